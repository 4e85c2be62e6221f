//! Map data consumed from the map-data collaborator
//!
//! The JSON shape is `{nodes, arcs, intersections, centralAntenna}`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct MapNode {
    pub id: String,
    #[serde(alias = "longitude")]
    pub lon: f64,
    #[serde(alias = "latitude")]
    pub lat: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapArc {
    pub from: String,
    pub to: String,
    #[serde(rename = "type", default = "default_road_type")]
    pub road_type: String,
}

fn default_road_type() -> String {
    "road".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MapIntersection {
    pub id: String,
    #[serde(alias = "longitude")]
    pub lon: f64,
    #[serde(alias = "latitude")]
    pub lat: f64,
}

/// The sensor position; its intersection never gets traffic lights
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CentralAntenna {
    #[serde(alias = "longitude")]
    pub lon: f64,
    #[serde(alias = "latitude")]
    pub lat: f64,
    #[serde(default)]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapData {
    pub nodes: Vec<MapNode>,
    pub arcs: Vec<MapArc>,
    #[serde(default)]
    pub intersections: Vec<MapIntersection>,
    #[serde(default)]
    pub central_antenna: Option<CentralAntenna>,
}

impl MapData {
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Map data is not valid JSON")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read map {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Failed to load map {}", path.display()))
    }

    pub fn add_node(&mut self, id: &str, lon: f64, lat: f64) {
        self.nodes.push(MapNode {
            id: id.to_string(),
            lon,
            lat,
        });
    }

    pub fn add_arc(&mut self, from: &str, to: &str) {
        self.arcs.push(MapArc {
            from: from.to_string(),
            to: to.to_string(),
            road_type: default_road_type(),
        });
    }

    /// Build a rectangular street grid anchored at `(origin_lon, origin_lat)`
    ///
    /// Node ids are `n<col>_<row>`. Intersections are left empty so they are
    /// detected from node degree, and the antenna sits on the centre node.
    pub fn demo_grid(cols: usize, rows: usize, origin_lon: f64, origin_lat: f64, spacing: f64) -> Self {
        let mut map = MapData::default();
        let node_id = |c: usize, r: usize| format!("n{c}_{r}");

        for c in 0..cols {
            for r in 0..rows {
                map.add_node(
                    &node_id(c, r),
                    origin_lon + c as f64 * spacing,
                    origin_lat + r as f64 * spacing * 0.7,
                );
            }
        }

        for c in 0..cols {
            for r in 0..rows {
                if c + 1 < cols {
                    map.add_arc(&node_id(c, r), &node_id(c + 1, r));
                }
                if r + 1 < rows {
                    map.add_arc(&node_id(c, r), &node_id(c, r + 1));
                }
            }
        }

        if cols > 0 && rows > 0 {
            let (c, r) = (cols / 2, rows / 2);
            map.central_antenna = Some(CentralAntenna {
                lon: origin_lon + c as f64 * spacing,
                lat: origin_lat + r as f64 * spacing * 0.7,
                node_id: Some(node_id(c, r)),
            });
        }

        map
    }
}
