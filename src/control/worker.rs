use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use super::client::ControlClient;
use super::link::{ControlEndpoint, ControlReply};

/// Handle to the background task that performs remote calls
#[derive(Debug)]
pub struct ControlWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Spawn the worker on the current tokio runtime
///
/// Each request runs as its own task so a blocking collision tick never
/// delays an optimization call.
pub fn spawn_control_worker(client: ControlClient, endpoint: ControlEndpoint) -> ControlWorker {
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(run(client, endpoint, shutdown_rx));
    ControlWorker { shutdown, handle }
}

impl ControlWorker {
    /// Stop accepting requests, abort outstanding calls and wait for the task
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            warn!("Control worker ended abnormally: {}", err);
        }
    }
}

async fn run(
    client: ControlClient,
    mut endpoint: ControlEndpoint,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pending: JoinSet<ControlReply> = JoinSet::new();

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            request = endpoint.requests.recv() => {
                let Some(request) = request else {
                    debug!("Simulation dropped its control link");
                    break;
                };
                let client = client.clone();
                pending.spawn(async move { client.handle(request).await });
            }
            Some(joined) = pending.join_next(), if !pending.is_empty() => {
                match joined {
                    Ok(reply) => {
                        if endpoint.replies.send(reply).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("Control request task failed: {}", err),
                }
            }
        }
    }

    if !pending.is_empty() {
        info!("Aborting {} outstanding control requests", pending.len());
    }
    pending.abort_all();
    while pending.join_next().await.is_some() {}
}
