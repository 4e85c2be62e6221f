use std::fmt;

/// Errors encountered while talking to the remote decision services
#[derive(Debug)]
pub enum ControlError {
    /// The request never completed
    Http(reqwest::Error),
    /// The service answered with a non-success status
    Status(reqwest::StatusCode),
    /// The body could not be decoded
    Json(reqwest::Error),
    /// The body decoded but its content is unusable
    Parse(String),
    /// The worker task is gone
    Disconnected,
}

impl ControlError {
    /// Transport-level failure, as opposed to a bad payload
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ControlError::Http(_) | ControlError::Status(_) | ControlError::Disconnected
        )
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlError::Http(err) => write!(f, "request failed: {}", err),
            ControlError::Status(status) => write!(f, "service returned {}", status),
            ControlError::Json(err) => write!(f, "malformed response body: {}", err),
            ControlError::Parse(msg) => write!(f, "unusable response: {}", msg),
            ControlError::Disconnected => write!(f, "control worker disconnected"),
        }
    }
}

impl std::error::Error for ControlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ControlError::Http(err) | ControlError::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ControlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ControlError::Json(err)
        } else {
            ControlError::Http(err)
        }
    }
}

impl From<serde_json::Error> for ControlError {
    fn from(err: serde_json::Error) -> Self {
        ControlError::Parse(err.to_string())
    }
}
