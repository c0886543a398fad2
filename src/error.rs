//! Driver error types and public status codes

use linkhub_transport::TransportError;
use serde::Serialize;
use thiserror::Error;

/// Errors raised inside the driver runtime.
///
/// These never cross the driver command API; commands log them and
/// answer with a [`Status`].
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("image: {0}")]
    Image(#[from] image::ImageError),

    #[error("metrics: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("profile: {0}")]
    Profile(String),

    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Status code returned by driver commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Status {
    Failure = 0,
    Ok = 1,
    /// A precondition failed (unknown profile, no pump for liquid sensor,
    /// deleting the active profile)
    Rejected = 2,
    /// The action is not allowed in the current state
    Forbidden = 3,
    /// Lighting is driven by the cluster broadcaster
    ClusterBlocked = 5,
}

impl Status {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<bool> for Status {
    fn from(ok: bool) -> Self {
        if ok {
            Status::Ok
        } else {
            Status::Failure
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(Status::Failure.code(), 0);
        assert_eq!(Status::Ok.code(), 1);
        assert_eq!(Status::Rejected.code(), 2);
        assert_eq!(Status::Forbidden.code(), 3);
        assert_eq!(Status::ClusterBlocked.code(), 5);
    }

    #[test]
    fn test_transport_error_wraps() {
        let err: DriverError = TransportError::Timeout.into();
        assert!(err.to_string().contains("timeout"));
    }
}
