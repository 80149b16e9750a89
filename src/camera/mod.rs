//! Camera fleet access: enumeration and snapshot capture.
//!
//! Cameras are plain HTTP devices that serve a single JPEG frame on
//! `/?action=snapshot`. Configuration lives in the database; the monitor
//! only consumes the list and never mutates it.

use anyhow::Result;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::db::Database;

/// A configured camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Camera {
    pub id: i64,
    pub name: String,
    /// Host or host:port reachable over HTTP.
    pub address: String,
}

/// Failure modes when capturing a frame.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Connection failure or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The camera answered with a non-2xx status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The payload is too small to be a real frame.
    #[error("snapshot too small ({got} bytes, need {min})")]
    TooSmall { got: usize, min: usize },
}

/// Enumerates the configured camera fleet.
pub trait CameraSource: Send + Sync {
    fn list(&self) -> Result<Vec<Camera>>;
}

/// Captures frames from a single camera address.
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch one frame, bounded by `timeout`.
    fn fetch(&self, address: &str, timeout: Duration) -> Result<Vec<u8>, SnapshotError>;

    /// Cheap reachability check; must return within roughly `timeout`.
    fn probe(&self, address: &str, timeout: Duration) -> bool;
}

/// Camera list backed by the `cameras` table.
pub struct DbCameraSource {
    db: Arc<Database>,
}

impl DbCameraSource {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl CameraSource for DbCameraSource {
    fn list(&self) -> Result<Vec<Camera>> {
        self.db.list_cameras()
    }
}

/// HTTP snapshot client for MJPEG-streamer style cameras.
pub struct HttpSnapshotClient {
    user_agent: String,
}

impl HttpSnapshotClient {
    pub fn new() -> Self {
        Self {
            user_agent: format!("facewatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for HttpSnapshotClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot endpoint for a camera address.
fn snapshot_url(address: &str) -> String {
    format!("http://{}/?action=snapshot", address)
}

impl SnapshotFetcher for HttpSnapshotClient {
    fn fetch(&self, address: &str, timeout: Duration) -> Result<Vec<u8>, SnapshotError> {
        let response = ureq::get(&snapshot_url(address))
            .timeout(timeout)
            .set("User-Agent", &self.user_agent)
            .call()
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => SnapshotError::Status(code),
                other => SnapshotError::Transport(other.to_string()),
            })?;

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| SnapshotError::Transport(e.to_string()))?;

        Ok(bytes)
    }

    fn probe(&self, address: &str, timeout: Duration) -> bool {
        // Any HTTP answer counts as reachable; only transport failures
        // (refused, timed out, unroutable) mark a camera offline.
        match ureq::get(&format!("http://{}/", address))
            .timeout(timeout)
            .set("User-Agent", &self.user_agent)
            .call()
        {
            Ok(_) | Err(ureq::Error::Status(_, _)) => true,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_url_shape() {
        assert_eq!(
            snapshot_url("192.168.0.42:8080"),
            "http://192.168.0.42:8080/?action=snapshot"
        );
    }

    #[test]
    fn snapshot_error_messages() {
        let err = SnapshotError::TooSmall { got: 12, min: 1000 };
        assert_eq!(err.to_string(), "snapshot too small (12 bytes, need 1000)");
        assert_eq!(SnapshotError::Status(503).to_string(), "unexpected HTTP status 503");
    }
}
