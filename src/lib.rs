//! Facewatch: a multi-camera face recognition monitor.
//!
//! The crate is built around three pieces:
//! - an [`identity::IdentityIndex`] that keeps embeddings for enrolled
//!   identities, backed by a durable cache that is rebuilt when the
//!   enrollment registry changes,
//! - a [`matcher`] that compares probe embeddings against the index with a
//!   cosine-distance threshold and a derived confidence score,
//! - a [`monitor::Monitor`] that periodically captures snapshots from all
//!   reachable cameras, matches any faces found, logs detections and sends
//!   best-effort notifications.
//!
//! External collaborators (the embedding backend, the camera fleet, the
//! detection log, the notification service) are reached through narrow
//! traits so they can be swapped or faked in tests.

pub mod camera;
pub mod config;
pub mod db;
pub mod embed;
pub mod identity;
pub mod logging;
pub mod matcher;
pub mod monitor;
pub mod notify;

pub use config::Config;
pub use db::{Database, DetectionEvent, DetectionSink};
pub use embed::{EmbedError, EmbeddingProvider};
pub use identity::IdentityIndex;
pub use matcher::{MatchOutcome, DEFAULT_MATCH_THRESHOLD};
pub use monitor::{Monitor, MonitorStatus};
