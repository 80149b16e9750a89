//! Continuous multi-camera monitoring.
//!
//! One background worker thread runs capture-and-match cycles at a
//! configurable interval. Control operations (`start`, `stop`,
//! `set_interval`, `status`) synchronize with the worker through a single
//! mutex around [`MonitorState`] and a cooperative stop flag; the worker is
//! never killed mid-cycle.

mod cycle;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::camera::{Camera, CameraSource, SnapshotFetcher};
use crate::config::Config;
use crate::db::DetectionSink;
use crate::embed::EmbeddingProvider;
use crate::identity::{IdentityIndex, LoadReport};
use crate::notify::Notifier;

/// Snapshot of the monitor for external callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorStatus {
    pub running: bool,
    pub interval_seconds: u64,
    pub last_detection_time: Option<DateTime<Utc>>,
    pub active_camera_count: usize,
}

/// Last observed state of one camera, refreshed each cycle it takes part in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraStatus {
    pub camera_id: i64,
    pub camera_name: String,
    pub online: bool,
    /// Failure description when the camera could not deliver a frame.
    pub error: Option<String>,
    pub faces: usize,
    pub known_faces: usize,
    pub unknown_faces: usize,
    pub checked_at: DateTime<Utc>,
}

impl CameraStatus {
    fn offline(camera: &Camera, error: String) -> Self {
        Self {
            camera_id: camera.id,
            camera_name: camera.name.clone(),
            online: false,
            error: Some(error),
            faces: 0,
            known_faces: 0,
            unknown_faces: 0,
            checked_at: Utc::now(),
        }
    }

    fn online(camera: &Camera, faces: usize, known_faces: usize, unknown_faces: usize) -> Self {
        Self {
            camera_id: camera.id,
            camera_name: camera.name.clone(),
            online: true,
            error: None,
            faces,
            known_faces,
            unknown_faces,
            checked_at: Utc::now(),
        }
    }
}

/// Tunables for the monitoring loop, derived from [`Config`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval_seconds: u64,
    pub min_interval_seconds: u64,
    pub max_interval_seconds: u64,
    pub camera_refresh_cycles: u64,
    pub snapshot_timeout: Duration,
    pub probe_timeout: Duration,
    pub stop_timeout: Duration,
    pub match_threshold: f32,
    pub trusted_name: Option<String>,
    pub min_snapshot_bytes: usize,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval_seconds: config.monitor.interval_seconds,
            min_interval_seconds: config.monitor.min_interval_seconds,
            max_interval_seconds: config.monitor.max_interval_seconds,
            camera_refresh_cycles: config.monitor.camera_refresh_cycles.max(1),
            snapshot_timeout: Duration::from_secs(config.monitor.snapshot_timeout_secs),
            probe_timeout: Duration::from_secs(config.monitor.probe_timeout_secs),
            stop_timeout: Duration::from_secs(config.monitor.stop_timeout_secs),
            match_threshold: config.recognition.match_threshold,
            trusted_name: config.recognition.trusted_name.clone(),
            min_snapshot_bytes: config.recognition.min_snapshot_bytes,
        }
    }

    fn clamp_interval(&self, seconds: u64) -> u64 {
        seconds
            .max(self.min_interval_seconds)
            .min(self.max_interval_seconds)
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub(super) struct MonitorState {
    running: bool,
    interval_seconds: u64,
    last_detection_time: Option<DateTime<Utc>>,
    active_cameras: Vec<Camera>,
    camera_status: HashMap<i64, CameraStatus>,
    /// Stop flag for the current worker; replaced on every `start` so a
    /// worker that overstayed a stop timeout can never be revived.
    stop_flag: Arc<AtomicBool>,
}

pub(super) struct MonitorInner {
    pub(super) settings: MonitorSettings,
    pub(super) state: Mutex<MonitorState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(super) cameras: Arc<dyn CameraSource>,
    pub(super) snapshots: Arc<dyn SnapshotFetcher>,
    pub(super) provider: Arc<dyn EmbeddingProvider>,
    pub(super) index: Arc<IdentityIndex>,
    pub(super) sink: Arc<dyn DetectionSink>,
    pub(super) notifier: Option<Arc<dyn Notifier>>,
}

/// The monitoring scheduler and its control surface.
///
/// Cheap to clone conceptually (wraps an `Arc`); all methods take `&self`
/// and are safe to call from any thread.
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: MonitorSettings,
        cameras: Arc<dyn CameraSource>,
        snapshots: Arc<dyn SnapshotFetcher>,
        provider: Arc<dyn EmbeddingProvider>,
        index: Arc<IdentityIndex>,
        sink: Arc<dyn DetectionSink>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        let interval_seconds = settings.clamp_interval(settings.interval_seconds);
        Self {
            inner: Arc::new(MonitorInner {
                settings,
                state: Mutex::new(MonitorState {
                    running: false,
                    interval_seconds,
                    last_detection_time: None,
                    active_cameras: Vec::new(),
                    camera_status: HashMap::new(),
                    stop_flag: Arc::new(AtomicBool::new(true)),
                }),
                worker: Mutex::new(None),
                cameras,
                snapshots,
                provider,
                index,
                sink,
                notifier,
            }),
        }
    }

    /// Start the background worker. A no-op when already running.
    pub fn start(&self) {
        let mut worker = self.inner.worker.lock().expect("monitor worker lock poisoned");

        let stop_flag = {
            let mut state = self.inner.state.lock().expect("monitor state lock poisoned");
            if state.running {
                debug!("Monitoring already running");
                return;
            }
            state.running = true;
            state.stop_flag = Arc::new(AtomicBool::new(false));
            state.stop_flag.clone()
        };

        let inner = self.inner.clone();
        *worker = Some(std::thread::spawn(move || {
            cycle::run_loop(&inner, &stop_flag);
        }));

        info!("Monitoring started");
    }

    /// Signal the worker to stop and wait (bounded) for it to exit.
    /// A no-op when already stopped; never interrupts an in-flight
    /// snapshot fetch, which is bounded by its own timeout.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock().expect("monitor state lock poisoned");
            if !state.running {
                debug!("Monitoring already stopped");
                return;
            }
            state.running = false;
            state.stop_flag.store(true, Ordering::SeqCst);
        }

        let handle = self
            .inner
            .worker
            .lock()
            .expect("monitor worker lock poisoned")
            .take();

        if let Some(handle) = handle {
            let deadline = Instant::now() + self.inner.settings.stop_timeout;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }

            if handle.is_finished() {
                let _ = handle.join();
                info!("Monitoring stopped");
            } else {
                // The worker saw the flag but is still inside a bounded
                // network call; it will exit on its own.
                warn!("Monitor worker still draining after stop timeout");
            }
        }
    }

    /// Change the cycle interval. Clamped to the configured range and
    /// applied from the next sleep onward. Returns the value in effect.
    pub fn set_interval(&self, seconds: u64) -> u64 {
        let clamped = self.inner.settings.clamp_interval(seconds);
        let mut state = self.inner.state.lock().expect("monitor state lock poisoned");
        state.interval_seconds = clamped;
        debug!(interval = clamped, "Monitoring interval updated");
        clamped
    }

    pub fn status(&self) -> MonitorStatus {
        let state = self.inner.state.lock().expect("monitor state lock poisoned");
        MonitorStatus {
            running: state.running,
            interval_seconds: state.interval_seconds,
            last_detection_time: state.last_detection_time,
            active_camera_count: state.active_cameras.len(),
        }
    }

    /// Per-camera outcomes of the most recent cycles, ordered by camera id.
    pub fn camera_statuses(&self) -> Vec<CameraStatus> {
        let state = self.inner.state.lock().expect("monitor state lock poisoned");
        let mut statuses: Vec<CameraStatus> = state.camera_status.values().cloned().collect();
        statuses.sort_by_key(|s| s.camera_id);
        statuses
    }

    /// Rebuild the identity index after enrollment changes.
    pub fn reload_identities(&self) -> LoadReport {
        self.inner.index.reload()
    }

    /// Execute a single monitoring cycle synchronously (daemon `--once`
    /// mode and tests). Independent of the background worker.
    pub fn run_once(&self) {
        let stop = AtomicBool::new(false);
        cycle::run_cycle(&self.inner, 0, &stop);
    }
}
