//! Monitoring cycle execution.
//!
//! Runs on the worker thread spawned by [`super::Monitor::start`]. Every
//! fallible step is contained to the camera it belongs to: a dead camera,
//! a corrupt frame, a failed sink write or a failed notification are all
//! logged and skipped, and the loop only ever exits through the stop flag.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::camera::Camera;
use crate::db::DetectionEvent;
use crate::matcher::{self, MatchOutcome};

use super::{CameraStatus, MonitorInner};

/// How often the per-cycle sleep re-checks the stop flag.
const SLEEP_SLICE: Duration = Duration::from_millis(250);

pub(super) fn run_loop(inner: &MonitorInner, stop: &AtomicBool) {
    let mut cycle: u64 = 0;
    while !stop.load(Ordering::SeqCst) {
        run_cycle(inner, cycle, stop);
        cycle = cycle.wrapping_add(1);
        sleep_between_cycles(inner, stop);
    }
    debug!("Monitor worker exiting");
}

/// One pass over the active cameras.
pub(super) fn run_cycle(inner: &MonitorInner, cycle: u64, stop: &AtomicBool) {
    let cameras = active_cameras(inner, cycle);

    for camera in cameras {
        if stop.load(Ordering::SeqCst) {
            debug!("Stop requested mid-cycle");
            return;
        }
        process_camera(inner, &camera);
    }
}

/// Current active camera list, refreshed every Nth cycle or whenever it
/// is empty. Discovery cost stays off the common path.
fn active_cameras(inner: &MonitorInner, cycle: u64) -> Vec<Camera> {
    let needs_refresh = {
        let state = inner.state.lock().expect("monitor state lock poisoned");
        cycle % inner.settings.camera_refresh_cycles == 0 || state.active_cameras.is_empty()
    };

    if needs_refresh {
        refresh_active_cameras(inner);
    }

    inner
        .state
        .lock()
        .expect("monitor state lock poisoned")
        .active_cameras
        .clone()
}

fn refresh_active_cameras(inner: &MonitorInner) {
    let listed = match inner.cameras.list() {
        Ok(cameras) => cameras,
        Err(e) => {
            warn!(error = %e, "Camera listing failed, keeping previous active set");
            return;
        }
    };

    let mut active = Vec::new();
    for camera in listed {
        if inner
            .snapshots
            .probe(&camera.address, inner.settings.probe_timeout)
        {
            active.push(camera);
        } else {
            debug!(camera = %camera.name, address = %camera.address,
                "Camera unreachable, dropped for this cycle");
            set_camera_status(
                inner,
                CameraStatus::offline(&camera, "unreachable".to_string()),
            );
        }
    }

    let mut state = inner.state.lock().expect("monitor state lock poisoned");
    state.active_cameras = active;
}

fn process_camera(inner: &MonitorInner, camera: &Camera) {
    let bytes = match inner
        .snapshots
        .fetch(&camera.address, inner.settings.snapshot_timeout)
    {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(camera = %camera.name, error = %e, "Snapshot failed");
            set_camera_status(inner, CameraStatus::offline(camera, e.to_string()));
            return;
        }
    };

    if bytes.len() < inner.settings.min_snapshot_bytes {
        let error = crate::camera::SnapshotError::TooSmall {
            got: bytes.len(),
            min: inner.settings.min_snapshot_bytes,
        };
        warn!(camera = %camera.name, error = %error, "Snapshot rejected");
        set_camera_status(inner, CameraStatus::offline(camera, error.to_string()));
        return;
    }

    analyze_snapshot(inner, camera, &bytes);
}

fn analyze_snapshot(inner: &MonitorInner, camera: &Camera, bytes: &[u8]) {
    // A probe that cannot be embedded degrades to "no faces", never to a
    // cycle failure.
    let embeddings = match inner.provider.extract(bytes) {
        Ok(embeddings) => embeddings,
        Err(e) => {
            warn!(camera = %camera.name, error = %e, "Face extraction failed, treating frame as empty");
            Vec::new()
        }
    };

    if embeddings.is_empty() {
        set_camera_status(inner, CameraStatus::online(camera, 0, 0, 0));
        return;
    }

    let known = inner.index.snapshot();
    let mut known_faces = 0;
    let mut unknown_faces = 0;

    for embedding in &embeddings {
        let outcome = matcher::best_match(embedding, &known, inner.settings.match_threshold);
        if outcome.no_known_identities {
            debug!(camera = %camera.name, "Face seen but nobody is enrolled");
        }
        if outcome.is_known() {
            known_faces += 1;
        } else {
            unknown_faces += 1;
        }

        let event = DetectionEvent {
            name: outcome.matched.clone(),
            confidence: outcome.confidence,
            is_known: outcome.is_known(),
            detected_at: Utc::now(),
            camera_id: Some(camera.id),
        };
        if let Err(e) = inner.sink.record(&event) {
            warn!(camera = %camera.name, error = %e, "Failed to record detection");
        }

        maybe_notify(inner, camera, &outcome, bytes);
    }

    {
        let mut state = inner.state.lock().expect("monitor state lock poisoned");
        state.last_detection_time = Some(Utc::now());
    }

    set_camera_status(
        inner,
        CameraStatus::online(camera, embeddings.len(), known_faces, unknown_faces),
    );
}

/// Alert unless the recognized person is the configured trusted identity.
/// Delivery failures are logged and swallowed; a later cycle re-notifies
/// if the sighting persists.
fn maybe_notify(inner: &MonitorInner, camera: &Camera, outcome: &MatchOutcome, image: &[u8]) {
    let Some(notifier) = &inner.notifier else {
        return;
    };

    if let Some(name) = outcome.matched.as_deref() {
        let trusted = inner
            .settings
            .trusted_name
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case(name));
        if trusted {
            debug!(name = %name, "Trusted identity, no alert");
            return;
        }
    }

    if let Err(e) = notifier.notify(outcome.matched.as_deref(), &camera.name, image) {
        warn!(camera = %camera.name, error = %e, "Notification failed");
    }
}

fn set_camera_status(inner: &MonitorInner, status: CameraStatus) {
    let mut state = inner.state.lock().expect("monitor state lock poisoned");
    state.camera_status.insert(status.camera_id, status);
}

/// Sleep for the configured interval in short slices so `stop()` is
/// observed promptly rather than after a full period.
fn sleep_between_cycles(inner: &MonitorInner, stop: &AtomicBool) {
    let interval = {
        let state = inner.state.lock().expect("monitor state lock poisoned");
        Duration::from_secs(state.interval_seconds)
    };

    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::SeqCst) {
            return;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}
