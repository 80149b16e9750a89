//! Best-effort alert notifications.
//!
//! Delivery failures are the caller's problem only insofar as they get a
//! `NotifyError` to log; the monitor never retries inside a cycle, since a
//! persisting condition re-notifies naturally on a later cycle.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::time::Duration;
use thiserror::Error;

use crate::config::NotifyConfig;

/// Upper bound on one delivery attempt, so a slow push service can never
/// stall a monitoring cycle for long.
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Sends an alert about a sighted person, with the frame attached.
/// `name` is `None` for an unrecognized person.
pub trait Notifier: Send + Sync {
    fn notify(&self, name: Option<&str>, camera_name: &str, image: &[u8]) -> Result<(), NotifyError>;
}

/// Pushover-style form POST with the frame attached as base64.
pub struct PushNotifier {
    config: NotifyConfig,
}

impl PushNotifier {
    pub fn new(config: NotifyConfig) -> Self {
        Self { config }
    }
}

fn alert_message(name: Option<&str>, camera_name: &str) -> String {
    match name {
        Some(name) => format!("Alert: '{}' sighted on camera {}", name, camera_name),
        None => format!("Alert: unknown person sighted on camera {}", camera_name),
    }
}

impl Notifier for PushNotifier {
    fn notify(&self, name: Option<&str>, camera_name: &str, image: &[u8]) -> Result<(), NotifyError> {
        let message = alert_message(name, camera_name);
        let priority = self.config.priority.to_string();
        let attachment = BASE64.encode(image);

        let form: Vec<(&str, &str)> = vec![
            ("token", self.config.token.as_str()),
            ("user", self.config.user.as_str()),
            ("message", message.as_str()),
            ("priority", priority.as_str()),
            ("sound", "Alarm"),
            ("attachment_base64", attachment.as_str()),
            ("attachment_type", "image/jpeg"),
        ];

        let response = ureq::post(&self.config.endpoint)
            .timeout(SEND_TIMEOUT)
            .send_form(&form)
            .map_err(|e| NotifyError(e.to_string()))?;

        tracing::debug!(status = response.status(), "Notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_the_person_and_camera() {
        assert_eq!(
            alert_message(Some("Raik"), "Front door"),
            "Alert: 'Raik' sighted on camera Front door"
        );
        assert_eq!(
            alert_message(None, "Garage"),
            "Alert: unknown person sighted on camera Garage"
        );
    }
}
