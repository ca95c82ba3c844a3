//! User-facing notices for failures the user has to act on.

use notify_rust::Notification;
use tracing::{debug, warn};

pub trait Notify: Send + Sync {
    fn notify(&self, summary: &str, body: &str);
}

/// Desktop notifications via notify-rust (D-Bus).
pub struct DesktopNotifier {
    enabled: bool,
}

impl DesktopNotifier {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }
}

impl Notify for DesktopNotifier {
    fn notify(&self, summary: &str, body: &str) {
        if !self.enabled {
            return;
        }

        debug!("Notification: {summary}");

        if let Err(e) = Notification::new()
            .summary(summary)
            .body(body)
            .icon("audio-input-microphone")
            .timeout(5000)
            .show()
        {
            warn!("Failed to show notification: {e}");
        }
    }
}
