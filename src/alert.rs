//! Alert Controller (C5): enforces at most one active alert process at a
//! time.

use crate::audio;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

struct Active {
    process: Child,
    filename: String,
}

/// Process-wide singleton alert state. `active` is `Some` iff a live child
/// process exists; a reaped process clears it before the next classification.
pub struct AlertController {
    player_command: String,
    mp3_dir: PathBuf,
    active: Mutex<Option<Active>>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertStatus {
    pub active: bool,
    pub filename: Option<String>,
}

impl AlertController {
    pub fn new(player_command: String, mp3_dir: PathBuf) -> Self {
        Self {
            player_command,
            mp3_dir,
            active: Mutex::new(None),
        }
    }

    /// Start a new alert, terminating any predecessor first.
    pub async fn trigger(&self, filename: &str, audio_device: Option<&str>) -> Result<(), String> {
        self.stop_current().await;

        let path = self.mp3_dir.join(filename);
        if !path.exists() {
            return Err(format!("alert sound file not found: {}", path.display()));
        }

        let child = audio::play(&self.player_command, &path, audio_device, false)
            .map_err(|e| format!("failed to launch alert playback: {e}"))?;

        info!(filename, "alert triggered");
        *self.active.lock().await = Some(Active {
            process: child,
            filename: filename.to_string(),
        });
        Ok(())
    }

    /// Stop the current alert, if any: terminate gracefully, then force-kill
    /// after the grace period if it hasn't exited.
    pub async fn stop(&self) {
        self.stop_current().await;
    }

    async fn stop_current(&self) {
        let Some(mut active) = self.active.lock().await.take() else {
            return;
        };

        if audio::has_exited(&mut active.process) {
            return;
        }

        // std::process offers no graceful-terminate signal; request exit via
        // kill and give it the grace period to actually reap before we'd
        // otherwise force a second kill (which is a no-op on an exited child).
        if let Err(e) = active.process.kill() {
            warn!(error = %e, "failed to signal alert process to stop");
        }
        let deadline = tokio::time::Instant::now() + STOP_GRACE_PERIOD;
        while tokio::time::Instant::now() < deadline {
            if audio::has_exited(&mut active.process) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        audio::kill(&mut active.process);
    }

    /// Stop the current alert and, if configured, play an end-of-alert sound
    /// as an untracked, fire-and-forget child.
    pub async fn end(&self, end_of_alert_filename: Option<&str>, audio_device: Option<&str>) {
        self.stop_current().await;

        let Some(filename) = end_of_alert_filename else {
            return;
        };

        let path = self.mp3_dir.join(filename);
        match audio::play(&self.player_command, &path, audio_device, false) {
            Ok(_child) => info!(filename, "playing end-of-alert sound"),
            Err(e) => warn!(filename, error = %e, "failed to play end-of-alert sound"),
        }
    }

    /// Reap the child if it has exited since the last check, then report
    /// the current status.
    pub async fn current_status(&self) -> AlertStatus {
        let mut guard = self.active.lock().await;
        if let Some(active) = guard.as_mut()
            && audio::has_exited(&mut active.process)
        {
            *guard = None;
        }

        match guard.as_ref() {
            Some(active) => AlertStatus {
                active: true,
                filename: Some(active.filename.clone()),
            },
            None => AlertStatus {
                active: false,
                filename: None,
            },
        }
    }
}

/// Whether `filename` names the file configured as the "PPMS"/attack sound,
/// used by the HTTP surface to decide whether a file-specific permission
/// check is required in addition to `control:alert_trigger_any`.
pub fn requires_file_specific_permission(filename: &str, configured_sound: &Path) -> bool {
    configured_sound.file_name().and_then(|n| n.to_str()) == Some(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_on_missing_file_errors() {
        let controller = AlertController::new(audio::DEFAULT_PLAYER_COMMAND.to_string(), PathBuf::from("/tmp/nonexistent-dir-xyz"));
        let result = controller.trigger("missing.mp3", None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn status_when_nothing_active() {
        let controller = AlertController::new(audio::DEFAULT_PLAYER_COMMAND.to_string(), PathBuf::from("/tmp"));
        let status = controller.current_status().await;
        assert!(!status.active);
        assert!(status.filename.is_none());
    }

    #[test]
    fn file_specific_permission_matches_by_name() {
        let configured = PathBuf::from("/mp3/attack.mp3");
        assert!(requires_file_specific_permission("attack.mp3", &configured));
        assert!(!requires_file_specific_permission("other.mp3", &configured));
    }
}
