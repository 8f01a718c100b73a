//! Audio Player (C4): plays a single sound file through an isolated child
//! process, so a crashing or hanging audio backend cannot take down the
//! scheduler.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use tracing::{error, warn};

/// The external player binary invoked for every playback. Kept configurable
/// so tests and alternate deployments can point at a different backend.
pub const DEFAULT_PLAYER_COMMAND: &str = "ffplay";

/// Launch `file_path` as a detached child process and return its handle.
///
/// A missing file or device is not fatal: the player falls back to the
/// system default output device and the error is logged, matching the
/// component's "best effort" playback contract. The caller decides whether
/// to track the child (Alert Controller) or let it run untracked (end-of-
/// alert sound).
pub fn play(player_command: &str, file_path: &Path, device_name: Option<&str>, loop_playback: bool) -> std::io::Result<Child> {
    if !file_path.exists() {
        warn!(path = %file_path.display(), "audio file missing, falling back to default device playback attempt");
    }

    let mut command = Command::new(player_command);
    command
        .arg("-nodisp")
        .arg("-autoexit")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    if loop_playback {
        command.arg("-loop").arg("0");
    }

    if let Some(device) = device_name {
        command.env("AUDIODEV", device);
    }

    command.arg(file_path);

    command.spawn().inspect_err(|e| {
        error!(path = %file_path.display(), error = %e, "failed to spawn audio player child process");
    })
}

/// Poll whether a previously spawned child has exited, without blocking.
pub fn has_exited(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(Some(_)))
}

/// Terminate a child process: best-effort graceful kill, since `std::process`
/// offers no portable "request termination" signal short of `kill`.
pub fn kill(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "failed to kill audio player child process");
    }
    let _ = child.wait();
}
