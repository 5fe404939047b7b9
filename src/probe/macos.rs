// macOS camera detection: when a client opens the camera, it holds a
// connection to the camera assistant, which shows up in its open-file
// table. `lsof` exposes that without needing special entitlements.

use anyhow::{Context, Result, bail};
use tokio::process::Command;

// Substrings that mark a process as talking to the camera stack.
const CAMERA_MARKERS: &[&str] = &["AppleCamera", "VDCAssistant", "iSight"];

// The assistant daemons themselves always match; they don't mean a
// client has the camera open.
const ASSISTANT_PROCESSES: &[&str] = &["VDCAssista", "appleh13ca", "UVCAssista"];

pub(super) async fn camera_in_use() -> Result<bool> {
    let output = Command::new("lsof")
        .args(["+c", "0", "-w", "-b", "-n"])
        .output()
        .await
        .context("spawning lsof")?;

    // lsof exits non-zero when some tables were unreadable; its partial
    // output is still usable, so only bail when there is none at all.
    if output.stdout.is_empty() {
        bail!("lsof produced no output ({})", output.status);
    }

    let listing = String::from_utf8_lossy(&output.stdout);
    Ok(listing.lines().any(holds_camera))
}

fn holds_camera(line: &str) -> bool {
    let Some(command) = line.split_whitespace().next() else {
        return false;
    };
    if ASSISTANT_PROCESSES.iter().any(|p| command.starts_with(p)) {
        return false;
    }
    CAMERA_MARKERS.iter().any(|m| line.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_camera_clients() {
        let line = "zoom.us  5122 alice  txt REG 1,13 1234 /System/Library/Frameworks/AppleCameraInterface";
        assert!(holds_camera(line));
    }

    #[test]
    fn ignores_the_assistant_itself() {
        let line = "VDCAssistant 301 root  txt REG 1,13 99 /Library/CoreMediaIO/Plug-Ins/DAL/AppleCamera.plugin";
        assert!(!holds_camera(line));
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(!holds_camera("Safari 812 alice cwd DIR 1,13 704 /Users/alice"));
        assert!(!holds_camera(""));
    }
}
