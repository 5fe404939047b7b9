// Linux camera detection: walk /proc and look for processes holding an
// open file descriptor on a video4linux device node.

use anyhow::{Context, Result};
use procfs::process::FDTarget;
use std::path::Path;

pub(super) async fn camera_in_use() -> Result<bool> {
    // /proc traversal is blocking filesystem work.
    tokio::task::spawn_blocking(scan_proc)
        .await
        .context("camera scan task failed")?
}

fn scan_proc() -> Result<bool> {
    let processes = procfs::process::all_processes().context("listing /proc")?;

    for process in processes {
        let Ok(process) = process else { continue };
        // fd listing fails for processes we don't own; skip them.
        let Ok(fds) = process.fd() else { continue };

        for fd in fds.flatten() {
            if let FDTarget::Path(path) = fd.target {
                if is_video_device(&path) {
                    return Ok(true);
                }
            }
        }
    }

    Ok(false)
}

fn is_video_device(path: &Path) -> bool {
    path.to_str()
        .map(|p| p.starts_with("/dev/video"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn recognizes_video_device_nodes() {
        assert!(is_video_device(&PathBuf::from("/dev/video0")));
        assert!(is_video_device(&PathBuf::from("/dev/video12")));
        assert!(!is_video_device(&PathBuf::from("/dev/snd/pcmC0D0c")));
        assert!(!is_video_device(&PathBuf::from("/tmp/video0")));
    }

    #[tokio::test]
    async fn probe_does_not_error_on_this_host() {
        // Whatever the answer, the scan itself must succeed.
        assert!(camera_in_use().await.is_ok());
    }
}
