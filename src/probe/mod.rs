//! Camera activity probing
//!
//! Answers one question: is any process currently using the camera?
//! Every failure mode (missing tool, permission denied, unparsable
//! output) degrades to `false` so the caller never has to handle an
//! error from a probe.

use async_trait::async_trait;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
use linux as platform;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
use macos as platform;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
use windows as platform;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
mod platform {
    pub(super) async fn camera_in_use() -> anyhow::Result<bool> {
        // No detection mechanism on this OS; the track stays muted.
        Ok(false)
    }
}

/// Source of the camera-in-use signal.
///
/// Implementations may be slow (some shell out to system tools), so the
/// query is async; they must never fail outward.
#[async_trait]
pub trait CameraProbe: Send + Sync {
    async fn probe(&self) -> bool;
}

/// Probe backed by the OS-specific detection mechanism.
pub struct SystemProbe;

#[async_trait]
impl CameraProbe for SystemProbe {
    async fn probe(&self) -> bool {
        absorb(platform::camera_in_use().await)
    }
}

/// A failed query means "idle", never an error for the caller.
fn absorb(result: anyhow::Result<bool>) -> bool {
    match result {
        Ok(active) => active,
        Err(e) => {
            log::debug!("camera probe failed, assuming idle: {e:#}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn failures_degrade_to_inactive() {
        assert!(!absorb(Err(anyhow!("detection tool unavailable"))));
        assert!(absorb(Ok(true)));
        assert!(!absorb(Ok(false)));
    }
}
