//! Activity transition logic
//!
//! Pure edge detection over the camera readings: raise immediately on the
//! first active reading, mute only after the off-debounce window passes
//! with no activity in between. Commands come out of state *transitions*
//! only; steady readings are silent.

use std::time::{Duration, Instant};

/// Volume change the pipeline should be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeCommand {
    /// Bring the music up to its active level.
    Raise,
    /// Silence the music.
    Mute,
}

/// Debounced view of the camera signal.
///
/// `applied` tracks the last state a command was issued for; the
/// off-debounce is an owned deadline, armed by the first inactive reading
/// and disarmed by any active one, so a firing timer can never race a
/// cancellation.
#[derive(Debug)]
pub struct ActivityState {
    current: bool,
    applied: bool,
    pending_off: Option<Instant>,
}

impl ActivityState {
    /// Starts inactive, matching the pipeline's initially muted track.
    pub fn new() -> Self {
        ActivityState {
            current: false,
            applied: false,
            pending_off: None,
        }
    }

    /// Feeds one probe reading taken at `now`.
    pub fn observe(
        &mut self,
        reading: bool,
        now: Instant,
        window: Duration,
    ) -> Option<VolumeCommand> {
        self.current = reading;

        if reading {
            // Any activity disarms a pending mute.
            self.pending_off = None;
            if !self.applied {
                self.applied = true;
                return Some(VolumeCommand::Raise);
            }
            None
        } else {
            if self.applied && self.pending_off.is_none() {
                self.pending_off = Some(now + window);
            }
            None
        }
    }

    /// Deadline of the armed off-debounce, if any.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending_off
    }

    /// Commits the pending mute once its deadline has passed.
    pub fn commit_pending(&mut self, now: Instant) -> Option<VolumeCommand> {
        match self.pending_off {
            Some(deadline) if now >= deadline => {
                self.pending_off = None;
                self.applied = false;
                Some(VolumeCommand::Mute)
            }
            _ => None,
        }
    }
}

impl Default for ActivityState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(1);

    /// Replays `readings` one poll interval apart, committing any expired
    /// deadline before each poll (the loop's timer fires first), then
    /// keeps ticking the timer for `tail` extra intervals.
    fn replay(
        readings: &[bool],
        window: Duration,
        tail: usize,
    ) -> Vec<(usize, VolumeCommand)> {
        let start = Instant::now();
        let mut state = ActivityState::new();
        let mut issued = Vec::new();

        for step in 0..readings.len() + tail {
            let now = start + INTERVAL * step as u32;
            if let Some(cmd) = state.commit_pending(now) {
                issued.push((step, cmd));
            }
            if let Some(&reading) = readings.get(step) {
                if let Some(cmd) = state.observe(reading, now, window) {
                    issued.push((step, cmd));
                }
            }
        }

        issued
    }

    #[test]
    fn raises_once_on_first_active_reading() {
        // Scenario A: [F,F,T,T,T] -> one raise, at the third reading.
        let issued = replay(&[false, false, true, true, true], INTERVAL * 2, 2);
        assert_eq!(issued, vec![(2, VolumeCommand::Raise)]);
    }

    #[test]
    fn mutes_only_after_the_debounce_window() {
        // Scenario B: [T,T,F,F,F,F], window of 2 intervals -> raise at
        // the first reading, mute 2 intervals after the first F.
        let issued = replay(&[true, true, false, false, false, false], INTERVAL * 2, 2);
        assert_eq!(
            issued,
            vec![(0, VolumeCommand::Raise), (4, VolumeCommand::Mute)]
        );
    }

    #[test]
    fn activity_during_the_window_cancels_the_mute() {
        // Scenario C: [T,F,T], window of 2 intervals -> the armed mute is
        // cancelled; no mute ever fires.
        let issued = replay(&[true, false, true], INTERVAL * 2, 4);
        assert_eq!(issued, vec![(0, VolumeCommand::Raise)]);
    }

    #[test]
    fn steady_readings_issue_nothing() {
        assert!(replay(&[false; 6], INTERVAL * 2, 2).is_empty());

        let issued = replay(&[true; 6], INTERVAL * 2, 2);
        assert_eq!(issued.len(), 1);
    }

    #[test]
    fn full_cycle_can_repeat() {
        let issued = replay(
            &[true, false, false, false, true, true],
            INTERVAL * 2,
            0,
        );
        assert_eq!(
            issued,
            vec![
                (0, VolumeCommand::Raise),
                (3, VolumeCommand::Mute),
                (4, VolumeCommand::Raise),
            ]
        );
    }

    #[test]
    fn deadline_is_armed_once_per_inactive_stretch() {
        let mut state = ActivityState::new();
        let start = Instant::now();
        let window = INTERVAL * 2;

        state.observe(true, start, window);
        state.observe(false, start + INTERVAL, window);
        let deadline = state.pending_deadline().unwrap();

        // Further inactive readings must not push the deadline back.
        state.observe(false, start + INTERVAL * 2, window);
        assert_eq!(state.pending_deadline(), Some(deadline));
    }
}
