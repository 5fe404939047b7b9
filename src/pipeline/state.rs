//! Pipeline lifecycle state

use std::time::Instant;

/// Lifecycle of the two-process audio pipeline.
///
/// Transitions are validated so that teardown logic can rely on the
/// ordering: once `Stopping` is entered, subprocess exits are expected
/// and must not trigger fault propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Subprocesses are being spawned and linked
    Starting,

    /// Both legs are up and audio is flowing
    Running {
        /// When the pipeline came up
        started_at: Instant,
    },

    /// Controlled teardown in progress; leg exits are expected
    Stopping,

    /// Pipeline is down and cannot be restarted
    Stopped,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Starting, Running { .. }) => true,
            (Starting, Stopping) => true, // aborting a half-built pipeline
            (Running { .. }, Stopping) => true,
            (Running { .. }, Stopped) => true, // fault propagation skips Stopping
            (Stopping, Stopped) => true,

            // Stopped is terminal
            (Stopped, _) => false,

            // Self-transitions
            (a, b) if a == b => true,

            _ => false,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Starting => "Starting",
            PipelineState::Running { .. } => "Running",
            PipelineState::Stopping => "Stopping",
            PipelineState::Stopped => "Stopped",
        }
    }

    /// Check if teardown has begun (faults should be suppressed)
    pub fn is_stopping(&self) -> bool {
        matches!(self, PipelineState::Stopping | PipelineState::Stopped)
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, PipelineState::Stopped)
    }

    /// Get the duration since the pipeline came up (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let starting = PipelineState::Starting;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let stopping = PipelineState::Stopping;
        let stopped = PipelineState::Stopped;

        assert!(starting.can_transition_to(&running));
        assert!(starting.can_transition_to(&stopping));
        assert!(running.can_transition_to(&stopping));
        assert!(running.can_transition_to(&stopped));
        assert!(stopping.can_transition_to(&stopped));

        // Self-transitions
        assert!(stopping.can_transition_to(&stopping));
        assert!(running.can_transition_to(&running));
    }

    #[test]
    fn test_stopped_is_terminal() {
        let stopped = PipelineState::Stopped;

        assert!(!stopped.can_transition_to(&PipelineState::Starting));
        assert!(!stopped.can_transition_to(&PipelineState::Running {
            started_at: Instant::now(),
        }));
        assert!(!stopped.can_transition_to(&PipelineState::Stopping));
    }

    #[test]
    fn test_state_checks() {
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };

        assert!(!running.is_stopping());
        assert!(running.running_duration().is_some());

        assert!(PipelineState::Stopping.is_stopping());
        assert!(!PipelineState::Stopping.is_stopped());
        assert!(PipelineState::Stopped.is_stopping());
        assert!(PipelineState::Stopped.is_stopped());
    }
}
