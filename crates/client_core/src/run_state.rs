use shared::domain::RunState;

/// Holds the last run state reported by the DAQ core.
#[derive(Debug, Default, Clone)]
pub struct RunStateTracker {
    current: RunState,
}

impl RunStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` as-is and reports whether it differs from the previous state.
    pub fn apply_run_state(&mut self, value: RunState) -> bool {
        let changed = self.current != value;
        self.current = value;
        changed
    }

    pub fn current(&self) -> &RunState {
        &self.current
    }

    pub fn is_command_enabled<S: AsRef<str>>(&self, enabled_states: &[S]) -> bool {
        enabled_states
            .iter()
            .any(|state| state.as_ref() == self.current.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_any_value_verbatim() {
        let mut tracker = RunStateTracker::new();
        for value in ["READY", "ready ", "", "CALIBRATING", "RUN"] {
            tracker.apply_run_state(RunState::new(value));
            assert_eq!(tracker.current().as_str(), value);
        }
    }

    #[test]
    fn reports_change_only_on_new_value() {
        let mut tracker = RunStateTracker::new();
        assert!(tracker.apply_run_state(RunState::new(RunState::INIT)));
        assert!(!tracker.apply_run_state(RunState::new(RunState::INIT)));
        assert!(tracker.apply_run_state(RunState::new(RunState::READY)));
    }

    #[test]
    fn enablement_is_membership() {
        let mut tracker = RunStateTracker::new();
        tracker.apply_run_state(RunState::new(RunState::READY));
        assert!(tracker.is_command_enabled(&[RunState::READY]));
        assert!(!tracker.is_command_enabled(&[RunState::RUN, RunState::INIT]));
        assert!(!tracker.is_command_enabled::<&str>(&[]));
    }
}
