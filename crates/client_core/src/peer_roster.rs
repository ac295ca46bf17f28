/// Names of the peers currently connected to the DAQ core.
#[derive(Debug, Default, Clone)]
pub struct PeerRoster {
    names: Vec<String>,
}

impl PeerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the roster unless `names` matches it position by position.
    ///
    /// Returns `false` when nothing changed so callers can skip the notification.
    pub fn apply_roster(&mut self, names: Vec<String>) -> bool {
        if self.names == names {
            return false;
        }
        self.names = names;
        true
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
