//! Operator commands known to the dashboard and the run states that enable them.

use shared::domain::RunState;

pub const PREPARE_RUN: &str = "prepare_run";
pub const START_RUN: &str = "start_run";
pub const END_RUN: &str = "end_run";
pub const RUN_ROUTINE: &str = "run_routine";
pub const LOAD_CONFIGURATION: &str = "load_configuration";
pub const RETRIEVE_CONFIGURATION: &str = "retrieve_configuration";
pub const SEND_CONFIGURATION: &str = "send_configuration";

/// How the operator fires a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Button,
    Select,
    Pane,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub trigger: TriggerKind,
    pub enabled_states: &'static [&'static str],
}

// START is treated as a pre-INIT state, so setup commands are live in both.
const SETUP_STATES: &[&str] = &[RunState::START, RunState::INIT];
const CONFIG_STATES: &[&str] = &[RunState::INIT, RunState::READY];

pub const LARPIX_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: PREPARE_RUN,
        trigger: TriggerKind::Button,
        enabled_states: SETUP_STATES,
    },
    CommandSpec {
        name: START_RUN,
        trigger: TriggerKind::Button,
        enabled_states: &[RunState::READY],
    },
    CommandSpec {
        name: END_RUN,
        trigger: TriggerKind::Button,
        enabled_states: &[RunState::RUN],
    },
    CommandSpec {
        name: RUN_ROUTINE,
        trigger: TriggerKind::Select,
        enabled_states: &[RunState::READY],
    },
    CommandSpec {
        name: LOAD_CONFIGURATION,
        trigger: TriggerKind::Select,
        enabled_states: CONFIG_STATES,
    },
    CommandSpec {
        name: RETRIEVE_CONFIGURATION,
        trigger: TriggerKind::Select,
        enabled_states: CONFIG_STATES,
    },
    CommandSpec {
        name: SEND_CONFIGURATION,
        trigger: TriggerKind::Pane,
        enabled_states: CONFIG_STATES,
    },
];

#[derive(Debug, Clone)]
pub struct CommandCatalog {
    commands: &'static [CommandSpec],
}

impl CommandCatalog {
    pub const fn new(commands: &'static [CommandSpec]) -> Self {
        Self { commands }
    }

    pub fn lookup(&self, name: &str) -> Option<&'static CommandSpec> {
        self.commands.iter().find(|spec| spec.name == name)
    }

    /// `None` for commands the catalog does not declare.
    pub fn enabled_states_for(&self, name: &str) -> Option<&'static [&'static str]> {
        self.lookup(name).map(|spec| spec.enabled_states)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static CommandSpec> {
        self.commands.iter()
    }
}

impl Default for CommandCatalog {
    fn default() -> Self {
        Self::new(LARPIX_COMMANDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_and_init_both_enable_prepare_run() {
        let catalog = CommandCatalog::default();
        let states = catalog.enabled_states_for(PREPARE_RUN).expect("declared");
        assert!(states.contains(&RunState::START));
        assert!(states.contains(&RunState::INIT));
        assert!(!states.contains(&RunState::RUN));
    }

    #[test]
    fn undeclared_command_has_no_state_set() {
        assert!(CommandCatalog::default().enabled_states_for("hello").is_none());
    }
}
