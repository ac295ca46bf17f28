use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use serde::Serialize;
use serde_json::{Map, Value};
use shared::{
    domain::CommandId,
    protocol::{ActionUpdate, PRELIM_HEADER},
};
use thiserror::Error;

/// Headers the core uses to report that a command did not complete.
const FAILURE_HEADERS: [&str; 2] = ["ERROR", "FAILED"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no command with id {0} has been submitted")]
    UnknownCommand(CommandId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Placeholder or progressive `_PRELIM` update; awaiting more info.
    Pending,
    Resolved,
    Failed,
    /// Still `_PRELIM` after the command timeout elapsed without any update.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LocalFault {
    Stale,
    SendFailed,
}

/// One entry of the command ledger.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingCommand {
    pub id: CommandId,
    pub name: String,
    pub header: String,
    pub result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(skip)]
    last_activity: Instant,
    #[serde(skip)]
    fault: Option<LocalFault>,
}

impl PendingCommand {
    fn placeholder(id: CommandId, name: String, now: Instant) -> Self {
        Self {
            id,
            name,
            header: PRELIM_HEADER.to_string(),
            result: Value::String(String::new()),
            metadata: None,
            last_activity: now,
            fault: None,
        }
    }

    pub fn is_prelim(&self) -> bool {
        self.header == PRELIM_HEADER
    }

    pub fn status(&self) -> CommandStatus {
        if self.fault == Some(LocalFault::SendFailed) {
            return CommandStatus::Failed;
        }
        if self.is_prelim() {
            return match self.fault {
                Some(LocalFault::Stale) => CommandStatus::Stale,
                _ => CommandStatus::Pending,
            };
        }
        if FAILURE_HEADERS
            .iter()
            .any(|header| self.header.eq_ignore_ascii_case(header))
        {
            CommandStatus::Failed
        } else {
            CommandStatus::Resolved
        }
    }

    /// Field-by-field merge of an `action-update` onto this entry.
    ///
    /// The update owns `header`; `name`, `result` and `metadata` are only replaced
    /// when the update carries the key (an explicit `null` counts), otherwise the
    /// placeholder's values survive.
    fn merge(&mut self, update: ActionUpdate, now: Instant) {
        self.header = update.header;
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(message) = update.message {
            if let Some(result) = message.result {
                self.result = result;
            }
            if let Some(metadata) = message.metadata {
                // `null` (or anything that is not an object) clears it.
                self.metadata = match metadata {
                    Value::Object(map) => Some(map),
                    _ => None,
                };
            }
        }
        self.last_activity = now;
        if self.fault == Some(LocalFault::Stale) {
            self.fault = None;
        }
    }
}

/// Ledger of every command issued this session, keyed by correlation id.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    next_id: u64,
    entries: BTreeMap<CommandId, PendingCommand>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next id and inserts its `_PRELIM` placeholder in one step.
    pub fn submit(&mut self, name: impl Into<String>) -> CommandId {
        self.submit_at(name, Instant::now())
    }

    pub(crate) fn submit_at(&mut self, name: impl Into<String>, now: Instant) -> CommandId {
        let id = CommandId(self.next_id);
        self.next_id += 1;
        self.entries
            .insert(id, PendingCommand::placeholder(id, name.into(), now));
        id
    }

    pub fn apply_update(&mut self, update: ActionUpdate) -> Result<&PendingCommand, RegistryError> {
        self.apply_update_at(update, Instant::now())
    }

    pub(crate) fn apply_update_at(
        &mut self,
        update: ActionUpdate,
        now: Instant,
    ) -> Result<&PendingCommand, RegistryError> {
        let entry = self
            .entries
            .get_mut(&update.id)
            .ok_or(RegistryError::UnknownCommand(update.id))?;
        entry.merge(update, now);
        Ok(entry)
    }

    pub fn get(&self, id: CommandId) -> Option<&PendingCommand> {
        self.entries.get(&id)
    }

    /// Entries in id order.
    pub fn list(&self) -> impl Iterator<Item = &PendingCommand> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn mark_send_failed(&mut self, id: CommandId) -> Result<(), RegistryError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(RegistryError::UnknownCommand(id))?;
        entry.fault = Some(LocalFault::SendFailed);
        Ok(())
    }

    /// Flags `_PRELIM` entries idle for longer than `timeout` and returns their ids.
    ///
    /// Entries already flagged are not reported again.
    pub fn expire_stale(&mut self, now: Instant, timeout: Duration) -> Vec<CommandId> {
        let mut expired = Vec::new();
        for entry in self.entries.values_mut() {
            if entry.fault.is_some() || !entry.is_prelim() {
                continue;
            }
            if now.saturating_duration_since(entry.last_activity) > timeout {
                entry.fault = Some(LocalFault::Stale);
                expired.push(entry.id);
            }
        }
        expired
    }
}

#[cfg(test)]
#[path = "tests/command_registry_tests.rs"]
mod tests;
