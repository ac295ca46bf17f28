use serde_json::Value;
use shared::{
    domain::{ChannelValue, ChipId, CommandId},
    error::{ApiError, ErrorCode},
    protocol::{
        ActionUpdate, ClientUpdate, CommandEnvelope, OptionDescriptor, OutboundCommand,
        StateUpdate, ACTION_UPDATE_EVENT, CLIENT_UPDATE_EVENT, STATE_UPDATE_EVENT,
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    command_registry::{CommandStatus, PendingCommand, RegistryError},
    commands::{CommandCatalog, RETRIEVE_CONFIGURATION},
    device_store::DeviceStoreError,
    session::{DashboardEvent, SessionContext},
};

/// Metadata key naming the chip a retrieved configuration belongs to.
const CHIP_METADATA_KEY: &str = "chip";

/// What the operator clicked, with everything needed to build its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    Button { name: String },
    Select { name: String, option: OptionDescriptor },
    /// Submission of the configuration pane for the selected chip.
    Pane { name: String },
}

impl Trigger {
    pub fn name(&self) -> &str {
        match self {
            Trigger::Button { name } | Trigger::Select { name, .. } | Trigger::Pane { name } => {
                name
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("malformed {event} payload: {source}")]
    MalformedPayload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Device(#[from] DeviceStoreError),
    #[error("command {command} is not enabled in run state {state:?}")]
    NotPermitted { command: String, state: String },
    #[error("outbound channel closed; command {0} was not sent")]
    ChannelClosed(CommandId),
    #[error("failed to encode command parameters: {0}")]
    Encode(#[source] serde_json::Error),
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::MalformedPayload { .. } => ErrorCode::MalformedPayload,
            DispatchError::Registry(RegistryError::UnknownCommand(_)) => ErrorCode::UnknownCommand,
            DispatchError::Device(DeviceStoreError::UnknownChip(_)) => ErrorCode::UnknownChip,
            DispatchError::Device(DeviceStoreError::UnknownRegister { .. }) => {
                ErrorCode::UnknownRegister
            }
            DispatchError::Device(DeviceStoreError::MalformedField { .. }) => {
                ErrorCode::MalformedPayload
            }
            DispatchError::Device(_) => ErrorCode::Internal,
            DispatchError::NotPermitted { .. } => ErrorCode::NotPermitted,
            DispatchError::ChannelClosed(_) => ErrorCode::Transport,
            DispatchError::Encode(_) => ErrorCode::Internal,
        }
    }

    pub fn to_api_error(&self) -> ApiError {
        ApiError::new(self.code(), self.to_string())
    }
}

/// Which store an inbound event was handed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    RunState { changed: bool },
    Roster { changed: bool },
    Command(CommandId),
    Ignored,
}

/// Binds push events to the session stores and turns operator intents into
/// outbound commands.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    commands: CommandCatalog,
    retrieval_command: String,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(CommandCatalog::default())
    }
}

impl Dispatcher {
    pub fn new(commands: CommandCatalog) -> Self {
        Self {
            commands,
            retrieval_command: RETRIEVE_CONFIGURATION.to_string(),
        }
    }

    pub fn route(
        &self,
        ctx: &mut SessionContext,
        event: &str,
        payload: Value,
    ) -> Result<Routed, DispatchError> {
        match event {
            STATE_UPDATE_EVENT => {
                let update: StateUpdate = decode(event, payload)?;
                let state = update.message.result;
                let changed = ctx.run_state.apply_run_state(state.clone());
                if changed {
                    info!(state = %state, "run state changed");
                    ctx.emit(DashboardEvent::RunStateChanged(state));
                }
                Ok(Routed::RunState { changed })
            }
            CLIENT_UPDATE_EVENT => {
                let update: ClientUpdate = decode(event, payload)?;
                let changed = ctx.peers.apply_roster(update.message.result);
                if changed {
                    ctx.emit(DashboardEvent::RosterChanged(ctx.peers.names().to_vec()));
                }
                Ok(Routed::Roster { changed })
            }
            ACTION_UPDATE_EVENT => {
                let update: ActionUpdate = decode(event, payload)?;
                let id = update.id;
                let entry = match ctx.commands.apply_update(update) {
                    Ok(entry) => entry.clone(),
                    Err(err) => {
                        warn!(id = id.0, "dropping action update for unknown command");
                        return Err(err.into());
                    }
                };
                debug!(id = id.0, header = %entry.header, "command updated");
                ctx.emit(DashboardEvent::CommandUpdated(entry.clone()));
                self.merge_retrieved_configuration(ctx, &entry);
                Ok(Routed::Command(id))
            }
            other => {
                debug!(event = other, "ignoring unknown push event");
                Ok(Routed::Ignored)
            }
        }
    }

    /// Parameters for `trigger`. The free-text values always travel as one trailing
    /// array, after the selected option or after the selected chip and its
    /// configuration.
    pub fn build_params(
        &self,
        ctx: &SessionContext,
        trigger: &Trigger,
        input: &[String],
    ) -> Result<Vec<Value>, DispatchError> {
        let mut params = match trigger {
            Trigger::Button { .. } => Vec::with_capacity(1),
            Trigger::Select { option, .. } => {
                vec![serde_json::to_value(option).map_err(DispatchError::Encode)?]
            }
            Trigger::Pane { .. } => {
                let (chip, config) = ctx
                    .devices
                    .active()
                    .ok_or(DeviceStoreError::UnknownChip(ctx.devices.selected_device()))?;
                vec![
                    serde_json::to_value(chip).map_err(DispatchError::Encode)?,
                    serde_json::to_value(config).map_err(DispatchError::Encode)?,
                ]
            }
        };
        params.push(Value::Array(
            input.iter().cloned().map(Value::String).collect(),
        ));
        Ok(params)
    }

    /// Builds the parameters, then takes the id from the registry, which also
    /// records the `_PRELIM` placeholder. Nothing is reserved if building fails.
    fn build_envelope(
        &self,
        ctx: &mut SessionContext,
        trigger: &Trigger,
        input: &[String],
    ) -> Result<CommandEnvelope, DispatchError> {
        let params = self.build_params(ctx, trigger, input)?;
        let id = ctx.commands.submit(trigger.name());
        Ok(CommandEnvelope { id, params })
    }

    pub fn is_command_enabled(&self, ctx: &SessionContext, command: &str) -> bool {
        match self.commands.enabled_states_for(command) {
            Some(states) => ctx.run_state.is_command_enabled(states),
            None => true,
        }
    }

    /// Reserves an id, records its placeholder and queues the command, all before
    /// returning; nothing else can run in between.
    pub fn submit(
        &self,
        ctx: &mut SessionContext,
        trigger: Trigger,
        input: &[String],
    ) -> Result<CommandId, DispatchError> {
        let name = trigger.name().to_string();
        if !self.is_command_enabled(ctx, &name) {
            return Err(DispatchError::NotPermitted {
                command: name,
                state: ctx.run_state.current().to_string(),
            });
        }

        let envelope = self.build_envelope(ctx, &trigger, input)?;
        let id = envelope.id;
        if ctx.outbound.send(OutboundCommand::new(name.clone(), envelope)).is_err() {
            warn!(id = id.0, command = %name, "outbound channel closed");
            ctx.commands.mark_send_failed(id)?;
            self.emit_command(ctx, id);
            return Err(DispatchError::ChannelClosed(id));
        }
        info!(id = id.0, command = %name, "command submitted");
        self.emit_command(ctx, id);
        Ok(id)
    }

    /// Bare-string submission, sent in the correlated form with the text as the only
    /// free-text value.
    pub fn submit_text(
        &self,
        ctx: &mut SessionContext,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<CommandId, DispatchError> {
        self.submit(ctx, Trigger::Button { name: name.into() }, &[text.into()])
    }

    pub fn set_scalar(
        &self,
        ctx: &mut SessionContext,
        chip: ChipId,
        register: &str,
        value: impl Into<String>,
    ) -> Result<(), DispatchError> {
        ctx.devices.set_scalar(chip, register, value)?;
        ctx.emit(DashboardEvent::DeviceUpdated {
            chip,
            registers: vec![register.to_string()],
        });
        Ok(())
    }

    pub fn set_channel(
        &self,
        ctx: &mut SessionContext,
        chip: ChipId,
        register: &str,
        channel: usize,
        value: ChannelValue,
    ) -> Result<(), DispatchError> {
        ctx.devices.set_channel(chip, register, channel, value)?;
        ctx.emit(DashboardEvent::DeviceUpdated {
            chip,
            registers: vec![register.to_string()],
        });
        Ok(())
    }

    pub fn select_device(&self, ctx: &mut SessionContext, chip: ChipId) -> Result<(), DispatchError> {
        ctx.devices.select_device(chip)?;
        ctx.emit(DashboardEvent::ActiveDeviceChanged(chip));
        Ok(())
    }

    fn emit_command(&self, ctx: &SessionContext, id: CommandId) {
        if let Some(entry) = ctx.commands.get(id) {
            ctx.emit(DashboardEvent::CommandUpdated(entry.clone()));
        }
    }

    /// A resolved `retrieve_configuration` carries the chip in its metadata and the
    /// register fields in its result; fold those into that chip only.
    fn merge_retrieved_configuration(&self, ctx: &mut SessionContext, entry: &PendingCommand) {
        if entry.name != self.retrieval_command || entry.status() != CommandStatus::Resolved {
            return;
        }
        let Some(chip) = entry
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.get(CHIP_METADATA_KEY))
            .and_then(chip_from_value)
        else {
            warn!(id = entry.id.0, "retrieved configuration has no chip metadata");
            return;
        };
        let Value::Object(fields) = &entry.result else {
            warn!(id = entry.id.0, chip = chip.0, "retrieved configuration is not an object");
            return;
        };

        match ctx.devices.merge_retrieved(chip, fields) {
            Ok(registers) => {
                info!(chip = chip.0, registers = registers.len(), "merged retrieved configuration");
                ctx.emit(DashboardEvent::DeviceUpdated { chip, registers });
            }
            Err(err) => {
                warn!(id = entry.id.0, chip = chip.0, %err, "rejected retrieved configuration");
                ctx.emit(DashboardEvent::Error(DispatchError::from(err).to_api_error()));
            }
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(event: &str, payload: Value) -> Result<T, DispatchError> {
    serde_json::from_value(payload).map_err(|source| {
        warn!(event, %source, "malformed push payload");
        DispatchError::MalformedPayload {
            event: event.to_string(),
            source,
        }
    })
}

fn chip_from_value(value: &Value) -> Option<ChipId> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()).map(ChipId),
        Value::String(text) => text.trim().parse().ok().map(ChipId),
        _ => None,
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
