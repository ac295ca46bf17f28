//! The session loop: one task, one queue of work, handlers run to completion.

use std::time::{Duration, Instant};

use shared::{
    domain::{ChannelValue, ChipId},
    protocol::PushFrame,
};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::{
    dispatcher::{DispatchError, Dispatcher, Trigger},
    session::{DashboardEvent, SessionContext},
};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Something the operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Submit {
        trigger: Trigger,
        input: Vec<String>,
    },
    SubmitText {
        name: String,
        text: String,
    },
    SetScalar {
        chip: ChipId,
        register: String,
        value: String,
    },
    SetChannel {
        chip: ChipId,
        register: String,
        channel: usize,
        value: ChannelValue,
    },
    SelectDevice(ChipId),
    /// Ask for a [`DashboardEvent::Snapshot`] of the current stores.
    Snapshot,
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// `_PRELIM` commands idle this long are reported stale. `None` disables the sweep.
    pub command_timeout: Option<Duration>,
    pub sweep_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            command_timeout: Some(Duration::from_secs(30)),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Serializes operator intents, push frames and stale sweeps onto one loop.
///
/// Returns once both inputs are closed or a [`Intent::Shutdown`] arrives.
pub async fn run_session(
    ctx: &mut SessionContext,
    dispatcher: &Dispatcher,
    mut intents: mpsc::Receiver<Intent>,
    mut frames: mpsc::Receiver<PushFrame>,
    options: SessionOptions,
) {
    let mut sweep = time::interval(options.sweep_interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut intents_open = true;
    let mut frames_open = true;

    while intents_open || frames_open {
        tokio::select! {
            intent = intents.recv(), if intents_open => match intent {
                Some(Intent::Shutdown) => {
                    info!("session shutdown requested");
                    break;
                }
                Some(intent) => {
                    if let Err(err) = handle_intent(ctx, dispatcher, intent) {
                        warn!(%err, "operator intent rejected");
                        ctx.emit(DashboardEvent::Error(err.to_api_error()));
                    }
                }
                None => intents_open = false,
            },
            frame = frames.recv(), if frames_open => match frame {
                Some(frame) => {
                    if let Err(err) = dispatcher.route(ctx, &frame.event, frame.data) {
                        ctx.emit(DashboardEvent::Error(err.to_api_error()));
                    }
                }
                None => {
                    warn!("push channel closed");
                    frames_open = false;
                }
            },
            _ = sweep.tick(), if options.command_timeout.is_some() => {
                if let Some(timeout) = options.command_timeout {
                    expire_stale(ctx, timeout);
                }
            }
        }
    }
}

pub fn handle_intent(
    ctx: &mut SessionContext,
    dispatcher: &Dispatcher,
    intent: Intent,
) -> Result<(), DispatchError> {
    match intent {
        Intent::Submit { trigger, input } => dispatcher.submit(ctx, trigger, &input).map(drop),
        Intent::SubmitText { name, text } => dispatcher.submit_text(ctx, name, text).map(drop),
        Intent::SetScalar {
            chip,
            register,
            value,
        } => dispatcher.set_scalar(ctx, chip, &register, value),
        Intent::SetChannel {
            chip,
            register,
            channel,
            value,
        } => dispatcher.set_channel(ctx, chip, &register, channel, value),
        Intent::SelectDevice(chip) => dispatcher.select_device(ctx, chip),
        Intent::Snapshot => {
            ctx.emit(DashboardEvent::Snapshot(Box::new(ctx.snapshot())));
            Ok(())
        }
        Intent::Shutdown => Ok(()),
    }
}

fn expire_stale(ctx: &mut SessionContext, timeout: Duration) {
    let expired = ctx.commands.expire_stale(Instant::now(), timeout);
    if expired.is_empty() {
        return;
    }
    warn!(count = expired.len(), "commands timed out without a final update");
    ctx.emit(DashboardEvent::CommandsExpired(expired));
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
