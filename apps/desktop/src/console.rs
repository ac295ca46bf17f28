//! Line-oriented operator console over a dashboard session.

use anyhow::{anyhow, bail, Context, Result};
use client_core::{
    command_registry::PendingCommand,
    commands::{CommandCatalog, TriggerKind},
    session::SessionSnapshot,
    DashboardClient, DashboardEvent, Intent, Trigger,
};
use shared::{
    domain::{ChannelValue, ChipId, RegisterValue},
    protocol::OptionDescriptor,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::warn;

pub const HELP: &str = "\
commands:
  submit <name> [args..]                    fire a command (select commands take the option first)
  select <chip>                             make <chip> the active device
  set <register> <value>                    edit a scalar register of the active device
  set-channel <register> <channel> <value>  edit one channel of the active device
  show                                      print run state, peers, registers and the command ledger
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Submit { name: String, args: Vec<String> },
    Select(ChipId),
    Set { register: String, value: String },
    SetChannel {
        register: String,
        channel: usize,
        value: ChannelValue,
    },
    Show,
    Help,
    Quit,
}

/// `Ok(None)` for blank lines.
pub fn parse_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();
    let command = match (verb, rest.as_slice()) {
        ("submit", [name, args @ ..]) => ConsoleCommand::Submit {
            name: (*name).to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        },
        ("select", [chip]) => ConsoleCommand::Select(ChipId(
            chip.parse().with_context(|| format!("invalid chip id {chip:?}"))?,
        )),
        ("set", [register, value]) => ConsoleCommand::Set {
            register: (*register).to_string(),
            value: (*value).to_string(),
        },
        ("set-channel", [register, channel, value]) => ConsoleCommand::SetChannel {
            register: (*register).to_string(),
            channel: channel
                .parse()
                .with_context(|| format!("invalid channel {channel:?}"))?,
            value: parse_channel_value(value)?,
        },
        ("show", []) => ConsoleCommand::Show,
        ("help", []) => ConsoleCommand::Help,
        ("quit" | "exit", []) => ConsoleCommand::Quit,
        _ => bail!("unrecognized input {line:?}; type `help`"),
    };
    Ok(Some(command))
}

fn parse_channel_value(raw: &str) -> Result<ChannelValue> {
    match raw {
        "true" | "on" => Ok(ChannelValue::Flag(true)),
        "false" | "off" => Ok(ChannelValue::Flag(false)),
        other => other
            .parse()
            .map(ChannelValue::Value)
            .with_context(|| format!("invalid channel value {other:?}")),
    }
}

/// Console-side state: the configured chips and the chip edits go to.
#[derive(Debug, Clone)]
pub struct ConsoleView {
    catalog: CommandCatalog,
    chip_ids: Vec<ChipId>,
    selected: ChipId,
}

impl ConsoleView {
    pub fn new(chip_ids: &[ChipId], catalog: CommandCatalog) -> Result<Self> {
        let selected = *chip_ids.first().ok_or_else(|| anyhow!("no chips configured"))?;
        Ok(Self {
            catalog,
            chip_ids: chip_ids.to_vec(),
            selected,
        })
    }

    pub fn selected(&self) -> ChipId {
        self.selected
    }

    /// Returns the text to print for a notification, if any.
    pub fn apply(&mut self, event: DashboardEvent) -> Option<String> {
        match event {
            DashboardEvent::RunStateChanged(state) => Some(format!("run state: {state}")),
            DashboardEvent::RosterChanged(names) => {
                Some(format!("connected: {}", names.join(", ")))
            }
            DashboardEvent::CommandUpdated(entry) => Some(describe_command(&entry)),
            DashboardEvent::DeviceUpdated { chip, registers } => {
                Some(format!("chip {chip}: updated {}", registers.join(", ")))
            }
            DashboardEvent::ActiveDeviceChanged(chip) => {
                self.selected = chip;
                None
            }
            DashboardEvent::CommandsExpired(ids) => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                Some(format!("no final update for command(s) {}", ids.join(", ")))
            }
            DashboardEvent::Error(error) => {
                Some(format!("error ({:?}): {}", error.code, error.message))
            }
            DashboardEvent::Snapshot(snapshot) => Some(self.render(&snapshot)),
        }
    }

    /// Run state, peers, the active chip's registers, which commands the run state
    /// allows, and the ledger.
    pub fn render(&self, snapshot: &SessionSnapshot) -> String {
        let mut out = format!(
            "run state: {}\nconnected: {}\nactive chip: {}\n",
            snapshot.run_state,
            snapshot.peers.join(", "),
            snapshot.active_chip
        );
        for (name, value) in &snapshot.active_configuration {
            out.push_str(&format!("  {name} = {}\n", describe_register(value)));
        }
        out.push_str("commands:\n");
        for spec in self.catalog.iter() {
            let allowed = spec.enabled_states.contains(&snapshot.run_state.as_str());
            out.push_str(&format!(
                "  {} ({:?}) {}\n",
                spec.name,
                spec.trigger,
                if allowed { "enabled" } else { "disabled" }
            ));
        }
        out.push_str("ledger:\n");
        for entry in &snapshot.commands {
            out.push_str("  ");
            out.push_str(&describe_command(entry));
            out.push('\n');
        }
        out
    }

    /// Builds the intent for a console command; selection is applied locally first
    /// so later edits in the same batch target the new chip.
    pub fn to_intent(&mut self, command: ConsoleCommand) -> Result<Intent> {
        let intent = match command {
            ConsoleCommand::Submit { name, args } => submit_intent(name, args, &self.catalog)?,
            ConsoleCommand::Select(chip) => {
                if !self.chip_ids.contains(&chip) {
                    bail!("chip {chip} is not configured");
                }
                self.selected = chip;
                Intent::SelectDevice(chip)
            }
            ConsoleCommand::Set { register, value } => Intent::SetScalar {
                chip: self.selected,
                register,
                value,
            },
            ConsoleCommand::SetChannel {
                register,
                channel,
                value,
            } => Intent::SetChannel {
                chip: self.selected,
                register,
                channel,
                value,
            },
            ConsoleCommand::Show => Intent::Snapshot,
            ConsoleCommand::Help | ConsoleCommand::Quit => bail!("not a session command"),
        };
        Ok(intent)
    }
}

fn submit_intent(name: String, mut args: Vec<String>, catalog: &CommandCatalog) -> Result<Intent> {
    let kind = catalog
        .lookup(&name)
        .map(|spec| spec.trigger)
        .unwrap_or(TriggerKind::Button);
    let trigger = match kind {
        TriggerKind::Button => Trigger::Button { name },
        TriggerKind::Pane => Trigger::Pane { name },
        TriggerKind::Select => {
            if args.is_empty() {
                bail!("{name} needs an option as its first argument");
            }
            let option = OptionDescriptor::new(args.remove(0));
            Trigger::Select { name, option }
        }
    };
    Ok(Intent::Submit {
        trigger,
        input: args,
    })
}

fn describe_register(value: &RegisterValue) -> String {
    match value {
        RegisterValue::Scalar(text) => text.clone(),
        RegisterValue::PerChannelValue(values) => format!("{values:?}"),
        RegisterValue::PerChannelFlag(flags) => format!("{flags:?}"),
    }
}

fn describe_command(entry: &PendingCommand) -> String {
    format!(
        "#{} {} [{:?}] {} {}",
        entry.id,
        entry.name,
        entry.status(),
        entry.header,
        entry.result
    )
}

/// Reads stdin until `quit` or EOF, forwarding intents and printing notifications.
pub async fn run(mut client: DashboardClient, chip_ids: &[ChipId]) -> Result<()> {
    let mut view = ConsoleView::new(chip_ids, CommandCatalog::default())?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let command = match parse_line(&line) {
                    Ok(Some(command)) => command,
                    Ok(None) => continue,
                    Err(err) => {
                        eprintln!("{err:#}");
                        continue;
                    }
                };
                match command {
                    ConsoleCommand::Quit => break,
                    ConsoleCommand::Help => println!("{HELP}"),
                    command => match view.to_intent(command) {
                        Ok(intent) => client.send(intent).await?,
                        Err(err) => eprintln!("{err:#}"),
                    },
                }
            }
            event = client.events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = view.apply(event) {
                        println!("{line}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "console fell behind dashboard events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await?;
    Ok(())
}
