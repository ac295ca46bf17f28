use shared::{
    domain::{ChipId, CommandId, RunState},
    error::ApiError,
    protocol::OutboundCommand,
};
use tokio::sync::{broadcast, mpsc};

use crate::{
    catalog::RegisterCatalog,
    command_registry::{CommandRegistry, PendingCommand},
    device_store::{DeviceConfiguration, DeviceStore, DeviceStoreError},
    peer_roster::PeerRoster,
    run_state::RunStateTracker,
};

const EVENT_CAPACITY: usize = 256;

/// Notifications for whatever renders the dashboard.
#[derive(Debug, Clone, PartialEq)]
pub enum DashboardEvent {
    RunStateChanged(RunState),
    RosterChanged(Vec<String>),
    CommandUpdated(PendingCommand),
    DeviceUpdated {
        chip: ChipId,
        registers: Vec<String>,
    },
    ActiveDeviceChanged(ChipId),
    CommandsExpired(Vec<CommandId>),
    Error(ApiError),
    /// Answer to [`Intent::Snapshot`](crate::runtime::Intent::Snapshot).
    Snapshot(Box<SessionSnapshot>),
}

/// Point-in-time copy of the session stores, for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub run_state: RunState,
    pub peers: Vec<String>,
    pub active_chip: ChipId,
    pub active_configuration: DeviceConfiguration,
    /// Ledger entries in id order.
    pub commands: Vec<PendingCommand>,
}

/// Everything one dashboard session owns: the four stores, the outbound queue and
/// the notification fan-out. Built once and handed to the dispatcher explicitly.
pub struct SessionContext {
    pub(crate) commands: CommandRegistry,
    pub(crate) devices: DeviceStore,
    pub(crate) run_state: RunStateTracker,
    pub(crate) peers: PeerRoster,
    pub(crate) outbound: mpsc::UnboundedSender<OutboundCommand>,
    events: broadcast::Sender<DashboardEvent>,
}

impl SessionContext {
    pub fn new(
        chip_ids: &[ChipId],
        catalog: RegisterCatalog,
        outbound: mpsc::UnboundedSender<OutboundCommand>,
    ) -> Result<Self, DeviceStoreError> {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            commands: CommandRegistry::new(),
            devices: DeviceStore::seed(chip_ids, catalog)?,
            run_state: RunStateTracker::new(),
            peers: PeerRoster::new(),
            outbound,
            events,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn devices(&self) -> &DeviceStore {
        &self.devices
    }

    pub fn run_state(&self) -> &RunState {
        self.run_state.current()
    }

    pub fn peers(&self) -> &[String] {
        self.peers.names()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (active_chip, active_configuration) = match self.devices.active() {
            Some((chip, config)) => (chip, config.clone()),
            None => (self.devices.selected_device(), DeviceConfiguration::new()),
        };
        SessionSnapshot {
            run_state: self.run_state.current().clone(),
            peers: self.peers.names().to_vec(),
            active_chip,
            active_configuration,
            commands: self.commands.list().cloned().collect(),
        }
    }

    pub(crate) fn emit(&self, event: DashboardEvent) {
        let _ = self.events.send(event);
    }
}
