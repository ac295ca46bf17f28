use anyhow::{anyhow, Context, Result};
use shared::domain::ChipId;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::info;

use crate::{
    catalog::RegisterCatalog,
    dispatcher::Dispatcher,
    runtime::{run_session, Intent, SessionOptions},
    session::{DashboardEvent, SessionContext},
    transport::{connect_websocket, ChannelHandle},
};

const INTENT_BUFFER: usize = 64;

/// A running dashboard session: intents go in, notifications come out.
pub struct DashboardClient {
    intents: mpsc::Sender<Intent>,
    /// Subscribed before the session task starts, so nothing is missed.
    pub events: broadcast::Receiver<DashboardEvent>,
    session: JoinHandle<SessionContext>,
}

impl DashboardClient {
    pub async fn connect(
        ws_url: &str,
        chip_ids: &[ChipId],
        options: SessionOptions,
    ) -> Result<Self> {
        let channel = connect_websocket(ws_url)
            .await
            .with_context(|| format!("failed to open push channel at {ws_url}"))?;
        Self::start(channel, chip_ids, options)
    }

    /// Seeds a session over an already open channel and spawns its loop.
    pub fn start(
        channel: ChannelHandle,
        chip_ids: &[ChipId],
        options: SessionOptions,
    ) -> Result<Self> {
        let ChannelHandle { outbound, frames } = channel;
        let ctx = SessionContext::new(chip_ids, RegisterCatalog::larpix(), outbound)
            .context("failed to seed device configurations")?;
        let events = ctx.subscribe();
        let (intents, intent_rx) = mpsc::channel(INTENT_BUFFER);
        info!(chips = chip_ids.len(), "starting dashboard session");
        let session = tokio::spawn(async move {
            let mut ctx = ctx;
            let dispatcher = Dispatcher::default();
            run_session(&mut ctx, &dispatcher, intent_rx, frames, options).await;
            ctx
        });
        Ok(Self {
            intents,
            events,
            session,
        })
    }

    pub async fn send(&self, intent: Intent) -> Result<()> {
        self.intents
            .send(intent)
            .await
            .map_err(|_| anyhow!("dashboard session has stopped"))
    }

    /// Stops the loop and hands back the final session state.
    pub async fn shutdown(self) -> Result<SessionContext> {
        // The loop may already have ended on its own.
        let _ = self.intents.send(Intent::Shutdown).await;
        self.session
            .await
            .context("dashboard session task failed")
    }
}
