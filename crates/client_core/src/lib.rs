//! Client side of the LArPix DAQ monitor dashboard.
//!
//! The stores ([`command_registry`], [`device_store`], [`run_state`], [`peer_roster`])
//! live in one [`SessionContext`]; the [`Dispatcher`] routes push events into them and
//! turns operator triggers into correlated commands; [`run_session`] serializes both
//! onto a single loop.

pub mod catalog;
mod client;
pub mod command_registry;
pub mod commands;
pub mod device_store;
pub mod dispatcher;
pub mod legacy_http;
pub mod peer_roster;
pub mod run_state;
pub mod runtime;
pub mod session;
pub mod transport;

pub use client::DashboardClient;
pub use dispatcher::{DispatchError, Dispatcher, Trigger};
pub use runtime::{run_session, Intent, SessionOptions};
pub use session::{DashboardEvent, SessionContext, SessionSnapshot};
