//! Core of the chatrelay process.
//!
//! - [`controller`]: the service lifecycle state machine, driven by control
//!   commands on the event bus
//! - [`orchestrator`]: owns the bus, the controller subscription and the
//!   settings store
//! - [`server`]: HTTP control surface plus dashboard and debug WebSockets

pub mod controller;
pub mod orchestrator;
pub mod server;
pub mod settings;
pub mod snapshot;
pub mod ws;

pub use {
    controller::{MISSING_CONFIGURATION, ServiceController},
    orchestrator::Orchestrator,
    server::{AppState, build_gateway_app, start_gateway},
    settings::SettingsStore,
    snapshot::{ServiceInfo, ServiceSnapshot, ServiceState},
};
