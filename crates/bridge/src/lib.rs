//! Browser-extension bridge.
//!
//! The extension connects to a WebSocket listener owned by [`BridgeAdapter`]
//! and exchanges JSON frames (see `chatrelay_protocol::bridge`). Chat lines
//! from the extension become chat events; chat events from the other
//! platforms are forwarded back to every connected peer.
//!
//! The listener lives and dies with the adapter, so stopping the `bridge`
//! service really closes the port.

pub mod adapter;
pub mod config;
pub mod hub;
mod server;

pub use {
    adapter::BridgeAdapter,
    config::BridgeConfig,
    hub::HubHandle,
};
