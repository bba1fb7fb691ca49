//! Platform adapter contract.
//!
//! Each chat source (Twitch, YouTube, the browser-extension bridge)
//! implements [`PlatformAdapter`]. Adapters own their connection loop,
//! translate native payloads into chat events and report connection state on
//! the event bus. The gateway builds a fresh adapter for every start through
//! the [`AdapterRegistry`].

pub mod adapter;
pub mod error;
pub mod registry;
pub mod reporter;
pub mod retry;

pub use {
    adapter::PlatformAdapter,
    error::{Error, Result},
    registry::{AdapterContext, AdapterFactory, AdapterRegistry},
    reporter::StatusReporter,
    retry::{Backoff, run_until_stopped},
};
