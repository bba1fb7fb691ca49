//! YouTube live chat adapter.
//!
//! Polls the Data API `liveChat/messages` endpoint with an API key and relays
//! text messages as chat events. API-key access is read-only, so outbound
//! messages are dropped.

pub mod adapter;
pub mod api;
pub mod config;

pub use {adapter::YoutubeAdapter, api::LiveChatClient, config::YoutubeConfig};
