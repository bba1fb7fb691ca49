//! Twitch chat adapter.
//!
//! Connects to Twitch's IRC-over-WebSocket endpoint, joins the configured
//! channels and relays `PRIVMSG`s as chat events.

pub mod adapter;
pub mod config;
pub mod irc;

pub use {
    adapter::TwitchAdapter,
    config::{DEFAULT_URL, TwitchConfig},
    irc::IrcMessage,
};
