//! In-process publish/subscribe for chatrelay events.
//!
//! One FIFO queue, one dispatch worker. Publishing never blocks; the worker
//! delivers each event to every subscription whose [`Topic`] matches it, in
//! the order events were published. A failing or panicking handler is logged
//! and skipped without affecting other handlers or later events.
//!
//! Subscription changes travel through the same queue as events, so the
//! subscription table is owned by the worker alone.

mod bus;
mod error;
mod handler;

pub use {
    bus::{Dispatcher, EventBus, SubscriptionId},
    chatrelay_protocol::{Event, Topic},
    error::{Error, Result},
    handler::{ChannelHandler, EventHandler, FnHandler, handler_fn},
};
