use {async_trait::async_trait, chatrelay_protocol::Event, tokio::sync::mpsc};

/// A bus subscriber.
///
/// Handlers are owned by the dispatch worker and invoked one at a time, so
/// `handle` gets exclusive access to the handler's state. Returning `Err`
/// (or panicking) only affects this invocation.
#[async_trait]
pub trait EventHandler: Send {
    async fn handle(&mut self, event: &Event) -> anyhow::Result<()>;
}

/// Adapts a synchronous closure into an [`EventHandler`].
pub struct FnHandler<F>(F);

/// Wrap `f` so it can be subscribed directly.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&Event) -> anyhow::Result<()> + Send,
{
    FnHandler(f)
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: FnMut(&Event) -> anyhow::Result<()> + Send,
{
    async fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Forwards matching events into an unbounded channel.
///
/// Used by WebSocket fan-out connections: the connection task owns the
/// receiver and unsubscribes when it closes.
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<Event>,
}

impl ChannelHandler {
    pub fn new(tx: mpsc::UnboundedSender<Event>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl EventHandler for ChannelHandler {
    async fn handle(&mut self, event: &Event) -> anyhow::Result<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| anyhow::anyhow!("subscriber channel closed"))
    }
}
