use std::{
    any::Any,
    fmt,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    chatrelay_protocol::{Event, Topic},
    futures::FutureExt,
    tokio::{sync::mpsc, task::JoinHandle},
    tracing::{debug, error, trace, warn},
};

use crate::{
    error::{Error, Result},
    handler::{ChannelHandler, EventHandler},
};

/// Identifies one subscription; pass it to [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

enum Envelope {
    Event(Event),
    Subscribe {
        id: SubscriptionId,
        topic: Topic,
        handler: Box<dyn EventHandler>,
    },
    Unsubscribe(SubscriptionId),
    Shutdown,
}

struct Shared {
    /// Events enqueued but not yet dispatched.
    pending: AtomicUsize,
    next_id: AtomicU64,
}

// ── Publisher handle ─────────────────────────────────────────────────────────

/// Cheap, cloneable handle for publishing and (un)subscribing.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Envelope>,
    shared: Arc<Shared>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("pending", &self.pending())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl EventBus {
    /// Create the bus and spawn its dispatch worker on the current runtime.
    ///
    /// The returned [`Dispatcher`] owns the worker; keep it around and call
    /// [`Dispatcher::shutdown`] on exit.
    pub fn spawn() -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
        });
        let handle = tokio::spawn(dispatch_loop(rx, Arc::clone(&shared)));
        let bus = Self { tx, shared };
        let dispatcher = Dispatcher {
            bus: bus.clone(),
            handle,
        };
        (bus, dispatcher)
    }

    /// Enqueue an event for delivery. Never blocks.
    pub fn publish(&self, event: impl Into<Event>) -> Result<()> {
        let event = event.into();
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        if let Err(mpsc::error::SendError(envelope)) = self.tx.send(Envelope::Event(event)) {
            self.shared.pending.fetch_sub(1, Ordering::SeqCst);
            if let Envelope::Event(event) = envelope {
                warn!(topic = ?event.topic(), platform = %event.platform(), "event bus closed, dropping event");
            }
            return Err(Error::Closed);
        }
        Ok(())
    }

    /// Register `handler` for events matching `topic`.
    ///
    /// The subscription takes effect in queue order: every event published
    /// after this call returns is delivered to it.
    pub fn subscribe(
        &self,
        topic: Topic,
        handler: impl EventHandler + 'static,
    ) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.shared.next_id.fetch_add(1, Ordering::Relaxed));
        self.tx
            .send(Envelope::Subscribe {
                id,
                topic,
                handler: Box::new(handler),
            })
            .map_err(|_| Error::Closed)?;
        debug!(subscription = %id, ?topic, "subscribed");
        Ok(id)
    }

    /// Subscribe and receive matching events on a channel.
    pub fn subscribe_channel(
        &self,
        topic: Topic,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(topic, ChannelHandler::new(tx))?;
        Ok((id, rx))
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        if self.tx.send(Envelope::Unsubscribe(id)).is_err() {
            trace!(subscription = %id, "unsubscribe after bus shutdown");
        }
    }

    /// Number of events waiting to be dispatched.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ── Dispatch worker ──────────────────────────────────────────────────────────

/// Owns the dispatch worker task.
pub struct Dispatcher {
    bus: EventBus,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Stop the worker after it has delivered everything queued so far.
    ///
    /// Waits at most `timeout`; if the queue has not drained by then the
    /// worker is aborted and the remaining events are dropped.
    pub async fn shutdown(self, timeout: Duration) -> Result<()> {
        let Self { bus, mut handle } = self;
        let queued = bus.pending();
        if bus.tx.send(Envelope::Shutdown).is_err() {
            debug!("event bus already stopped");
        }
        debug!(queued, "draining event bus");

        match tokio::time::timeout(timeout, &mut handle).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                error!(error = %e, "event bus worker terminated abnormally");
                Ok(())
            },
            Err(_) => {
                handle.abort();
                let dropped = bus.pending();
                bus.shared.pending.store(0, Ordering::SeqCst);
                error!(
                    dropped,
                    timeout_ms = timeout.as_millis() as u64,
                    "event bus drain timed out, dropping queued events"
                );
                Err(Error::DrainTimeout { dropped })
            },
        }
    }
}

struct Subscription {
    id: SubscriptionId,
    topic: Topic,
    handler: Box<dyn EventHandler>,
}

async fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<Envelope>, shared: Arc<Shared>) {
    let mut subscriptions: Vec<Subscription> = Vec::new();

    while let Some(envelope) = rx.recv().await {
        match envelope {
            Envelope::Event(event) => {
                shared.pending.fetch_sub(1, Ordering::SeqCst);
                dispatch(&mut subscriptions, &event).await;
            },
            Envelope::Subscribe { id, topic, handler } => {
                subscriptions.push(Subscription { id, topic, handler });
            },
            Envelope::Unsubscribe(id) => {
                subscriptions.retain(|s| s.id != id);
                debug!(subscription = %id, "unsubscribed");
            },
            Envelope::Shutdown => break,
        }
    }

    rx.close();
    let mut late = 0usize;
    while let Ok(envelope) = rx.try_recv() {
        if matches!(envelope, Envelope::Event(_)) {
            shared.pending.fetch_sub(1, Ordering::SeqCst);
            late += 1;
        }
    }
    if late > 0 {
        warn!(dropped = late, "events published during shutdown were dropped");
    }
    debug!(subscriptions = subscriptions.len(), "event bus stopped");
}

async fn dispatch(subscriptions: &mut [Subscription], event: &Event) {
    let topic = event.topic();
    trace!(?topic, platform = %event.platform(), "dispatching event");

    for sub in subscriptions.iter_mut().filter(|s| s.topic.matches(event)) {
        let outcome = AssertUnwindSafe(sub.handler.handle(event))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {},
            Ok(Err(e)) => {
                warn!(subscription = %sub.id, ?topic, error = %e, "event handler failed");
            },
            Err(panic) => {
                error!(
                    subscription = %sub.id,
                    ?topic,
                    panic = %panic_message(panic.as_ref()),
                    "event handler panicked"
                );
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
