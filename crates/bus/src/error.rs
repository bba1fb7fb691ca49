/// Crate-wide result type for bus operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dispatch worker has shut down; nothing is delivered any more.
    #[error("event bus is closed")]
    Closed,

    /// Shutdown gave up waiting for the queue to drain.
    #[error("event bus drain timed out, {dropped} queued events dropped")]
    DrainTimeout { dropped: usize },
}
