use {async_trait::async_trait, chatrelay_protocol::Platform};

use crate::error::Result;

/// One external chat platform connection.
///
/// The gateway holds the adapter behind an `Arc`: one task drives [`run`],
/// while the controller calls [`send`] and [`stop`] concurrently.
///
/// [`run`]: PlatformAdapter::run
/// [`send`]: PlatformAdapter::send
/// [`stop`]: PlatformAdapter::stop
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn platform(&self) -> Platform;

    /// Cheap preflight. Returns [`Error::MissingConfig`] naming the absent
    /// settings; never touches the network.
    ///
    /// [`Error::MissingConfig`]: crate::Error::MissingConfig
    fn check_config(&self) -> Result<()>;

    /// Connection loop. Returns once [`stop`](Self::stop) has been called
    /// (after emitting `stopped`) or immediately when configuration is
    /// missing (after emitting `disabled`). Transient failures are reported
    /// as `error` and retried internally.
    async fn run(&self);

    /// Best-effort outbound message. Failures are logged, never returned.
    async fn send(&self, text: &str);

    /// Request cooperative shutdown of [`run`](Self::run). Idempotent and
    /// safe to call before `run` starts or after it returned.
    fn stop(&self);
}
