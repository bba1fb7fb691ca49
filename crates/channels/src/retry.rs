use std::{future::Future, time::Duration};

use {
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    error::{Error, Result},
    reporter::StatusReporter,
};

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5))
    }
}

impl Backoff {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Sleep for the retry delay. Returns `false` if `cancel` fired first.
    pub async fn sleep_or_cancel(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            () = cancel.cancelled() => false,
            () = tokio::time::sleep(self.delay) => true,
        }
    }
}

/// Standard adapter connection loop.
///
/// Reports `disabled` and returns when `preflight` carries a configuration
/// error. Otherwise repeatedly reports `connecting` and runs `session` until
/// `cancel` fires. A session that fails, or ends on its own while the adapter
/// is still wanted, is reported as `error` and retried after `backoff`.
/// Always reports `stopped` on the way out of the loop.
///
/// Sessions must watch `cancel` themselves and return `Ok(())` promptly once
/// it fires, so they get a chance to close their connection cleanly.
pub async fn run_until_stopped<F, Fut>(
    reporter: &StatusReporter,
    backoff: Backoff,
    cancel: &CancellationToken,
    preflight: Result<()>,
    mut session: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let service = reporter.platform();
    if let Err(e) = preflight {
        info!(%service, error = %e, "adapter disabled");
        let message = match e {
            Error::MissingConfig { .. } => "missing configuration".to_string(),
            other => other.to_string(),
        };
        reporter.disabled(message);
        return;
    }

    while !cancel.is_cancelled() {
        reporter.connecting();
        let outcome = session().await;
        if cancel.is_cancelled() {
            break;
        }

        let detail = match outcome {
            Ok(()) => "connection closed by remote".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(
            %service,
            error = %detail,
            retry_in_ms = backoff.delay().as_millis() as u64,
            "connection lost, retrying"
        );
        reporter.error(detail);

        if !backoff.sleep_or_cancel(cancel).await {
            break;
        }
    }

    reporter.stopped();
}
