use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::BootstrapError;

/// How long and how often to probe a freshly launched node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Total budget for the node to start accepting connections.
    pub timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Budget for a single connect attempt.
    pub attempt_timeout: Duration,
}

impl ReadinessPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout, ..Self::default() }
    }
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(1),
        }
    }
}

/// One connect attempt. True when something is listening.
pub async fn probe_once(host: &str, port: u16, attempt_timeout: Duration) -> bool {
    matches!(
        timeout(attempt_timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

/// Probes `host:port` until it accepts a connection.
pub async fn wait_until_ready(
    host: &str,
    port: u16,
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
) -> Result<(), BootstrapError> {
    wait_until_ready_or_exit(host, port, policy, cancel, || None).await
}

/// Like `wait_until_ready`, but `exited` is consulted before every attempt so a
/// process that already died is reported as a launch failure instead of being
/// waited on for the full timeout.
pub(crate) async fn wait_until_ready_or_exit<F>(
    host: &str,
    port: u16,
    policy: &ReadinessPolicy,
    cancel: &CancellationToken,
    mut exited: F,
) -> Result<(), BootstrapError>
where
    F: FnMut() -> Option<String>,
{
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let mut delay = policy.initial_backoff;
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(BootstrapError::Cancelled);
        }
        if let Some(status) = exited() {
            return Err(BootstrapError::ProcessLaunchFailed {
                reason: format!("process exited before accepting connections ({})", status),
            });
        }

        attempts += 1;
        let attempt = probe_once(host, port, policy.attempt_timeout);
        tokio::select! {
            _ = cancel.cancelled() => return Err(BootstrapError::Cancelled),
            ready = attempt => {
                if ready {
                    tracing::debug!(port, attempts, elapsed = ?started.elapsed(), "node accepting connections");
                    return Ok(());
                }
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(BootstrapError::ReadinessTimeout { port, waited: now - started });
        }
        let pause = delay.min(deadline - now);
        tracing::trace!(port, attempts, ?pause, "node not ready, retrying");
        tokio::select! {
            _ = cancel.cancelled() => return Err(BootstrapError::Cancelled),
            _ = sleep(pause) => {}
        }
        delay = (delay * 2).min(policy.max_backoff);
    }
}
