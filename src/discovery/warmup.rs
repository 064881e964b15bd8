//! Startup barrier: block until every readiness signal is up.

use crate::errors::{FlowsyncError, Result};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Wait until every signal reports `true`.
///
/// A zero `timeout` skips the wait entirely. A closed signal that never
/// became ready counts as still pending.
pub async fn wait_for_ready(
    cancel: &CancellationToken,
    timeout: Duration,
    signals: Vec<(String, watch::Receiver<bool>)>,
) -> Result<()> {
    if timeout.is_zero() {
        info!("warm-up timeout is zero, not waiting for readiness");
        return Ok(());
    }

    let mut pending = signals;
    let mut closed: Vec<String> = Vec::new();
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        pending.retain(|(name, rx)| {
            let ready = *rx.borrow();
            if ready {
                info!(signal = %name, "ready");
            }
            !ready
        });
        if pending.is_empty() && closed.is_empty() {
            return Ok(());
        }

        let wake = if pending.is_empty() {
            // Only closed signals remain; nothing can make them ready
            tokio::select! {
                _ = cancel.cancelled() => Wake::Cancelled,
                _ = &mut deadline => Wake::TimedOut,
            }
        } else {
            let changed = futures::future::select_all(
                pending.iter_mut().map(|(_, rx)| Box::pin(rx.changed())),
            );
            tokio::select! {
                _ = cancel.cancelled() => Wake::Cancelled,
                _ = &mut deadline => Wake::TimedOut,
                (result, index, _) = changed => Wake::Changed { index, closed: result.is_err() },
            }
        };

        match wake {
            Wake::Cancelled => return Err(FlowsyncError::cancelled("warm-up")),
            Wake::TimedOut => {
                let names: Vec<&str> = closed
                    .iter()
                    .map(String::as_str)
                    .chain(pending.iter().map(|(name, _)| name.as_str()))
                    .collect();
                warn!(pending = ?names, timeout_ms = timeout.as_millis() as u64, "warm-up timed out");
                return Err(FlowsyncError::warmup_timeout(
                    timeout.as_millis() as u64,
                    names.join(", "),
                ));
            }
            Wake::Changed { index, closed: true } => {
                let (name, _) = pending.remove(index);
                warn!(signal = %name, "readiness signal closed before becoming ready");
                closed.push(name);
            }
            Wake::Changed { .. } => {}
        }
    }
}

enum Wake {
    Cancelled,
    TimedOut,
    Changed { index: usize, closed: bool },
}
