//! Peak resident memory sampling for a running process

use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Background poller tracking the peak resident set of one pid, in KiB.
///
/// The sampler ends on its own once the process entry disappears; `stop`
/// must still be called to collect the peak. With a limit, [`exceeded`]
/// resolves as soon as a sample goes over it.
///
/// [`exceeded`]: MemorySampler::exceeded
pub struct MemorySampler {
    stop_tx: Option<oneshot::Sender<()>>,
    exceeded_rx: Option<oneshot::Receiver<u64>>,
    handle: Option<JoinHandle<u64>>,
}

impl MemorySampler {
    pub fn start(pid: u32, interval: Duration) -> Self {
        Self::with_limit(pid, interval, None)
    }

    pub fn with_limit(pid: u32, interval: Duration, limit_kb: Option<u64>) -> Self {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (exceeded_tx, exceeded_rx) = oneshot::channel::<u64>();

        let handle = tokio::spawn(async move {
            let mut peak = 0u64;
            let mut exceeded_tx = limit_kb.map(|limit| (limit, exceeded_tx));
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => match read_resident_kb(pid).await {
                        Some(kb) => peak = peak.max(kb),
                        None => break,
                    },
                }
                if matches!(exceeded_tx, Some((limit, _)) if peak > limit) {
                    if let Some((limit, tx)) = exceeded_tx.take() {
                        debug!(pid, peak, limit, "memory limit exceeded");
                        let _ = tx.send(peak);
                    }
                }
            }

            trace!(pid, peak, "memory sampler finished");
            peak
        });

        Self {
            stop_tx: Some(stop_tx),
            exceeded_rx: Some(exceeded_rx),
            handle: Some(handle),
        }
    }

    /// Resolves once the peak goes over the limit; never without a limit.
    /// Dropping the returned future forfeits the signal.
    pub async fn exceeded(&mut self) {
        if let Some(rx) = self.exceeded_rx.take() {
            if rx.await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }

    /// Stop polling and return the peak observed so far.
    pub async fn stop(mut self) -> u64 {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or(0),
            None => 0,
        }
    }
}

impl Drop for MemorySampler {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

async fn read_resident_kb(pid: u32) -> Option<u64> {
    let status = tokio::fs::read_to_string(format!("/proc/{}/status", pid))
        .await
        .ok()?;
    parse_status_kb(&status)
}

/// Largest of `VmHWM` and `VmRSS` in a `/proc/<pid>/status` dump.
fn parse_status_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .filter_map(|line| {
            let rest = line
                .strip_prefix("VmHWM:")
                .or_else(|| line.strip_prefix("VmRSS:"))?;
            rest.split_whitespace().next()?.parse::<u64>().ok()
        })
        .max()
}
