//! Long-running loop around [`RoundEngine::advance`].
//!
//! Each step is fallible; the supervisor decides how long to wait before
//! trying again. Stopping is safe at any point because the next start resumes
//! from the persisted round.

use super::round_engine::RoundEngine;
use crate::config::TimingConfig;
use crate::errors::KenoError;
use crate::metrics::KenoMetrics;
use crate::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Delay before retrying a failed step. Transient store errors back off
/// exponentially up to `max_backoff_ms`; anything else waits `retry_delay_ms`.
pub fn failure_delay(err: &KenoError, consecutive_failures: u32, timing: &TimingConfig) -> Duration {
    let base = Duration::from_millis(timing.retry_delay_ms);
    if err.is_transient() {
        RetryPolicy::exponential(base, Duration::from_millis(timing.max_backoff_ms), None)
            .delay_for(consecutive_failures.max(1))
    } else {
        base
    }
}

pub struct Supervisor {
    engine: Arc<RoundEngine>,
    timing: TimingConfig,
    metrics: Arc<KenoMetrics>,
}

impl Supervisor {
    pub fn new(engine: Arc<RoundEngine>, timing: TimingConfig, metrics: Arc<KenoMetrics>) -> Self {
        Self {
            engine,
            timing,
            metrics,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Drive rounds until `shutdown` flips to true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            wait_ms = self.timing.wait_ms,
            reveal_interval_ms = self.timing.reveal_interval_ms,
            cooldown_ms = self.timing.cooldown_ms,
            "Round supervisor started"
        );
        let mut failures: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = tokio::select! {
                result = self.engine.advance() => match result {
                    Ok(step) => {
                        failures = 0;
                        debug!(?step, "Engine step");
                        step.idle_for(self.timing.poll())
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let delay = failure_delay(&e, failures, &self.timing);
                        if e.is_transient() {
                            self.metrics.storage_retries.inc();
                            warn!(error = %e, failures, delay_ms = delay.as_millis() as u64, "Engine step failed, backing off");
                        } else {
                            error!(error = %e, failures, delay_ms = delay.as_millis() as u64, "Engine step failed");
                        }
                        delay
                    }
                },
                _ = shutdown.changed() => break,
            };

            if pause.is_zero() {
                continue;
            }
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!("Round supervisor stopped");
    }
}
