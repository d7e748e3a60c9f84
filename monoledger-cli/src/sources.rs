//! Transaction sources feeding the approval queue.
//!
//! Polling diffs successive statement snapshots; webhook mode only needs the
//! push URL registered with the bank, the server does the rest.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use monoledger_bank::MonoClient;
use monoledger_core::{ApprovalQueue, PollPhase, StatementTracker};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

pub struct Poller {
    client: MonoClient,
    account: String,
    interval: Duration,
    lookback: chrono::Duration,
    tracker: StatementTracker,
}

impl Poller {
    pub fn new(
        client: MonoClient,
        account: impl Into<String>,
        interval: Duration,
        lookback: chrono::Duration,
    ) -> Self {
        Self {
            client,
            account: account.into(),
            interval,
            lookback,
            tracker: StatementTracker::new(),
        }
    }

    /// Check the statement every interval, starting now. Stops only when
    /// the approval queue is gone.
    pub async fn run(mut self, queue: ApprovalQueue) -> Result<()> {
        info!(
            account = %self.account,
            every_secs = self.interval.as_secs(),
            "statement polling started"
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick(&queue).await?;
        }
    }

    /// One statement check; returns how many transactions were queued.
    ///
    /// A failed fetch is logged and skipped, keeping the previous baseline.
    pub async fn tick(&mut self, queue: &ApprovalQueue) -> Result<usize> {
        debug!("started statement check");
        let from = Utc::now() - self.lookback;
        let snapshot = match self.client.statement(&self.account, from, None).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "statement check failed, will retry next tick");
                return Ok(0);
            }
        };

        let phase = self.tracker.phase();
        let fresh = self.tracker.observe(snapshot);
        if phase == PollPhase::Priming {
            info!(
                baseline = self.tracker.baseline_len(),
                "first run, waiting for the next check"
            );
            return Ok(0);
        }
        if fresh.is_empty() {
            debug!("no new transactions");
            return Ok(0);
        }

        info!(count = fresh.len(), "queueing new transaction(s)");
        let count = fresh.len();
        for txn in fresh {
            queue.submit(txn).context("approval queue closed")?;
        }
        Ok(count)
    }
}

/// Point the bank's push delivery at `url`.
pub async fn register_webhook(client: &MonoClient, url: &str) -> Result<()> {
    let ack = client
        .set_webhook(url)
        .await
        .context("Monobank webhook setup problem")?;
    if !ack.is_ok() {
        bail!("Monobank webhook setup problem: status '{}'", ack.status);
    }
    info!(%url, "Monobank webhook setup success");
    Ok(())
}
