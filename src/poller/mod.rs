//! Status poller for pending on-chain transactions.
//!
//! After a transaction is recorded with a real hash, the poller waits an
//! initial delay and then checks the status source at a fixed interval, at
//! most `max_checks` times. A terminal answer settles the stored record and
//! notifies the sender; an exhausted budget leaves the record `pending`.
//!
//! Stored pending transactions are the source of truth: `resume_pending`
//! reschedules them after a restart.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::chain::StatusSource;
use crate::config::Config;
use crate::database::models::{Transaction, TransactionStatus};
use crate::database::{StoreError, TransactionStore};
use crate::notify::{NotificationHub, ServerEvent};
use crate::retry::{execute_with_retry, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub initial_delay: Duration,
    pub interval: Duration,
    /// Total number of checks, including the first.
    pub max_checks: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(3),
            interval: Duration::from_secs(15),
            max_checks: 5,
        }
    }
}

impl From<&Config> for PollPolicy {
    fn from(config: &Config) -> Self {
        Self {
            initial_delay: config.poll_initial_delay,
            interval: config.poll_interval,
            max_checks: config.poll_max_checks,
        }
    }
}

/// An issued external operation awaiting a terminal status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOperation {
    pub id: i64,
    pub external_reference: Option<String>,
    pub status: TransactionStatus,
    pub attempts_remaining: u32,
}

impl PendingOperation {
    pub fn new(id: i64, external_reference: Option<String>, policy: &PollPolicy) -> Self {
        Self {
            id,
            external_reference,
            status: TransactionStatus::Pending,
            attempts_remaining: policy.max_checks,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Drive `op` until the source reports a terminal status or the check budget
/// runs out. Returns the terminal status, if one was reached.
pub async fn poll_until_terminal(
    source: &dyn StatusSource,
    op: &mut PendingOperation,
    policy: &PollPolicy,
) -> Option<TransactionStatus> {
    let reference = op.external_reference.clone()?;

    tokio::time::sleep(policy.initial_delay).await;
    while op.attempts_remaining > 0 {
        op.attempts_remaining -= 1;
        let status = source.check(&reference).await;

        if let Some(terminal) = status.terminal() {
            op.status = terminal;
            return Some(terminal);
        }
        debug!(
            "Transaction {} still {:?}, {} check(s) left",
            op.id, status, op.attempts_remaining
        );

        if op.attempts_remaining > 0 {
            tokio::time::sleep(policy.interval).await;
        }
    }
    None
}

struct PollerInner {
    source: Arc<dyn StatusSource>,
    store: Arc<dyn TransactionStore>,
    hub: NotificationHub,
    policy: PollPolicy,
    retry: RetryPolicy,
    /// Transactions with a running poll task.
    jobs: DashMap<i64, ()>,
}

/// Removes the job entry when the poll task ends, however it ends.
struct JobGuard {
    inner: Arc<PollerInner>,
    id: i64,
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        self.inner.jobs.remove(&self.id);
    }
}

#[derive(Clone)]
pub struct StatusPoller {
    inner: Arc<PollerInner>,
}

impl StatusPoller {
    pub fn new(
        source: Arc<dyn StatusSource>,
        store: Arc<dyn TransactionStore>,
        hub: NotificationHub,
        policy: PollPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(PollerInner {
                source,
                store,
                hub,
                policy,
                retry,
                jobs: DashMap::new(),
            }),
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.inner.policy
    }

    /// Start polling `tx` in the background.
    /// `false` if it is not awaiting confirmation or is already being polled.
    pub fn schedule(&self, tx: &Transaction) -> bool {
        if !tx.awaits_confirmation() {
            return false;
        }
        if self.inner.jobs.insert(tx.id, ()).is_some() {
            debug!("Transaction {} already being polled", tx.id);
            return false;
        }

        let guard = JobGuard {
            inner: self.inner.clone(),
            id: tx.id,
        };
        let op = PendingOperation::new(tx.id, Some(tx.tx_hash.clone()), &self.inner.policy);
        let sender = tx.sender;

        tokio::spawn(async move {
            run_job(&guard.inner, op, sender).await;
        });
        true
    }

    /// Reschedule every stored transaction still awaiting confirmation.
    pub async fn resume_pending(&self) -> Result<usize, StoreError> {
        let store = self.inner.store.clone();
        let pending = execute_with_retry("transactions.awaiting_confirmation", &self.inner.retry, || {
            let store = store.clone();
            async move { store.awaiting_confirmation().await }
        })
        .await?;

        let scheduled = pending.iter().filter(|tx| self.schedule(tx)).count();
        if scheduled > 0 {
            info!("Resumed polling for {} pending transaction(s)", scheduled);
        }
        Ok(scheduled)
    }

    pub fn active_jobs(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_polling(&self, id: i64) -> bool {
        self.inner.jobs.contains_key(&id)
    }
}

async fn run_job(inner: &PollerInner, mut op: PendingOperation, sender: i64) {
    let Some(status) = poll_until_terminal(inner.source.as_ref(), &mut op, &inner.policy).await else {
        info!(
            "Transaction {} still pending after {} check(s); leaving it pending",
            op.id, inner.policy.max_checks
        );
        return;
    };

    let store = inner.store.clone();
    let id = op.id;
    let settled = execute_with_retry("transactions.settle", &inner.retry, || {
        let store = store.clone();
        async move { store.settle(id, status).await }
    })
    .await;

    match settled {
        Ok(Some(updated)) => {
            info!("Transaction {} settled as {}", id, status);
            inner.hub.send(sender, ServerEvent::TransactionUpdate(updated));
        }
        Ok(None) => debug!("Transaction {} left pending before the poller settled it", id),
        Err(e) => warn!("Could not record status {} for transaction {}: {}", status, id, e),
    }
}
