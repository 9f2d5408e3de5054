//! KYC status watcher.
//!
//! Remembers the last-seen `verified` flag per connected user and notifies
//! the user when it flips to `true`. The first observation only seeds the
//! snapshot. Snapshots do not expire while the user stays connected.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::{Notification, NotificationHub, ServerEvent};
use crate::cache::{CacheConfig, TypedCache};
use crate::database::models::KycSummary;
use crate::database::{KycStore, StoreError};
use crate::retry::{execute_with_retry, RetryPolicy};

#[derive(Clone)]
pub struct KycWatcher {
    kyc: Arc<dyn KycStore>,
    hub: NotificationHub,
    snapshots: TypedCache<i64, bool>,
    retry: RetryPolicy,
}

impl KycWatcher {
    pub fn new(kyc: Arc<dyn KycStore>, hub: NotificationHub, retry: RetryPolicy) -> Self {
        Self {
            kyc,
            hub,
            snapshots: TypedCache::new("kyc_snapshots", CacheConfig::kyc_snapshots()),
            retry,
        }
    }

    /// Check one user. Returns `true` if an approval notification was sent.
    pub async fn observe(&self, user_id: i64) -> Result<bool, StoreError> {
        let kyc = self.kyc.clone();
        let status = execute_with_retry("kyc.get", &self.retry, || {
            let kyc = kyc.clone();
            async move { kyc.get(user_id).await }
        })
        .await?;

        let summary = status.map(|s| s.summary()).unwrap_or_default();
        let previous = self.snapshots.get(&user_id);
        self.snapshots.insert(user_id, summary.verified);

        if previous == Some(false) && summary.verified {
            info!("KYC approved for user {}", user_id);
            return Ok(self.notify_approved(user_id, summary));
        }
        Ok(false)
    }

    /// Drop the user's snapshot once they have no live connection.
    pub fn forget(&self, user_id: i64) {
        self.snapshots.invalidate(&user_id);
        debug!("Dropped KYC snapshot for user {}", user_id);
    }

    fn notify_approved(&self, user_id: i64, status: KycSummary) -> bool {
        let event = ServerEvent::KycStatusUpdate {
            status,
            notification: Notification::kyc_approved(),
        };
        self.hub.send(user_id, event)
    }

    /// Check every connected user once.
    pub async fn sweep(&self) -> usize {
        let users = self.hub.connected_users();
        let mut notified = 0;
        for user_id in users {
            match self.observe(user_id).await {
                Ok(true) => notified += 1,
                Ok(false) => {}
                Err(e) => warn!("KYC check for user {} failed: {}", user_id, e),
            }
        }
        notified
    }

    /// Sweep connected users every `interval` until the task is aborted.
    pub fn spawn(self, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let notified = self.sweep().await;
                debug!("KYC sweep done, {} notification(s) sent", notified);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use super::*;
    use crate::database::MemoryStore;

    fn watcher() -> (KycWatcher, Arc<MemoryStore>, NotificationHub) {
        let store = Arc::new(MemoryStore::new());
        let hub = NotificationHub::new();
        let watcher = KycWatcher::new(store.clone(), hub.clone(), RetryPolicy::default());
        (watcher, store, hub)
    }

    #[tokio::test]
    async fn test_first_observation_is_silent() {
        let (watcher, store, hub) = watcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(1, Uuid::new_v4(), tx);

        store.set_verified(1, true).await.unwrap();
        assert!(!watcher.observe(1).await.unwrap());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_flip_to_verified_notifies_once() {
        let (watcher, store, hub) = watcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(1, Uuid::new_v4(), tx);

        assert!(!watcher.observe(1).await.unwrap());
        store.set_verified(1, true).await.unwrap();

        assert_eq!(watcher.sweep().await, 1);
        match rx.try_recv() {
            Ok(ServerEvent::KycStatusUpdate { status, notification }) => {
                assert!(status.verified);
                assert_eq!(notification.kind, "kyc_verification_success");
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(watcher.sweep().await, 0);
    }

    #[test]
    fn test_snapshots_do_not_expire() {
        let config = CacheConfig::kyc_snapshots();
        assert!(config.ttl.is_none());
        assert!(config.tti.is_none());
    }

    #[tokio::test]
    async fn test_forget_reseeds_silently() {
        let (watcher, store, hub) = watcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(1, Uuid::new_v4(), tx);

        assert!(!watcher.observe(1).await.unwrap());
        watcher.forget(1);
        store.set_verified(1, true).await.unwrap();

        // No previous snapshot, so this only seeds
        assert!(!watcher.observe(1).await.unwrap());
        assert!(rx.try_recv().is_err());
    }
}
