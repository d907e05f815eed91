use std::time::Duration;

use axum::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::time::interval;
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::repo::RefreshToken;
use crate::state::AppState;
use crate::users::repo::{list_due_for_purge, purge_account};

/// Storage operations the sweep drives. A seam, so the batch control flow can
/// be exercised against a fake store.
#[async_trait]
pub trait DeletionStore: Send + Sync {
    /// Accounts whose grace window has elapsed at `now`.
    async fn due_for_purge(&self, now: OffsetDateTime) -> anyhow::Result<Vec<Uuid>>;
    /// Purges one account; a no-op for an already-purged id.
    async fn purge(&self, user_id: Uuid) -> anyhow::Result<()>;
    async fn prune_expired_tokens(&self, now: OffsetDateTime) -> anyhow::Result<u64>;
}

pub struct PgDeletionStore {
    db: PgPool,
    reports_dir: String,
}

impl PgDeletionStore {
    pub fn new(db: PgPool, reports_dir: String) -> Self {
        Self { db, reports_dir }
    }
}

#[async_trait]
impl DeletionStore for PgDeletionStore {
    async fn due_for_purge(&self, now: OffsetDateTime) -> anyhow::Result<Vec<Uuid>> {
        list_due_for_purge(&self.db, now).await
    }

    async fn purge(&self, user_id: Uuid) -> anyhow::Result<()> {
        purge_account(&self.db, &self.reports_dir, user_id).await
    }

    async fn prune_expired_tokens(&self, now: OffsetDateTime) -> anyhow::Result<u64> {
        RefreshToken::purge_expired(&self.db, now).await
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub purged: u64,
    pub failed: u64,
    pub tokens_pruned: u64,
}

/// Finalizes every deletion window that has elapsed by `now`, one account at a
/// time. Each purge is independent: a failure is recorded and the batch moves
/// on, and an interrupted run can simply be re-run (purging an already-gone
/// account is a no-op).
pub async fn sweep(store: &dyn DeletionStore, now: OffsetDateTime) -> SweepReport {
    let mut report = SweepReport::default();

    let due = match store.due_for_purge(now).await {
        Ok(ids) => ids,
        Err(e) => {
            error!(error = %e, "sweep could not enumerate due accounts");
            return report;
        }
    };

    for user_id in due {
        match store.purge(user_id).await {
            Ok(()) => report.purged += 1,
            Err(e) => {
                report.failed += 1;
                error!(user_id = %user_id, error = %e, "account purge failed");
            }
        }
    }

    match store.prune_expired_tokens(now).await {
        Ok(n) => report.tokens_pruned = n,
        Err(e) => error!(error = %e, "refresh token pruning failed"),
    }

    if report.purged > 0 || report.failed > 0 || report.tokens_pruned > 0 {
        info!(
            purged = report.purged,
            failed = report.failed,
            tokens_pruned = report.tokens_pruned,
            "sweep completed"
        );
    }
    report
}

/// Periodic driver, spawned once at startup.
pub fn spawn(state: AppState) {
    let period = Duration::from_secs(state.config.deletion.sweep_interval_hours * 3600);
    let store = PgDeletionStore::new(state.db.clone(), state.config.reports.dir.clone());
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            ticker.tick().await;
            sweep(&store, OffsetDateTime::now_utc()).await;
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// In-memory store with the same purge semantics as the database one:
    /// purging removes the account, purging a gone account is a no-op, and
    /// selected ids can be made to fail.
    struct FakeStore {
        accounts: Mutex<Vec<Uuid>>,
        failing: Vec<Uuid>,
        expired_tokens: Mutex<u64>,
    }

    impl FakeStore {
        fn with_accounts(accounts: Vec<Uuid>) -> Self {
            Self {
                accounts: Mutex::new(accounts),
                failing: Vec::new(),
                expired_tokens: Mutex::new(0),
            }
        }

        fn remaining(&self) -> Vec<Uuid> {
            self.accounts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DeletionStore for FakeStore {
        async fn due_for_purge(&self, _now: OffsetDateTime) -> anyhow::Result<Vec<Uuid>> {
            Ok(self.remaining())
        }

        async fn purge(&self, user_id: Uuid) -> anyhow::Result<()> {
            if self.failing.contains(&user_id) {
                anyhow::bail!("storage unavailable");
            }
            self.accounts.lock().unwrap().retain(|id| *id != user_id);
            Ok(())
        }

        async fn prune_expired_tokens(&self, _now: OffsetDateTime) -> anyhow::Result<u64> {
            Ok(std::mem::take(&mut *self.expired_tokens.lock().unwrap()))
        }
    }

    #[tokio::test]
    async fn one_failing_purge_does_not_abort_the_batch() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let mut store = FakeStore::with_accounts(ids.clone());
        store.failing = vec![ids[1]];

        let now = OffsetDateTime::now_utc();
        let report = sweep(&store, now).await;

        assert_eq!(report.purged, 2);
        assert_eq!(report.failed, 1);
        // Only the failing account is left; the one after it was still processed.
        assert_eq!(store.remaining(), vec![ids[1]]);
    }

    #[tokio::test]
    async fn second_sweep_is_a_noop() {
        let store = FakeStore::with_accounts(vec![Uuid::new_v4(), Uuid::new_v4()]);
        let now = OffsetDateTime::now_utc();

        let first = sweep(&store, now).await;
        assert_eq!(first.purged, 2);
        assert_eq!(first.failed, 0);
        assert!(store.remaining().is_empty());

        // Nothing is due any more, so each account is purged exactly once.
        let second = sweep(&store, now).await;
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn expired_tokens_are_counted() {
        let store = FakeStore::with_accounts(vec![]);
        *store.expired_tokens.lock().unwrap() = 5;

        let report = sweep(&store, OffsetDateTime::now_utc()).await;
        assert_eq!(report.purged, 0);
        assert_eq!(report.tokens_pruned, 5);
    }
}
