use sqlx::PgPool;
use time::{Duration, OffsetDateTime};
use tracing::{error, info};
use uuid::Uuid;

use crate::auth::repo::{User, USER_COLS};
use crate::error::ApiError;
use crate::reports::report_path;
use crate::trips::repo_types::Trip;

/// Computes the pending-deletion window for a request made at `now`.
pub fn deletion_window(now: OffsetDateTime, grace_days: i64) -> (OffsetDateTime, OffsetDateTime) {
    (now, now + Duration::days(grace_days))
}

/// `Active -> DeletionPending`. The conditional update makes the transition
/// atomic: a second concurrent request finds the pending marker already set.
pub async fn schedule_deletion(
    db: &PgPool,
    user_id: Uuid,
    now: OffsetDateTime,
    grace_days: i64,
    reason: Option<&str>,
) -> Result<User, ApiError> {
    let (scheduled_at, expires_at) = deletion_window(now, grace_days);
    let updated = sqlx::query_as::<_, User>(&format!(
        "UPDATE users
         SET deletion_scheduled_at = $2, deletion_expires_at = $3, deletion_reason = $4
         WHERE id = $1 AND deletion_scheduled_at IS NULL
         RETURNING {USER_COLS}"
    ))
    .bind(user_id)
    .bind(scheduled_at)
    .bind(expires_at)
    .bind(reason)
    .fetch_optional(db)
    .await?;

    match updated {
        Some(user) => Ok(user),
        None => {
            if User::find_by_id(db, user_id).await?.is_some() {
                Err(ApiError::AlreadyScheduled)
            } else {
                Err(ApiError::NotFound("user"))
            }
        }
    }
}

/// `DeletionPending -> Active`. "Nothing to cancel" is its own error so the
/// client can tell it apart from a transient failure.
pub async fn cancel_deletion(db: &PgPool, user_id: Uuid) -> Result<User, ApiError> {
    let updated = sqlx::query_as::<_, User>(&format!(
        "UPDATE users
         SET deletion_scheduled_at = NULL, deletion_expires_at = NULL, deletion_reason = NULL
         WHERE id = $1 AND deletion_scheduled_at IS NOT NULL
         RETURNING {USER_COLS}"
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await?;

    match updated {
        Some(user) => Ok(user),
        None => {
            if User::find_by_id(db, user_id).await?.is_some() {
                Err(ApiError::NoPendingDeletion)
            } else {
                Err(ApiError::NotFound("user"))
            }
        }
    }
}

/// Terminal purge: report artifacts first, then the user row; trips and
/// refresh tokens go with it via `ON DELETE CASCADE`. Safe to call again for
/// an already-purged id (the delete is then a no-op).
pub async fn purge_account(db: &PgPool, reports_dir: &str, user_id: Uuid) -> anyhow::Result<()> {
    let files = Trip::report_files_for_owner(db, user_id).await?;
    for file in &files {
        let path = report_path(reports_dir, file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            error!(user_id = %user_id, file = %file, error = %e, "report artifact removal failed");
        }
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(db)
        .await?;
    if result.rows_affected() > 0 {
        info!(user_id = %user_id, reports = files.len(), "account purged");
    }
    Ok(())
}

/// Accounts whose grace window has elapsed at `now`.
pub async fn list_due_for_purge(db: &PgPool, now: OffsetDateTime) -> anyhow::Result<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE deletion_expires_at <= $1")
            .bind(now)
            .fetch_all(db)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deletion_window_spans_the_grace_period() {
        let now = OffsetDateTime::now_utc();
        let (scheduled_at, expires_at) = deletion_window(now, 30);
        assert_eq!(scheduled_at, now);
        assert_eq!(expires_at - scheduled_at, Duration::days(30));
    }

    #[test]
    fn deletion_window_before_expiry_is_not_due() {
        let t0 = OffsetDateTime::now_utc();
        let (_, expires_at) = deletion_window(t0, 30);
        assert!(expires_at > t0 + Duration::days(29));
        assert!(expires_at <= t0 + Duration::days(31));
    }
}
