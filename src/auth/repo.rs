use rand::{distributions::Alphanumeric, Rng};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::jwt::{roles_from_strings, Role};
use crate::error::{is_unique_violation, ApiError};

pub(crate) const USER_COLS: &str = "id, email, full_name, password_hash, roles, is_active, \
     last_login, deletion_scheduled_at, deletion_expires_at, deletion_reason, created_at";

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    pub roles: Vec<String>,
    pub is_active: bool,
    pub last_login: Option<OffsetDateTime>,
    pub deletion_scheduled_at: Option<OffsetDateTime>,
    pub deletion_expires_at: Option<OffsetDateTime>,
    pub deletion_reason: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn role_set(&self) -> Vec<Role> {
        roles_from_strings(&self.roles)
    }

    pub fn deletion_pending(&self) -> bool {
        self.deletion_scheduled_at.is_some()
    }

    /// True once the grace window has elapsed. Such an account is awaiting the
    /// sweep and is no longer a valid login target.
    pub fn past_deletion_window(&self, now: OffsetDateTime) -> bool {
        matches!(self.deletion_expires_at, Some(exp) if exp <= now)
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// The unique constraint on `email` is the authoritative duplicate check;
    /// an insert racing past the handler's pre-check still comes back as
    /// `DuplicateEmail`.
    pub async fn create(
        db: &PgPool,
        email: &str,
        full_name: &str,
        password_hash: &str,
    ) -> Result<User, ApiError> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, full_name, password_hash)
             VALUES ($1, $2, $3)
             RETURNING {USER_COLS}"
        ))
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                ApiError::DuplicateEmail
            } else {
                e.into()
            }
        })
    }

    pub async fn touch_last_login(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET last_login = now() WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update_password(db: &PgPool, id: Uuid, password_hash: &str) -> anyhow::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

impl RefreshToken {
    pub async fn issue(
        db: &PgPool,
        user_id: Uuid,
        ttl: std::time::Duration,
    ) -> anyhow::Result<RefreshToken> {
        let token = generate_token();
        let expires_at =
            OffsetDateTime::now_utc() + time::Duration::seconds(ttl.as_secs() as i64);
        let row = sqlx::query_as::<_, RefreshToken>(
            "INSERT INTO refresh_tokens (user_id, token, expires_at)
             VALUES ($1, $2, $3)
             RETURNING id, user_id, token, expires_at, created_at",
        )
        .bind(user_id)
        .bind(&token)
        .bind(expires_at)
        .fetch_one(db)
        .await?;
        Ok(row)
    }

    /// Atomically consumes a token: the conditional delete is the single-writer
    /// discipline — of two concurrent rotations, exactly one gets the row back.
    pub async fn consume(db: &PgPool, token: &str) -> anyhow::Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            "DELETE FROM refresh_tokens WHERE token = $1
             RETURNING id, user_id, token, expires_at, created_at",
        )
        .bind(token)
        .fetch_optional(db)
        .await?;
        Ok(row)
    }

    /// Logout. Deleting an already-absent token is not an error.
    pub async fn revoke(db: &PgPool, token: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token = $1")
            .bind(token)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn revoke_all_for_user(db: &PgPool, user_id: Uuid) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn purge_expired(db: &PgPool, now: OffsetDateTime) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= $1")
            .bind(now)
            .execute(db)
            .await?;
        Ok(result.rows_affected())
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_opaque_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_check_is_inclusive() {
        let now = OffsetDateTime::now_utc();
        let token = RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: generate_token(),
            expires_at: now,
            created_at: now - time::Duration::days(7),
        };
        assert!(token.is_expired(now));
        assert!(!token.is_expired(now - time::Duration::seconds(1)));
    }

    #[test]
    fn deletion_window_checks() {
        let now = OffsetDateTime::now_utc();
        let mut user = User {
            id: Uuid::new_v4(),
            email: "alice@example.com".into(),
            full_name: "Alice".into(),
            password_hash: "x".into(),
            roles: vec!["traveler".into()],
            is_active: true,
            last_login: None,
            deletion_scheduled_at: None,
            deletion_expires_at: None,
            deletion_reason: None,
            created_at: now,
        };
        assert!(!user.deletion_pending());
        assert!(!user.past_deletion_window(now));

        user.deletion_scheduled_at = Some(now);
        user.deletion_expires_at = Some(now + time::Duration::days(30));
        assert!(user.deletion_pending());
        assert!(!user.past_deletion_window(now + time::Duration::days(29)));
        assert!(user.past_deletion_window(now + time::Duration::days(31)));
    }
}
