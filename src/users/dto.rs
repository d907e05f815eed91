use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::jwt::Role;
use crate::auth::repo::User;

#[derive(Debug, Serialize)]
pub struct DeletionStatus {
    #[serde(with = "time::serde::rfc3339")]
    pub scheduled_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub roles: Vec<Role>,
    pub is_active: bool,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Present only while a deletion request is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deletion_scheduled: Option<DeletionStatus>,
}

impl From<User> for Profile {
    fn from(user: User) -> Self {
        let deletion_scheduled = match (user.deletion_scheduled_at, user.deletion_expires_at) {
            (Some(scheduled_at), Some(expires_at)) => Some(DeletionStatus {
                scheduled_at,
                expires_at,
                reason: user.deletion_reason.clone(),
            }),
            _ => None,
        };
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            roles: crate::auth::jwt::roles_from_strings(&user.roles),
            is_active: user.is_active,
            last_login: user.last_login,
            created_at: user.created_at,
            deletion_scheduled,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ScheduleDeletionRequest {
    pub reason: Option<String>,
}

/// Password re-confirmation guards the irreversible path against a hijacked
/// session.
#[derive(Debug, Deserialize)]
pub struct ImmediateDeletionRequest {
    pub password: String,
}
