use axum::{
    extract::State,
    routing::{delete, get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        jwt::AuthUser,
        password::{hash_password, verify_password},
        repo::{RefreshToken, User},
    },
    error::ApiError,
    response::ApiResponse,
    state::AppState,
    users::{
        dto::{ChangePasswordRequest, ImmediateDeletionRequest, Profile, ScheduleDeletionRequest},
        repo,
    },
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/me", get(me).delete(immediate_deletion))
        .route("/users/me/change-password", put(change_password))
        .route("/users/me/schedule-deletion", post(schedule_deletion))
        .route("/users/me/cancel-deletion", delete(cancel_deletion))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Profile>>, ApiError> {
    let record = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    Ok(Json(ApiResponse::ok(record.into())))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    if payload.new_password.len() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }

    let record = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if !verify_password(&payload.current_password, &record.password_hash)? {
        warn!(user_id = %user.id, "change-password with wrong current password");
        return Err(ApiError::InvalidCredentials);
    }

    let hash = hash_password(&payload.new_password)?;
    User::update_password(&state.db, user.id, &hash).await?;
    // Outstanding sessions die with the old password.
    let revoked = RefreshToken::revoke_all_for_user(&state.db, user.id).await?;
    info!(user_id = %user.id, revoked, "password changed");
    Ok(Json(ApiResponse::message("Password changed")))
}

#[instrument(skip(state, payload))]
pub async fn schedule_deletion(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ScheduleDeletionRequest>,
) -> Result<Json<ApiResponse<Profile>>, ApiError> {
    let record = repo::schedule_deletion(
        &state.db,
        user.id,
        OffsetDateTime::now_utc(),
        state.config.deletion.grace_period_days,
        payload.reason.as_deref(),
    )
    .await?;
    info!(user_id = %user.id, "account deletion scheduled");
    Ok(Json(ApiResponse::ok(record.into())))
}

#[instrument(skip(state))]
pub async fn cancel_deletion(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Profile>>, ApiError> {
    let record = repo::cancel_deletion(&state.db, user.id).await?;
    info!(user_id = %user.id, "account deletion cancelled");
    Ok(Json(ApiResponse::ok(record.into())))
}

/// Bypasses the grace period; valid from `Active` and `DeletionPending` alike.
#[instrument(skip(state, payload))]
pub async fn immediate_deletion(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ImmediateDeletionRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let record = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;

    if !verify_password(&payload.password, &record.password_hash)? {
        warn!(user_id = %user.id, "immediate deletion with wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    repo::purge_account(&state.db, &state.config.reports.dir, user.id).await?;
    info!(user_id = %user.id, "account deleted immediately");
    Ok(Json(ApiResponse::message("Account deleted")))
}
