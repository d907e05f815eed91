use axum::{
    extract::{FromRef, State},
    routing::post,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use crate::{
    auth::{
        dto::{LoginRequest, PublicUser, RefreshRequest, RegisterRequest, SessionResponse},
        jwt::JwtKeys,
        password::{hash_password, is_valid_email, verify_password},
        repo::{RefreshToken, User},
    },
    error::ApiError,
    response::ApiResponse,
    state::AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
}

/// Mints an access token and persists one new refresh-token row.
async fn issue_session(state: &AppState, user: &User) -> Result<SessionResponse, ApiError> {
    let keys = JwtKeys::from_ref(state);
    let access_token = keys.sign_access(user.id, &user.role_set())?;
    let refresh = RefreshToken::issue(&state.db, user.id, keys.refresh_ttl).await?;
    Ok(SessionResponse {
        access_token,
        refresh_token: refresh.token,
        user: PublicUser::from(user),
    })
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err(ApiError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if payload.full_name.trim().is_empty() {
        return Err(ApiError::Validation("Full name is required".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::DuplicateEmail);
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.email, payload.full_name.trim(), &hash).await?;

    let session = issue_session(&state, &user).await?;
    info!(user_id = %user.id, email = %user.email, "user registered");
    Ok(Json(ApiResponse::ok(session)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    // Every rejection below is the same generic 401 so the response never
    // reveals whether the email exists.
    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::InvalidCredentials
        })?;

    if !user.is_active {
        warn!(user_id = %user.id, "login on deactivated account");
        return Err(ApiError::InvalidCredentials);
    }
    if user.past_deletion_window(OffsetDateTime::now_utc()) {
        // Awaiting the sweep; no longer a valid login target.
        warn!(user_id = %user.id, "login on account past deletion window");
        return Err(ApiError::InvalidCredentials);
    }

    if !verify_password(&payload.password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::InvalidCredentials);
    }

    User::touch_last_login(&state.db, user.id).await?;
    let session = issue_session(&state, &user).await?;
    info!(user_id = %user.id, "user logged in");
    Ok(Json(ApiResponse::ok(session)))
}

#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<SessionResponse>>, ApiError> {
    // The conditional delete both looks up and invalidates the presented
    // token, so a replayed rotation cannot succeed twice.
    let consumed = RefreshToken::consume(&state.db, &payload.refresh_token).await?;
    let consumed = validate_rotation(consumed, OffsetDateTime::now_utc())?;

    let user = User::find_by_id(&state.db, consumed.user_id)
        .await?
        .ok_or(ApiError::InvalidToken)?;

    let session = issue_session(&state, &user).await?;
    info!(user_id = %user.id, "session rotated");
    Ok(Json(ApiResponse::ok(session)))
}

/// Outcome of a rotation attempt after the conditional delete. An absent row
/// means the token was never issued, was revoked, or was already rotated once;
/// all three read the same to the caller.
fn validate_rotation(
    consumed: Option<RefreshToken>,
    now: OffsetDateTime,
) -> Result<RefreshToken, ApiError> {
    let token = consumed.ok_or(ApiError::InvalidToken)?;
    if token.is_expired(now) {
        // Stale row is already gone thanks to the delete above.
        warn!(user_id = %token.user_id, "expired refresh token");
        return Err(ApiError::TokenExpired);
    }
    Ok(token)
}

#[instrument(skip(state, payload))]
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    RefreshToken::revoke(&state.db, &payload.refresh_token).await?;
    Ok(Json(ApiResponse::message("Logged out")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::Role;
    use time::Duration as TimeDuration;
    use uuid::Uuid;

    fn token_row(expires_at: OffsetDateTime) -> RefreshToken {
        RefreshToken {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: "t".repeat(64),
            expires_at,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn rotation_accepts_a_live_consumed_token() {
        let now = OffsetDateTime::now_utc();
        let row = token_row(now + TimeDuration::days(7));
        let out = validate_rotation(Some(row.clone()), now).expect("live token rotates");
        assert_eq!(out.id, row.id);
    }

    #[test]
    fn second_rotation_of_the_same_token_is_invalid() {
        // The first rotation deleted the row, so the replay consumes nothing.
        let now = OffsetDateTime::now_utc();
        assert!(matches!(
            validate_rotation(None, now).unwrap_err(),
            ApiError::InvalidToken
        ));
    }

    #[test]
    fn rotation_of_an_expired_token_reports_expiry() {
        let now = OffsetDateTime::now_utc();
        let row = token_row(now - TimeDuration::minutes(1));
        assert!(matches!(
            validate_rotation(Some(row), now).unwrap_err(),
            ApiError::TokenExpired
        ));
    }

    #[test]
    fn session_response_serialization() {
        let response = SessionResponse {
            access_token: "header.payload.sig".into(),
            refresh_token: "r".repeat(64),
            user: PublicUser {
                id: Uuid::new_v4(),
                email: "test@example.com".into(),
                full_name: "Test User".into(),
                roles: vec![Role::Traveler],
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["user"]["email"], "test@example.com");
        assert_eq!(json["user"]["roles"][0], "traveler");
        assert!(json["refresh_token"].as_str().unwrap().len() == 64);
    }
}
