use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{config::JwtConfig, error::ApiError, state::AppState};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Traveler,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s {
            "traveler" => Some(Role::Traveler),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

/// Maps the `roles TEXT[]` column onto the typed role set, dropping tags this
/// build does not know about.
pub fn roles_from_strings(raw: &[String]) -> Vec<Role> {
    raw.iter().filter_map(|s| Role::parse(s)).collect()
}

/// Access-token claims. Self-contained: validation needs no lookup.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: Uuid,
    pub roles: Vec<Role>,
    pub exp: usize,
    pub iat: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let JwtConfig {
            secret,
            issuer,
            audience,
            access_ttl_minutes,
            refresh_ttl_days,
        } = state.config.jwt.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            access_ttl: Duration::from_secs((access_ttl_minutes as u64) * 60),
            refresh_ttl: Duration::from_secs((refresh_ttl_days as u64) * 24 * 3600),
        }
    }
}

impl JwtKeys {
    pub fn sign_access(&self, user_id: Uuid, roles: &[Role]) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let exp = now + TimeDuration::seconds(self.access_ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            roles: roles.to_vec(),
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "access token signed");
        Ok(token)
    }

    /// Signature + expiry check only; `TokenExpired` and `InvalidToken` are
    /// distinct outcomes for the caller.
    pub fn verify(&self, token: &str) -> Result<Claims, ApiError> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => ApiError::TokenExpired,
                _ => ApiError::InvalidToken,
            }
        })?;
        debug!(user_id = %data.claims.sub, "access token verified");
        Ok(data.claims)
    }
}

/// Validated identity + role context, extracted from the bearer header.
#[derive(Debug)]
pub struct AuthUser {
    pub id: Uuid,
    pub roles: Vec<Role>,
}

impl AuthUser {
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn require_role(&self, role: Role) -> Result<(), ApiError> {
        self.require_any_role(&[role])
    }

    pub fn require_any_role(&self, roles: &[Role]) -> Result<(), ApiError> {
        if roles.iter().any(|r| self.has_role(*r)) {
            Ok(())
        } else {
            Err(ApiError::Forbidden)
        }
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::InvalidToken)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or(ApiError::InvalidToken)?;

        let claims = keys.verify(token).map_err(|e| {
            warn!("bearer token rejected");
            e
        })?;

        Ok(AuthUser {
            id: claims.sub,
            roles: claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_roundtrips_id_and_roles() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let roles = vec![Role::Traveler, Role::Admin];
        let token = keys.sign_access(user_id, &roles).expect("sign access");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.roles, roles);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
    }

    #[tokio::test]
    async fn verify_rejects_garbage_as_invalid_token() {
        let keys = make_keys();
        let err = keys.verify("not.a.jwt").unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken));
    }

    #[tokio::test]
    async fn verify_rejects_wrong_secret() {
        let keys = make_keys();
        let token = keys.sign_access(Uuid::new_v4(), &[Role::Traveler]).unwrap();
        let mut other = make_keys();
        other.decoding = DecodingKey::from_secret(b"other-secret");
        assert!(matches!(
            other.verify(&token).unwrap_err(),
            ApiError::InvalidToken
        ));
    }

    #[tokio::test]
    async fn expired_token_maps_to_token_expired() {
        // Hand-roll claims whose exp is past the default leeway.
        let keys = make_keys();
        let now = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let claims = Claims {
            sub: Uuid::new_v4(),
            roles: vec![Role::Traveler],
            iat: now.unix_timestamp() as usize,
            exp: (now + TimeDuration::minutes(1)).unix_timestamp() as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(matches!(
            keys.verify(&token).unwrap_err(),
            ApiError::TokenExpired
        ));
    }

    #[test]
    fn role_gate() {
        let user = AuthUser {
            id: Uuid::new_v4(),
            roles: vec![Role::Traveler],
        };
        assert!(user.require_role(Role::Traveler).is_ok());
        assert!(matches!(
            user.require_role(Role::Admin).unwrap_err(),
            ApiError::Forbidden
        ));
        assert!(user.require_any_role(&[Role::Admin, Role::Traveler]).is_ok());
        assert!(user.require_any_role(&[]).is_err());
    }

    #[test]
    fn roles_from_strings_drops_unknown_tags() {
        let raw = vec!["traveler".to_string(), "superuser".to_string(), "admin".to_string()];
        assert_eq!(roles_from_strings(&raw), vec![Role::Traveler, Role::Admin]);
    }
}
