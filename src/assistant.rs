use std::time::Duration;

use axum::{async_trait, extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::jwt::{AuthUser, Role},
    config::AssistantConfig,
    error::ApiError,
    response::ApiResponse,
    state::AppState,
    trips::repo_types::{Transcript, Trip},
};

/// Opaque text-in/text-out completion collaborator.
#[async_trait]
pub trait AssistantClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

pub struct HttpAssistant {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpAssistant {
    pub fn new(config: &AssistantConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    prompt: &'a str,
}

/// The one shape we accept from upstream. Anything else is an
/// `UpstreamFailure`, never ad hoc shape sniffing.
pub fn parse_completion(body: &serde_json::Value) -> Result<String, ApiError> {
    body.get("response")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| ApiError::Upstream("unexpected completion response shape".into()))
}

#[async_trait]
impl AssistantClient for HttpAssistant {
    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .json(&CompletionRequest { prompt });
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::UpstreamTimeout
            } else {
                ApiError::Upstream(format!("completion request failed: {e}"))
            }
        })?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "completion upstream returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(format!("completion body unreadable: {e}")))?;
        parse_completion(&body)
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/chat/assistant", post(chat))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub trip_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    pub reply: String,
}

#[instrument(skip(state, payload))]
pub async fn chat(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatReply>>, ApiError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation("Message is required".into()));
    }

    let reply = state.assistant.complete(message).await?;

    if let Some(trip_id) = payload.trip_id {
        let trip = Trip::find_by_id(&state.db, trip_id)
            .await?
            .ok_or(ApiError::NotFound("trip"))?;
        if trip.user_id != user.id && !user.has_role(Role::Admin) {
            warn!(user_id = %user.id, trip_id = %trip_id, "chat on foreign trip");
            return Err(ApiError::Forbidden);
        }
        let transcript = Transcript {
            question: message.to_string(),
            answer: reply.clone(),
            at: OffsetDateTime::now_utc(),
        };
        Trip::append_conversation(&state.db, trip_id, &transcript).await?;
        info!(trip_id = %trip_id, "transcript appended");
    }

    Ok(Json(ApiResponse::ok(ChatReply { reply })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_the_strict_shape() {
        let body = serde_json::json!({"response": "Day 1: Louvre", "model": "x"});
        assert_eq!(parse_completion(&body).unwrap(), "Day 1: Louvre");
    }

    #[test]
    fn parse_rejects_other_shapes() {
        for body in [
            serde_json::json!({"data": {"response": "nested"}}),
            serde_json::json!({"message": "wrong key"}),
            serde_json::json!({"response": 42}),
            serde_json::json!("bare string"),
        ] {
            let err = parse_completion(&body).unwrap_err();
            assert!(matches!(err, ApiError::Upstream(_)));
        }
    }
}
