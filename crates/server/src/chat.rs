//! Chat quota endpoints.
//!
//! Two layers, mirroring how the product gates its free trial:
//! - a per-session window (client address + user agent) that admits or
//!   refuses each chat message, and
//! - the advisory per-business counter the widget keeps to decide when to
//!   show the signup prompt, served here so it survives page reloads.
//!
//! Neither is a security boundary; a visitor with a fresh session starts
//! over. The AI reply itself is produced elsewhere.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use frontdesk_core::domain::conversation::{BookingContext, BusinessId, ConversationId};
use frontdesk_core::quota::QuotaTracker;
use frontdesk_core::session::{SessionKey, SessionQuotaGate};

#[derive(Clone)]
pub struct ChatState {
    quota: Arc<QuotaTracker>,
    session_gate: Arc<SessionQuotaGate>,
}

impl ChatState {
    pub fn new(quota: Arc<QuotaTracker>, session_gate: Arc<SessionQuotaGate>) -> Self {
        Self { quota, session_gate }
    }
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessagePayload {
    pub business_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatAcceptedResponse {
    pub accepted: bool,
    pub remaining_messages: u32,
}

#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    pub error: &'static str,
    pub message: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub remaining_messages: u32,
}

#[derive(Debug, Deserialize)]
struct QuotaQuery {
    #[serde(default)]
    business_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QuotaConsumePayload {
    pub business_id: String,
}

#[derive(Debug, Serialize)]
pub struct QuotaResponse {
    pub business_id: String,
    pub limit: u32,
    pub remaining_messages: u32,
}

pub fn router(quota: Arc<QuotaTracker>, session_gate: Arc<SessionQuotaGate>) -> Router {
    Router::new()
        .route("/api/v1/chat/messages", post(post_message))
        .route("/api/v1/chat/quota", get(get_quota))
        .route("/api/v1/chat/quota/consume", post(consume_quota))
        .with_state(ChatState::new(quota, session_gate))
}

/// Session identity the way the original gate derives it: first hop of
/// `x-forwarded-for`, falling back to `x-real-ip`, plus the user agent.
fn session_from_headers(headers: &HeaderMap) -> SessionKey {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let ip = forwarded
        .or_else(|| headers.get("x-real-ip").and_then(|value| value.to_str().ok()))
        .unwrap_or("unknown");
    let user_agent =
        headers.get("user-agent").and_then(|value| value.to_str().ok()).unwrap_or("unknown");

    SessionKey::derive(ip, user_agent)
}

async fn post_message(
    State(state): State<ChatState>,
    headers: HeaderMap,
    Json(payload): Json<ChatMessagePayload>,
) -> Result<Json<ChatAcceptedResponse>, (StatusCode, Json<serde_json::Value>)> {
    if payload.business_id.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "business_id is required" })),
        ));
    }
    if payload.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "message must not be empty" })),
        ));
    }

    let business_id = BusinessId(payload.business_id);
    let session = session_from_headers(&headers);

    if !state.session_gate.try_consume(&session, &business_id) {
        return Err((
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({
                "error": "Free message limit reached",
                "message": "You've reached the limit for free messages. Please sign up to continue chatting.",
                "type": "rate_limit",
                "remaining_messages": 0,
            })),
        ));
    }

    let context = payload
        .conversation_id
        .map(|conversation_id| {
            BookingContext::new(ConversationId(conversation_id), business_id.clone())
        });
    info!(
        event_name = "chat.message.accepted",
        session = %session,
        business_id = %business_id,
        conversation_id = context
            .as_ref()
            .map(|ctx| ctx.conversation_id.0.as_str())
            .unwrap_or("unknown"),
        "chat message admitted within the free allowance"
    );

    Ok(Json(ChatAcceptedResponse {
        accepted: true,
        remaining_messages: state.session_gate.remaining(&session, &business_id),
    }))
}

async fn get_quota(
    State(state): State<ChatState>,
    Query(query): Query<QuotaQuery>,
) -> Result<Json<QuotaResponse>, (StatusCode, Json<ApiError>)> {
    let business_id = require_business_id(query.business_id)?;

    let remaining = state.quota.remaining(&business_id).await;
    Ok(Json(QuotaResponse {
        business_id: business_id.0,
        limit: state.quota.limit(),
        remaining_messages: remaining,
    }))
}

async fn consume_quota(
    State(state): State<ChatState>,
    Json(payload): Json<QuotaConsumePayload>,
) -> Result<Json<QuotaResponse>, (StatusCode, Json<ApiError>)> {
    let business_id = require_business_id(Some(payload.business_id))?;

    state.quota.increment(&business_id).await;
    let remaining = state.quota.remaining(&business_id).await;

    Ok(Json(QuotaResponse {
        business_id: business_id.0,
        limit: state.quota.limit(),
        remaining_messages: remaining,
    }))
}

fn require_business_id(
    raw: Option<String>,
) -> Result<BusinessId, (StatusCode, Json<ApiError>)> {
    match raw.filter(|value| !value.trim().is_empty()) {
        Some(value) => Ok(BusinessId(value)),
        None => Err((
            StatusCode::BAD_REQUEST,
            Json(ApiError { error: "business_id is required".to_string() }),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::Json;

    use frontdesk_core::quota::{QuotaTracker, MAX_FREE_MESSAGES};
    use frontdesk_core::session::SessionQuotaGate;
    use frontdesk_db::repositories::InMemoryCounterStore;

    use super::{
        consume_quota, get_quota, post_message, ChatMessagePayload, ChatState, QuotaConsumePayload,
        QuotaQuery,
    };

    fn state() -> ChatState {
        ChatState::new(
            Arc::new(QuotaTracker::new(Arc::new(InMemoryCounterStore::default()))),
            Arc::new(SessionQuotaGate::default()),
        )
    }

    fn browser_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        headers.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));
        headers
    }

    fn message() -> ChatMessagePayload {
        ChatMessagePayload {
            business_id: "B1".to_string(),
            conversation_id: Some("C1".to_string()),
            message: "what are your hours?".to_string(),
        }
    }

    #[tokio::test]
    async fn messages_are_admitted_until_the_session_allowance_runs_out() {
        let state = state();

        for expected_remaining in (0..MAX_FREE_MESSAGES).rev() {
            let Json(response) =
                post_message(State(state.clone()), browser_headers(), Json(message()))
                    .await
                    .expect("message admitted");
            assert!(response.accepted);
            assert_eq!(response.remaining_messages, expected_remaining);
        }

        let (status, Json(body)) =
            post_message(State(state), browser_headers(), Json(message()))
                .await
                .expect_err("limit reached");
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["type"], "rate_limit");
        assert_eq!(body["remaining_messages"], 0);
    }

    #[tokio::test]
    async fn a_different_session_keeps_its_own_allowance() {
        let state = state();

        for _ in 0..MAX_FREE_MESSAGES {
            post_message(State(state.clone()), browser_headers(), Json(message()))
                .await
                .expect("message admitted");
        }

        let mut other = HeaderMap::new();
        other.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.10"));
        other.insert("user-agent", HeaderValue::from_static("Mozilla/5.0"));

        let Json(response) = post_message(State(state), other, Json(message()))
            .await
            .expect("fresh session admitted");
        assert_eq!(response.remaining_messages, MAX_FREE_MESSAGES - 1);
    }

    #[tokio::test]
    async fn blank_business_or_message_is_a_bad_request() {
        let state = state();

        let mut blank_business = message();
        blank_business.business_id = "  ".to_string();
        let (status, _) = post_message(State(state.clone()), browser_headers(), Json(blank_business))
            .await
            .expect_err("blank business rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let mut blank_message = message();
        blank_message.message = String::new();
        let (status, _) = post_message(State(state), browser_headers(), Json(blank_message))
            .await
            .expect_err("blank message rejected");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn advisory_quota_counts_down_per_business() {
        let state = state();

        let Json(fresh) = get_quota(
            State(state.clone()),
            Query(QuotaQuery { business_id: Some("B1".to_string()) }),
        )
        .await
        .expect("quota readable");
        assert_eq!(fresh.remaining_messages, MAX_FREE_MESSAGES);

        let Json(after) = consume_quota(
            State(state.clone()),
            Json(QuotaConsumePayload { business_id: "B1".to_string() }),
        )
        .await
        .expect("quota consumable");
        assert_eq!(after.remaining_messages, MAX_FREE_MESSAGES - 1);

        let Json(other) = get_quota(
            State(state),
            Query(QuotaQuery { business_id: Some("B2".to_string()) }),
        )
        .await
        .expect("other business unaffected");
        assert_eq!(other.remaining_messages, MAX_FREE_MESSAGES);
    }

    #[tokio::test]
    async fn quota_lookup_requires_a_business_id() {
        let state = state();

        let (status, Json(error)) =
            get_quota(State(state), Query(QuotaQuery { business_id: None }))
                .await
                .expect_err("missing business_id rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error, "business_id is required");
    }
}
