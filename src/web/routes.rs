//! HTTP surface of the plugin.
//!
//! Stateless translation between the host's request dispatch and the
//! [`SecretService`]. Authentication comes from the `Mattermost-User-Id`
//! header the host injects on every request; this is the only component that
//! turns typed service errors into HTTP status codes.

use crate::error::{AppError, AppResult};
use crate::host::types::{
    Post, PostAction, PostActionIntegration, PostActionIntegrationResponse, SlackAttachment,
    SlackAttachmentField,
};
use crate::service::{
    close_action_url, CloseState, RevealOutcome, SecretService, ATTACHMENT_TITLE, EXPIRED_TEXT,
    UNAVAILABLE_TEXT,
};
use crate::store::{Secret, SecretRequest, SecretViewedRequest};
use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Header carrying the authenticated viewer identity, injected by the host.
pub const USER_ID_HEADER: &str = "Mattermost-User-Id";

/// Colour of the attachment a placeholder collapses into.
const INACTIVE_ATTACHMENT_COLOR: &str = "#DDDDDD";

const CLOSE_EPHEMERAL_TEXT: &str = "You've closed this secret message.";

const REVEAL_STATUS_TEXT: &str = "This message can only be viewed once per person. \
    It will be automatically deleted when everyone in the channel has viewed it \
    or when it expires.";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SecretService>,
}

#[derive(Debug, Deserialize)]
struct ViewQuery {
    #[serde(default)]
    secret_id: String,
}

#[derive(Debug, Deserialize)]
struct CloseQuery {
    #[serde(default)]
    secret_id: String,
    #[serde(default)]
    post_id: String,
}

/// Build the plugin router. Wrong methods get a 405 from the method router;
/// unknown paths fall through to axum's 404.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/secrets", post(create_secret))
        .route("/api/v1/secrets/viewed", post(secret_viewed))
        .route("/api/v1/secrets/view", post(view_secret))
        .route("/api/v1/secrets/close", post(close_secret))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn viewer_id(headers: &HeaderMap) -> AppResult<String> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(AppError::AuthRequired)
}

/// `POST /api/v1/secrets`: create a secret and its placeholder post.
async fn create_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SecretRequest>,
) -> AppResult<Json<Secret>> {
    let author = viewer_id(&headers)?;

    let secret = state
        .service
        .create(&author, &req.channel_id, &req.root_id, &req.message)
        .await?;

    // The record is durable from here on; a failed placeholder is reaped by
    // the sweeper once the secret expires.
    if let Err(e) = state.service.create_placeholder(&secret).await {
        warn!(secret_id = %secret.id, error = %e, "failed to create placeholder post");
    }

    Ok(Json(secret))
}

/// `POST /api/v1/secrets/viewed`: record the viewer without disclosure.
async fn secret_viewed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SecretViewedRequest>,
) -> AppResult<StatusCode> {
    let viewer = viewer_id(&headers)?;
    if req.secret_id.is_empty() {
        return Err(AppError::invalid_input("secret_id is required"));
    }

    state.service.mark_viewed(&viewer, &req.secret_id).await?;
    Ok(StatusCode::OK)
}

/// `POST /api/v1/secrets/view`: reveal via the legacy attachment button.
///
/// Always answers 200 with an integration payload; an expired or missing
/// record becomes explanatory text so the pressed attachment still updates.
async fn view_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ViewQuery>,
) -> AppResult<Json<PostActionIntegrationResponse>> {
    let viewer = viewer_id(&headers)?;
    if query.secret_id.is_empty() {
        return Err(AppError::invalid_input("secret_id is required"));
    }

    let response = match state.service.reveal(&viewer, &query.secret_id).await? {
        RevealOutcome::Revealed {
            message,
            author_username,
            allow_copy,
        } => reveal_response(&query.secret_id, &author_username, &message, allow_copy),
        RevealOutcome::Expired => inactive_response(String::new(), EXPIRED_TEXT),
        RevealOutcome::NotFound => inactive_response(String::new(), UNAVAILABLE_TEXT),
    };
    Ok(Json(response))
}

/// `POST /api/v1/secrets/close`: collapse the revealed attachment for the
/// acting viewer. Never mutates the record.
async fn close_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CloseQuery>,
) -> AppResult<Json<PostActionIntegrationResponse>> {
    viewer_id(&headers)?;
    if query.secret_id.is_empty() {
        return Err(AppError::invalid_input("secret_id is required"));
    }
    let post_id = if query.post_id.is_empty() {
        "unknown_post_id".to_string()
    } else {
        query.post_id
    };

    let close_state = state.service.close(&query.secret_id).await;
    let mut response = inactive_response(post_id, close_state.text());
    if close_state == CloseState::Closed {
        response.ephemeral_text = CLOSE_EPHEMERAL_TEXT.to_string();
    }
    Ok(Json(response))
}

/// Integration payload disclosing the message, with a Close button so the
/// viewer can collapse it again.
fn reveal_response(
    secret_id: &str,
    author: &str,
    message: &str,
    allow_copy: bool,
) -> PostActionIntegrationResponse {
    let mut update = Post::default();
    update.set_prop("allow_copy", serde_json::Value::Bool(allow_copy));
    update.set_attachments(vec![SlackAttachment {
        title: ATTACHMENT_TITLE.to_string(),
        text: format!("**From @{author}:**\n\n```\n{message}\n```"),
        fields: vec![SlackAttachmentField {
            title: "Status".to_string(),
            value: REVEAL_STATUS_TEXT.to_string(),
            short: false,
        }],
        actions: vec![PostAction {
            name: "Close".to_string(),
            action_type: "button".to_string(),
            integration: PostActionIntegration {
                url: close_action_url(secret_id),
            },
            ..Default::default()
        }],
        ..Default::default()
    }]);

    PostActionIntegrationResponse {
        update,
        ephemeral_text: String::new(),
    }
}

/// Integration payload collapsing the attachment into a grey terminal state.
fn inactive_response(post_id: String, text: &str) -> PostActionIntegrationResponse {
    let mut update = Post {
        id: post_id,
        ..Default::default()
    };
    update.set_attachments(vec![SlackAttachment {
        title: ATTACHMENT_TITLE.to_string(),
        text: text.to_string(),
        color: INACTIVE_ATTACHMENT_COLOR.to_string(),
        ..Default::default()
    }]);

    PostActionIntegrationResponse {
        update,
        ephemeral_text: text.to_string(),
    }
}
