//! `axum::Router` wiring: the `/ws` upgrade plus the synchronous HTTP
//! boundary handlers of spec §5.
//!
//! Grounded on the teacher's `socket/server.rs` accept-loop-to-per-client-task
//! shape, rehosted on `axum`'s WebSocket upgrade since the teacher's own
//! transport (`tokio-tungstenite` over a raw `TcpListener`) has no
//! server-side HTTP boundary alongside it; the combined `/ws` + REST router
//! follows `other_examples`' `luban` `pty.rs` `pty_ws_task` shape for the
//! websocket half.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::sync::oneshot;

use crate::auth::Authenticator;
use crate::config::Config;
use crate::connection;
use crate::error::WireError;
use crate::hub::{ClaimSnapshot, HubEvent, SubscriberHandle};
use crate::registry::SessionRegistry;

/// Shared state every handler closes over.
pub struct AppState {
    /// Session hub registry.
    pub registry: Arc<SessionRegistry>,
    /// Tunables.
    pub config: Arc<Config>,
    /// Dev-mode header authenticator (see [`crate::auth`]).
    pub authenticator: Arc<dyn Authenticator>,
}

/// Build the router: `/ws` plus the spec §5 HTTP boundary.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/terminal/sessions", get(list_sessions_handler))
        .route("/api/terminal/locks", get(list_locks_handler))
        .route("/api/terminal/{session_name}/lock", post(lock_handler))
        .route("/api/terminal/{session_name}/release", post(release_handler))
        .route("/api/terminal/{session_name}/force-release", post(force_release_handler))
        .with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let principal = match state.authenticator.authenticate(&headers) {
        Ok(principal) => Arc::new(principal),
        Err(err) => return wire_error_response(&err),
    };

    let registry = state.registry.clone();
    let config = state.config.clone();
    ws.on_upgrade(move |socket| connection::run(socket, principal, registry, config))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionSummary {
    name: String,
    window_count: u32,
    attached: bool,
}

async fn list_sessions_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.registry.list_multiplexer_sessions().await {
        Ok(sessions) => {
            let body: Vec<SessionSummary> = sessions
                .into_iter()
                .map(|s| SessionSummary { name: s.name, window_count: s.window_count, attached: s.attached })
                .collect();
            Json(body).into_response()
        }
        Err(err) => (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LockSummary {
    session_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    holder_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    holder_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<String>,
}

async fn list_locks_handler(State(state): State<Arc<AppState>>) -> Response {
    let sessions = match state.registry.list_multiplexer_sessions().await {
        Ok(sessions) => sessions,
        Err(err) => return (StatusCode::BAD_GATEWAY, err.to_string()).into_response(),
    };

    let mut summaries = Vec::with_capacity(sessions.len());
    for session in sessions {
        let held = match state.registry.lookup(&session.name) {
            Some(hub) => {
                let (tx, rx) = oneshot::channel();
                hub.post(HubEvent::QueryClaim { reply: tx });
                rx.await.ok().and_then(|snapshot: ClaimSnapshot| snapshot.held)
            }
            None => None,
        };
        summaries.push(match held {
            Some(held) => LockSummary {
                session_name: session.name,
                holder_user_id: Some(held.holder_user_id),
                holder_name: Some(held.holder_name),
                expires_at: Some(held.expires_at),
            },
            None => LockSummary { session_name: session.name, holder_user_id: None, holder_name: None, expires_at: None },
        });
    }
    Json(summaries).into_response()
}

async fn lock_handler(
    State(state): State<Arc<AppState>>,
    Path(session_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    claim_action(&state, &session_name, &headers, |sub| HubEvent::Claim { sub, http_reply: None }).await
}

async fn release_handler(
    State(state): State<Arc<AppState>>,
    Path(session_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    claim_action(&state, &session_name, &headers, |sub| HubEvent::Release { sub, http_reply: None }).await
}

async fn force_release_handler(
    State(state): State<Arc<AppState>>,
    Path(session_name): Path<String>,
    headers: HeaderMap,
) -> Response {
    // The hub requires a forceRelease actor to already be a subscriber (spec
    // §9's Open Question resolution), so this path joins membership
    // transiently around the single force-release call and leaves again —
    // unlike `lock`/`release`, which only ever check claim-holder identity.
    let principal = match state.authenticator.authenticate(&headers) {
        Ok(principal) => principal,
        Err(err) => return wire_error_response(&err),
    };

    let hub = match state.registry.resolve(&session_name).await {
        Ok(hub) => hub,
        Err(_) => return wire_error_response(&WireError::NotFound),
    };

    let sub = SubscriberHandle { id: crate::hub::next_subscriber_id(), principal: Arc::new(principal) };
    let queues = crate::hub::broadcast::SubscriberQueues::new(
        state.config.subscriber_queue_output,
        state.config.subscriber_queue_priority,
        Arc::new(tokio::sync::Notify::new()),
    );
    let (sub_reply, sub_rx) = oneshot::channel();
    hub.post(HubEvent::Subscribe { sub: sub.clone(), queues, reply: sub_reply });
    if let Ok(Err(err)) = sub_rx.await {
        return wire_error_response(&err);
    }

    let (tx, rx) = oneshot::channel();
    hub.post(HubEvent::ForceRelease { sub: sub.clone(), http_reply: Some(tx) });
    let response = match rx.await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => wire_error_response(&err),
        Err(_) => wire_error_response(&WireError::SessionLost),
    };

    hub.post(HubEvent::Unsubscribe { sub_id: sub.id });
    response
}

/// Shared REST boundary for the three claim-mutating endpoints: resolve the
/// hub, post the event with an `http_reply` oneshot instead of `None`, and
/// translate the synchronous result into a status code.
async fn claim_action(
    state: &Arc<AppState>,
    session_name: &str,
    headers: &HeaderMap,
    make_event: impl FnOnce(SubscriberHandle) -> HubEvent,
) -> Response {
    let principal = match state.authenticator.authenticate(headers) {
        Ok(principal) => principal,
        Err(err) => return wire_error_response(&err),
    };

    let hub = match state.registry.resolve(session_name).await {
        Ok(hub) => hub,
        Err(_) => return wire_error_response(&WireError::NotFound),
    };

    // REST actors aren't subscribers; they're assigned a throwaway id.
    let sub = SubscriberHandle { id: crate::hub::next_subscriber_id(), principal: Arc::new(principal) };
    let event_without_reply = make_event(sub.clone());
    let (event, reply_rx) = attach_http_reply(event_without_reply);
    hub.post(event);

    match reply_rx.await {
        Ok(Ok(())) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(err)) => wire_error_response(&err),
        Err(_) => wire_error_response(&WireError::SessionLost),
    }
}

/// Swap a `None` `http_reply` for a live oneshot pair, without every call
/// site constructing the variant twice. Covers `lock`/`release`, whose hub
/// events only check claim-holder identity; `force-release` builds its own
/// event directly since it also needs a transient subscription.
fn attach_http_reply(event: HubEvent) -> (HubEvent, oneshot::Receiver<Result<(), WireError>>) {
    let (tx, rx) = oneshot::channel();
    let event = match event {
        HubEvent::Claim { sub, .. } => HubEvent::Claim { sub, http_reply: Some(tx) },
        HubEvent::Release { sub, .. } => HubEvent::Release { sub, http_reply: Some(tx) },
        other => other,
    };
    (event, rx)
}

fn wire_error_response(err: &WireError) -> Response {
    let status = match err {
        WireError::Unauthorized => StatusCode::UNAUTHORIZED,
        WireError::Forbidden | WireError::NotHolder | WireError::Preempted => StatusCode::FORBIDDEN,
        WireError::NotFound => StatusCode::NOT_FOUND,
        WireError::Locked { .. } => StatusCode::CONFLICT,
        WireError::BadFrame => StatusCode::BAD_REQUEST,
        WireError::ServerShutdown => StatusCode::SERVICE_UNAVAILABLE,
        WireError::Io | WireError::SessionLost | WireError::SlowConsumer | WireError::IdleTimeout => {
            StatusCode::BAD_GATEWAY
        }
    };
    let frame = crate::protocol::ServerFrame::from_wire_error(err, None);
    (status, Json(frame)).into_response()
}
