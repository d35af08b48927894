//! Axum web server with WebSocket streaming of the opinion model.

use std::sync::Arc;

use agora_model::{Bid, Tid, Vote, VoteTally, VoteValue};
use agora_sync::{Availability, CoordinatorHandle};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::{ModelRelay, VisEvent};

/// Shared application state.
pub struct AppState {
    handle: CoordinatorHandle,
    relay: ModelRelay,
}

/// Visualization server.
pub struct VisServer {
    state: Arc<AppState>,
}

impl VisServer {
    /// Create a server for a running coordinator and register its relay.
    pub async fn new(handle: CoordinatorHandle) -> Result<Self> {
        let relay = ModelRelay::new(64);
        handle.subscribe(relay.clone()).await?;
        Ok(Self {
            state: Arc::new(AppState { handle, relay }),
        })
    }

    /// Build the router for the server.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/status", get(status_handler))
            .route("/api/model", get(model_handler))
            .route("/api/votes/{tid}/{bid}", get(votes_handler))
            .route("/api/vote", post(vote_handler))
            .route("/api/visibility", post(visibility_handler))
            // WebSocket for live updates
            .route("/ws", get(ws_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Run the server on the given port.
    pub async fn serve(self, port: u16) -> Result<()> {
        let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Opinion map server running on http://localhost:{}", port);
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

/// Server status response.
#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    availability: Availability,
    math_tick: Option<i64>,
    bucket_count: usize,
    participant_count: u64,
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>> {
    let model = state.handle.model().await?;
    Ok(Json(StatusResponse {
        status: "ok",
        availability: state.handle.availability(),
        math_tick: model.as_ref().map(|m| m.math_tick.0),
        bucket_count: model.as_ref().map_or(0, |m| m.buckets.len()),
        participant_count: model.as_ref().map_or(0, |m| m.participant_count),
    }))
}

async fn model_handler(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse> {
    let model = state.handle.model().await?.ok_or(Error::NoModel)?;
    Ok(Json(model))
}

async fn votes_handler(
    State(state): State<Arc<AppState>>,
    Path((tid, bid)): Path<(u64, u64)>,
) -> Result<Json<VoteTally>> {
    let model = state.handle.model().await?.ok_or(Error::NoModel)?;
    Ok(Json(model.votes.get(Tid(tid), Bid(bid))))
}

#[derive(Debug, Deserialize)]
struct VoteRequest {
    tid: Tid,
    vote: VoteValue,
}

#[derive(Debug, Serialize)]
struct PositionResponse {
    x: f64,
    y: f64,
}

async fn vote_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<PositionResponse>> {
    let position = state.handle.record_vote(Vote::new(req.tid, req.vote)).await?;
    Ok(Json(PositionResponse {
        x: position.x,
        y: position.y,
    }))
}

#[derive(Debug, Deserialize)]
struct VisibilityRequest {
    visible: bool,
}

async fn visibility_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VisibilityRequest>,
) -> Result<Json<serde_json::Value>> {
    state.handle.set_visible(req.visible).await?;
    Ok(Json(serde_json::json!({ "visible": req.visible })))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    GetModel,
    Vote { tid: Tid, vote: VoteValue },
    Visibility { visible: bool },
}

async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    debug!("WebSocket client connected");
    let mut updates = state.relay.subscribe();

    if let Some(json) = current_model(&state).await {
        if socket.send(Message::Text(json.as_ref().into())).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(json) => {
                    if socket.send(Message::Text(json.as_ref().into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "WebSocket client fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = socket.recv() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let reply = match serde_json::from_str::<WsCommand>(&text) {
                        Ok(cmd) => handle_ws_command(&state, cmd).await,
                        Err(e) => VisEvent::Error { message: e.to_string() }.to_json(),
                    };
                    if let Some(json) = reply {
                        if socket.send(Message::Text(json.as_ref().into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    let _ = socket.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("WebSocket client disconnected");
}

/// Handle a client command. Votes and visibility changes reach the client
/// through the relay, so only errors and explicit requests get a reply.
async fn handle_ws_command(state: &AppState, cmd: WsCommand) -> Option<Arc<str>> {
    let result = match cmd {
        WsCommand::GetModel => return current_model(state).await,
        WsCommand::Vote { tid, vote } => state.handle.record_vote(Vote::new(tid, vote)).await.map(|_| ()),
        WsCommand::Visibility { visible } => state.handle.set_visible(visible).await,
    };
    match result {
        Ok(()) => None,
        Err(e) => VisEvent::Error { message: e.to_string() }.to_json(),
    }
}

async fn current_model(state: &AppState) -> Option<Arc<str>> {
    let model = state.handle.model().await.ok().flatten()?;
    VisEvent::Model { model }.to_json()
}
