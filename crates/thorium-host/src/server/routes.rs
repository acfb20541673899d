//! HTTP routes of a worker host.
//!
//! The master calls `/games` to launch game servers. Local game servers call
//! the remaining `POST` routes, which are checked against this machine's key
//! and forwarded to the master.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use thorium_core::wire::{
    NewGameServer, NewGameServerResponse, PlayerConnect, PlayerDisconnect, RegisterGameServer,
    UpdateCharacter,
};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::error::HostError;
use crate::master::MasterClient;
use crate::supervisor::{ProcessInfo, ProcessSupervisor};

/// Shared application state.
#[derive(Clone)]
pub struct HostState {
    pub supervisor: ProcessSupervisor,
    pub master: MasterClient,
    /// Key issued to this machine by the master.
    pub machine_key: Arc<str>,
}

impl HostState {
    fn check_key(&self, presented: &str, route: &'static str) -> Result<(), HostError> {
        if presented == &*self.machine_key {
            Ok(())
        } else {
            warn!(route, "Received invalid machine key");
            Err(HostError::InvalidKey)
        }
    }

    /// Forward a game server request to the master and relay its answer.
    async fn forward<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, HostError> {
        let resp = self.master.forward(path, body).await?;
        let status = StatusCode::from_u16(resp.status).map_err(|_| HostError::Internal)?;
        let mut response = (status, resp.body).into_response();
        if let Some(value) = resp
            .content_type
            .and_then(|ct| HeaderValue::from_str(&ct).ok())
        {
            response.headers_mut().insert(CONTENT_TYPE, value);
        }
        Ok(response)
    }
}

pub fn build_router(state: HostState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/status", get(status))
        .route("/games", post(launch_game).get(list_games))
        .route("/games/register_server", post(register_server))
        .route("/games/player_connect", post(player_connect))
        .route("/games/player_disconnect", post(player_disconnect))
        .route("/characters", post(update_character))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /` and `GET /status`
async fn status() -> &'static str {
    "OK"
}

#[instrument(skip_all)]
async fn launch_game(
    State(state): State<HostState>,
    payload: Result<Json<NewGameServer>, JsonRejection>,
) -> Result<Json<NewGameServerResponse>, HostError> {
    let Json(req) = payload?;
    state.check_key(&req.machine_key, "launch")?;
    let listen_port = state.supervisor.launch(&req).await?;
    info!(game_id = req.game_id, listen_port, "Game server started");
    Ok(Json(NewGameServerResponse {
        machine_key: req.machine_key,
        listen_port,
    }))
}

async fn list_games(State(state): State<HostState>) -> Json<Vec<ProcessInfo>> {
    Json(state.supervisor.list().await)
}

/// Provisioning confirmation. When the master refuses it the game server keeps
/// running unconfirmed.
#[instrument(skip_all)]
async fn register_server(
    State(state): State<HostState>,
    payload: Result<Json<RegisterGameServer>, JsonRejection>,
) -> Result<Response, HostError> {
    let Json(req) = payload?;
    state.check_key(&req.machine_key, "register_server")?;
    let resp = state.forward("/games/register_server", &req).await?;
    if !resp.status().is_success() {
        warn!(
            game_id = req.game_id,
            status = %resp.status(),
            "Master rejected game server confirmation"
        );
    }
    Ok(resp)
}

#[instrument(skip_all)]
async fn player_connect(
    State(state): State<HostState>,
    payload: Result<Json<PlayerConnect>, JsonRejection>,
) -> Result<Response, HostError> {
    let Json(req) = payload?;
    state.check_key(&req.machine_key, "player_connect")?;
    state.forward("/games/player_connect", &req).await
}

#[instrument(skip_all)]
async fn player_disconnect(
    State(state): State<HostState>,
    payload: Result<Json<PlayerDisconnect>, JsonRejection>,
) -> Result<Response, HostError> {
    let Json(req) = payload?;
    state.check_key(&req.machine_key, "player_disconnect")?;
    state.forward("/games/player_disconnect", &req).await
}

#[instrument(skip_all)]
async fn update_character(
    State(state): State<HostState>,
    payload: Result<Json<UpdateCharacter>, JsonRejection>,
) -> Result<Response, HostError> {
    let Json(req) = payload?;
    state.check_key(&req.machine_key, "update_character")?;
    state.forward("/characters", &req).await
}
