//! HTTP routes of the master coordinator.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use thorium_core::config::SchedulerConfig;
use thorium_core::model::{Character, Game};
use thorium_core::wire::{
    Authentication, CreateCharacter, CreateNewGame, CreateNewGameResponse, GetCharacter,
    LoginResponse, MachineRegisterResponse, MachineStatus, NewCharacterResponse, PlayerConnect,
    PlayerConnectResponse, PlayerDisconnect, RegisterGameServer, RegisterMachine,
    SelectCharacter, ServerInfoResponse, UnregisterMachine, UpdateCharacter,
};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use super::error::ApiError;
use super::extract::{JsonBody, RemoteAddr};
use crate::accounts::AccountService;
use crate::auth::TokenAuthority;
use crate::connect::PlayerConnectCoordinator;
use crate::registry::MachineRegistry;
use crate::scheduler::{GameScheduler, ServerInfo, WorkerClient};
use crate::session::SessionStore;
use crate::storage::MasterDatabase;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub registry: MachineRegistry,
    pub scheduler: GameScheduler,
    pub players: PlayerConnectCoordinator,
}

impl AppState {
    /// Wire every service over one database, token authority and session
    /// store.
    pub fn new(
        db: &MasterDatabase,
        tokens: &Arc<TokenAuthority>,
        sessions: &SessionStore,
        scheduler: SchedulerConfig,
    ) -> Result<Self, reqwest::Error> {
        let worker = WorkerClient::new(Duration::from_secs(scheduler.worker_timeout_secs))?;
        let registry = MachineRegistry::new(db.clone(), Arc::clone(tokens));
        Ok(Self {
            accounts: AccountService::new(db.clone(), sessions.clone(), Arc::clone(tokens)),
            scheduler: GameScheduler::new(db.clone(), registry.clone(), worker, scheduler),
            players: PlayerConnectCoordinator::new(
                db.clone(),
                registry.clone(),
                sessions.clone(),
                Arc::clone(tokens),
            ),
            registry,
        })
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/status", get(status))
        .route("/clients/register", post(register))
        .route("/clients/login", post(login))
        .route("/clients/disconnect", post(disconnect))
        .route("/characters", post(update_character))
        .route("/characters/new", post(create_character))
        .route("/characters/lookup", post(get_character))
        .route("/characters/{id}/select", post(select_character))
        .route("/games", post(create_game).get(list_games))
        .route("/games/{id}/server_info", get(server_info))
        .route("/games/register_server", post(register_server))
        .route("/games/player_connect", post(player_connect))
        .route("/games/player_disconnect", post(player_disconnect))
        .route("/machines/register", post(register_machine))
        .route("/machines/status", post(machine_heartbeat))
        .route("/machines/{id}/disconnect", post(unregister_machine))
        .route("/machines/{id}", axum::routing::delete(unregister_machine))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /` and `GET /status`
async fn status() -> &'static str {
    "OK"
}

// =========================================================================
// Clients
// =========================================================================

#[instrument(skip_all, fields(username = %req.username))]
async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<Authentication>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(
        state.accounts.register(&req.username, &req.password).await?,
    ))
}

#[instrument(skip_all, fields(username = %req.username))]
async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<Authentication>,
) -> Result<Json<LoginResponse>, ApiError> {
    Ok(Json(state.accounts.login(&req.username, &req.password).await?))
}

/// The body is the bare session key.
#[instrument(skip_all)]
async fn disconnect(State(state): State<AppState>, body: String) -> Result<&'static str, ApiError> {
    let session_key = body.trim().trim_matches('"');
    if session_key.is_empty() {
        return Err(ApiError::BadRequest("session key is required".into()));
    }
    state.accounts.disconnect(session_key).await?;
    Ok("OK")
}

#[instrument(skip_all, fields(name = %req.name, class_id = req.class_id))]
async fn create_character(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateCharacter>,
) -> Result<Json<NewCharacterResponse>, ApiError> {
    let character_id = state
        .accounts
        .create_character(&req.session_key, &req.name, req.class_id)
        .await?;
    Ok(Json(NewCharacterResponse { character_id }))
}

/// The character id in the path wins over the one in the body.
#[instrument(skip_all, fields(character_id = id))]
async fn select_character(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<SelectCharacter>,
) -> Result<Json<Character>, ApiError> {
    Ok(Json(
        state
            .accounts
            .select_character(&req.session_key, id)
            .await?,
    ))
}

// =========================================================================
// Games
// =========================================================================

#[instrument(skip_all, fields(map = %req.map, mode = %req.game_mode))]
async fn create_game(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateNewGame>,
) -> Result<Response, ApiError> {
    let game_id = state
        .scheduler
        .create_game(
            &req.map,
            &req.game_mode,
            req.minimum_level,
            req.max_players,
        )
        .await?;
    info!(game_id, "New game");
    Ok((StatusCode::CREATED, Json(CreateNewGameResponse { game_id })).into_response())
}

async fn list_games(State(state): State<AppState>) -> Result<Json<Vec<Game>>, ApiError> {
    Ok(Json(state.scheduler.list_games().await?))
}

/// `200` with the address once active, `202` while provisioning.
#[instrument(skip_all, fields(game_id = id))]
async fn server_info(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    match state.scheduler.server_info(id).await? {
        ServerInfo::Ready {
            remote_address,
            listen_port,
        } => Ok(Json(ServerInfoResponse {
            remote_address,
            listen_port,
        })
        .into_response()),
        ServerInfo::Loading => Ok((StatusCode::ACCEPTED, "Accepted").into_response()),
    }
}

#[instrument(skip_all, fields(game_id = req.game_id, listen_port = req.listen_port))]
async fn register_server(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterGameServer>,
) -> Result<&'static str, ApiError> {
    if req.listen_port == 0 {
        return Err(ApiError::BadRequest("Missing Parameters".into()));
    }
    state
        .scheduler
        .confirm_provisioning(&req.machine_key, req.game_id, req.listen_port)
        .await?;
    Ok("OK")
}

// =========================================================================
// Game servers
// =========================================================================

#[instrument(skip_all, fields(game_id = req.game_id, character_id = req.character_id))]
async fn player_connect(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PlayerConnect>,
) -> Result<Json<PlayerConnectResponse>, ApiError> {
    let character = state
        .players
        .connect(
            &req.machine_key,
            req.game_id,
            &req.session_key,
            req.character_id,
        )
        .await?;
    Ok(Json(PlayerConnectResponse { character }))
}

#[instrument(skip_all, fields(game_id = req.game_id, character_id = req.snapshot.character_id))]
async fn player_disconnect(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<PlayerDisconnect>,
) -> Result<&'static str, ApiError> {
    state
        .players
        .disconnect(&req.machine_key, req.game_id, &req.snapshot)
        .await?;
    Ok("OK")
}

#[instrument(skip_all, fields(character_id = req.character_id))]
async fn get_character(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<GetCharacter>,
) -> Result<Json<Character>, ApiError> {
    Ok(Json(
        state
            .players
            .get_character(&req.machine_key, req.character_id)
            .await?,
    ))
}

#[instrument(skip_all, fields(character_id = req.snapshot.character_id))]
async fn update_character(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpdateCharacter>,
) -> Result<&'static str, ApiError> {
    state
        .players
        .update_character(&req.machine_key, &req.snapshot)
        .await?;
    Ok("OK")
}

// =========================================================================
// Machines
// =========================================================================

#[instrument(skip_all, fields(remote = %remote.0, port = req.service_port))]
async fn register_machine(
    State(state): State<AppState>,
    remote: RemoteAddr,
    JsonBody(req): JsonBody<RegisterMachine>,
) -> Result<Json<MachineRegisterResponse>, ApiError> {
    if req.service_port == 0 {
        return Err(ApiError::BadRequest("No Port Given".into()));
    }
    let (machine_id, machine_key) = state.registry.register(&remote.0, req.service_port).await?;
    Ok(Json(MachineRegisterResponse {
        machine_id,
        machine_key,
    }))
}

async fn machine_heartbeat(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<MachineStatus>,
) -> Result<&'static str, ApiError> {
    if req.machine_key.is_empty() {
        return Err(ApiError::BadRequest("machineToken is required".into()));
    }
    state
        .registry
        .heartbeat(
            &req.machine_key,
            req.cpu_usage_pct,
            req.network_usage_pct,
            req.player_capacity_pct,
        )
        .await?;
    Ok("OK")
}

/// The key must belong to the machine named in the path.
#[instrument(skip_all, fields(machine_id = id))]
async fn unregister_machine(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    JsonBody(req): JsonBody<UnregisterMachine>,
) -> Result<&'static str, ApiError> {
    let machine_id = state.registry.validate(&req.machine_key).await?;
    if machine_id != id {
        warn!(machine_id, "Unregister for another machine");
        return Err(ApiError::Forbidden("Invalid machine credential".into()));
    }
    state.registry.unregister(&req.machine_key).await?;
    Ok("OK")
}
