//! Game placement: `requested -> provisioning -> active`.
//!
//! A provisioning record is written in the same transaction that creates the
//! game and picks its machine, before the worker is contacted, so the
//! worker's confirmation always finds it. A failed launch removes it again.

use thorium_core::config::SchedulerConfig;
use thorium_core::db::{DatabaseError, unix_timestamp};
use thorium_core::model::Game;
use thorium_core::wire::NewGameServer;
use tracing::{info, warn};

use super::worker::WorkerClient;
use crate::registry::{MachineRegistry, RegistryError};
use crate::storage::{MasterDatabase, NewGame, Placement, Reprovision, Reservation};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("No available machines")]
    NoAvailableMachines,

    #[error("Machine unavailable: {0}")]
    MachineUnavailable(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid machine credential")]
    InvalidCredential,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for SchedulerError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound(what) => Self::NotFound(what),
            other => Self::Database(other),
        }
    }
}

impl From<RegistryError> for SchedulerError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidCredential | RegistryError::Token(_) => Self::InvalidCredential,
            RegistryError::Database(e) => e.into(),
        }
    }
}

/// Answer to a server-info query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerInfo {
    Ready { remote_address: String, listen_port: u16 },
    /// Still provisioning; poll again later.
    Loading,
}

#[derive(Clone)]
pub struct GameScheduler {
    db: MasterDatabase,
    registry: MachineRegistry,
    worker: WorkerClient,
    config: SchedulerConfig,
}

impl GameScheduler {
    pub const fn new(
        db: MasterDatabase,
        registry: MachineRegistry,
        worker: WorkerClient,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            registry,
            worker,
            config,
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    fn live_since(&self) -> i64 {
        unix_timestamp() - self.config.machine_stale_secs as i64
    }

    /// Clamp a requested player limit into `1..=cap`, substituting the
    /// default for anything outside it.
    fn player_limit(&self, requested: i64) -> i64 {
        if requested <= 0 || requested > i64::from(self.config.max_players_cap) {
            i64::from(self.config.default_max_players)
        } else {
            requested
        }
    }

    /// Create a game and start provisioning it on the first live machine.
    pub async fn create_game(
        &self,
        map: &str,
        mode: &str,
        minimum_level: i64,
        max_players: i64,
    ) -> Result<i64, SchedulerError> {
        if map.is_empty() {
            return Err(SchedulerError::InvalidInput("map is required".into()));
        }
        if mode.is_empty() {
            return Err(SchedulerError::InvalidInput("gameMode is required".into()));
        }

        let new_game = NewGame {
            map,
            mode,
            minimum_level,
            max_players: self.player_limit(max_players),
        };
        let reservation = self
            .db
            .reserve_new_game(new_game, self.live_since())
            .await?
            .ok_or(SchedulerError::NoAvailableMachines)?;
        let game_id = reservation.game.game_id;
        let machine_id = reservation.machine.machine_id;

        if let Err(e) = self.launch(&reservation).await {
            if let Err(cleanup) = self.db.cancel_provisioning(game_id, machine_id).await {
                warn!(game_id, machine_id, error = %cleanup, "Provisioning record left behind");
            }
            match self.db.discard_unconfirmed_game(game_id).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(game_id, machine_id, "Game confirmed despite launch error");
                    return Ok(game_id);
                }
                Err(cleanup) => {
                    warn!(game_id, error = %cleanup, "Unlaunched game left behind");
                }
            }
            return Err(e);
        }

        info!(game_id, machine_id, map, mode, "Game provisioning");
        Ok(game_id)
    }

    async fn launch(&self, reservation: &Reservation) -> Result<(), SchedulerError> {
        let machine = &reservation.machine;
        let game = &reservation.game;
        let request = NewGameServer {
            game_id: game.game_id,
            map: game.map_name.clone(),
            mode: game.game_mode.clone(),
            minimum_level: game.minimum_level,
            max_players: game.maximum_players,
            machine_key: machine.machine_key.clone(),
        };

        self.worker
            .launch(machine, &request)
            .await
            .map(|_| ())
            .map_err(|e| {
                warn!(
                    game_id = game.game_id,
                    machine_id = machine.machine_id,
                    error = %e,
                    "Launch failed"
                );
                SchedulerError::MachineUnavailable(e.to_string())
            })
    }

    /// Promote a provisioning game to active. Only the machine the game was
    /// assigned to can confirm it.
    pub async fn confirm_provisioning(
        &self,
        machine_key: &str,
        game_id: i64,
        listen_port: u16,
    ) -> Result<(), SchedulerError> {
        let machine_id = self.registry.validate(machine_key).await?;
        self.db
            .confirm_provisioning(game_id, machine_id, listen_port)
            .await?;
        info!(game_id, machine_id, listen_port, "Game active");
        Ok(())
    }

    /// Where to connect for `game_id`.
    ///
    /// A game stuck in provisioning past the staleness window, or with no
    /// machine at all, is provisioned again before answering.
    pub async fn server_info(&self, game_id: i64) -> Result<ServerInfo, SchedulerError> {
        match self.db.game_placement(game_id).await? {
            Placement::Active {
                remote_address,
                port,
            } => ready(remote_address, port),
            Placement::Provisioning { kickoff_time, .. }
                if unix_timestamp() - kickoff_time < self.stale_secs() =>
            {
                Ok(ServerInfo::Loading)
            }
            Placement::Provisioning { machine_id, .. } => {
                warn!(game_id, machine_id, "Provisioning went stale");
                self.reprovision(game_id).await
            }
            Placement::Requested => self.reprovision(game_id).await,
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    const fn stale_secs(&self) -> i64 {
        self.config.provision_stale_secs as i64
    }

    async fn reprovision(&self, game_id: i64) -> Result<ServerInfo, SchedulerError> {
        let stale_before = unix_timestamp() - self.stale_secs();
        match self
            .db
            .reserve_existing_game(game_id, stale_before, self.live_since())
            .await?
        {
            Reprovision::Reserved(reservation) => {
                let machine_id = reservation.machine.machine_id;
                if let Err(e) = self.launch(&reservation).await {
                    if let Err(cleanup) = self.db.cancel_provisioning(game_id, machine_id).await {
                        warn!(
                            game_id,
                            machine_id,
                            error = %cleanup,
                            "Provisioning record left behind"
                        );
                    }
                    return Err(e);
                }
                info!(game_id, machine_id, "Game reprovisioning");
                Ok(ServerInfo::Loading)
            }
            Reprovision::NoMachine => Err(SchedulerError::NoAvailableMachines),
            Reprovision::Superseded => match self.db.game_placement(game_id).await? {
                Placement::Active {
                    remote_address,
                    port,
                } => ready(remote_address, port),
                _ => Ok(ServerInfo::Loading),
            },
        }
    }

    pub async fn list_games(&self) -> Result<Vec<Game>, SchedulerError> {
        let games = self.db.list_games().await?;
        Ok(games.into_iter().map(Game::from).collect())
    }
}

fn ready(remote_address: String, port: i64) -> Result<ServerInfo, SchedulerError> {
    let listen_port = u16::try_from(port)
        .map_err(|_| SchedulerError::Database(DatabaseError::Query(format!("bad port {port}"))))?;
    Ok(ServerInfo::Ready {
        remote_address,
        listen_port,
    })
}
