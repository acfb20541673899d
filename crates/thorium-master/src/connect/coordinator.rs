//! Player admission and departure, called by game servers through their host.

use std::sync::Arc;

use thorium_core::db::DatabaseError;
use thorium_core::model::Character;
use tracing::{info, warn};

use crate::auth::TokenAuthority;
use crate::registry::{MachineRegistry, RegistryError};
use crate::session::SessionStore;
use crate::storage::{Admission, HostedWrite, MasterDatabase};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Invalid machine credential")]
    InvalidMachineCredential,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Game not found")]
    GameNotFound,

    #[error("Character not found")]
    CharacterNotFound,

    #[error("Game Full")]
    GameFull,

    #[error("Player not in game")]
    NotSeated,

    #[error("Corrupt character snapshot: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<RegistryError> for ConnectError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidCredential | RegistryError::Token(_) => {
                Self::InvalidMachineCredential
            }
            RegistryError::Database(e) => Self::Database(e),
        }
    }
}

#[derive(Clone)]
pub struct PlayerConnectCoordinator {
    db: MasterDatabase,
    registry: MachineRegistry,
    sessions: SessionStore,
    tokens: Arc<TokenAuthority>,
}

impl PlayerConnectCoordinator {
    pub const fn new(
        db: MasterDatabase,
        registry: MachineRegistry,
        sessions: SessionStore,
        tokens: Arc<TokenAuthority>,
    ) -> Self {
        Self {
            db,
            registry,
            sessions,
            tokens,
        }
    }

    /// Admit a player's character into a game.
    ///
    /// Checks run in a fixed order: machine key, session key, capacity,
    /// character ownership. Nothing about the game is looked up for an
    /// unrecognised machine.
    pub async fn connect(
        &self,
        machine_key: &str,
        game_id: i64,
        session_key: &str,
        character_id: i64,
    ) -> Result<Character, ConnectError> {
        let machine_id = self.registry.validate(machine_key).await?;
        let uid = self
            .sessions
            .validate(&self.tokens, session_key)
            .await
            .map_err(|_| ConnectError::InvalidSession)?;

        let row = match self
            .db
            .admit_player(game_id, machine_id, uid, character_id)
            .await?
        {
            Admission::Admitted(row) => row,
            Admission::GameFull => return Err(ConnectError::GameFull),
            Admission::GameNotFound => return Err(ConnectError::GameNotFound),
            Admission::CharacterNotFound => return Err(ConnectError::CharacterNotFound),
        };

        info!(game_id, machine_id, uid, character_id, "Player connected");
        row.into_character()
            .map_err(|e| ConnectError::Snapshot(e.to_string()))
    }

    /// Save a departing player's snapshot and free their slot.
    ///
    /// A bad machine key, or a machine that does not host the game, is
    /// rejected and the snapshot is not written. Each seat is freed once.
    pub async fn disconnect(
        &self,
        machine_key: &str,
        game_id: i64,
        snapshot: &Character,
    ) -> Result<(), ConnectError> {
        let character_id = snapshot.character_id;
        let machine_id = self.registry.validate(machine_key).await.map_err(|e| {
            warn!(
                game_id,
                character_id,
                "Disconnect with bad machine key, snapshot not saved"
            );
            ConnectError::from(e)
        })?;

        match self
            .db
            .record_disconnect(game_id, machine_id, snapshot)
            .await?
        {
            HostedWrite::Saved => {}
            HostedWrite::ForeignMachine => {
                warn!(
                    game_id,
                    machine_id,
                    character_id,
                    "Disconnect from a machine not hosting the game, snapshot not saved"
                );
                return Err(ConnectError::InvalidMachineCredential);
            }
            HostedWrite::NotSeated => return Err(ConnectError::NotSeated),
        }
        self.refresh_session(snapshot).await;

        info!(game_id, machine_id, character_id, "Player disconnected");
        Ok(())
    }

    /// Read a character on behalf of a machine.
    pub async fn get_character(
        &self,
        machine_key: &str,
        character_id: i64,
    ) -> Result<Character, ConnectError> {
        self.registry.validate(machine_key).await?;
        let row = match self.db.get_character(character_id).await {
            Ok(row) => row,
            Err(DatabaseError::NotFound(_)) => return Err(ConnectError::CharacterNotFound),
            Err(e) => return Err(e.into()),
        };
        row.into_character()
            .map_err(|e| ConnectError::Snapshot(e.to_string()))
    }

    /// Overwrite a character's stored snapshot on behalf of the machine
    /// hosting the character's last game.
    pub async fn update_character(
        &self,
        machine_key: &str,
        snapshot: &Character,
    ) -> Result<(), ConnectError> {
        let machine_id = self.registry.validate(machine_key).await?;
        match self.db.save_hosted_character(machine_id, snapshot).await {
            Ok(HostedWrite::Saved) => {}
            Ok(HostedWrite::ForeignMachine | HostedWrite::NotSeated) => {
                warn!(
                    machine_id,
                    character_id = snapshot.character_id,
                    "Character update from a machine not hosting it"
                );
                return Err(ConnectError::InvalidMachineCredential);
            }
            Err(DatabaseError::NotFound(_)) => return Err(ConnectError::CharacterNotFound),
            Err(e) => return Err(e.into()),
        }
        self.refresh_session(snapshot).await;
        Ok(())
    }

    /// Keep the owner's session copy in step with the durable store.
    async fn refresh_session(&self, snapshot: &Character) {
        let uid = match self.db.get_character(snapshot.character_id).await {
            Ok(row) => row.uid,
            Err(e) => {
                warn!(character_id = snapshot.character_id, error = %e, "Owner lookup failed");
                return;
            }
        };
        if let Err(e) = self.sessions.refresh_snapshot(uid, snapshot).await {
            warn!(uid, error = %e, "Session snapshot refresh failed");
        }
    }
}
