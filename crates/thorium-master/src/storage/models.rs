//! Row types for the master's tables.

use serde::{Deserialize, Serialize};
use thorium_core::model::{Character, CharacterState, Game};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub user_id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64,
    pub last_login: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CharacterRow {
    pub id: i64,
    pub uid: i64,
    pub name: String,
    pub last_game_id: Option<i64>,
    pub game_data: String,
}

impl CharacterRow {
    /// Decode the stored state blob into a [`Character`].
    pub fn into_character(self) -> thorium_core::Result<Character> {
        let state = CharacterState::from_blob(&self.game_data)?;
        Ok(Character {
            character_id: self.id,
            name: self.name,
            last_game_id: self.last_game_id,
            state,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Machine {
    pub machine_id: i64,
    pub remote_address: String,
    pub service_listen_port: i64,
    pub machine_key: String,
    pub registered_at: i64,
    pub cpu_usage_pct: f64,
    pub network_usage_pct: f64,
    pub player_capacity_pct: f64,
    pub last_heartbeat: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameRow {
    pub game_id: i64,
    pub map_name: String,
    pub game_mode: String,
    pub minimum_level: i64,
    pub player_count: i64,
    pub maximum_players: i64,
    pub created_at: i64,
}

impl From<GameRow> for Game {
    fn from(row: GameRow) -> Self {
        Self {
            game_id: row.game_id,
            map: row.map_name,
            mode: row.game_mode,
            minimum_level: row.minimum_level,
            player_count: row.player_count,
            max_players: row.maximum_players,
        }
    }
}

/// Parameters for a new game row.
#[derive(Debug, Clone, Copy)]
pub struct NewGame<'a> {
    pub map: &'a str,
    pub mode: &'a str,
    pub minimum_level: i64,
    pub max_players: i64,
}

/// A game that has just been assigned to a machine.
#[derive(Debug, Clone)]
pub struct Reservation {
    pub game: GameRow,
    pub machine: Machine,
}

/// Where a game currently stands in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// No machine assigned.
    Requested,
    /// Assigned to `machine_id`, waiting for confirmation since `kickoff_time`.
    Provisioning { machine_id: i64, kickoff_time: i64 },
    /// Confirmed and reachable.
    Active { remote_address: String, port: i64 },
}

/// Result of trying to admit a player into a game.
#[derive(Debug, Clone)]
pub enum Admission {
    Admitted(CharacterRow),
    GameFull,
    /// The game does not exist or is not hosted by the calling machine.
    GameNotFound,
    CharacterNotFound,
}

/// Result of a machine writing back a character it hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostedWrite {
    Saved,
    /// The game is not hosted by the calling machine. Nothing was written.
    ForeignMachine,
    /// The character is not seated in the game. Nothing was written.
    NotSeated,
}

/// Result of re-provisioning a game that is not active.
#[derive(Debug, Clone)]
pub enum Reprovision {
    Reserved(Reservation),
    /// No live machine could take the game. Any stale record was cleared.
    NoMachine,
    /// The game gained a live provisioning or active record meanwhile.
    Superseded,
}
