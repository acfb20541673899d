//! Domain model shared by the master, hosts and game servers.
//!
//! The character state is treated as an opaque blob by the orchestration
//! layer: it is stored as JSON text and round-tripped unchanged between the
//! durable store, sessions and game servers.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(rename = "itemId")]
    pub item_id: i64,
    pub stacks: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vital {
    pub current: f64,
    pub max: f64,
    #[serde(rename = "regenRate")]
    pub regen_rate: f64,
}

/// Mutable game state of a character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterState {
    pub class_id: i64,
    pub base_mesh_id: i64,
    pub position: Vector3,
    pub alive: bool,
    pub health: Vital,
    pub power: Vital,
    pub base_movespeed: f64,
    /// Index into `weapons`, or -1 when nothing is equipped.
    pub selected_weapon: i64,
    pub weapons: Vec<i64>,
    pub inventory: Vec<Item>,
}

impl Default for CharacterState {
    fn default() -> Self {
        Self {
            class_id: 0,
            base_mesh_id: 0,
            position: Vector3::default(),
            alive: false,
            health: Vital::default(),
            power: Vital::default(),
            base_movespeed: 0.0,
            selected_weapon: -1,
            weapons: Vec::new(),
            inventory: Vec::new(),
        }
    }
}

impl CharacterState {
    /// Starting state for a freshly created character of the given class.
    pub fn for_class(class_id: i64) -> Self {
        Self {
            class_id,
            base_mesh_id: 1,
            alive: true,
            health: Vital {
                current: 100.0,
                max: 100.0,
                regen_rate: 10.0,
            },
            power: Vital {
                current: 100.0,
                max: 100.0,
                regen_rate: 30.0,
            },
            base_movespeed: 8.0,
            weapons: vec![1],
            selected_weapon: 0,
            ..Self::default()
        }
    }

    /// Encode as the text blob kept in the durable store.
    pub fn to_blob(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Snapshot(e.to_string()))
    }

    /// Decode a blob previously produced by [`CharacterState::to_blob`].
    pub fn from_blob(blob: &str) -> Result<Self> {
        serde_json::from_str(blob).map_err(|e| Error::Snapshot(e.to_string()))
    }
}

/// A character together with its current state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Character {
    #[serde(rename = "characterId")]
    pub character_id: i64,
    pub name: String,
    /// Game the character was last active in, used to resume after reconnect.
    #[serde(rename = "lastGameId", default)]
    pub last_game_id: Option<i64>,
    #[serde(rename = "characterState")]
    pub state: CharacterState,
}

/// Public description of a game instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    #[serde(rename = "gameId")]
    pub game_id: i64,
    pub map: String,
    pub mode: String,
    #[serde(rename = "minimumLevel")]
    pub minimum_level: i64,
    #[serde(rename = "playerCount")]
    pub player_count: i64,
    #[serde(rename = "maxPlayers")]
    pub max_players: i64,
}
