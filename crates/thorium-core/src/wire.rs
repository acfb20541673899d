//! JSON request and response bodies exchanged over HTTP.
//!
//! Field names are part of the protocol spoken by clients, hosts and game
//! servers and must not change.

use serde::{Deserialize, Serialize};

use crate::model::Character;

// =========================================================================
// Clients
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authentication {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "characters")]
    pub character_ids: Vec<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCharacter {
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    pub name: String,
    #[serde(rename = "classId")]
    pub class_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCharacterResponse {
    #[serde(rename = "characterId")]
    pub character_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectCharacter {
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "characterId")]
    pub character_id: i64,
}

// =========================================================================
// Games
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNewGame {
    #[serde(rename = "sessionKey", default)]
    pub session_key: String,
    #[serde(default)]
    pub map: String,
    #[serde(rename = "gameMode", alias = "mode", default)]
    pub game_mode: String,
    #[serde(rename = "minimumLevel", default)]
    pub minimum_level: i64,
    #[serde(rename = "maxPlayers", default)]
    pub max_players: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNewGameResponse {
    #[serde(rename = "gameId")]
    pub game_id: i64,
}

/// Launch request sent by the master to a host's supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGameServer {
    #[serde(rename = "gameId")]
    pub game_id: i64,
    pub map: String,
    pub mode: String,
    #[serde(rename = "minimumLevel")]
    pub minimum_level: i64,
    #[serde(rename = "maxPlayers")]
    pub max_players: i64,
    /// The target machine's own key, echoed back on confirmation.
    #[serde(rename = "machineKey")]
    pub machine_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGameServerResponse {
    #[serde(rename = "machineKey")]
    pub machine_key: String,
    #[serde(rename = "listenPort")]
    pub listen_port: u16,
}

/// Provisioning confirmation, sent once a game server is listening.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterGameServer {
    #[serde(rename = "machineKey")]
    pub machine_key: String,
    #[serde(rename = "gameId")]
    pub game_id: i64,
    #[serde(rename = "gameListenPort", alias = "listenPort", default)]
    pub listen_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfoResponse {
    #[serde(rename = "remoteAddress")]
    pub remote_address: String,
    #[serde(rename = "listenPort")]
    pub listen_port: u16,
}

// =========================================================================
// Machines
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterMachine {
    #[serde(rename = "serviceListenPort", default)]
    pub service_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRegisterResponse {
    #[serde(rename = "machineId")]
    pub machine_id: i64,
    #[serde(rename = "machineKey")]
    pub machine_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnregisterMachine {
    #[serde(rename = "machineKey")]
    pub machine_key: String,
}

/// Heartbeat body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineStatus {
    #[serde(rename = "machineToken", alias = "machineKey", default)]
    pub machine_key: String,
    #[serde(rename = "cpuUsagePct", default)]
    pub cpu_usage_pct: f64,
    #[serde(rename = "networkUsagePct", default)]
    pub network_usage_pct: f64,
    #[serde(rename = "playerCapacityPct", default)]
    pub player_capacity_pct: f64,
}

// =========================================================================
// Game servers
// =========================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConnect {
    #[serde(rename = "gameId")]
    pub game_id: i64,
    #[serde(rename = "machineKey")]
    pub machine_key: String,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "characterId")]
    pub character_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerConnectResponse {
    pub character: Character,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerDisconnect {
    #[serde(rename = "gameId")]
    pub game_id: i64,
    #[serde(rename = "machineKey")]
    pub machine_key: String,
    pub snapshot: Character,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateCharacter {
    #[serde(rename = "machineKey")]
    pub machine_key: String,
    pub snapshot: Character,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCharacter {
    #[serde(rename = "machineKey")]
    pub machine_key: String,
    #[serde(rename = "characterId")]
    pub character_id: i64,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_accepts_machine_token_field() {
        let status: MachineStatus = serde_json::from_str(
            r#"{"machineToken":"k","cpuUsagePct":12.5,"networkUsagePct":1.0,"playerCapacityPct":50.0}"#,
        )
        .unwrap();
        assert_eq!(status.machine_key, "k");
        assert!((status.cpu_usage_pct - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn create_game_accepts_mode_alias() {
        let req: CreateNewGame =
            serde_json::from_str(r#"{"map":"mp_sandbox","mode":"tutorial","maxPlayers":16}"#)
                .unwrap();
        assert_eq!(req.game_mode, "tutorial");
        assert_eq!(req.minimum_level, 0);
    }

    #[test]
    fn register_server_accepts_both_port_names() {
        let a: RegisterGameServer =
            serde_json::from_str(r#"{"machineKey":"k","gameId":1,"gameListenPort":10100}"#)
                .unwrap();
        let b: RegisterGameServer =
            serde_json::from_str(r#"{"machineKey":"k","gameId":1,"listenPort":10100}"#).unwrap();
        assert_eq!(a.listen_port, 10100);
        assert_eq!(b.listen_port, 10100);
    }

    #[test]
    fn login_response_field_names() {
        let json = serde_json::to_value(LoginResponse {
            session_key: "s".into(),
            character_ids: vec![1, 2],
        })
        .unwrap();
        assert_eq!(json["sessionKey"], "s");
        assert_eq!(json["characters"], serde_json::json!([1, 2]));
    }
}
