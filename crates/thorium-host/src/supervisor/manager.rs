//! Game server process lifecycle manager.
//!
//! Launches game server executables on consecutive local ports, keeps them in
//! launch order and stops them gracefully.

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thorium_core::wire::NewGameServer;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Configuration for launching game servers.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Path to the game server executable.
    pub binary: PathBuf,
    /// First port handed to a game server.
    pub base_port: u16,
    /// Port of this host's own HTTP service, passed to every game server.
    pub service_port: u16,
    /// Maximum concurrently running game servers.
    pub max_processes: usize,
    /// Directory receiving one log file per game.
    pub log_dir: PathBuf,
    /// Timeout for graceful termination before kill.
    pub terminate_timeout: Duration,
}

/// Snapshot of one supervised game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    #[serde(rename = "gameId")]
    pub game_id: i64,
    pub map: String,
    pub mode: String,
    #[serde(rename = "minimumLevel")]
    pub minimum_level: i64,
    #[serde(rename = "maxPlayers")]
    pub max_players: i64,
    #[serde(rename = "listenPort")]
    pub listen_port: u16,
    pub pid: Option<u32>,
    pub running: bool,
}

struct GameProcess {
    child: Child,
    game_id: i64,
    map: String,
    mode: String,
    minimum_level: i64,
    max_players: i64,
    listen_port: u16,
}

impl GameProcess {
    fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn info(&mut self) -> ProcessInfo {
        ProcessInfo {
            game_id: self.game_id,
            map: self.map.clone(),
            mode: self.mode.clone(),
            minimum_level: self.minimum_level,
            max_players: self.max_players,
            listen_port: self.listen_port,
            pid: self.child.id(),
            running: self.is_running(),
        }
    }
}

/// Launches and tracks the game servers of this machine.
#[derive(Clone)]
pub struct ProcessSupervisor {
    /// Tracked processes in launch order.
    processes: Arc<Mutex<Vec<GameProcess>>>,
    config: Arc<SupervisorConfig>,
}

impl ProcessSupervisor {
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            processes: Arc::new(Mutex::new(Vec::new())),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Launch a game server for `req.game_id`, returning its listen port.
    ///
    /// A game whose process is still running keeps its port and is not
    /// started twice. Exited processes are forgotten before the port and
    /// capacity checks.
    #[allow(clippy::significant_drop_tightening)]
    pub async fn launch(&self, req: &NewGameServer) -> Result<u16, SupervisorError> {
        let mut processes = self.processes.lock().await;

        if let Some(existing) = processes.iter_mut().find(|p| p.game_id == req.game_id)
            && existing.is_running()
        {
            debug!(
                game_id = req.game_id,
                port = existing.listen_port,
                "Game server already running"
            );
            return Ok(existing.listen_port);
        }
        processes.retain_mut(|p| {
            let running = p.is_running();
            if !running {
                info!(game_id = p.game_id, port = p.listen_port, "Reaped exited game server");
            }
            running
        });

        if processes.len() >= self.config.max_processes {
            return Err(SupervisorError::CapacityExhausted {
                current: processes.len(),
                max: self.config.max_processes,
            });
        }
        let port = (self.config.base_port..=u16::MAX)
            .find(|port| processes.iter().all(|p| p.listen_port != *port))
            .ok_or(SupervisorError::PortsExhausted)?;

        let child = self.spawn(req, port)?;
        info!(
            game_id = req.game_id,
            port,
            pid = ?child.id(),
            map = %req.map,
            mode = %req.mode,
            "Launched game server"
        );

        processes.push(GameProcess {
            child,
            game_id: req.game_id,
            map: req.map.clone(),
            mode: req.mode.clone(),
            minimum_level: req.minimum_level,
            max_players: req.max_players,
            listen_port: port,
        });
        Ok(port)
    }

    fn spawn(&self, req: &NewGameServer, port: u16) -> Result<Child, SupervisorError> {
        std::fs::create_dir_all(&self.config.log_dir).map_err(|e| SupervisorError::Log {
            path: self.config.log_dir.clone(),
            reason: e.to_string(),
        })?;
        let log_path = self
            .config
            .log_dir
            .join(format!("gameserver-{}.log", req.game_id));
        let log_error = |e: std::io::Error| SupervisorError::Log {
            path: log_path.clone(),
            reason: e.to_string(),
        };
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .map_err(log_error)?;
        let stderr = stdout.try_clone().map_err(log_error)?;

        Command::new(&self.config.binary)
            .arg("-key")
            .arg(&req.machine_key)
            .arg("-id")
            .arg(req.game_id.to_string())
            .arg("-listen")
            .arg(port.to_string())
            .arg("-service")
            .arg(self.config.service_port.to_string())
            .arg("-map")
            .arg(&req.map)
            .arg("-mode")
            .arg(&req.mode)
            .arg("-minlvl")
            .arg(req.minimum_level.to_string())
            .arg("-maxplayers")
            .arg(req.max_players.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::SpawnFailed {
                reason: format!("{}: {e}", self.config.binary.display()),
            })
    }

    /// Stop a game server gracefully, killing it after the grace period.
    pub async fn terminate(&self, game_id: i64) -> Result<(), SupervisorError> {
        let process = {
            let mut processes = self.processes.lock().await;
            let pos = processes
                .iter()
                .position(|p| p.game_id == game_id)
                .ok_or(SupervisorError::GameNotFound { game_id })?;
            processes.remove(pos)
        };
        self.stop(process).await;
        Ok(())
    }

    /// Stop every supervised game server.
    pub async fn terminate_all(&self) {
        let processes = std::mem::take(&mut *self.processes.lock().await);
        for process in processes {
            self.stop(process).await;
        }
    }

    async fn stop(&self, mut process: GameProcess) {
        let game_id = process.game_id;
        debug!(game_id, port = process.listen_port, "Terminating game server");

        #[cfg(unix)]
        {
            if let Some(pid) = process.child.id() {
                // SAFETY: pid comes from our own Child handle, which has not
                // been reaped yet, so it still names that process.
                #[allow(unsafe_code)]
                #[allow(clippy::cast_possible_wrap)]
                let ret = unsafe { libc::kill(pid as i32, libc::SIGINT) };
                if ret != 0 {
                    let err = std::io::Error::last_os_error();
                    warn!(game_id, pid, error = %err, "Failed to send SIGINT");
                }
            }
        }

        match tokio::time::timeout(self.config.terminate_timeout, process.child.wait()).await {
            Ok(Ok(status)) => {
                info!(game_id, ?status, "Game server exited");
            }
            Ok(Err(e)) => {
                warn!(game_id, error = %e, "Error waiting for game server");
                process.child.kill().await.ok();
            }
            Err(_) => {
                warn!(game_id, "Timeout waiting for graceful shutdown, killing");
                process.child.kill().await.ok();
            }
        }
    }

    /// Snapshot of every tracked game server in launch order.
    pub async fn list(&self) -> Vec<ProcessInfo> {
        self.processes
            .lock()
            .await
            .iter_mut()
            .map(GameProcess::info)
            .collect()
    }

    /// Number of game servers still running.
    pub async fn running_count(&self) -> usize {
        self.processes
            .lock()
            .await
            .iter_mut()
            .map(GameProcess::is_running)
            .filter(|running| *running)
            .count()
    }

    /// Share of capacity in use, 0 to 100.
    #[allow(clippy::cast_precision_loss)]
    pub async fn capacity_pct(&self) -> f64 {
        if self.config.max_processes == 0 {
            return 100.0;
        }
        self.running_count().await as f64 * 100.0 / self.config.max_processes as f64
    }
}

/// Errors from supervisor operations.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("Game server capacity exhausted ({current}/{max})")]
    CapacityExhausted { current: usize, max: usize },

    #[error("No free listen port")]
    PortsExhausted,

    #[error("Failed to spawn game server: {reason}")]
    SpawnFailed { reason: String },

    #[error("Failed to open log {}: {reason}", path.display())]
    Log { path: PathBuf, reason: String },

    #[error("No game server for game {game_id}")]
    GameNotFound { game_id: i64 },
}

#[cfg(all(test, unix))]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    use super::*;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn supervisor(dir: &Path, binary: PathBuf, max_processes: usize) -> ProcessSupervisor {
        ProcessSupervisor::new(SupervisorConfig {
            binary,
            base_port: 41000,
            service_port: 6961,
            max_processes,
            log_dir: dir.join("logs"),
            terminate_timeout: Duration::from_secs(2),
        })
    }

    fn long_running(dir: &Path, max_processes: usize) -> ProcessSupervisor {
        let binary = script(dir, "gameserver", "echo \"$@\"\nexec sleep 30");
        supervisor(dir, binary, max_processes)
    }

    fn request(game_id: i64) -> NewGameServer {
        NewGameServer {
            game_id,
            map: "mp_sandbox".into(),
            mode: "tutorial".into(),
            minimum_level: 1,
            max_players: 16,
            machine_key: "key-1".into(),
        }
    }

    async fn wait_until_exited(sup: &ProcessSupervisor, game_id: i64) {
        for _ in 0..100 {
            let list = sup.list().await;
            if list.iter().any(|p| p.game_id == game_id && !p.running) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("game server {game_id} never exited");
    }

    #[tokio::test]
    async fn launch_allocates_consecutive_ports() {
        let dir = tempfile::tempdir().unwrap();
        let sup = long_running(dir.path(), 4);

        assert_eq!(sup.launch(&request(1)).await.unwrap(), 41000);
        assert_eq!(sup.launch(&request(2)).await.unwrap(), 41001);

        let list = sup.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].game_id, 1);
        assert_eq!(list[1].listen_port, 41001);
        assert!(list.iter().all(|p| p.running));

        sup.terminate_all().await;
        assert!(sup.list().await.is_empty());
    }

    #[tokio::test]
    async fn launch_passes_arguments_and_logs_output() {
        let dir = tempfile::tempdir().unwrap();
        let sup = long_running(dir.path(), 4);
        sup.launch(&request(7)).await.unwrap();

        let log_path = dir.path().join("logs").join("gameserver-7.log");
        let mut contents = String::new();
        for _ in 0..100 {
            contents = std::fs::read_to_string(&log_path).unwrap_or_default();
            if !contents.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(
            contents.trim(),
            "-key key-1 -id 7 -listen 41000 -service 6961 -map mp_sandbox -mode tutorial -minlvl 1 -maxplayers 16"
        );

        sup.terminate_all().await;
    }

    #[tokio::test]
    async fn relaunch_of_running_game_reuses_process() {
        let dir = tempfile::tempdir().unwrap();
        let sup = long_running(dir.path(), 4);

        let first = sup.launch(&request(3)).await.unwrap();
        let pid = sup.list().await[0].pid;
        let second = sup.launch(&request(3)).await.unwrap();

        assert_eq!(first, second);
        let list = sup.list().await;
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].pid, pid);

        sup.terminate_all().await;
    }

    #[tokio::test]
    async fn exited_game_is_restarted() {
        let dir = tempfile::tempdir().unwrap();
        let binary = script(dir.path(), "gameserver", "exit 0");
        let sup = supervisor(dir.path(), binary, 4);

        sup.launch(&request(5)).await.unwrap();
        wait_until_exited(&sup, 5).await;

        let port = sup.launch(&request(5)).await.unwrap();
        assert_eq!(port, 41000);
        assert_eq!(sup.list().await.len(), 1);
    }

    #[tokio::test]
    async fn capacity_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let sup = long_running(dir.path(), 1);

        sup.launch(&request(1)).await.unwrap();
        let err = sup.launch(&request(2)).await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::CapacityExhausted { current: 1, max: 1 }
        ));
        assert!((sup.capacity_pct().await - 100.0).abs() < f64::EPSILON);

        sup.terminate_all().await;
    }

    #[tokio::test]
    async fn missing_binary_leaves_no_entry() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(dir.path(), dir.path().join("does-not-exist"), 4);

        let err = sup.launch(&request(1)).await.unwrap_err();
        assert!(matches!(err, SupervisorError::SpawnFailed { .. }));
        assert!(sup.list().await.is_empty());
    }

    #[tokio::test]
    async fn terminate_frees_port() {
        let dir = tempfile::tempdir().unwrap();
        let sup = long_running(dir.path(), 4);

        sup.launch(&request(1)).await.unwrap();
        sup.launch(&request(2)).await.unwrap();
        sup.terminate(1).await.unwrap();

        assert_eq!(sup.launch(&request(3)).await.unwrap(), 41000);
        assert_eq!(sup.running_count().await, 2);

        sup.terminate_all().await;
    }

    #[tokio::test]
    async fn terminate_unknown_game_fails() {
        let dir = tempfile::tempdir().unwrap();
        let sup = long_running(dir.path(), 4);
        assert!(matches!(
            sup.terminate(99).await,
            Err(SupervisorError::GameNotFound { game_id: 99 })
        ));
    }
}
