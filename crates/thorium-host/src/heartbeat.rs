//! Periodic machine status reports to the master.

use std::time::{Duration, Instant};

use sysinfo::{Networks, System};
use thorium_core::wire::MachineStatus;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::master::MasterClient;
use crate::supervisor::ProcessSupervisor;

/// Spawn a task that reports this machine's load every `interval` until
/// `shutdown` changes.
///
/// A failed report is logged and dropped; the next tick sends a fresh one.
pub fn spawn_heartbeat_task(
    master: MasterClient,
    machine_key: String,
    supervisor: ProcessSupervisor,
    mut sampler: LoadSampler,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.tick().await; // Skip first immediate tick

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let load = sampler.sample();
                    let status = MachineStatus {
                        machine_key: machine_key.clone(),
                        cpu_usage_pct: load.cpu_usage_pct,
                        network_usage_pct: load.network_usage_pct,
                        player_capacity_pct: supervisor.capacity_pct().await,
                    };
                    match master.heartbeat(&status).await {
                        Ok(()) => debug!(
                            cpu = status.cpu_usage_pct,
                            network = status.network_usage_pct,
                            "Heartbeat sent"
                        ),
                        Err(e) => warn!(error = %e, "Heartbeat failed"),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Heartbeat task shutting down");
                    return;
                }
            }
        }
    })
}

/// Machine load since the previous sample, each value 0 to 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Load {
    pub cpu_usage_pct: f64,
    pub network_usage_pct: f64,
}

/// Samples CPU and network usage as deltas between successive calls.
pub struct LoadSampler {
    system: System,
    networks: Networks,
    capacity_bytes_per_sec: f64,
    last_sample: Instant,
}

impl LoadSampler {
    /// `capacity_mbps` is the link speed network usage is measured against.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(capacity_mbps: u64) -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            capacity_bytes_per_sec: capacity_mbps as f64 * 1_000_000.0 / 8.0,
            last_sample: Instant::now(),
        }
    }

    pub fn sample(&mut self) -> Load {
        self.system.refresh_cpu_usage();
        self.networks.refresh(true);

        let now = Instant::now();
        let elapsed = now.duration_since(self.last_sample);
        self.last_sample = now;

        let mut bytes = 0_u64;
        for (_interface, data) in &self.networks {
            bytes = bytes
                .saturating_add(data.received())
                .saturating_add(data.transmitted());
        }

        Load {
            cpu_usage_pct: f64::from(self.system.global_cpu_usage()).clamp(0.0, 100.0),
            network_usage_pct: utilization_pct(bytes, elapsed, self.capacity_bytes_per_sec),
        }
    }
}

/// Throughput of `bytes` over `elapsed` as a share of `capacity_bytes_per_sec`.
#[allow(clippy::cast_precision_loss)]
fn utilization_pct(bytes: u64, elapsed: Duration, capacity_bytes_per_sec: f64) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 || capacity_bytes_per_sec <= 0.0 {
        return 0.0;
    }
    (bytes as f64 / secs / capacity_bytes_per_sec * 100.0).clamp(0.0, 100.0)
}
