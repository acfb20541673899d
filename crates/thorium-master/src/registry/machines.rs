//! Registry of worker machines and their rotating credentials.

use std::sync::Arc;

use thorium_core::db::DatabaseError;
use tracing::{info, warn};

use crate::auth::{Subject, TokenAuthority, TokenError};
use crate::storage::{Machine, MasterDatabase};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid machine credential")]
    InvalidCredential,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Owns the machine table. Scheduling only reads from it.
#[derive(Clone)]
pub struct MachineRegistry {
    db: MasterDatabase,
    tokens: Arc<TokenAuthority>,
}

impl MachineRegistry {
    pub const fn new(db: MasterDatabase, tokens: Arc<TokenAuthority>) -> Self {
        Self { db, tokens }
    }

    /// Register a machine under a fresh id and credential.
    ///
    /// Repeat registrations from the same address are new machines; the old
    /// row stays until it is unregistered.
    pub async fn register(
        &self,
        remote_address: &str,
        service_port: u16,
    ) -> Result<(i64, String), RegistryError> {
        let (machine_id, key) = self
            .db
            .insert_machine(remote_address, service_port, |machine_id| {
                self.tokens
                    .issue(Subject::Machine { machine_id })
                    .map_err(RegistryError::from)
            })
            .await?;

        info!(machine_id, remote_address, service_port, "Machine registered");
        Ok((machine_id, key))
    }

    pub async fn unregister(&self, machine_key: &str) -> Result<(), RegistryError> {
        let machine_id = self.validate(machine_key).await?;
        self.db.delete_machine(machine_id).await?;
        info!(machine_id, "Machine unregistered");
        Ok(())
    }

    /// Store a liveness report from the machine holding `machine_key`.
    pub async fn heartbeat(
        &self,
        machine_key: &str,
        cpu_usage_pct: f64,
        network_usage_pct: f64,
        player_capacity_pct: f64,
    ) -> Result<(), RegistryError> {
        let machine_id = self.validate(machine_key).await?;
        self.db
            .record_heartbeat(
                machine_id,
                cpu_usage_pct,
                network_usage_pct,
                player_capacity_pct,
            )
            .await?;
        Ok(())
    }

    /// All machines in registration order.
    pub async fn list(&self) -> Result<Vec<Machine>, RegistryError> {
        Ok(self.db.list_machines().await?)
    }

    /// Resolve a machine key to its machine id.
    ///
    /// The key must verify as a machine token and be the latest key issued
    /// to that machine.
    pub async fn validate(&self, machine_key: &str) -> Result<i64, RegistryError> {
        let machine_id = self.tokens.verify_machine(machine_key).map_err(|e| {
            warn!(error = %e, "Rejected machine key");
            RegistryError::InvalidCredential
        })?;

        let machine = match self.db.get_machine(machine_id).await {
            Ok(machine) => machine,
            Err(DatabaseError::NotFound(_)) => {
                warn!(machine_id, "Machine key for unknown machine");
                return Err(RegistryError::InvalidCredential);
            }
            Err(e) => return Err(e.into()),
        };

        if machine.machine_key != machine_key {
            warn!(machine_id, "Machine key was rotated out");
            return Err(RegistryError::InvalidCredential);
        }
        Ok(machine_id)
    }
}
