//! Account, character and machine queries for the Thorium master.

use thorium_core::db::{DatabaseError, unix_timestamp};
use thorium_core::model::{Character, CharacterState};

use super::db::MasterDatabase;
use super::models::{Account, CharacterRow, Machine};

pub(super) fn snapshot_blob(state: &CharacterState) -> Result<String, DatabaseError> {
    state
        .to_blob()
        .map_err(|e| DatabaseError::Query(e.to_string()))
}

impl MasterDatabase {
    // =========================================================================
    // Account queries
    // =========================================================================

    /// Create an account. A taken username yields [`DatabaseError::Conflict`].
    pub async fn create_account(
        &self,
        username: &str,
        password_hash: &str,
    ) -> Result<Account, DatabaseError> {
        let now = unix_timestamp();

        let result = sqlx::query(
            "INSERT INTO accounts (username, password_hash, created_at, last_login) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_account(result.last_insert_rowid()).await
    }

    pub async fn get_account(&self, user_id: i64) -> Result<Account, DatabaseError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Account {user_id}")))
    }

    /// Look up an account by username, ignoring case.
    pub async fn get_account_by_username(&self, username: &str) -> Result<Account, DatabaseError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE username = ?")
            .bind(username)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Account {username}")))
    }

    pub async fn touch_last_login(&self, user_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE accounts SET last_login = ? WHERE user_id = ?")
            .bind(unix_timestamp())
            .bind(user_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Character queries
    // =========================================================================

    /// Create a character owned by `uid`, returning its id.
    pub async fn create_character(
        &self,
        uid: i64,
        name: &str,
        state: &CharacterState,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query("INSERT INTO characters (uid, name, game_data) VALUES (?, ?, ?)")
            .bind(uid)
            .bind(name)
            .bind(snapshot_blob(state)?)
            .execute(self.pool())
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Ids of every character owned by `uid`, oldest first.
    pub async fn character_ids(&self, uid: i64) -> Result<Vec<i64>, DatabaseError> {
        let ids =
            sqlx::query_scalar::<_, i64>("SELECT id FROM characters WHERE uid = ? ORDER BY id")
                .bind(uid)
                .fetch_all(self.pool())
                .await?;

        Ok(ids)
    }

    pub async fn get_character(&self, id: i64) -> Result<CharacterRow, DatabaseError> {
        sqlx::query_as::<_, CharacterRow>("SELECT * FROM characters WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Character {id}")))
    }

    /// Fetch a character only if it belongs to `uid`.
    pub async fn get_owned_character(
        &self,
        uid: i64,
        id: i64,
    ) -> Result<CharacterRow, DatabaseError> {
        sqlx::query_as::<_, CharacterRow>("SELECT * FROM characters WHERE id = ? AND uid = ?")
            .bind(id)
            .bind(uid)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Character {id}")))
    }

    /// Write a character's snapshot and last game back to the durable store.
    pub async fn save_character(&self, character: &Character) -> Result<(), DatabaseError> {
        let result =
            sqlx::query("UPDATE characters SET game_data = ?, last_game_id = ? WHERE id = ?")
                .bind(snapshot_blob(&character.state)?)
                .bind(character.last_game_id)
                .bind(character.character_id)
                .execute(self.pool())
                .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Character {}",
                character.character_id
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Machine queries
    // =========================================================================

    /// Insert a machine and store the key `issue_key` mints for its new id.
    ///
    /// Both writes commit together, so no reader ever sees the machine
    /// without its key. An error from `issue_key` leaves no row behind.
    pub async fn insert_machine<E, F>(
        &self,
        remote_address: &str,
        service_listen_port: u16,
        issue_key: F,
    ) -> Result<(i64, String), E>
    where
        E: From<DatabaseError>,
        F: FnOnce(i64) -> Result<String, E>,
    {
        let now = unix_timestamp();
        let mut tx = self.pool().begin().await.map_err(DatabaseError::from)?;

        let result = sqlx::query(
            "INSERT INTO machines (remote_address, service_listen_port, registered_at, last_heartbeat) VALUES (?, ?, ?, ?)",
        )
        .bind(remote_address)
        .bind(i64::from(service_listen_port))
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(DatabaseError::from)?;
        let machine_id = result.last_insert_rowid();

        let key = issue_key(machine_id)?;
        sqlx::query("UPDATE machines SET machine_key = ? WHERE machine_id = ?")
            .bind(&key)
            .bind(machine_id)
            .execute(&mut *tx)
            .await
            .map_err(DatabaseError::from)?;

        tx.commit().await.map_err(DatabaseError::from)?;
        Ok((machine_id, key))
    }

    pub async fn get_machine(&self, machine_id: i64) -> Result<Machine, DatabaseError> {
        sqlx::query_as::<_, Machine>("SELECT * FROM machines WHERE machine_id = ?")
            .bind(machine_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Machine {machine_id}")))
    }

    /// Every machine in registration order.
    pub async fn list_machines(&self) -> Result<Vec<Machine>, DatabaseError> {
        let machines = sqlx::query_as::<_, Machine>("SELECT * FROM machines ORDER BY machine_id")
            .fetch_all(self.pool())
            .await?;

        Ok(machines)
    }

    /// Record a liveness report and stamp the heartbeat time.
    pub async fn record_heartbeat(
        &self,
        machine_id: i64,
        cpu_usage_pct: f64,
        network_usage_pct: f64,
        player_capacity_pct: f64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE machines SET cpu_usage_pct = ?, network_usage_pct = ?, player_capacity_pct = ?, last_heartbeat = ? WHERE machine_id = ?",
        )
        .bind(cpu_usage_pct)
        .bind(network_usage_pct)
        .bind(player_capacity_pct)
        .bind(unix_timestamp())
        .bind(machine_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a machine. Its provisioning and active records go with it.
    pub async fn delete_machine(&self, machine_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM machines WHERE machine_id = ?")
            .bind(machine_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
