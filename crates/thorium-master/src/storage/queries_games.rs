//! Game lifecycle queries: reservation, confirmation, placement and player
//! seating.
//!
//! A game moves between `loading_hosts` (provisioning) and `hosts` (active).
//! Every move happens inside one transaction whose first statement is a
//! write, so concurrent writers serialize on SQLite's write lock instead of
//! failing a read-to-write upgrade.

use sqlx::sqlite::SqliteConnection;
use thorium_core::db::{DatabaseError, unix_timestamp};
use thorium_core::model::Character;

use super::db::MasterDatabase;
use super::models::{
    Admission, CharacterRow, GameRow, HostedWrite, Machine, NewGame, Placement, Reprovision,
    Reservation,
};
use super::queries::snapshot_blob;

/// Assign `game_id` to the first machine that heartbeated at or after
/// `live_since` and write its provisioning record.
async fn reserve_machine(
    conn: &mut SqliteConnection,
    game_id: i64,
    live_since: i64,
) -> Result<Option<Machine>, DatabaseError> {
    let Some(machine) = sqlx::query_as::<_, Machine>(
        "SELECT * FROM machines WHERE last_heartbeat >= ? ORDER BY machine_id LIMIT 1",
    )
    .bind(live_since)
    .fetch_optional(&mut *conn)
    .await?
    else {
        return Ok(None);
    };

    sqlx::query("INSERT INTO loading_hosts (game_id, machine_id, kickoff_time) VALUES (?, ?, ?)")
        .bind(game_id)
        .bind(machine.machine_id)
        .bind(unix_timestamp())
        .execute(&mut *conn)
        .await?;

    Ok(Some(machine))
}

impl MasterDatabase {
    // =========================================================================
    // Game queries
    // =========================================================================

    pub async fn get_game(&self, game_id: i64) -> Result<GameRow, DatabaseError> {
        sqlx::query_as::<_, GameRow>("SELECT * FROM games WHERE game_id = ?")
            .bind(game_id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Game {game_id}")))
    }

    pub async fn list_games(&self) -> Result<Vec<GameRow>, DatabaseError> {
        let games = sqlx::query_as::<_, GameRow>("SELECT * FROM games ORDER BY game_id")
            .fetch_all(self.pool())
            .await?;

        Ok(games)
    }

    // =========================================================================
    // Provisioning
    // =========================================================================

    /// Create a game and put it into provisioning on a live machine.
    ///
    /// Returns `None` and leaves no trace when no machine is live.
    pub async fn reserve_new_game(
        &self,
        game: NewGame<'_>,
        live_since: i64,
    ) -> Result<Option<Reservation>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query(
            "INSERT INTO games (map_name, game_mode, minimum_level, maximum_players, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(game.map)
        .bind(game.mode)
        .bind(game.minimum_level)
        .bind(game.max_players)
        .bind(unix_timestamp())
        .execute(&mut *tx)
        .await?;
        let game_id = result.last_insert_rowid();

        let Some(machine) = reserve_machine(&mut *tx, game_id, live_since).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        let game = sqlx::query_as::<_, GameRow>("SELECT * FROM games WHERE game_id = ?")
            .bind(game_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(Reservation { game, machine }))
    }

    /// Put an existing, inactive game back into provisioning.
    ///
    /// A provisioning record kicked off at or before `stale_before` is cleared
    /// first; a fresher one, or an active record, wins and nothing changes.
    pub async fn reserve_existing_game(
        &self,
        game_id: i64,
        stale_before: i64,
        live_since: i64,
    ) -> Result<Reprovision, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("DELETE FROM loading_hosts WHERE game_id = ? AND kickoff_time <= ?")
            .bind(game_id)
            .bind(stale_before)
            .execute(&mut *tx)
            .await?;

        let game = sqlx::query_as::<_, GameRow>("SELECT * FROM games WHERE game_id = ?")
            .bind(game_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Game {game_id}")))?;

        let placed: i64 = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM hosts WHERE game_id = ?) OR EXISTS (SELECT 1 FROM loading_hosts WHERE game_id = ?)",
        )
        .bind(game_id)
        .bind(game_id)
        .fetch_one(&mut *tx)
        .await?;
        if placed != 0 {
            tx.commit().await?;
            return Ok(Reprovision::Superseded);
        }

        let machine = reserve_machine(&mut *tx, game_id, live_since).await?;
        tx.commit().await?;

        Ok(machine.map_or(Reprovision::NoMachine, |machine| {
            Reprovision::Reserved(Reservation { game, machine })
        }))
    }

    /// Drop the provisioning record of a launch that failed.
    pub async fn cancel_provisioning(
        &self,
        game_id: i64,
        machine_id: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM loading_hosts WHERE game_id = ? AND machine_id = ?")
            .bind(game_id)
            .bind(machine_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a game unless it already became active.
    ///
    /// Returns `false` when an active record kept the game alive.
    pub async fn discard_unconfirmed_game(&self, game_id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "DELETE FROM games WHERE game_id = ? AND NOT EXISTS (SELECT 1 FROM hosts WHERE hosts.game_id = games.game_id)",
        )
        .bind(game_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Promote a provisioning record for `(game_id, machine_id)` to active.
    ///
    /// Of two concurrent confirmations only the first finds the record; the
    /// second gets [`DatabaseError::NotFound`].
    pub async fn confirm_provisioning(
        &self,
        game_id: i64,
        machine_id: i64,
        port: u16,
    ) -> Result<(), DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let result = sqlx::query("DELETE FROM loading_hosts WHERE game_id = ? AND machine_id = ?")
            .bind(game_id)
            .bind(machine_id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(DatabaseError::NotFound(format!(
                "Provisioning record for game {game_id} on machine {machine_id}"
            )));
        }

        sqlx::query("INSERT INTO hosts (game_id, machine_id, port) VALUES (?, ?, ?)")
            .bind(game_id)
            .bind(machine_id)
            .bind(i64::from(port))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Current lifecycle phase of a game.
    pub async fn game_placement(&self, game_id: i64) -> Result<Placement, DatabaseError> {
        let active = sqlx::query_as::<_, (String, i64)>(
            "SELECT m.remote_address, h.port FROM hosts h JOIN machines m USING (machine_id) WHERE h.game_id = ?",
        )
        .bind(game_id)
        .fetch_optional(self.pool())
        .await?;
        if let Some((remote_address, port)) = active {
            return Ok(Placement::Active {
                remote_address,
                port,
            });
        }

        let loading = sqlx::query_as::<_, (i64, i64)>(
            "SELECT machine_id, kickoff_time FROM loading_hosts WHERE game_id = ?",
        )
        .bind(game_id)
        .fetch_optional(self.pool())
        .await?;
        if let Some((machine_id, kickoff_time)) = loading {
            return Ok(Placement::Provisioning {
                machine_id,
                kickoff_time,
            });
        }

        self.get_game(game_id).await?;
        Ok(Placement::Requested)
    }

    // =========================================================================
    // Players
    // =========================================================================

    /// Seat a player in a game hosted by `machine_id` and load the
    /// character, all or nothing.
    ///
    /// The slot is claimed with a conditional increment, so concurrent
    /// admissions can never push the count past the game's maximum. A
    /// character that is already seated keeps its one slot.
    pub async fn admit_player(
        &self,
        game_id: i64,
        machine_id: i64,
        uid: i64,
        character_id: i64,
    ) -> Result<Admission, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let claimed = sqlx::query(
            "UPDATE games SET player_count = player_count + 1 \
             WHERE game_id = ? AND player_count < maximum_players \
             AND EXISTS (SELECT 1 FROM hosts WHERE hosts.game_id = games.game_id AND hosts.machine_id = ?)",
        )
        .bind(game_id)
        .bind(machine_id)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            let hosted = hosted_by(&mut *tx, game_id, machine_id).await?;
            tx.rollback().await?;
            return Ok(if hosted {
                Admission::GameFull
            } else {
                Admission::GameNotFound
            });
        }

        let Some(character) = sqlx::query_as::<_, CharacterRow>(
            "SELECT * FROM characters WHERE id = ? AND uid = ?",
        )
        .bind(character_id)
        .bind(uid)
        .fetch_optional(&mut *tx)
        .await?
        else {
            tx.rollback().await?;
            return Ok(Admission::CharacterNotFound);
        };

        let seated =
            sqlx::query("INSERT OR IGNORE INTO game_players (game_id, character_id) VALUES (?, ?)")
                .bind(game_id)
                .bind(character_id)
                .execute(&mut *tx)
                .await?;
        if seated.rows_affected() == 0 {
            sqlx::query("UPDATE games SET player_count = player_count - 1 WHERE game_id = ?")
                .bind(game_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("UPDATE characters SET last_game_id = ? WHERE id = ?")
            .bind(game_id)
            .bind(character_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Admission::Admitted(CharacterRow {
            last_game_id: Some(game_id),
            ..character
        }))
    }

    /// Unseat a departing player, persist their snapshot and free their slot.
    ///
    /// Only the machine hosting `game_id` may do this, and only once per
    /// seat. Anything else writes nothing.
    pub async fn record_disconnect(
        &self,
        game_id: i64,
        machine_id: i64,
        character: &Character,
    ) -> Result<HostedWrite, DatabaseError> {
        let blob = snapshot_blob(&character.state)?;

        let mut tx = self.pool().begin().await?;

        let unseated = sqlx::query(
            "DELETE FROM game_players WHERE game_id = ? AND character_id = ? \
             AND EXISTS (SELECT 1 FROM hosts WHERE game_id = ? AND machine_id = ?)",
        )
        .bind(game_id)
        .bind(character.character_id)
        .bind(game_id)
        .bind(machine_id)
        .execute(&mut *tx)
        .await?;
        if unseated.rows_affected() == 0 {
            let hosted = hosted_by(&mut *tx, game_id, machine_id).await?;
            tx.rollback().await?;
            return Ok(if hosted {
                HostedWrite::NotSeated
            } else {
                HostedWrite::ForeignMachine
            });
        }

        sqlx::query("UPDATE characters SET game_data = ?, last_game_id = ? WHERE id = ?")
            .bind(blob)
            .bind(game_id)
            .bind(character.character_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE games SET player_count = player_count - 1 WHERE game_id = ? AND player_count > 0",
        )
        .bind(game_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(HostedWrite::Saved)
    }

    /// Overwrite the snapshot of a character whose last game is hosted by
    /// `machine_id`.
    pub async fn save_hosted_character(
        &self,
        machine_id: i64,
        character: &Character,
    ) -> Result<HostedWrite, DatabaseError> {
        let blob = snapshot_blob(&character.state)?;

        let mut tx = self.pool().begin().await?;

        let saved = sqlx::query(
            "UPDATE characters SET game_data = ? WHERE id = ? \
             AND EXISTS (SELECT 1 FROM hosts WHERE hosts.game_id = characters.last_game_id AND hosts.machine_id = ?)",
        )
        .bind(blob)
        .bind(character.character_id)
        .bind(machine_id)
        .execute(&mut *tx)
        .await?;
        if saved.rows_affected() > 0 {
            tx.commit().await?;
            return Ok(HostedWrite::Saved);
        }

        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM characters WHERE id = ?)")
                .bind(character.character_id)
                .fetch_one(&mut *tx)
                .await?;
        tx.rollback().await?;
        if exists == 0 {
            return Err(DatabaseError::NotFound(format!(
                "Character {}",
                character.character_id
            )));
        }
        Ok(HostedWrite::ForeignMachine)
    }
}

async fn hosted_by(
    conn: &mut SqliteConnection,
    game_id: i64,
    machine_id: i64,
) -> Result<bool, DatabaseError> {
    let hosted: i64 = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM hosts WHERE game_id = ? AND machine_id = ?)",
    )
    .bind(game_id)
    .bind(machine_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(hosted != 0)
}
