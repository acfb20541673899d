//! Storage layer tests for the Thorium master.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use thorium_core::db::{DatabaseError, unix_timestamp};
use thorium_core::model::CharacterState;

use super::db::MasterDatabase;
use super::models::{Admission, HostedWrite, NewGame, Placement, Reprovision};

async fn test_db() -> MasterDatabase {
    MasterDatabase::open_in_memory().await.unwrap()
}

const SANDBOX: NewGame<'static> = NewGame {
    map: "mp_sandbox",
    mode: "tutorial",
    minimum_level: 1,
    max_players: 2,
};

/// A registered machine plus a game already active on it.
async fn active_game(db: &MasterDatabase) -> (i64, i64) {
    let machine_id = add_machine(&db, "10.0.0.5").await;
    let reservation = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap();
    db.confirm_provisioning(reservation.game.game_id, machine_id, 10100)
        .await
        .unwrap();
    (machine_id, reservation.game.game_id)
}

async fn add_machine(db: &MasterDatabase, remote_address: &str) -> i64 {
    db.insert_machine(remote_address, 6961, |id| {
        Ok::<_, DatabaseError>(format!("key-{id}"))
    })
    .await
    .unwrap()
    .0
}

async fn account_with_character(db: &MasterDatabase, name: &str) -> (i64, i64) {
    let account = db.create_account(name, "hash").await.unwrap();
    let id = db
        .create_character(account.user_id, name, &CharacterState::for_class(1))
        .await
        .unwrap();
    (account.user_id, id)
}

// === Account tests ===

#[tokio::test]
async fn create_and_find_account() {
    let db = test_db().await;
    let account = db.create_account("alice", "hash123").await.unwrap();
    assert_eq!(account.username, "alice");

    let found = db.get_account_by_username("ALICE").await.unwrap();
    assert_eq!(found.user_id, account.user_id);
    assert!(db.get_account_by_username("bob").await.is_err());
}

#[tokio::test]
async fn duplicate_username_conflicts_ignoring_case() {
    let db = test_db().await;
    db.create_account("alice", "h").await.unwrap();
    assert!(matches!(
        db.create_account("Alice", "h").await,
        Err(DatabaseError::Conflict(_))
    ));
}

// === Character tests ===

#[tokio::test]
async fn characters_belong_to_their_account() {
    let db = test_db().await;
    let (uid, id) = account_with_character(&db, "alice").await;
    let (other_uid, _) = account_with_character(&db, "bob").await;

    assert_eq!(db.character_ids(uid).await.unwrap(), vec![id]);
    assert!(db.get_owned_character(uid, id).await.is_ok());
    assert!(matches!(
        db.get_owned_character(other_uid, id).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn duplicate_character_name_conflicts() {
    let db = test_db().await;
    let (uid, _) = account_with_character(&db, "alice").await;
    assert!(matches!(
        db.create_character(uid, "ALICE", &CharacterState::default()).await,
        Err(DatabaseError::Conflict(_))
    ));
}

#[tokio::test]
async fn saved_snapshot_reads_back_unchanged() {
    let db = test_db().await;
    let (_, id) = account_with_character(&db, "alice").await;

    let mut character = db.get_character(id).await.unwrap().into_character().unwrap();
    character.state.position.z = -4.5;
    character.state.health.current = 12.0;
    character.last_game_id = Some(9);
    db.save_character(&character).await.unwrap();

    let reloaded = db.get_character(id).await.unwrap().into_character().unwrap();
    assert_eq!(reloaded, character);
}

// === Machine tests ===

#[tokio::test]
async fn machines_list_in_registration_order() {
    let db = test_db().await;
    let a = add_machine(&db, "10.0.0.1").await;
    let b = add_machine(&db, "10.0.0.1").await;
    let ids: Vec<i64> = db
        .list_machines()
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.machine_id)
        .collect();
    assert_eq!(ids, vec![a, b]);
}

#[tokio::test]
async fn heartbeat_updates_liveness() {
    let db = test_db().await;
    let id = add_machine(&db, "10.0.0.1").await;
    assert!(db.record_heartbeat(id, 12.5, 0.0, 50.0).await.unwrap());
    assert!(!db.record_heartbeat(id + 1, 1.0, 1.0, 1.0).await.unwrap());

    let machine = db.get_machine(id).await.unwrap();
    assert!((machine.cpu_usage_pct - 12.5).abs() < f64::EPSILON);
    assert!((machine.player_capacity_pct - 50.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn machine_row_never_lacks_its_key() {
    let db = test_db().await;
    let (id, key) = db
        .insert_machine("10.0.0.1", 6961, |id| {
            Ok::<_, DatabaseError>(format!("key-{id}"))
        })
        .await
        .unwrap();
    assert_eq!(db.get_machine(id).await.unwrap().machine_key, key);

    let failed = db
        .insert_machine("10.0.0.2", 6961, |_| {
            Err::<String, _>(DatabaseError::Query("no key".into()))
        })
        .await;
    assert!(failed.is_err());
    assert_eq!(db.list_machines().await.unwrap().len(), 1);
}

// === Game lifecycle tests ===

#[tokio::test]
async fn reserve_without_machine_leaves_nothing() {
    let db = test_db().await;
    assert!(db.reserve_new_game(SANDBOX, 0).await.unwrap().is_none());
    assert!(db.list_games().await.unwrap().is_empty());
}

#[tokio::test]
async fn reserve_skips_stale_machines() {
    let db = test_db().await;
    add_machine(&db, "10.0.0.1").await;
    let future = unix_timestamp() + 60;
    assert!(db.reserve_new_game(SANDBOX, future).await.unwrap().is_none());
}

#[tokio::test]
async fn reserve_picks_first_machine() {
    let db = test_db().await;
    let first = add_machine(&db, "10.0.0.1").await;
    add_machine(&db, "10.0.0.2").await;

    let reservation = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap();
    assert_eq!(reservation.machine.machine_id, first);
    assert_eq!(reservation.game.map_name, "mp_sandbox");
    assert!(matches!(
        db.game_placement(reservation.game.game_id).await.unwrap(),
        Placement::Provisioning { machine_id, .. } if machine_id == first
    ));
}

#[tokio::test]
async fn confirm_moves_game_to_active_once() {
    let db = test_db().await;
    let machine_id = add_machine(&db, "10.0.0.5").await;
    let game_id = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap().game.game_id;

    db.confirm_provisioning(game_id, machine_id, 10100).await.unwrap();
    assert_eq!(
        db.game_placement(game_id).await.unwrap(),
        Placement::Active {
            remote_address: "10.0.0.5".into(),
            port: 10100
        }
    );
    assert!(matches!(
        db.confirm_provisioning(game_id, machine_id, 10101).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn confirm_from_other_machine_is_rejected() {
    let db = test_db().await;
    add_machine(&db, "10.0.0.5").await;
    let other = add_machine(&db, "10.0.0.6").await;
    let game_id = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap().game.game_id;

    assert!(matches!(
        db.confirm_provisioning(game_id, other, 10100).await,
        Err(DatabaseError::NotFound(_))
    ));
    assert!(matches!(
        db.game_placement(game_id).await.unwrap(),
        Placement::Provisioning { .. }
    ));
}

#[tokio::test]
async fn failed_launch_rolls_back() {
    let db = test_db().await;
    let machine_id = add_machine(&db, "10.0.0.5").await;
    let game_id = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap().game.game_id;

    assert!(db.cancel_provisioning(game_id, machine_id).await.unwrap());
    assert!(db.discard_unconfirmed_game(game_id).await.unwrap());
    assert!(matches!(
        db.game_placement(game_id).await,
        Err(DatabaseError::NotFound(_))
    ));
}

#[tokio::test]
async fn discard_keeps_active_game() {
    let db = test_db().await;
    let (_, game_id) = active_game(&db).await;
    assert!(!db.discard_unconfirmed_game(game_id).await.unwrap());
    assert!(db.get_game(game_id).await.is_ok());
}

#[tokio::test]
async fn stale_provisioning_is_reassigned() {
    let db = test_db().await;
    let machine_id = add_machine(&db, "10.0.0.5").await;
    let game_id = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap().game.game_id;

    // A fresh record is left alone.
    assert!(matches!(
        db.reserve_existing_game(game_id, 0, 0).await.unwrap(),
        Reprovision::Superseded
    ));

    let later = unix_timestamp() + 10;
    match db.reserve_existing_game(game_id, later, 0).await.unwrap() {
        Reprovision::Reserved(reservation) => {
            assert_eq!(reservation.machine.machine_id, machine_id);
            assert_eq!(reservation.game.game_id, game_id);
        }
        other => panic!("expected a reservation, got {other:?}"),
    }
}

#[tokio::test]
async fn stale_provisioning_without_machines_returns_to_requested() {
    let db = test_db().await;
    add_machine(&db, "10.0.0.5").await;
    let game_id = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap().game.game_id;

    let later = unix_timestamp() + 10;
    assert!(matches!(
        db.reserve_existing_game(game_id, later, later).await.unwrap(),
        Reprovision::NoMachine
    ));
    assert_eq!(db.game_placement(game_id).await.unwrap(), Placement::Requested);
}

#[tokio::test]
async fn active_game_is_never_reprovisioned() {
    let db = test_db().await;
    let (_, game_id) = active_game(&db).await;
    assert!(matches!(
        db.reserve_existing_game(game_id, unix_timestamp() + 10, 0)
            .await
            .unwrap(),
        Reprovision::Superseded
    ));
}

#[tokio::test]
async fn unknown_game_has_no_placement() {
    let db = test_db().await;
    assert!(matches!(
        db.game_placement(404).await,
        Err(DatabaseError::NotFound(_))
    ));
}

// === Player tests ===

async fn admit(db: &MasterDatabase, game_id: i64, machine_id: i64, name: &str) -> Admission {
    let (uid, id) = account_with_character(db, name).await;
    db.admit_player(game_id, machine_id, uid, id).await.unwrap()
}

#[tokio::test]
async fn admission_respects_capacity() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;

    for name in ["alice", "bob"] {
        assert!(matches!(
            admit(&db, game_id, machine_id, name).await,
            Admission::Admitted(_)
        ));
    }
    assert!(matches!(
        admit(&db, game_id, machine_id, "carol").await,
        Admission::GameFull
    ));
    assert_eq!(db.get_game(game_id).await.unwrap().player_count, 2);
}

#[tokio::test]
async fn readmitting_a_seated_character_keeps_one_slot() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;
    let (uid, id) = account_with_character(&db, "alice").await;

    for _ in 0..2 {
        assert!(matches!(
            db.admit_player(game_id, machine_id, uid, id).await.unwrap(),
            Admission::Admitted(_)
        ));
    }
    assert_eq!(db.get_game(game_id).await.unwrap().player_count, 1);
}

#[tokio::test]
async fn admission_sets_last_game() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;
    let (uid, id) = account_with_character(&db, "alice").await;

    let admission = db.admit_player(game_id, machine_id, uid, id).await.unwrap();
    let Admission::Admitted(row) = admission else {
        panic!("expected admission, got {admission:?}");
    };
    assert_eq!(row.last_game_id, Some(game_id));
    assert_eq!(db.get_character(id).await.unwrap().last_game_id, Some(game_id));
}

#[tokio::test]
async fn admission_requires_hosting_machine_and_owned_character() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;
    let other_machine = add_machine(&db, "10.0.0.9").await;
    let (uid, id) = account_with_character(&db, "alice").await;
    let (other_uid, _) = account_with_character(&db, "bob").await;

    assert!(matches!(
        db.admit_player(game_id, other_machine, uid, id).await.unwrap(),
        Admission::GameNotFound
    ));
    assert!(matches!(
        db.admit_player(game_id, machine_id, other_uid, id).await.unwrap(),
        Admission::CharacterNotFound
    ));
    // Neither failure consumed a slot.
    assert_eq!(db.get_game(game_id).await.unwrap().player_count, 0);
}

/// Seat `name` and return the admitted character.
async fn seated(
    db: &MasterDatabase,
    game_id: i64,
    machine_id: i64,
    name: &str,
) -> thorium_core::model::Character {
    match admit(db, game_id, machine_id, name).await {
        Admission::Admitted(row) => row.into_character().unwrap(),
        other => panic!("expected admission, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_saves_snapshot_and_frees_slot() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;

    let mut character = seated(&db, game_id, machine_id, "alice").await;
    character.state.position.x = 3.25;
    assert_eq!(
        db.record_disconnect(game_id, machine_id, &character)
            .await
            .unwrap(),
        HostedWrite::Saved
    );

    assert_eq!(db.get_game(game_id).await.unwrap().player_count, 0);
    let saved = db
        .get_character(character.character_id)
        .await
        .unwrap()
        .into_character()
        .unwrap();
    assert_eq!(saved, character);
}

#[tokio::test]
async fn repeated_disconnect_frees_only_one_slot() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;

    let alice = seated(&db, game_id, machine_id, "alice").await;
    seated(&db, game_id, machine_id, "bob").await;

    assert_eq!(
        db.record_disconnect(game_id, machine_id, &alice).await.unwrap(),
        HostedWrite::Saved
    );
    assert_eq!(
        db.record_disconnect(game_id, machine_id, &alice).await.unwrap(),
        HostedWrite::NotSeated
    );
    assert_eq!(db.get_game(game_id).await.unwrap().player_count, 1);

    // Bob keeps a seat, so only one newcomer fits.
    assert!(matches!(
        admit(&db, game_id, machine_id, "carol").await,
        Admission::Admitted(_)
    ));
    assert!(matches!(
        admit(&db, game_id, machine_id, "dave").await,
        Admission::GameFull
    ));
}

#[tokio::test]
async fn disconnect_from_foreign_machine_writes_nothing() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;
    let intruder = add_machine(&db, "10.9.9.9").await;

    let before = seated(&db, game_id, machine_id, "alice").await;
    let mut character = before.clone();
    character.state.alive = false;

    assert_eq!(
        db.record_disconnect(game_id, intruder, &character)
            .await
            .unwrap(),
        HostedWrite::ForeignMachine
    );
    assert_eq!(db.get_game(game_id).await.unwrap().player_count, 1);
    let stored = db
        .get_character(before.character_id)
        .await
        .unwrap()
        .into_character()
        .unwrap();
    assert_eq!(stored, before);
}

#[tokio::test]
async fn hosted_save_requires_the_hosting_machine() {
    let db = test_db().await;
    let (machine_id, game_id) = active_game(&db).await;
    let intruder = add_machine(&db, "10.9.9.9").await;

    let mut character = seated(&db, game_id, machine_id, "alice").await;
    character.state.health.current = 3.0;
    assert_eq!(
        db.save_hosted_character(intruder, &character).await.unwrap(),
        HostedWrite::ForeignMachine
    );
    assert_eq!(
        db.save_hosted_character(machine_id, &character)
            .await
            .unwrap(),
        HostedWrite::Saved
    );
    let stored = db.get_character(character.character_id).await.unwrap();
    assert_eq!(stored.into_character().unwrap(), character);

    character.character_id = 9999;
    assert!(matches!(
        db.save_hosted_character(machine_id, &character).await,
        Err(DatabaseError::NotFound(_))
    ));
}

// === File-backed concurrency tests ===
//
// The in-memory pool has a single connection, so these run against a real
// file where transactions from different connections overlap.

async fn file_db(dir: &tempfile::TempDir) -> MasterDatabase {
    MasterDatabase::open(&dir.path().join("master.db"))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_admissions_on_file_pool_stop_at_capacity() {
    const MAX: i64 = 4;
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;

    let machine_id = add_machine(&db, "10.0.0.5").await;
    let game = NewGame {
        max_players: MAX,
        ..SANDBOX
    };
    let game_id = db.reserve_new_game(game, 0).await.unwrap().unwrap().game.game_id;
    db.confirm_provisioning(game_id, machine_id, 10100)
        .await
        .unwrap();

    let mut players = Vec::new();
    for i in 0..12 {
        players.push(account_with_character(&db, &format!("player{i}")).await);
    }

    let mut handles = Vec::new();
    for (uid, id) in players {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.admit_player(game_id, machine_id, uid, id).await
        }));
    }

    let mut admitted = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Admission::Admitted(_) => admitted += 1,
            Admission::GameFull => full += 1,
            other => panic!("unexpected admission: {other:?}"),
        }
    }
    assert_eq!(admitted, MAX);
    assert_eq!(full, 12 - MAX);
    assert_eq!(db.get_game(game_id).await.unwrap().player_count, MAX);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_confirmations_on_file_pool_promote_once() {
    let dir = tempfile::tempdir().unwrap();
    let db = file_db(&dir).await;

    let machine_id = add_machine(&db, "10.0.0.5").await;
    let game_id = db.reserve_new_game(SANDBOX, 0).await.unwrap().unwrap().game.game_id;

    let mut handles = Vec::new();
    for port in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.confirm_provisioning(game_id, machine_id, 10100 + port)
                .await
        }));
    }

    let mut confirmed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => confirmed += 1,
            Err(DatabaseError::NotFound(_)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(confirmed, 1);
    assert!(matches!(
        db.game_placement(game_id).await.unwrap(),
        Placement::Active { .. }
    ));
}
