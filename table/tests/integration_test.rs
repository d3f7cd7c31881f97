//! Integration tests for the table actor: membership round trips,
//! auto-start, mid-hand departures, timers and shutdown.

use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::Duration;

use pokerd_engine::HoldemFactory;
use pokerd_engine::EngineFactory;
use pokerd_shared::wire::{Event, SettingsPayload};
use pokerd_shared::{Chips, ErrorCode};
use pokerd_table::{
    spawn_table_actor, Table, TableHandle, TableNotice, TableSettings,
};

struct Fixture {
    handle: TableHandle,
    notices: mpsc::UnboundedReceiver<TableNotice>,
}

fn settings(auto_start: bool) -> SettingsPayload {
    SettingsPayload {
        small_blind: 10,
        big_blind: 20,
        buy_in: 1000,
        auto_start,
        observers_allowed: true,
        ..Default::default()
    }
}

fn spawn_with(payload: SettingsPayload) -> Fixture {
    let settings = TableSettings::from_payload(&payload).unwrap();
    let table = Table::new(
        "feedbeeffeedbeef".into(),
        "Actor Test".into(),
        "creator".into(),
        None,
        vec![],
        settings.clone(),
    );
    let engine = HoldemFactory.create(settings.small_blind, settings.big_blind);
    let (notice_tx, notice_rx) = mpsc::unbounded_channel();
    let handle = spawn_table_actor(table, engine, notice_tx, Duration::from_secs(2));
    Fixture {
        handle,
        notices: notice_rx,
    }
}

fn drain_events(notices: &mut mpsc::UnboundedReceiver<TableNotice>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        if let TableNotice::Broadcast { event, .. } = notice {
            events.push(event);
        }
    }
    events
}

/// Join and leave round trip on a fresh table.
#[tokio::test]
async fn test_join_then_leave_round_trip() {
    let mut fx = spawn_with(settings(false));

    let view = fx.handle.join_player("b", "bob", 0, None).await.unwrap();
    assert_eq!(view["player_count"], 1);
    assert_eq!(view["status"], "waiting");
    assert_eq!(view["seats"][0]["user_id"], "b");

    fx.handle.leave("b").await.unwrap();
    let info = fx.handle.get_info(None).await.unwrap();
    assert_eq!(info["player_count"], 0);
    assert_eq!(info["status"], "waiting");

    // Leave is single-shot: the second call reports absence and the
    // table is unchanged.
    let err = fx.handle.leave("b").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlayerNotAtTable);
    let info = fx.handle.get_info(None).await.unwrap();
    assert_eq!(info["player_count"], 0);

    let events = drain_events(&mut fx.notices);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PlayerJoined { user_id, .. } if user_id == "b")));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PlayerLeft { user_id, .. } if user_id == "b")));
}

/// Private tables gate joins on the password.
#[tokio::test]
async fn test_private_password() {
    let mut payload = settings(false);
    payload.private = true;
    payload.password = Some("s3cret".into());
    let fx = spawn_with(payload);

    let err = fx
        .handle
        .join_player("a", "alice", 0, Some("wrong".into()))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPassword);

    let err = fx.handle.join_player("a", "alice", 0, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPassword);

    fx.handle
        .join_player("a", "alice", 0, Some("s3cret".into()))
        .await
        .unwrap();
    let info = fx.handle.get_info(Some("a")).await.unwrap();
    assert_eq!(info["player_count"], 1);
}

/// Auto-start fires once enough players are seated.
#[tokio::test]
async fn test_auto_start_begins_hand() {
    let mut fx = spawn_with(settings(true));

    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    fx.handle.join_player("b", "bob", 0, None).await.unwrap();

    let info = fx.handle.get_info(Some("a")).await.unwrap();
    assert_eq!(info["status"], "active");

    let events = drain_events(&mut fx.notices);
    assert!(events.iter().any(|e| matches!(e, Event::GameStarted { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::HandStarted { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::BlindsPosted { .. })));

    // Participants can read the game state; strangers get the stub.
    let state = fx.handle.get_game_state(Some("a")).await.unwrap();
    assert_eq!(state["round"], "preflop");
    let denied = fx.handle.get_game_state(Some("stranger")).await.unwrap();
    assert_eq!(denied["error"], "ACCESS_DENIED");
}

/// Joining an active table is refused; a paused table accepts.
#[tokio::test]
async fn test_join_refused_mid_game() {
    let fx = spawn_with(settings(true));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    fx.handle.join_player("b", "bob", 0, None).await.unwrap();

    let err = fx.handle.join_player("c", "carol", 0, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotJoinable);
}

/// Leaving mid-hand folds the player and the hand continues.
#[tokio::test]
async fn test_leave_mid_hand_folds_first() {
    let mut fx = spawn_with(settings(true));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    fx.handle.join_player("b", "bob", 0, None).await.unwrap();
    // Auto-start fired at two players, so a third join bounces off
    // the now-active table.
    let err = fx.handle.join_player("c", "carol", 0, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotJoinable);
    let info = fx.handle.get_info(Some("a")).await.unwrap();
    assert_eq!(info["player_count"], 2);

    drain_events(&mut fx.notices);

    // Bob leaves during the hand: folded, then unseated, and the
    // remaining player wins the pot.
    fx.handle.leave("b").await.unwrap();
    let events = drain_events(&mut fx.notices);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PlayerFolded { user_id, timeout: false } if user_id == "b")));
    assert!(events.iter().any(|e| matches!(e, Event::PotDistributed { .. })));
    assert!(events.iter().any(|e| matches!(e, Event::GameFinished { winners, .. } if winners == &vec!["a".to_string()])));
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::PlayerLeft { user_id, .. } if user_id == "b")));

    // The winner's seat stack grew by the blinds bob left behind.
    let info = fx.handle.get_info(Some("a")).await.unwrap();
    let alice_chips = info["seats"][0]["chips"].as_u64().unwrap();
    assert!(alice_chips > 1000, "winner settles above the buy-in");
}

/// Position semantics: auto-assign on zero/negative, collisions and
/// range errors on explicit seats.
#[tokio::test]
async fn test_join_positions() {
    let fx = spawn_with(settings(false));

    fx.handle.join_player("a", "alice", -1, None).await.unwrap();
    let info = fx.handle.get_info(Some("a")).await.unwrap();
    assert_eq!(info["seats"][0]["user_id"], "a");

    let err = fx.handle.join_player("b", "bob", 1, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PositionOccupied);

    let err = fx.handle.join_player("b", "bob", 9, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPosition);

    fx.handle.join_player("b", "bob", 2, None).await.unwrap();
    let info = fx.handle.get_info(Some("b")).await.unwrap();
    assert_eq!(info["seats"][1]["user_id"], "b");
}

/// Observers join, are counted, and cannot double as players.
#[tokio::test]
async fn test_observers() {
    let fx = spawn_with(settings(false));
    fx.handle.join_observer("o", "olive", None).await.unwrap();

    let info = fx.handle.get_info(Some("o")).await.unwrap();
    assert_eq!(info["observer_count"], 1);
    assert_eq!(info["observers"][0]["user_id"], "o");

    let err = fx.handle.join_player("o", "olive", 0, None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlayerAlreadyAtTable);
}

/// The last participant leaving signals the supervisor.
#[tokio::test]
async fn test_empty_table_signals_supervisor() {
    let mut fx = spawn_with(settings(false));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    fx.handle.leave("a").await.unwrap();

    let mut saw_empty = false;
    while let Ok(notice) = fx.notices.try_recv() {
        if matches!(notice, TableNotice::Empty { .. }) {
            saw_empty = true;
        }
    }
    assert!(saw_empty, "supervisor must learn the table is empty");
}

/// Ready flags round-trip and broadcast.
#[tokio::test]
async fn test_set_ready() {
    let mut fx = spawn_with(settings(false));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    fx.handle.set_ready("a", true).await.unwrap();

    let info = fx.handle.get_info(Some("a")).await.unwrap();
    assert_eq!(info["seats"][0]["ready"], true);

    let events = drain_events(&mut fx.notices);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::PlayerReadyChanged { ready: true, .. }
    )));

    let err = fx.handle.set_ready("ghost", true).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlayerNotAtTable);
}

/// Manual hand start needs a seat and enough funded players.
#[tokio::test]
async fn test_manual_start_hand() {
    let mut fx = spawn_with(settings(false));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();

    let err = fx.handle.start_hand("stranger").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlayerNotAtTable);

    let err = fx.handle.start_hand("a").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::GameNotInProgress);

    fx.handle.join_player("b", "bob", 0, None).await.unwrap();
    fx.handle.start_hand("a").await.unwrap();

    let events = drain_events(&mut fx.notices);
    assert!(events.iter().any(|e| matches!(e, Event::GameStarted { .. })));

    // A second start while the hand runs is refused.
    let err = fx.handle.start_hand("a").await.unwrap_err();
    assert_eq!(err.code, ErrorCode::GameNotInProgress);
}

/// Actions flow through the actor into the engine.
#[tokio::test]
async fn test_ingest_action_round_trip() {
    let mut fx = spawn_with(settings(true));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    fx.handle.join_player("b", "bob", 0, None).await.unwrap();
    drain_events(&mut fx.notices);

    // Heads-up: the dealer (seat 0, alice) acts first preflop.
    fx.handle
        .ingest_action("a", json!({"action": "call"}))
        .await
        .unwrap();
    let err = fx
        .handle
        .ingest_action("a", json!({"action": "check"}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotPlayersTurn);

    fx.handle
        .ingest_action("b", json!({"action": "check"}))
        .await
        .unwrap();
    let events = drain_events(&mut fx.notices);
    assert!(events.iter().any(|e| matches!(e, Event::FlopDealt { .. })));
}

/// An expired turn timer folds the current actor.
#[tokio::test(start_paused = true)]
async fn test_turn_timer_folds() {
    let mut payload = settings(true);
    payload.turn_time_limit_secs = 30;
    let mut fx = spawn_with(payload);
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    fx.handle.join_player("b", "bob", 0, None).await.unwrap();
    drain_events(&mut fx.notices);

    // Let virtual time run past the 30-second turn limit.
    tokio::time::sleep(Duration::from_secs(31)).await;
    // Nudge the scheduler so the worker observes the deadline.
    let _ = fx.handle.get_info(None).await.unwrap();

    let events = drain_events(&mut fx.notices);
    assert!(
        events
            .iter()
            .any(|e| matches!(e, Event::PlayerFolded { timeout: true, .. })),
        "timer expiry must fold the current actor"
    );
    assert!(events.iter().any(|e| matches!(e, Event::GameFinished { .. })));
}

/// Shutdown closes the table, drops the worker, and repeats cleanly.
#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let mut fx = spawn_with(settings(false));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();

    fx.handle.shutdown().await.unwrap();
    fx.handle.shutdown().await.unwrap();

    let mut closed = false;
    let mut terminated = false;
    while let Some(notice) = fx.notices.recv().await {
        match notice {
            TableNotice::Broadcast {
                event: Event::TableClosed { .. },
                ..
            } => closed = true,
            TableNotice::Terminated { .. } => {
                terminated = true;
                break;
            }
            _ => {}
        }
    }
    assert!(closed && terminated);

    // Commands against a dead table map to not-found.
    let err = fx.handle.get_info(None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotFound);
}

/// A panic inside the worker closes the table instead of corrupting
/// anything outside it.
#[tokio::test]
async fn test_worker_panic_closes_table() {
    use pokerd_engine::{EngineSnapshot, GameEngine, HandRound, SeatedPlayer};
    use pokerd_shared::wire::Event as WireEvent;

    struct FaultyEngine;

    impl GameEngine for FaultyEngine {
        fn variant(&self) -> &'static str {
            "texas_holdem"
        }
        fn start_hand(&mut self, _players: Vec<SeatedPlayer>) -> pokerd_shared::Result<Vec<WireEvent>> {
            Ok(vec![])
        }
        fn apply_action(
            &mut self,
            _user_id: &str,
            _data: &serde_json::Value,
        ) -> pokerd_shared::Result<Vec<WireEvent>> {
            panic!("engine blew up");
        }
        fn fold_player(
            &mut self,
            _user_id: &str,
            _timeout: bool,
        ) -> pokerd_shared::Result<Vec<WireEvent>> {
            Ok(vec![])
        }
        fn in_progress(&self) -> bool {
            false
        }
        fn current_actor(&self) -> Option<String> {
            None
        }
        fn snapshot(&self) -> EngineSnapshot {
            EngineSnapshot {
                round: HandRound::Waiting,
                community: vec![],
                pot: Chips::ZERO,
                current_bet: Chips::ZERO,
                current_player: None,
                dealer_position: 0,
                players: vec![],
                winners: vec![],
            }
        }
    }

    let settings = TableSettings::from_payload(&settings(false)).unwrap();
    let table = Table::new(
        "0badc0de0badc0de".into(),
        "Faulty".into(),
        "creator".into(),
        None,
        vec![],
        settings,
    );
    let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
    let handle = spawn_table_actor(
        table,
        Box::new(FaultyEngine),
        notice_tx,
        Duration::from_secs(2),
    );

    handle.join_player("a", "alice", 0, None).await.unwrap();
    // The panic eats the in-flight command; the caller sees the dead
    // actor, not a poisoned state.
    let err = handle
        .ingest_action("a", json!({"action": "fold"}))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotFound);

    let mut closed = false;
    let mut terminated = false;
    while let Some(notice) = notice_rx.recv().await {
        match notice {
            TableNotice::Broadcast {
                event: Event::TableClosed { .. },
                ..
            } => closed = true,
            TableNotice::Terminated { .. } => {
                terminated = true;
                break;
            }
            _ => {}
        }
    }
    assert!(closed && terminated);
}

/// The table view exposes chips through settle; sanity-check the
/// buy-in lands on the seat.
#[tokio::test]
async fn test_buy_in_stacks_seat() {
    let fx = spawn_with(settings(false));
    fx.handle.join_player("a", "alice", 0, None).await.unwrap();
    let info = fx.handle.get_info(Some("a")).await.unwrap();
    assert_eq!(info["seats"][0]["chips"], Chips(1000).0);
}
