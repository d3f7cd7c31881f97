//! End-to-end lobby tests: creation flow, join/leave through the
//! supervisor, listings, the dispatch bridge, and fan-out.

use std::sync::Arc;

use serde_json::json;
use tokio::time::Duration;

use pokerd_lobby::{LobbyConfig, RateLimitConfig, TableSupervisor};
use pokerd_shared::traits::memory::{MemoryAudit, MemoryConnection, MemoryHub, MemoryStore};
use pokerd_shared::wire::{CreateTablePayload, JoinTablePayload, RequestEnvelope, SettingsPayload};
use pokerd_shared::ErrorCode;

struct Fixture {
    supervisor: TableSupervisor,
    hub: Arc<MemoryHub>,
    store: Arc<MemoryStore>,
    audit: Arc<MemoryAudit>,
}

fn fixture_with(rate_limit: RateLimitConfig) -> Fixture {
    let hub = Arc::new(MemoryHub::new());
    let store = Arc::new(MemoryStore::new());
    let audit = Arc::new(MemoryAudit::new());
    let supervisor = TableSupervisor::builder(hub.clone())
        .config(LobbyConfig {
            rate_limit,
            command_timeout: Duration::from_secs(2),
        })
        .store(store.clone())
        .audit(audit.clone())
        .build();
    Fixture {
        supervisor,
        hub,
        store,
        audit,
    }
}

fn fixture() -> Fixture {
    fixture_with(RateLimitConfig::default())
}

fn create_payload(name: &str) -> CreateTablePayload {
    CreateTablePayload {
        name: name.into(),
        description: None,
        tags: vec![],
        settings: SettingsPayload {
            small_blind: 10,
            big_blind: 20,
            buy_in: 1000,
            observers_allowed: true,
            ..Default::default()
        },
    }
}

fn join_payload(table_id: &str) -> JoinTablePayload {
    JoinTablePayload {
        table_id: table_id.into(),
        mode: "player".into(),
        position: 0,
        password: None,
    }
}

/// Broadcasts cross the notice pump asynchronously; wait until the
/// room has seen the given event type.
async fn await_event(hub: &MemoryHub, room: &str, kind: &str) -> Vec<serde_json::Value> {
    for _ in 0..100 {
        let events = hub.messages_for(room);
        if events.iter().any(|e| e["type"] == kind) {
            return events;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("event {kind:?} never reached room {room:?}");
}

/// Create, join and leave through the supervisor surface.
#[tokio::test]
async fn test_create_join_leave() {
    let fx = fixture();

    let view = fx
        .supervisor
        .create("user-a", &create_payload("Friday Night"))
        .await
        .unwrap();
    let table_id = view["id"].as_str().unwrap().to_string();
    assert_eq!(table_id.len(), 16);
    assert_eq!(view["status"], "waiting");

    let (view, room) = fx
        .supervisor
        .join("user-b", "bob", &join_payload(&table_id))
        .await
        .unwrap();
    assert_eq!(view["player_count"], 1);
    assert_eq!(view["status"], "waiting");
    assert_eq!(room, format!("table_{table_id}"));

    fx.supervisor.leave("user-b", &table_id).await.unwrap();
    let info = fx.supervisor.get(&table_id, Some("user-a")).await.unwrap();
    assert_eq!(info["player_count"], 0);
    assert_eq!(info["status"], "waiting");

    // The second leave reports absence.
    let err = fx.supervisor.leave("user-b", &table_id).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::PlayerNotAtTable);

    // Membership traffic reached the room.
    let events = await_event(&fx.hub, &room, "player_left").await;
    assert!(events.iter().any(|e| e["type"] == "player_joined"));
}

/// Password-gated join on a private table.
#[tokio::test]
async fn test_private_table_password() {
    let fx = fixture();
    let mut payload = create_payload("Secret Game");
    payload.settings.private = true;
    payload.settings.password = Some("s3cret".into());

    let view = fx.supervisor.create("user-a", &payload).await.unwrap();
    let table_id = view["id"].as_str().unwrap().to_string();

    let mut join = join_payload(&table_id);
    join.password = Some("wrong".into());
    let err = fx
        .supervisor
        .join("user-b", "bob", &join)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPassword);

    join.password = Some("s3cret".into());
    fx.supervisor.join("user-b", "bob", &join).await.unwrap();
}

/// The fourth create inside the window is rate limited.
#[tokio::test]
async fn test_create_rate_limit() {
    let fx = fixture_with(RateLimitConfig {
        max_creates_per_window: 3,
        ..Default::default()
    });

    for i in 0..3 {
        fx.supervisor
            .create("user-a", &create_payload(&format!("Table {i}")))
            .await
            .unwrap();
    }
    let err = fx
        .supervisor
        .create("user-a", &create_payload("Table 3"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::RateLimitExceeded);
}

/// Validation failure precedes the rate limiter, so rejected names do
/// not burn create attempts.
#[tokio::test]
async fn test_validation_does_not_consume_attempts() {
    let fx = fixture_with(RateLimitConfig {
        max_creates_per_window: 2,
        ..Default::default()
    });

    for _ in 0..5 {
        let err = fx
            .supervisor
            .create("user-a", &create_payload("'; DROP TABLE users; --"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationFailed);
    }

    // Both window slots are still available.
    fx.supervisor
        .create("user-a", &create_payload("Legit One"))
        .await
        .unwrap();
    fx.supervisor
        .create("user-a", &create_payload("Legit Two"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_with_filters() {
    let fx = fixture();
    fx.supervisor
        .create("user-a", &create_payload("Open Table"))
        .await
        .unwrap();

    let mut private = create_payload("Hidden Table");
    private.settings.private = true;
    private.settings.password = Some("s3cret".into());
    fx.supervisor.create("user-b", &private).await.unwrap();

    let all = fx.supervisor.list(None, None).await.unwrap();
    assert_eq!(all.len(), 2);

    let filtered = fx
        .supervisor
        .list(None, Some(&json!({"created_by": "user-a"})))
        .await
        .unwrap();
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0]["name"], "Open Table");

    let spacious = fx
        .supervisor
        .list(None, Some(&json!({"has_space": true, "status": "waiting"})))
        .await
        .unwrap();
    assert_eq!(spacious.len(), 2);

    let err = fx
        .supervisor
        .list(None, Some(&json!({"sneaky": 1})))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);
}

#[tokio::test]
async fn test_close_requires_creator() {
    let fx = fixture();
    let view = fx
        .supervisor
        .create("user-a", &create_payload("Mine"))
        .await
        .unwrap();
    let table_id = view["id"].as_str().unwrap().to_string();

    let err = fx
        .supervisor
        .close("user-b", &table_id)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotTableCreator);

    fx.supervisor.close("user-a", &table_id).await.unwrap();
    let err = fx
        .supervisor
        .get(&table_id, Some("user-a"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotFound);
    assert_eq!(fx.supervisor.table_count(), 0);

    // Write-through: the row was created, then removed on close.
    assert!(fx.store.get(&table_id).is_none());
}

#[tokio::test]
async fn test_unknown_table_and_bad_ids() {
    let fx = fixture();
    let err = fx
        .supervisor
        .get("00000000deadbeef", None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TableNotFound);

    let err = fx.supervisor.get("nope", None).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);

    let err = fx
        .supervisor
        .join("user-a", "alice", &join_payload("bad id!"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::ValidationFailed);
}

#[tokio::test]
async fn test_invalid_join_mode() {
    let fx = fixture();
    let view = fx
        .supervisor
        .create("user-a", &create_payload("Modes"))
        .await
        .unwrap();
    let table_id = view["id"].as_str().unwrap().to_string();

    let mut join = join_payload(&table_id);
    join.mode = "spectator".into();
    let err = fx
        .supervisor
        .join("user-b", "bob", &join)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidJoinMode);
}

/// An empty table closes itself through the supervisor.
#[tokio::test]
async fn test_empty_table_is_reaped() {
    let fx = fixture();
    let view = fx
        .supervisor
        .create("user-a", &create_payload("Ephemeral"))
        .await
        .unwrap();
    let table_id = view["id"].as_str().unwrap().to_string();

    fx.supervisor
        .join("user-b", "bob", &join_payload(&table_id))
        .await
        .unwrap();
    fx.supervisor.leave("user-b", &table_id).await.unwrap();

    // The reap crosses the notice pump; poll briefly.
    for _ in 0..50 {
        if fx.supervisor.table_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(fx.supervisor.table_count(), 0);
}

/// Full wire round trip through the dispatch bridge.
#[tokio::test]
async fn test_dispatch_bridge() {
    let fx = fixture();
    let conn = MemoryConnection::new("user-a", "alice");

    let create = RequestEnvelope {
        kind: "table_create".into(),
        request_id: Some("r1".into()),
        data: serde_json::to_value(create_payload("Wire Table")).unwrap(),
    };
    let reply = fx.supervisor.handle_request(&conn, &create).await;
    assert!(reply.success);
    assert_eq!(reply.kind, "table_create_response");
    assert_eq!(reply.request_id.as_deref(), Some("r1"));
    let table_id = reply.data.unwrap()["id"].as_str().unwrap().to_string();

    let join = RequestEnvelope {
        kind: "table_join".into(),
        request_id: Some("r2".into()),
        data: serde_json::to_value(join_payload(&table_id)).unwrap(),
    };
    let reply = fx.supervisor.handle_request(&conn, &join).await;
    assert!(reply.success);
    assert_eq!(reply.room.as_deref(), Some(&*format!("table_{table_id}")));
    // The connection was moved into the room.
    assert_eq!(
        conn.rooms.lock().unwrap().as_slice(),
        [format!("table_{table_id}")]
    );

    let bogus = RequestEnvelope {
        kind: "table_join".into(),
        request_id: Some("r3".into()),
        data: json!({"table_id": "missing0deadbeef"}),
    };
    let reply = fx.supervisor.handle_request(&conn, &bogus).await;
    assert!(!reply.success);
    assert_eq!(reply.error.as_deref(), Some("TABLE_NOT_FOUND"));

    let stats = RequestEnvelope {
        kind: "table_get_stats".into(),
        request_id: None,
        data: json!({}),
    };
    let reply = fx.supervisor.handle_request(&conn, &stats).await;
    assert!(reply.success);
    let data = reply.data.unwrap();
    assert_eq!(data["lobby"]["tables"], 1);
    assert_eq!(data["lobby"]["players_seated"], 1);
}

/// A full hand driven through the supervisor surface.
#[tokio::test]
async fn test_game_flow_through_supervisor() {
    let fx = fixture();
    let mut payload = create_payload("Auto Game");
    payload.settings.auto_start = true;
    let view = fx.supervisor.create("user-a", &payload).await.unwrap();
    let table_id = view["id"].as_str().unwrap().to_string();
    let room = format!("table_{table_id}");

    fx.supervisor
        .join("user-a", "alice", &join_payload(&table_id))
        .await
        .unwrap();
    fx.supervisor
        .join("user-b", "bob", &join_payload(&table_id))
        .await
        .unwrap();

    // Auto-start kicked in; both players see state, strangers do not.
    let state = fx
        .supervisor
        .get_game_state(&table_id, Some("user-a"))
        .await
        .unwrap();
    assert_eq!(state["round"], "preflop");
    let denied = fx
        .supervisor
        .get_game_state(&table_id, Some("user-z"))
        .await
        .unwrap();
    assert_eq!(denied["error"], "ACCESS_DENIED");

    // Alice (dealer, small blind) folds; bob wins.
    fx.supervisor
        .game_action("user-a", &table_id, json!({"action": "fold"}))
        .await
        .unwrap();

    let events = await_event(&fx.hub, &room, "game_finished").await;
    assert!(events.iter().any(|e| e["type"] == "hand_started"));
    assert!(events.iter().any(|e| e["type"] == "blinds_posted"));
    assert!(events.iter().any(|e| e["type"] == "player_folded"));
    assert!(events.iter().any(|e| e["type"] == "pot_distributed"));

    // Audit captured the membership actions.
    let audited: Vec<String> = fx
        .audit
        .records()
        .iter()
        .map(|r| r.action.clone())
        .collect();
    assert!(audited.contains(&"table_create".to_string()));
    assert!(audited.contains(&"table_join".to_string()));
}

#[tokio::test]
async fn test_stop_shuts_everything_down() {
    let fx = fixture();
    for i in 0..3 {
        fx.supervisor
            .create("user-a", &create_payload(&format!("Table {i}")))
            .await
            .unwrap();
    }
    assert_eq!(fx.supervisor.table_count(), 3);
    fx.supervisor.stop().await.unwrap();
    assert_eq!(fx.supervisor.table_count(), 0);
}
