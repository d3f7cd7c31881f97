//! Role-aware projection of table state.
//!
//! Everything that leaves the subsystem passes through here. Fields
//! are allow-listed per viewer role; nothing is copied wholesale from
//! the table record, so a new internal field stays internal until it
//! is deliberately projected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pokerd_engine::EngineSnapshot;
use pokerd_shared::wire::access_denied_stub;
use pokerd_shared::{Card, Chips};

use crate::table::{Table, TableStatus};

// ============================================================================
// ROLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewerRole {
    Stranger,
    Observer,
    Player,
    Creator,
}

impl ViewerRole {
    pub fn is_participant(self) -> bool {
        !matches!(self, ViewerRole::Stranger)
    }
}

/// Resolve a viewer's role at a table.
pub fn role_for(table: &Table, viewer: Option<&str>) -> ViewerRole {
    match viewer {
        Some(user_id) if user_id == table.creator_id => ViewerRole::Creator,
        Some(user_id) if table.is_seated(user_id) => ViewerRole::Player,
        Some(user_id) if table.is_observer(user_id) => ViewerRole::Observer,
        _ => ViewerRole::Stranger,
    }
}

// ============================================================================
// LISTING (stranger-safe)
// ============================================================================

/// What anyone browsing the lobby may see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableListing {
    pub id: String,
    pub name: String,
    pub variant: String,
    pub status: TableStatus,
    pub created_at: DateTime<Utc>,
    pub capacity: usize,
    pub player_count: usize,
    pub observer_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub has_space: bool,
    pub observers_allowed: bool,
    /// Withheld for private tables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub small_blind: Option<Chips>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub big_blind: Option<Chips>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_in: Option<Chips>,
}

pub fn listing_for(table: &Table) -> TableListing {
    let private = table.settings.private;
    TableListing {
        id: table.id.clone(),
        name: table.name.clone(),
        variant: table.variant.as_str().to_string(),
        status: table.status,
        created_at: table.created_at,
        capacity: table.seats.len(),
        player_count: table.player_count(),
        observer_count: table.observer_count(),
        description: table.description.clone(),
        tags: table.tags.clone(),
        has_space: table.has_space(),
        observers_allowed: table.settings.observers_allowed,
        creator_id: (!private).then(|| table.creator_id.clone()),
        room: (!private).then(|| table.room()),
        small_blind: (!private).then_some(table.settings.small_blind),
        big_blind: (!private).then_some(table.settings.big_blind),
        buy_in: (!private).then_some(table.settings.buy_in),
    }
}

// ============================================================================
// PARTICIPANT VIEW
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeatView {
    pub position: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chips: Option<Chips>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub joined_at: Option<DateTime<Utc>>,
}

/// Settings as participants see them: everything except the password,
/// plus a flag saying whether one is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsView {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub buy_in: Chips,
    pub max_buy_in: Chips,
    pub max_players: u8,
    pub auto_start: bool,
    pub turn_time_limit_secs: u64,
    pub observers_allowed: bool,
    pub private: bool,
    pub has_password: bool,
    pub tournament: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserverView {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableView {
    #[serde(flatten)]
    pub listing: TableListing,
    pub creator_id: String,
    pub room: String,
    pub seats: Vec<SeatView>,
    pub observers: Vec<ObserverView>,
    pub settings: SettingsView,
}

pub fn participant_view(table: &Table) -> TableView {
    // The flattened listing must not duplicate keys the full view
    // carries itself.
    let mut listing = listing_for(table);
    listing.creator_id = None;
    listing.room = None;
    listing.small_blind = None;
    listing.big_blind = None;
    listing.buy_in = None;
    TableView {
        listing,
        creator_id: table.creator_id.clone(),
        room: table.room(),
        seats: table
            .seats
            .iter()
            .map(|seat| SeatView {
                position: seat.position,
                user_id: seat.occupant.as_ref().map(|o| o.user_id.clone()),
                username: seat.occupant.as_ref().map(|o| o.username.clone()),
                ready: seat.occupant.as_ref().map(|o| o.ready).unwrap_or(false),
                chips: seat.occupant.as_ref().map(|o| o.chips),
                joined_at: seat.occupant.as_ref().map(|o| o.joined_at),
            })
            .collect(),
        observers: table
            .observers
            .iter()
            .map(|o| ObserverView {
                user_id: o.user_id.clone(),
                username: o.username.clone(),
            })
            .collect(),
        settings: SettingsView {
            small_blind: table.settings.small_blind,
            big_blind: table.settings.big_blind,
            buy_in: table.settings.buy_in,
            max_buy_in: table.settings.max_buy_in,
            max_players: table.settings.max_players,
            auto_start: table.settings.auto_start,
            turn_time_limit_secs: table.settings.turn_time_limit_secs,
            observers_allowed: table.settings.observers_allowed,
            private: table.settings.private,
            has_password: table.settings.password_hash.is_some(),
            tournament: table.settings.tournament,
        },
    }
}

/// Project table info for the given viewer.
pub fn table_info(table: &Table, viewer: Option<&str>) -> Value {
    let role = role_for(table, viewer);
    if role.is_participant() {
        serde_json::to_value(participant_view(table)).unwrap_or_default()
    } else {
        serde_json::to_value(listing_for(table)).unwrap_or_default()
    }
}

// ============================================================================
// GAME STATE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GamePlayerView {
    pub user_id: String,
    pub username: String,
    pub seat: usize,
    pub chips: Chips,
    pub street_bet: Chips,
    pub total_contribution: Chips,
    pub folded: bool,
    pub all_in: bool,
    /// Present only for the viewer's own seat.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hole_cards: Option<Vec<Card>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateView {
    pub round: pokerd_engine::HandRound,
    pub community: Vec<Card>,
    pub pot: Chips,
    pub current_bet: Chips,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_player: Option<String>,
    pub dealer_position: usize,
    pub players: Vec<GamePlayerView>,
    pub winners: Vec<String>,
}

/// Project engine state for the given viewer. Non-participants get an
/// access-denied stub; hole cards go only to their owner.
pub fn game_state(table: &Table, snapshot: Option<&EngineSnapshot>, viewer: Option<&str>) -> Value {
    let role = role_for(table, viewer);
    if !role.is_participant() {
        return access_denied_stub();
    }
    let Some(snapshot) = snapshot else {
        return serde_json::json!({ "round": "waiting" });
    };

    let view = GameStateView {
        round: snapshot.round,
        community: snapshot.community.clone(),
        pot: snapshot.pot,
        current_bet: snapshot.current_bet,
        current_player: snapshot.current_player.clone(),
        dealer_position: snapshot.dealer_position,
        players: snapshot
            .players
            .iter()
            .map(|p| GamePlayerView {
                user_id: p.user_id.clone(),
                username: p.username.clone(),
                seat: p.seat,
                chips: p.chips,
                street_bet: p.street_bet,
                total_contribution: p.total_contribution,
                folded: p.folded,
                all_in: p.all_in,
                hole_cards: (viewer == Some(p.user_id.as_str()))
                    .then(|| p.hole_cards.clone()),
            })
            .collect(),
        winners: snapshot.winners.clone(),
    };
    serde_json::to_value(view).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::TableSettings;
    use pokerd_engine::{GameEngine, HoldemEngine, SeatedPlayer};
    use pokerd_shared::wire::SettingsPayload;

    fn table(private: bool) -> Table {
        let settings = TableSettings::from_payload(&SettingsPayload {
            small_blind: 10,
            big_blind: 20,
            buy_in: 1000,
            observers_allowed: true,
            private,
            password: private.then(|| "s3cret".to_string()),
            ..Default::default()
        })
        .unwrap();
        let mut t = Table::new(
            "00112233aabbccdd".into(),
            "Filtered".into(),
            "creator".into(),
            Some("a test table".into()),
            vec!["casual".into()],
            settings,
        );
        t.seat_player("alice", "alice", 0).unwrap();
        t.add_observer("bob", "bob").unwrap();
        t
    }

    #[test]
    fn test_roles() {
        let t = table(false);
        assert_eq!(role_for(&t, Some("creator")), ViewerRole::Creator);
        assert_eq!(role_for(&t, Some("alice")), ViewerRole::Player);
        assert_eq!(role_for(&t, Some("bob")), ViewerRole::Observer);
        assert_eq!(role_for(&t, Some("nobody")), ViewerRole::Stranger);
        assert_eq!(role_for(&t, None), ViewerRole::Stranger);
    }

    #[test]
    fn test_password_never_emitted() {
        let t = table(true);
        for viewer in [None, Some("alice"), Some("creator"), Some("nobody")] {
            let json = serde_json::to_string(&table_info(&t, viewer)).unwrap();
            assert!(!json.contains("s3cret"));
            assert!(!json.contains("password_hash"));
        }
        // Participants do learn that a password exists.
        let view = table_info(&t, Some("alice"));
        assert_eq!(view["settings"]["has_password"], true);
    }

    #[test]
    fn test_private_table_withholds_from_strangers() {
        let t = table(true);
        let stranger = table_info(&t, None);
        assert!(stranger.get("creator_id").is_none());
        assert!(stranger.get("room").is_none());
        assert!(stranger.get("small_blind").is_none());
        assert!(stranger.get("seats").is_none());

        let public = table_info(&table(false), None);
        assert_eq!(public["creator_id"], "creator");
        assert_eq!(public["small_blind"], 10);
    }

    #[test]
    fn test_stranger_listing_fields() {
        let t = table(false);
        let listing = table_info(&t, None);
        assert_eq!(listing["id"], t.id);
        assert_eq!(listing["variant"], "texas_holdem");
        assert_eq!(listing["status"], "waiting");
        assert_eq!(listing["capacity"], 8);
        assert_eq!(listing["player_count"], 1);
        assert_eq!(listing["observer_count"], 1);
        assert_eq!(listing["has_space"], true);
        assert_eq!(listing["observers_allowed"], true);
        assert_eq!(listing["tags"][0], "casual");
        // Strangers never see the seat vector or the roster.
        assert!(listing.get("seats").is_none());
        assert!(listing.get("observers").is_none());
    }

    #[test]
    fn test_participants_see_seats_and_roster() {
        let t = table(false);
        let view = table_info(&t, Some("bob"));
        assert_eq!(view["seats"][0]["user_id"], "alice");
        assert!(view["seats"][0]["joined_at"].is_string());
        assert_eq!(view["observers"][0]["user_id"], "bob");
    }

    #[test]
    fn test_filtering_is_idempotent() {
        let t = table(true);
        for viewer in [None, Some("alice"), Some("creator")] {
            assert_eq!(table_info(&t, viewer), table_info(&t, viewer));
            assert_eq!(game_state(&t, None, viewer), game_state(&t, None, viewer));
        }
    }

    #[test]
    fn test_game_state_visibility() {
        let mut t = table(false);
        t.seat_player("carol", "carol", 0).unwrap();

        let mut engine = HoldemEngine::new(Chips(10), Chips(20));
        engine
            .start_hand(vec![
                SeatedPlayer {
                    user_id: "alice".into(),
                    username: "alice".into(),
                    seat: 0,
                    chips: Chips(1000),
                },
                SeatedPlayer {
                    user_id: "carol".into(),
                    username: "carol".into(),
                    seat: 1,
                    chips: Chips(1000),
                },
            ])
            .unwrap();
        let snapshot = engine.snapshot();

        // Strangers get the stub.
        let denied = game_state(&t, Some(&snapshot), Some("nobody"));
        assert_eq!(denied["error"], "ACCESS_DENIED");

        // A player sees their own hole cards and nobody else's.
        let alice_view = game_state(&t, Some(&snapshot), Some("alice"));
        let players = alice_view["players"].as_array().unwrap();
        let alice = players.iter().find(|p| p["user_id"] == "alice").unwrap();
        let carol = players.iter().find(|p| p["user_id"] == "carol").unwrap();
        assert_eq!(alice["hole_cards"].as_array().unwrap().len(), 2);
        assert!(carol.get("hole_cards").is_none());

        // An observer sees the public state but no hole cards at all.
        let bob_view = game_state(&t, Some(&snapshot), Some("bob"));
        for p in bob_view["players"].as_array().unwrap() {
            assert!(p.get("hole_cards").is_none());
        }
    }
}
