//! Wire contracts: JSON request/reply envelopes, the typed request
//! union, and the broadcast event set.
//!
//! The transport delivers untyped JSON bodies; they are parsed into a
//! discriminated union keyed on `type` at this boundary so everything
//! downstream is typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::card::Card;
use crate::chips::Chips;
use crate::error::{Error, ErrorCode, Result};

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Generate a table id: 16 lowercase hex chars from a cryptographic
/// random source.
pub fn new_table_id() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Room tag for a table's broadcast channel.
pub fn room_for_table(table_id: &str) -> String {
    format!("table_{table_id}")
}

// ============================================================================
// REQUEST ENVELOPE
// ============================================================================

/// Incoming request envelope: `{type, request_id, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Settings payload as it arrives on the wire; validated before a
/// table is built from it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPayload {
    #[serde(default)]
    pub small_blind: u64,
    #[serde(default)]
    pub big_blind: u64,
    #[serde(default)]
    pub buy_in: u64,
    #[serde(default)]
    pub max_buy_in: u64,
    #[serde(default)]
    pub max_players: Option<u8>,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub turn_time_limit_secs: u64,
    #[serde(default = "default_true")]
    pub observers_allowed: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tournament: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTablePayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub settings: SettingsPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinTablePayload {
    pub table_id: String,
    /// "player" or "observer".
    #[serde(default = "default_join_mode")]
    pub mode: String,
    /// 1-based desired seat; zero or negative means auto-assign.
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_join_mode() -> String {
    "player".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableIdPayload {
    pub table_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTablesPayload {
    #[serde(default)]
    pub filters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetReadyPayload {
    pub table_id: String,
    pub ready: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameActionPayload {
    pub table_id: String,
    #[serde(default)]
    pub action: Value,
}

/// The discriminated request union, keyed on the envelope `type`.
#[derive(Debug, Clone)]
pub enum ApiRequest {
    Create(CreateTablePayload),
    Join(JoinTablePayload),
    Leave(TableIdPayload),
    List(ListTablesPayload),
    Get(TableIdPayload),
    Close(TableIdPayload),
    SetReady(SetReadyPayload),
    StartGame(TableIdPayload),
    GameAction(GameActionPayload),
    GetStats,
}

impl RequestEnvelope {
    /// Parse the envelope body into a typed request.
    pub fn parse(&self) -> Result<ApiRequest> {
        fn body<T: serde::de::DeserializeOwned>(data: &Value) -> Result<T> {
            serde_json::from_value(data.clone())
                .map_err(|e| Error::validation(format!("malformed request data: {e}")))
        }

        match self.kind.as_str() {
            "table_create" => Ok(ApiRequest::Create(body(&self.data)?)),
            "table_join" => Ok(ApiRequest::Join(body(&self.data)?)),
            "table_leave" => Ok(ApiRequest::Leave(body(&self.data)?)),
            "table_list" => Ok(ApiRequest::List(body(&self.data)?)),
            "table_get" => Ok(ApiRequest::Get(body(&self.data)?)),
            "table_close" => Ok(ApiRequest::Close(body(&self.data)?)),
            "table_set_ready" => Ok(ApiRequest::SetReady(body(&self.data)?)),
            "table_start_game" => Ok(ApiRequest::StartGame(body(&self.data)?)),
            "table_game_action" => Ok(ApiRequest::GameAction(body(&self.data)?)),
            "table_get_stats" => Ok(ApiRequest::GetStats),
            other => Err(Error::validation(format!("unknown request type: {other}"))),
        }
    }
}

// ============================================================================
// REPLY ENVELOPE
// ============================================================================

/// Outgoing reply envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplyEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

impl ReplyEnvelope {
    pub fn ok(request: &RequestEnvelope, data: Option<Value>) -> Self {
        Self {
            kind: format!("{}_response", request.kind),
            request_id: request.request_id.clone(),
            success: true,
            error: None,
            data,
            room: None,
        }
    }

    pub fn ok_in_room(request: &RequestEnvelope, data: Option<Value>, room: String) -> Self {
        Self {
            room: Some(room),
            ..Self::ok(request, data)
        }
    }

    pub fn fail(request: &RequestEnvelope, error: &Error) -> Self {
        Self {
            kind: format!("{}_response", request.kind),
            request_id: request.request_id.clone(),
            success: false,
            error: Some(error.code.as_str().to_string()),
            data: None,
            room: None,
        }
    }
}

// ============================================================================
// BROADCAST EVENTS
// ============================================================================

/// A player's revealed hand at showdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowdownHand {
    pub user_id: String,
    pub hole_cards: Vec<Card>,
    pub category: crate::eval::HandCategory,
    pub best_five: Vec<Card>,
}

/// Events broadcast to a table's room. Engine-level events carry no
/// table id; the room they are delivered to identifies the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Membership events, emitted by the table actor.
    PlayerJoined {
        table_id: String,
        user_id: String,
        username: String,
        /// Seat position; absent for observers.
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    PlayerLeft {
        table_id: String,
        user_id: String,
    },
    PlayerReadyChanged {
        table_id: String,
        user_id: String,
        ready: bool,
    },
    GameStarted {
        table_id: String,
    },
    GameFinished {
        table_id: String,
        winners: Vec<String>,
    },
    TableClosed {
        table_id: String,
    },

    // Hand events, emitted by the engine.
    HandStarted {
        dealer_position: usize,
        small_blind_position: usize,
        big_blind_position: usize,
        players: Vec<String>,
    },
    BlindsPosted {
        small_blind: Chips,
        big_blind: Chips,
        small_blind_player: String,
        big_blind_player: String,
    },
    /// Hole cards are dealt face down; the event names the recipients
    /// only. Owners see their cards through the game-state query.
    HoleCardsDealt {
        players: Vec<String>,
    },
    FlopDealt {
        cards: Vec<Card>,
    },
    TurnDealt {
        card: Card,
    },
    RiverDealt {
        card: Card,
    },
    PlayerFolded {
        user_id: String,
        timeout: bool,
    },
    PlayerCalled {
        user_id: String,
        amount: Chips,
    },
    PlayerRaised {
        user_id: String,
        amount: Chips,
        total_bet: Chips,
    },
    PlayerBet {
        user_id: String,
        amount: Chips,
    },
    PlayerChecked {
        user_id: String,
    },
    PlayerAllIn {
        user_id: String,
        amount: Chips,
        total_bet: Chips,
    },
    /// Main pot split evenly; the remainder goes to the winner closest
    /// to the dealer's left.
    PotDistributed {
        pot: Chips,
        winners: Vec<String>,
        share: Chips,
        #[serde(skip_serializing_if = "Option::is_none")]
        remainder_to: Option<String>,
    },
    Showdown {
        hands: Vec<ShowdownHand>,
    },
}

impl Event {
    /// The wire `type` tag of this event.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::PlayerJoined { .. } => "player_joined",
            Event::PlayerLeft { .. } => "player_left",
            Event::PlayerReadyChanged { .. } => "player_ready_changed",
            Event::GameStarted { .. } => "game_started",
            Event::GameFinished { .. } => "game_finished",
            Event::TableClosed { .. } => "table_closed",
            Event::HandStarted { .. } => "hand_started",
            Event::BlindsPosted { .. } => "blinds_posted",
            Event::HoleCardsDealt { .. } => "hole_cards_dealt",
            Event::FlopDealt { .. } => "flop_dealt",
            Event::TurnDealt { .. } => "turn_dealt",
            Event::RiverDealt { .. } => "river_dealt",
            Event::PlayerFolded { .. } => "player_folded",
            Event::PlayerCalled { .. } => "player_called",
            Event::PlayerRaised { .. } => "player_raised",
            Event::PlayerBet { .. } => "player_bet",
            Event::PlayerChecked { .. } => "player_checked",
            Event::PlayerAllIn { .. } => "player_all_in",
            Event::PotDistributed { .. } => "pot_distributed",
            Event::Showdown { .. } => "showdown",
        }
    }
}

/// Error stub returned to non-participants asking for game state.
pub fn access_denied_stub() -> Value {
    serde_json::json!({
        "error": ErrorCode::AccessDenied.as_str(),
        "message": "game state is only visible to table participants",
    })
}
