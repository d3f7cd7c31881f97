//! Table settings: blinds, buy-in range, pacing and privacy flags.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use pokerd_shared::wire::SettingsPayload;
use pokerd_shared::{Chips, Error, Result};

/// Seat bounds for Texas Hold'em tables.
pub const MIN_PLAYERS: u8 = 2;
pub const MAX_PLAYERS: u8 = 8;

/// Longest allowed turn timer, in seconds.
pub const MAX_TURN_TIME_SECS: u64 = 300;

/// The single supported game variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameVariant {
    TexasHoldem,
}

impl GameVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            GameVariant::TexasHoldem => "texas_holdem",
        }
    }
}

/// Validated table settings. Construction goes through
/// [`TableSettings::from_payload`]; the password is digested at that
/// point and the plaintext dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSettings {
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub buy_in: Chips,
    /// Zero means no upper bound.
    pub max_buy_in: Chips,
    pub max_players: u8,
    pub auto_start: bool,
    /// Zero means no limit.
    pub turn_time_limit_secs: u64,
    pub observers_allowed: bool,
    pub private: bool,
    /// SHA-256 digest of the password; never the plaintext.
    pub password_hash: Option<String>,
    pub tournament: bool,
}

impl TableSettings {
    /// Build settings from a wire payload. The numeric bounds here
    /// back the table invariants; the lobby validator enforces the
    /// stricter public limits before this runs.
    pub fn from_payload(payload: &SettingsPayload) -> Result<Self> {
        let max_players = payload.max_players.unwrap_or(MAX_PLAYERS);
        let settings = Self {
            small_blind: Chips(payload.small_blind),
            big_blind: Chips(payload.big_blind),
            buy_in: Chips(payload.buy_in),
            max_buy_in: Chips(payload.max_buy_in),
            max_players,
            auto_start: payload.auto_start,
            turn_time_limit_secs: payload.turn_time_limit_secs,
            observers_allowed: payload.observers_allowed,
            private: payload.private,
            password_hash: payload.password.as_deref().map(hash_password),
            tournament: payload.tournament,
        };
        settings.check()?;
        Ok(settings)
    }

    /// Structural invariants every stored settings block satisfies.
    pub fn check(&self) -> Result<()> {
        if self.small_blind < Chips(1) {
            return Err(Error::validation("small blind must be at least 1"));
        }
        if self.big_blind <= self.small_blind {
            return Err(Error::validation("big blind must exceed the small blind"));
        }
        if self.buy_in < Chips(1) {
            return Err(Error::validation("buy-in must be at least 1"));
        }
        if !self.max_buy_in.is_zero() && self.max_buy_in < self.buy_in {
            return Err(Error::validation("max buy-in must not undercut the buy-in"));
        }
        if self.max_players < MIN_PLAYERS || self.max_players > MAX_PLAYERS {
            return Err(Error::validation(format!(
                "player capacity must be between {MIN_PLAYERS} and {MAX_PLAYERS}"
            )));
        }
        if self.turn_time_limit_secs > MAX_TURN_TIME_SECS {
            return Err(Error::validation(format!(
                "turn timer must not exceed {MAX_TURN_TIME_SECS} seconds"
            )));
        }
        if self.private && self.password_hash.is_none() {
            return Err(Error::validation("private tables require a password"));
        }
        Ok(())
    }

    /// Verify a join password against the stored digest.
    pub fn password_matches(&self, candidate: &str) -> bool {
        match &self.password_hash {
            Some(stored) => *stored == hash_password(candidate),
            None => true,
        }
    }
}

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
