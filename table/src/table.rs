//! The table record: seats, observers, settings, and the status
//! lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use pokerd_shared::wire::room_for_table;
use pokerd_shared::{Chips, Error, ErrorCode, Result};

use crate::settings::{GameVariant, TableSettings};

// ============================================================================
// STATUS LIFECYCLE
// ============================================================================

/// Table status. Transitions form the DAG
/// waiting → active ↔ paused → finished → closed; closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Waiting,
    Active,
    Paused,
    Finished,
    Closed,
}

impl TableStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TableStatus::Waiting => "waiting",
            TableStatus::Active => "active",
            TableStatus::Paused => "paused",
            TableStatus::Finished => "finished",
            TableStatus::Closed => "closed",
        }
    }

    pub fn can_transition(self, to: TableStatus) -> bool {
        use TableStatus::*;
        matches!(
            (self, to),
            (Waiting, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Active, Finished)
                | (Paused, Finished)
                | (Finished, Closed)
                // Any live state may close directly on teardown.
                | (Waiting, Closed)
                | (Active, Closed)
                | (Paused, Closed)
        )
    }

    /// Players may only join while the table waits or is paused.
    pub fn joinable(self) -> bool {
        matches!(self, TableStatus::Waiting | TableStatus::Paused)
    }
}

// ============================================================================
// SEATS AND OBSERVERS
// ============================================================================

/// A seated player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatOccupant {
    pub user_id: String,
    pub username: String,
    pub ready: bool,
    pub chips: Chips,
    pub joined_at: DateTime<Utc>,
}

/// A fixed seat at the table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub position: usize,
    pub occupant: Option<SeatOccupant>,
}

/// A watching user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observer {
    pub user_id: String,
    pub username: String,
    pub joined_at: DateTime<Utc>,
}

// ============================================================================
// TABLE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Opaque 16-hex identifier.
    pub id: String,
    pub name: String,
    pub variant: GameVariant,
    pub creator_id: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub seats: Vec<Seat>,
    pub observers: Vec<Observer>,
    pub settings: TableSettings,
    pub status: TableStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Table {
    pub fn new(
        id: String,
        name: String,
        creator_id: String,
        description: Option<String>,
        tags: Vec<String>,
        settings: TableSettings,
    ) -> Self {
        let now = Utc::now();
        let seats = (0..settings.max_players as usize)
            .map(|position| Seat {
                position,
                occupant: None,
            })
            .collect();
        Self {
            id,
            name,
            variant: GameVariant::TexasHoldem,
            creator_id,
            description,
            tags,
            seats,
            observers: Vec::new(),
            settings,
            status: TableStatus::Waiting,
            created_at: now,
            updated_at: now,
        }
    }

    /// Room tag for broadcasts: `table_` + id.
    pub fn room(&self) -> String {
        room_for_table(&self.id)
    }

    pub fn player_count(&self) -> usize {
        self.seats.iter().filter(|s| s.occupant.is_some()).count()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn has_space(&self) -> bool {
        self.player_count() < self.seats.len()
    }

    pub fn seat_of(&self, user_id: &str) -> Option<&Seat> {
        self.seats
            .iter()
            .find(|s| s.occupant.as_ref().is_some_and(|o| o.user_id == user_id))
    }

    pub fn is_seated(&self, user_id: &str) -> bool {
        self.seat_of(user_id).is_some()
    }

    pub fn is_observer(&self, user_id: &str) -> bool {
        self.observers.iter().any(|o| o.user_id == user_id)
    }

    pub fn is_participant(&self, user_id: &str) -> bool {
        self.is_seated(user_id) || self.is_observer(user_id)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Seat a player. `desired_position` is the external 1-based seat
    /// number; zero or negative auto-assigns the first empty seat.
    pub fn seat_player(
        &mut self,
        user_id: &str,
        username: &str,
        desired_position: i64,
    ) -> Result<usize> {
        if !self.status.joinable() {
            return Err(Error::new(
                ErrorCode::TableNotJoinable,
                format!("table is {}", self.status.as_str()),
            ));
        }
        if self.is_participant(user_id) {
            return Err(Error::new(
                ErrorCode::PlayerAlreadyAtTable,
                "user is already at this table",
            ));
        }
        if !self.has_space() {
            return Err(Error::new(ErrorCode::TableFull, "all seats are taken"));
        }

        let position = if desired_position <= 0 {
            self.seats
                .iter()
                .find(|s| s.occupant.is_none())
                .map(|s| s.position)
                .ok_or_else(|| Error::new(ErrorCode::TableFull, "all seats are taken"))?
        } else {
            // External positions are 1-based.
            let internal = (desired_position - 1) as usize;
            if internal >= self.seats.len() {
                return Err(Error::new(
                    ErrorCode::InvalidPosition,
                    format!("position {desired_position} is out of range"),
                ));
            }
            if self.seats[internal].occupant.is_some() {
                return Err(Error::new(
                    ErrorCode::PositionOccupied,
                    format!("position {desired_position} is taken"),
                ));
            }
            internal
        };

        self.seats[position].occupant = Some(SeatOccupant {
            user_id: user_id.to_string(),
            username: username.to_string(),
            ready: false,
            chips: self.settings.buy_in,
            joined_at: Utc::now(),
        });
        self.touch();
        Ok(position)
    }

    /// Add an observer.
    pub fn add_observer(&mut self, user_id: &str, username: &str) -> Result<()> {
        if !self.settings.observers_allowed {
            return Err(Error::new(
                ErrorCode::ObserversNotAllowed,
                "this table does not allow observers",
            ));
        }
        if self.is_participant(user_id) {
            return Err(Error::new(
                ErrorCode::PlayerAlreadyAtTable,
                "user is already at this table",
            ));
        }
        self.observers.push(Observer {
            user_id: user_id.to_string(),
            username: username.to_string(),
            joined_at: Utc::now(),
        });
        self.touch();
        Ok(())
    }

    /// Remove a user from their seat or the observer set.
    pub fn remove_user(&mut self, user_id: &str) -> Result<()> {
        if let Some(seat) = self
            .seats
            .iter_mut()
            .find(|s| s.occupant.as_ref().is_some_and(|o| o.user_id == user_id))
        {
            seat.occupant = None;
            self.touch();
            return Ok(());
        }
        let before = self.observers.len();
        self.observers.retain(|o| o.user_id != user_id);
        if self.observers.len() != before {
            self.touch();
            return Ok(());
        }
        Err(Error::new(
            ErrorCode::PlayerNotAtTable,
            "user is not at this table",
        ))
    }

    pub fn set_ready(&mut self, user_id: &str, ready: bool) -> Result<()> {
        let seat = self
            .seats
            .iter_mut()
            .find(|s| s.occupant.as_ref().is_some_and(|o| o.user_id == user_id))
            .ok_or_else(|| Error::new(ErrorCode::PlayerNotAtTable, "user is not seated"))?;
        if let Some(occupant) = seat.occupant.as_mut() {
            occupant.ready = ready;
        }
        self.touch();
        Ok(())
    }

    pub fn transition(&mut self, to: TableStatus) -> Result<()> {
        if !self.status.can_transition(to) {
            return Err(Error::invalid_action(format!(
                "cannot move table from {} to {}",
                self.status.as_str(),
                to.as_str()
            )));
        }
        self.status = to;
        self.touch();
        Ok(())
    }

    /// Seat occupants are pairwise distinct and never double as
    /// observers. Checked by tests after every mutation path.
    pub fn membership_is_consistent(&self) -> bool {
        let mut ids = std::collections::HashSet::new();
        for seat in &self.seats {
            if let Some(occupant) = &seat.occupant {
                if !ids.insert(occupant.user_id.as_str()) {
                    return false;
                }
            }
        }
        self.observers.iter().all(|o| !ids.contains(o.user_id.as_str()))
    }
}
