//! Per-player state within a single hand.

use serde::{Deserialize, Serialize};

use pokerd_shared::{Chips, Hand};

/// A player's seat, stack and name as handed to the engine when a
/// hand starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatedPlayer {
    pub user_id: String,
    pub username: String,
    /// Table seat index; fixes the canonical dealing/betting order.
    pub seat: usize,
    pub chips: Chips,
}

/// Hand-scoped state for one player.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandPlayer {
    pub user_id: String,
    pub username: String,
    pub seat: usize,
    pub hole_cards: Hand,
    /// Remaining stack.
    pub chips: Chips,
    /// Contribution on the current street.
    pub street_bet: Chips,
    /// Aggregate contribution across the whole hand.
    pub total_contribution: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub has_acted: bool,
}

impl HandPlayer {
    pub fn new(seated: SeatedPlayer) -> Self {
        Self {
            user_id: seated.user_id,
            username: seated.username,
            seat: seated.seat,
            hole_cards: Hand::new(),
            chips: seated.chips,
            street_bet: Chips::ZERO,
            total_contribution: Chips::ZERO,
            folded: false,
            all_in: false,
            has_acted: false,
        }
    }

    /// Still contesting the pot.
    pub fn is_active(&self) -> bool {
        !self.folded
    }

    /// Eligible to act this street.
    pub fn can_act(&self) -> bool {
        !self.folded && !self.all_in
    }

    /// Move up to `amount` chips from the stack into the current
    /// street. Clamps at the stack; an emptied stack flags all-in.
    /// Returns the chips actually moved.
    pub fn commit(&mut self, amount: Chips) -> Chips {
        let moved = amount.min(self.chips);
        self.chips = self.chips.saturating_sub(moved);
        self.street_bet = self.street_bet.saturating_add(moved);
        self.total_contribution = self.total_contribution.saturating_add(moved);
        if self.chips.is_zero() {
            self.all_in = true;
        }
        moved
    }
}
