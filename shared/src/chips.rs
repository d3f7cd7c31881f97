//! Chip amounts as an integer newtype.

use serde::{Deserialize, Serialize};

/// A non-negative chip amount. All arithmetic saturates; the pot can
/// never go negative and an over-bet clamps at the player's stack.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct Chips(pub u64);

impl Chips {
    pub const ZERO: Chips = Chips(0);

    pub fn saturating_add(self, other: Chips) -> Chips {
        Chips(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Chips) -> Chips {
        Chips(self.0.saturating_sub(other.0))
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Even split across `n` takers: per-share amount and remainder.
    pub fn split(self, n: u64) -> (Chips, Chips) {
        if n == 0 {
            return (Chips::ZERO, self);
        }
        (Chips(self.0 / n), Chips(self.0 % n))
    }

    pub fn min(self, other: Chips) -> Chips {
        Chips(self.0.min(other.0))
    }
}

impl std::fmt::Display for Chips {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Chips {
    fn from(value: u64) -> Self {
        Chips(value)
    }
}
