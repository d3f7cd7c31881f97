//! Deck handling: shuffle, deal, and the shuffler seam.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::card::Card;
use crate::error::{Error, ErrorCode, Result};

/// Source of shuffle randomness. Production decks use entropy-seeded
/// randomness; tests and hand replays inject deterministic sources.
pub trait Shuffler: Send {
    fn shuffle(&mut self, cards: &mut [Card]);
}

/// Default shuffler: a fresh entropy-seeded RNG per deck instance, so
/// the shuffle order is cryptographically unpredictable.
pub struct EntropyShuffler;

impl Shuffler for EntropyShuffler {
    fn shuffle(&mut self, cards: &mut [Card]) {
        let mut rng = StdRng::from_entropy();
        cards.shuffle(&mut rng);
    }
}

/// Deterministic shuffler for tests and replays.
pub struct SeededShuffler {
    rng: ChaCha20Rng,
}

impl SeededShuffler {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }
}

impl Shuffler for SeededShuffler {
    fn shuffle(&mut self, cards: &mut [Card]) {
        cards.shuffle(&mut self.rng);
    }
}

/// Shuffler that imposes a fixed order instead of randomizing. Used to
/// stack decks in engine tests; `cards[0]` is dealt first.
pub struct StackedShuffler {
    order: Vec<Card>,
}

impl StackedShuffler {
    pub fn new(order: Vec<Card>) -> Self {
        Self { order }
    }
}

impl Shuffler for StackedShuffler {
    fn shuffle(&mut self, cards: &mut [Card]) {
        // Stack the wanted cards on top (the dealing end), keep the
        // rest of the 52 in their prior order underneath.
        let rest: Vec<Card> = cards
            .iter()
            .copied()
            .filter(|c| !self.order.contains(c))
            .collect();
        let mut stacked = rest;
        // Dealing pops from the back, so the first card to deal goes last.
        stacked.extend(self.order.iter().rev().copied());
        cards.copy_from_slice(&stacked);
    }
}

/// An ordered 52-card deck. Cards are dealt from the top; `reset`
/// restores and reshuffles the full universe.
pub struct Deck {
    cards: Vec<Card>,
    shuffler: Box<dyn Shuffler>,
}

impl Deck {
    /// Fresh shuffled deck with the default entropy shuffler.
    pub fn new() -> Self {
        Self::with_shuffler(Box::new(EntropyShuffler))
    }

    pub fn with_shuffler(shuffler: Box<dyn Shuffler>) -> Self {
        let mut deck = Self {
            cards: Vec::new(),
            shuffler,
        };
        deck.reset();
        deck
    }

    /// Restore all 52 cards and shuffle.
    pub fn reset(&mut self) {
        self.cards = (0..52).filter_map(Card::from_index).collect();
        self.shuffler.shuffle(&mut self.cards);
    }

    pub fn remaining(&self) -> usize {
        self.cards.len()
    }

    /// Deal the top card.
    pub fn deal_one(&mut self) -> Result<Card> {
        self.cards
            .pop()
            .ok_or_else(|| Error::new(ErrorCode::DeckEmpty, "deck is empty"))
    }

    /// Deal `n` cards, or fail without dealing any.
    pub fn deal_n(&mut self, n: usize) -> Result<Vec<Card>> {
        if self.cards.len() < n {
            return Err(Error::new(
                ErrorCode::DeckEmpty,
                format!("asked for {n} cards, {} remaining", self.cards.len()),
            ));
        }
        let at = self.cards.len() - n;
        let mut dealt = self.cards.split_off(at);
        dealt.reverse();
        Ok(dealt)
    }
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Deck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deck")
            .field("remaining", &self.cards.len())
            .finish()
    }
}
