//! An ordered container of cards held by a player or board.

use serde::{Deserialize, Serialize};

use crate::card::Card;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hand {
    cards: Vec<Card>,
}

impl Hand {
    pub fn new() -> Self {
        Self { cards: Vec::new() }
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn add(&mut self, card: Card) {
        self.cards.push(card);
    }

    pub fn clear(&mut self) {
        self.cards.clear();
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn contains(&self, card: &Card) -> bool {
        self.cards.contains(card)
    }

    /// Remove the first occurrence of `card`; false if absent.
    pub fn remove(&mut self, card: &Card) -> bool {
        match self.cards.iter().position(|c| c == card) {
            Some(idx) => {
                self.cards.remove(idx);
                true
            }
            None => false,
        }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn sort_by_rank_desc(&mut self) {
        self.cards.sort_by(|a, b| b.rank.cmp(&a.rank));
    }
}
