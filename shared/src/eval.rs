//! Hand evaluation: best-5-of-7 classification with a total order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::card::{Card, Rank};
use crate::error::{Error, Result};

/// Hand categories, weakest to strongest (1..10).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum HandCategory {
    HighCard = 1,
    OnePair = 2,
    TwoPair = 3,
    ThreeOfAKind = 4,
    Straight = 5,
    Flush = 6,
    FullHouse = 7,
    FourOfAKind = 8,
    StraightFlush = 9,
    RoyalFlush = 10,
}

/// The result of evaluating exactly five cards.
///
/// Ordering compares category, then the primary rank vector, then the
/// kicker vector, each lexicographically. The five source cards are
/// carried for showdown display but do not participate in ordering or
/// equality: two hands that tie on all three keys are equal and split
/// the pot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatedHand {
    pub category: HandCategory,
    /// Ranks that define the hand type (e.g. the quad rank, the two
    /// full-house ranks, all five flush ranks descending).
    pub primary: Vec<u8>,
    /// Ranks used solely to break ties within the category.
    pub kickers: Vec<u8>,
    /// The five cards this evaluation was computed from.
    pub cards: Vec<Card>,
}

impl PartialEq for EvaluatedHand {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EvaluatedHand {}

impl PartialOrd for EvaluatedHand {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvaluatedHand {
    fn cmp(&self, other: &Self) -> Ordering {
        self.category
            .cmp(&other.category)
            .then_with(|| self.primary.cmp(&other.primary))
            .then_with(|| self.kickers.cmp(&other.kickers))
    }
}

impl EvaluatedHand {
    /// Three-way comparison: +1 if self beats other, -1 if it loses,
    /// 0 on an exact tie (split pot).
    pub fn compare(&self, other: &Self) -> i8 {
        match self.cmp(other) {
            Ordering::Greater => 1,
            Ordering::Less => -1,
            Ordering::Equal => 0,
        }
    }
}

/// Evaluate exactly five cards.
pub fn evaluate(cards: &[Card]) -> Result<EvaluatedHand> {
    if cards.len() != 5 {
        return Err(Error::invalid_action(format!(
            "evaluator requires exactly 5 cards, got {}",
            cards.len()
        )));
    }

    let mut ranks: Vec<u8> = cards.iter().map(|c| c.rank.value()).collect();
    ranks.sort_by(|a, b| b.cmp(a));

    let is_flush = cards.iter().all(|c| c.suit == cards[0].suit);
    let straight_top = straight_top_rank(&ranks);

    // Count rank occurrences, grouped by (count desc, rank desc).
    let mut rank_counts: HashMap<u8, u8> = HashMap::new();
    for r in &ranks {
        *rank_counts.entry(*r).or_insert(0) += 1;
    }
    let mut counts: Vec<(u8, u8)> = rank_counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(b.0.cmp(&a.0)));
    let shape: Vec<u8> = counts.iter().map(|(_, n)| *n).collect();

    let (category, primary, kickers) = match straight_top {
        Some(top) if is_flush => {
            if top == Rank::Ace.value() {
                (HandCategory::RoyalFlush, vec![top], vec![])
            } else {
                (HandCategory::StraightFlush, vec![top], vec![])
            }
        }
        _ if shape == [4, 1] => (
            HandCategory::FourOfAKind,
            vec![counts[0].0],
            vec![counts[1].0],
        ),
        _ if shape == [3, 2] => (
            HandCategory::FullHouse,
            vec![counts[0].0, counts[1].0],
            vec![],
        ),
        _ if is_flush => (HandCategory::Flush, ranks.clone(), vec![]),
        Some(top) => (HandCategory::Straight, vec![top], vec![]),
        _ if shape == [3, 1, 1] => (
            HandCategory::ThreeOfAKind,
            vec![counts[0].0],
            vec![counts[1].0, counts[2].0],
        ),
        _ if shape == [2, 2, 1] => (
            HandCategory::TwoPair,
            vec![counts[0].0, counts[1].0],
            vec![counts[2].0],
        ),
        _ if shape == [2, 1, 1, 1] => (
            HandCategory::OnePair,
            vec![counts[0].0],
            vec![counts[1].0, counts[2].0, counts[3].0],
        ),
        _ => (HandCategory::HighCard, ranks.clone(), vec![]),
    };

    Ok(EvaluatedHand {
        category,
        primary,
        kickers,
        cards: cards.to_vec(),
    })
}

/// Evaluate the best five-card hand from 5-7 cards by enumerating all
/// 5-card subsets.
pub fn best_of(cards: &[Card]) -> Result<EvaluatedHand> {
    if cards.len() < 5 || cards.len() > 7 {
        return Err(Error::invalid_action(format!(
            "best_of requires 5-7 cards, got {}",
            cards.len()
        )));
    }

    let mut best: Option<EvaluatedHand> = None;
    for combo in combinations(cards, 5) {
        let score = evaluate(&combo)?;
        best = match best {
            Some(current) if current >= score => Some(current),
            _ => Some(score),
        };
    }
    // Non-empty: C(n, 5) >= 1 for n >= 5.
    best.ok_or_else(|| Error::invalid_action("no 5-card combination"))
}

/// Top rank of the straight formed by `ranks` (sorted descending), if
/// any. The wheel A-5-4-3-2 counts as a 5-high straight.
fn straight_top_rank(ranks: &[u8]) -> Option<u8> {
    let mut distinct = ranks.to_vec();
    distinct.dedup();
    if distinct.len() != 5 {
        return None;
    }
    if distinct[0] - distinct[4] == 4 {
        return Some(distinct[0]);
    }
    if distinct == [14, 5, 4, 3, 2] {
        return Some(5);
    }
    None
}

fn combinations(items: &[Card], k: usize) -> Vec<Vec<Card>> {
    if k == 0 {
        return vec![vec![]];
    }
    if items.len() < k {
        return vec![];
    }

    let mut result = vec![];
    for i in 0..=items.len() - k {
        let head = items[i];
        for mut tail in combinations(&items[i + 1..], k - 1) {
            tail.insert(0, head);
            result.push(tail);
        }
    }
    result
}
