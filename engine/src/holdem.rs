//! The Texas Hold'em hand state machine.
//!
//! Drives one hand from blind posting to a fold-to-one victory or a
//! showdown. The engine is purely synchronous and owned by exactly one
//! table actor; it never shares its deck or player state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use pokerd_shared::wire::{Event, ShowdownHand};
use pokerd_shared::{best_of, Card, Chips, Deck, Error, ErrorCode, Result, Shuffler};

use crate::action::{self, ActionKind};
use crate::player::{HandPlayer, SeatedPlayer};

// ============================================================================
// ROUNDS
// ============================================================================

/// Hand phases: waiting → preflop → flop → turn → river → showdown →
/// finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandRound {
    Waiting,
    Preflop,
    Flop,
    Turn,
    River,
    Showdown,
    Finished,
}

impl HandRound {
    /// A betting street where actions are accepted.
    pub fn accepts_actions(self) -> bool {
        matches!(
            self,
            HandRound::Preflop | HandRound::Flop | HandRound::Turn | HandRound::River
        )
    }
}

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Read-only projection of one player's hand state. Hole cards are
/// included; the data filter decides who gets to see them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub user_id: String,
    pub username: String,
    pub seat: usize,
    pub hole_cards: Vec<Card>,
    pub chips: Chips,
    pub street_bet: Chips,
    pub total_contribution: Chips,
    pub folded: bool,
    pub all_in: bool,
    pub has_acted: bool,
}

/// Read-only projection of the whole hand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub round: HandRound,
    pub community: Vec<Card>,
    pub pot: Chips,
    pub current_bet: Chips,
    pub current_player: Option<String>,
    pub dealer_position: usize,
    pub players: Vec<PlayerSnapshot>,
    pub winners: Vec<String>,
}

// ============================================================================
// VARIANT SEAM
// ============================================================================

/// The surface a table actor drives. Texas Hold'em is the only
/// variant; the trait is the seam an injected factory fills.
pub trait GameEngine: Send {
    fn variant(&self) -> &'static str;
    fn start_hand(&mut self, players: Vec<SeatedPlayer>) -> Result<Vec<Event>>;
    fn apply_action(&mut self, user_id: &str, data: &Value) -> Result<Vec<Event>>;
    /// Fold a player outside the normal action flow (departure or
    /// turn timeout).
    fn fold_player(&mut self, user_id: &str, timeout: bool) -> Result<Vec<Event>>;
    fn in_progress(&self) -> bool;
    fn current_actor(&self) -> Option<String>;
    fn snapshot(&self) -> EngineSnapshot;
}

/// Builds an engine per table.
pub trait EngineFactory: Send + Sync {
    fn create(&self, small_blind: Chips, big_blind: Chips) -> Box<dyn GameEngine>;
}

/// Default factory: entropy-shuffled Texas Hold'em.
pub struct HoldemFactory;

impl EngineFactory for HoldemFactory {
    fn create(&self, small_blind: Chips, big_blind: Chips) -> Box<dyn GameEngine> {
        Box::new(HoldemEngine::new(small_blind, big_blind))
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct HoldemEngine {
    deck: Deck,
    small_blind: Chips,
    big_blind: Chips,
    community: Vec<Card>,
    players: Vec<HandPlayer>,
    pot: Chips,
    current_bet: Chips,
    round: HandRound,
    /// Indices into `players`.
    dealer: usize,
    sb: usize,
    bb: usize,
    action_pos: usize,
    winners: Vec<String>,
    /// Seat of the last hand's dealer, for button rotation.
    last_dealer_seat: Option<usize>,
}

impl HoldemEngine {
    pub fn new(small_blind: Chips, big_blind: Chips) -> Self {
        Self::with_deck(small_blind, big_blind, Deck::new())
    }

    /// Engine over a specific deck; used with deterministic shufflers
    /// in tests and replays.
    pub fn with_deck(small_blind: Chips, big_blind: Chips, deck: Deck) -> Self {
        Self {
            deck,
            small_blind,
            big_blind,
            community: Vec::new(),
            players: Vec::new(),
            pot: Chips::ZERO,
            current_bet: Chips::ZERO,
            round: HandRound::Waiting,
            dealer: 0,
            sb: 0,
            bb: 0,
            action_pos: 0,
            winners: Vec::new(),
            last_dealer_seat: None,
        }
    }

    pub fn with_shuffler(small_blind: Chips, big_blind: Chips, shuffler: Box<dyn Shuffler>) -> Self {
        Self::with_deck(small_blind, big_blind, Deck::with_shuffler(shuffler))
    }

    // ------------------------------------------------------------------
    // Hand setup
    // ------------------------------------------------------------------

    fn do_start_hand(&mut self, seated: Vec<SeatedPlayer>) -> Result<Vec<Event>> {
        if self.round.accepts_actions() || self.round == HandRound::Showdown {
            return Err(Error::new(
                ErrorCode::GameNotInProgress,
                "a hand is already in progress",
            ));
        }

        let mut seated: Vec<SeatedPlayer> =
            seated.into_iter().filter(|p| !p.chips.is_zero()).collect();
        seated.sort_by_key(|p| p.seat);
        if seated.len() < 2 {
            return Err(Error::new(
                ErrorCode::GameNotInProgress,
                "a hand needs at least two players with chips",
            ));
        }

        self.deck.reset();
        self.community.clear();
        self.winners.clear();
        self.pot = Chips::ZERO;
        self.players = seated.into_iter().map(HandPlayer::new).collect();

        let n = self.players.len();
        self.dealer = match self.last_dealer_seat {
            // The button moves to the next occupied seat.
            Some(prev_seat) => self
                .players
                .iter()
                .position(|p| p.seat > prev_seat)
                .unwrap_or(0),
            None => 0,
        };
        self.last_dealer_seat = Some(self.players[self.dealer].seat);

        // Heads-up: the dealer posts the small blind.
        if n == 2 {
            self.sb = self.dealer;
            self.bb = (self.dealer + 1) % n;
        } else {
            self.sb = (self.dealer + 1) % n;
            self.bb = (self.dealer + 2) % n;
        }

        let mut events = vec![Event::HandStarted {
            dealer_position: self.players[self.dealer].seat,
            small_blind_position: self.players[self.sb].seat,
            big_blind_position: self.players[self.bb].seat,
            players: self.players.iter().map(|p| p.user_id.clone()).collect(),
        }];

        // Post blinds, clamped by available chips.
        let sb_paid = self.players[self.sb].commit(self.small_blind);
        let bb_paid = self.players[self.bb].commit(self.big_blind);
        self.pot = self.pot.saturating_add(sb_paid).saturating_add(bb_paid);
        events.push(Event::BlindsPosted {
            small_blind: sb_paid,
            big_blind: bb_paid,
            small_blind_player: self.players[self.sb].user_id.clone(),
            big_blind_player: self.players[self.bb].user_id.clone(),
        });

        // Two full passes starting at the small blind.
        for _ in 0..2 {
            for i in 0..n {
                let idx = (self.sb + i) % n;
                let card = self.deck.deal_one()?;
                self.players[idx].hole_cards.add(card);
            }
        }
        events.push(Event::HoleCardsDealt {
            players: self.players.iter().map(|p| p.user_id.clone()).collect(),
        });

        self.current_bet = self.big_blind;
        self.round = HandRound::Preflop;
        self.action_pos = (self.bb + 1) % n;

        debug!(
            players = n,
            dealer = self.players[self.dealer].seat,
            "hand started"
        );

        // Blind posting can leave the first actor all-in, or nobody
        // able to act at all.
        match self.next_pending_from(self.action_pos) {
            Some(idx) => self.action_pos = idx,
            None => self.finish_street(&mut events)?,
        }

        Ok(events)
    }

    // ------------------------------------------------------------------
    // Action handling
    // ------------------------------------------------------------------

    fn do_apply_action(&mut self, user_id: &str, data: &Value) -> Result<Vec<Event>> {
        if !self.round.accepts_actions() {
            return Err(Error::new(
                ErrorCode::GameNotInProgress,
                "no betting round is in progress",
            ));
        }

        action::screen_shape(data)?;

        let idx = self
            .players
            .iter()
            .position(|p| p.user_id == user_id)
            .ok_or_else(|| Error::invalid_action("player is not in this hand"))?;
        if self.players[idx].folded {
            return Err(Error::invalid_action("player has folded"));
        }
        if self.players[idx].all_in {
            return Err(Error::invalid_action("player is all-in"));
        }
        if idx != self.action_pos {
            return Err(Error::new(ErrorCode::NotPlayersTurn, "not this player's turn"));
        }

        let parsed = action::parse_action(data)?;
        let mut events = Vec::new();

        match parsed.kind {
            ActionKind::Fold => {
                self.players[idx].folded = true;
                self.players[idx].has_acted = true;
                events.push(Event::PlayerFolded {
                    user_id: user_id.to_string(),
                    timeout: false,
                });
                if self.fold_to_one(&mut events) {
                    return Ok(events);
                }
            }
            ActionKind::Call => {
                if self.current_bet <= self.players[idx].street_bet {
                    return Err(Error::invalid_action("nothing to call"));
                }
                let owed = self.current_bet.saturating_sub(self.players[idx].street_bet);
                let moved = self.players[idx].commit(owed);
                self.pot = self.pot.saturating_add(moved);
                self.players[idx].has_acted = true;
                events.push(Event::PlayerCalled {
                    user_id: user_id.to_string(),
                    amount: moved,
                });
            }
            ActionKind::Check => {
                if self.current_bet != self.players[idx].street_bet {
                    return Err(Error::invalid_action("cannot check facing a bet"));
                }
                self.players[idx].has_acted = true;
                events.push(Event::PlayerChecked {
                    user_id: user_id.to_string(),
                });
            }
            ActionKind::Bet => {
                if !self.current_bet.is_zero() {
                    return Err(Error::invalid_action("cannot bet over an existing bet"));
                }
                let amount = Chips(parsed.amount.unwrap_or(0));
                let moved = self.players[idx].commit(amount);
                self.pot = self.pot.saturating_add(moved);
                self.players[idx].has_acted = true;
                self.reopen_round(idx);
                self.current_bet = self.players[idx].street_bet;
                events.push(Event::PlayerBet {
                    user_id: user_id.to_string(),
                    amount: moved,
                });
            }
            ActionKind::Raise => {
                let amount = Chips(parsed.amount.unwrap_or(0));
                if self.current_bet.is_zero() {
                    // A raise with no bet to raise is a plain bet in
                    // disguise; the contract keeps them distinct.
                    return Err(Error::invalid_action("nothing to raise, use bet"));
                }
                let target = self.current_bet.saturating_add(amount);
                let owed = target.saturating_sub(self.players[idx].street_bet);
                // A rejected action must leave no trace; size the move
                // before touching any state.
                let would_reach = self.players[idx]
                    .street_bet
                    .saturating_add(owed.min(self.players[idx].chips));
                if would_reach <= self.current_bet {
                    return Err(Error::new(
                        ErrorCode::InsufficientChips,
                        "stack too short to raise above the current bet",
                    ));
                }
                let moved = self.players[idx].commit(owed);
                self.pot = self.pot.saturating_add(moved);
                self.players[idx].has_acted = true;
                let resulting = self.players[idx].street_bet;
                self.reopen_round(idx);
                self.current_bet = resulting;
                events.push(Event::PlayerRaised {
                    user_id: user_id.to_string(),
                    amount: moved,
                    total_bet: resulting,
                });
            }
            ActionKind::AllIn => {
                if self.players[idx].chips.is_zero() {
                    return Err(Error::new(
                        ErrorCode::InsufficientChips,
                        "no chips left to move all-in",
                    ));
                }
                let stack = self.players[idx].chips;
                let moved = self.players[idx].commit(stack);
                self.pot = self.pot.saturating_add(moved);
                self.players[idx].has_acted = true;
                let resulting = self.players[idx].street_bet;
                if resulting > self.current_bet {
                    self.reopen_round(idx);
                    self.current_bet = resulting;
                }
                events.push(Event::PlayerAllIn {
                    user_id: user_id.to_string(),
                    amount: moved,
                    total_bet: resulting,
                });
            }
        }

        self.advance_after_action(&mut events)?;
        Ok(events)
    }

    fn do_fold_player(&mut self, user_id: &str, timeout: bool) -> Result<Vec<Event>> {
        if !self.round.accepts_actions() {
            return Err(Error::new(
                ErrorCode::GameNotInProgress,
                "no betting round is in progress",
            ));
        }
        let idx = self
            .players
            .iter()
            .position(|p| p.user_id == user_id)
            .ok_or_else(|| Error::invalid_action("player is not in this hand"))?;
        if self.players[idx].folded {
            return Err(Error::invalid_action("player has already folded"));
        }

        self.players[idx].folded = true;
        self.players[idx].has_acted = true;
        let mut events = vec![Event::PlayerFolded {
            user_id: user_id.to_string(),
            timeout,
        }];
        if self.fold_to_one(&mut events) {
            return Ok(events);
        }
        // Only a fold by the player holding the turn moves the turn;
        // any other seat folding cannot complete the street, because
        // the action position always points at a pending player.
        if idx == self.action_pos {
            self.advance_after_action(&mut events)?;
        }
        Ok(events)
    }

    // ------------------------------------------------------------------
    // Round flow
    // ------------------------------------------------------------------

    /// A raise above the current bet reopens the street: everyone else
    /// still able to act must act again.
    fn reopen_round(&mut self, raiser: usize) {
        for (i, p) in self.players.iter_mut().enumerate() {
            if i != raiser && p.can_act() {
                p.has_acted = false;
            }
        }
    }

    /// Next player at or after `start` (wrapping) who still owes the
    /// street an action. None means the street is complete.
    fn next_pending_from(&self, start: usize) -> Option<usize> {
        let n = self.players.len();
        for off in 0..n {
            let idx = (start + off) % n;
            let p = &self.players[idx];
            if p.can_act() && (!p.has_acted || p.street_bet != self.current_bet) {
                return Some(idx);
            }
        }
        None
    }

    /// After an accepted action: either hand the turn to the next
    /// pending player or close out the street.
    fn advance_after_action(&mut self, events: &mut Vec<Event>) -> Result<()> {
        let n = self.players.len();
        match self.next_pending_from((self.action_pos + 1) % n) {
            Some(next) => {
                self.action_pos = next;
                Ok(())
            }
            None => self.finish_street(events),
        }
    }

    /// Close the current street and advance; keeps advancing through
    /// empty streets when everyone left is all-in.
    fn finish_street(&mut self, events: &mut Vec<Event>) -> Result<()> {
        loop {
            for p in &mut self.players {
                p.street_bet = Chips::ZERO;
                p.has_acted = false;
            }
            self.current_bet = Chips::ZERO;
            self.action_pos = self.sb;

            self.round = match self.round {
                HandRound::Preflop => {
                    self.deck.deal_one()?; // burn
                    let cards = self.deck.deal_n(3)?;
                    self.community.extend(&cards);
                    events.push(Event::FlopDealt { cards });
                    HandRound::Flop
                }
                HandRound::Flop => {
                    self.deck.deal_one()?;
                    let card = self.deck.deal_one()?;
                    self.community.push(card);
                    events.push(Event::TurnDealt { card });
                    HandRound::Turn
                }
                HandRound::Turn => {
                    self.deck.deal_one()?;
                    let card = self.deck.deal_one()?;
                    self.community.push(card);
                    events.push(Event::RiverDealt { card });
                    HandRound::River
                }
                HandRound::River => {
                    self.round = HandRound::Showdown;
                    self.showdown(events)?;
                    return Ok(());
                }
                other => {
                    return Err(Error::new(
                        ErrorCode::GameNotInProgress,
                        format!("cannot advance from round {other:?}"),
                    ));
                }
            };

            // Find the first actor of the new street; if nobody can
            // act the street is already complete, keep dealing.
            match self.next_pending_from(self.sb) {
                Some(idx) => {
                    self.action_pos = idx;
                    return Ok(());
                }
                None => continue,
            }
        }
    }

    /// If only one active player remains they win the pot outright.
    fn fold_to_one(&mut self, events: &mut Vec<Event>) -> bool {
        let active: Vec<usize> = (0..self.players.len())
            .filter(|&i| self.players[i].is_active())
            .collect();
        if active.len() != 1 {
            return false;
        }
        let winner = active[0];
        let pot = self.pot;
        self.players[winner].chips = self.players[winner].chips.saturating_add(pot);
        self.winners = vec![self.players[winner].user_id.clone()];
        events.push(Event::PotDistributed {
            pot,
            winners: self.winners.clone(),
            share: pot,
            remainder_to: None,
        });
        self.round = HandRound::Finished;
        debug!(winner = %self.players[winner].user_id, pot = %pot, "hand won by fold-out");
        true
    }

    /// Evaluate all remaining hands over exactly seven cards, split
    /// the main pot among the best, and finish the hand.
    fn showdown(&mut self, events: &mut Vec<Event>) -> Result<()> {
        let mut scored: Vec<(usize, pokerd_shared::EvaluatedHand)> = Vec::new();
        for (i, p) in self.players.iter().enumerate() {
            if !p.is_active() {
                continue;
            }
            let mut cards = p.hole_cards.cards().to_vec();
            cards.extend(&self.community);
            debug_assert_eq!(cards.len(), 7);
            scored.push((i, best_of(&cards)?));
        }

        let best = scored
            .iter()
            .map(|(_, hand)| hand.clone())
            .max()
            .ok_or_else(|| Error::new(ErrorCode::GameNotInProgress, "no hands to show down"))?;
        let winner_indices: Vec<usize> = scored
            .iter()
            .filter(|(_, hand)| hand.compare(&best) == 0)
            .map(|(i, _)| *i)
            .collect();

        events.push(Event::Showdown {
            hands: scored
                .iter()
                .map(|(i, hand)| ShowdownHand {
                    user_id: self.players[*i].user_id.clone(),
                    hole_cards: self.players[*i].hole_cards.cards().to_vec(),
                    category: hand.category,
                    best_five: hand.cards.clone(),
                })
                .collect(),
        });

        let pot = self.pot;
        let (share, remainder) = pot.split(winner_indices.len() as u64);
        for &i in &winner_indices {
            self.players[i].chips = self.players[i].chips.saturating_add(share);
        }

        // The remainder goes to the winner closest to the dealer's
        // left, scanning in seat order.
        let mut remainder_to = None;
        if !remainder.is_zero() {
            let n = self.players.len();
            for off in 1..=n {
                let idx = (self.dealer + off) % n;
                if winner_indices.contains(&idx) {
                    self.players[idx].chips = self.players[idx].chips.saturating_add(remainder);
                    remainder_to = Some(self.players[idx].user_id.clone());
                    break;
                }
            }
        }

        self.winners = winner_indices
            .iter()
            .map(|&i| self.players[i].user_id.clone())
            .collect();
        events.push(Event::PotDistributed {
            pot,
            winners: self.winners.clone(),
            share,
            remainder_to,
        });
        self.round = HandRound::Finished;
        debug!(winners = ?self.winners, pot = %pot, "showdown complete");
        Ok(())
    }
}

impl GameEngine for HoldemEngine {
    fn variant(&self) -> &'static str {
        "texas_holdem"
    }

    fn start_hand(&mut self, players: Vec<SeatedPlayer>) -> Result<Vec<Event>> {
        self.do_start_hand(players)
    }

    fn apply_action(&mut self, user_id: &str, data: &Value) -> Result<Vec<Event>> {
        self.do_apply_action(user_id, data)
    }

    fn fold_player(&mut self, user_id: &str, timeout: bool) -> Result<Vec<Event>> {
        self.do_fold_player(user_id, timeout)
    }

    fn in_progress(&self) -> bool {
        self.round.accepts_actions() || self.round == HandRound::Showdown
    }

    fn current_actor(&self) -> Option<String> {
        if self.round.accepts_actions() {
            let p = &self.players[self.action_pos];
            if p.can_act() {
                return Some(p.user_id.clone());
            }
        }
        None
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            round: self.round,
            community: self.community.clone(),
            pot: self.pot,
            current_bet: self.current_bet,
            current_player: self.current_actor(),
            dealer_position: self
                .players
                .get(self.dealer)
                .map(|p| p.seat)
                .unwrap_or_default(),
            players: self
                .players
                .iter()
                .map(|p| PlayerSnapshot {
                    user_id: p.user_id.clone(),
                    username: p.username.clone(),
                    seat: p.seat,
                    hole_cards: p.hole_cards.cards().to_vec(),
                    chips: p.chips,
                    street_bet: p.street_bet,
                    total_contribution: p.total_contribution,
                    folded: p.folded,
                    all_in: p.all_in,
                    has_acted: p.has_acted,
                })
                .collect(),
            winners: self.winners.clone(),
        }
    }
}
