//! Texas Hold'em hand engine.
//!
//! A synchronous state machine that one table actor owns and drives:
//! blind posting, hole-card dealing, four betting streets with
//! raise-reopen and all-in handling, then a fold-to-one victory or a
//! showdown over the shared evaluator.

pub mod action;
pub mod holdem;
pub mod player;

pub use action::{parse_action, ActionKind, GameAction};
pub use holdem::{
    EngineFactory, EngineSnapshot, GameEngine, HandRound, HoldemEngine, HoldemFactory,
    PlayerSnapshot,
};
pub use player::{HandPlayer, SeatedPlayer};
