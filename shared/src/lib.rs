//! Shared primitives for the poker table subsystem.
//!
//! Cards, decks, hand evaluation, chip arithmetic, the error model,
//! the wire contracts, and the transport/persistence collaborator
//! seams. Everything here is owned by no actor and shared by all of
//! them; nothing in this crate holds mutable cross-task state.

pub mod card;
pub mod chips;
pub mod deck;
pub mod error;
pub mod eval;
pub mod hand;
pub mod traits;
pub mod wire;

pub use card::{Card, Rank, Suit};
pub use chips::Chips;
pub use deck::{Deck, EntropyShuffler, SeededShuffler, Shuffler, StackedShuffler};
pub use error::{Error, ErrorCategory, ErrorCode, Result};
pub use eval::{best_of, evaluate, EvaluatedHand, HandCategory};
pub use hand::Hand;
pub use traits::{AuditLog, AuditRecord, Connection, Hub, TableRow, TableStore};
pub use wire::{
    new_table_id, room_for_table, ApiRequest, Event, ReplyEnvelope, RequestEnvelope,
};
