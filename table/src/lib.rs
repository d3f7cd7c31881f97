//! Poker tables: membership, settings, role-filtered projections, and
//! the per-table actor that serializes every mutation.

pub mod actor;
pub mod filter;
pub mod settings;
pub mod table;

pub use actor::{
    spawn_table_actor, TableCommand, TableHandle, TableNotice, COMMAND_BUFFER,
};
pub use filter::{game_state, listing_for, participant_view, role_for, table_info, ViewerRole};
pub use settings::{GameVariant, TableSettings, MAX_PLAYERS, MAX_TURN_TIME_SECS, MIN_PLAYERS};
pub use table::{Observer, Seat, SeatOccupant, Table, TableStatus};
