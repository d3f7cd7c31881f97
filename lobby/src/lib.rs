//! Lobby services: input validation, per-user rate limiting, and the
//! supervisor that owns every table actor.

pub mod rate_limit;
pub mod supervisor;
pub mod validator;

pub use rate_limit::{RateLimitConfig, RateLimitStats, RateLimiter};
pub use supervisor::{LobbyConfig, LobbyStats, SupervisorBuilder, TableSupervisor};
