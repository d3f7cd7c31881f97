//! Error kinds shared across the table subsystem.
//!
//! Every failure carries a machine code (surfaced verbatim in the wire
//! envelope's `error` field) and a human-readable message. The category
//! dictates HTTP mapping at the gateway.

use serde::{Deserialize, Serialize};

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    TableNotFound,
    TableFull,
    TableNotJoinable,
    PlayerAlreadyAtTable,
    PlayerNotAtTable,
    PositionOccupied,
    InvalidPosition,
    ObserversNotAllowed,
    InvalidPassword,
    NotTableCreator,
    InvalidJoinMode,
    RateLimitExceeded,
    ValidationFailed,
    AccessDenied,
    GameNotInProgress,
    InvalidAction,
    NotPlayersTurn,
    InsufficientChips,
    DeckEmpty,
    Cancelled,
}

/// Coarse grouping used by the gateway to pick an HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Target does not exist (404).
    NotFound,
    /// Request conflicts with current state (409).
    Conflict,
    /// Input failed validation (400).
    Invalid,
    /// Caller lacks permission (403).
    Denied,
    /// Caller exhausted a quota (429).
    Limited,
    /// Caller's deadline fired (408).
    Cancelled,
    /// Internal fault (500).
    Internal,
}

impl ErrorCode {
    /// The wire-format spelling of the code.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::TableNotFound => "TABLE_NOT_FOUND",
            ErrorCode::TableFull => "TABLE_FULL",
            ErrorCode::TableNotJoinable => "TABLE_NOT_JOINABLE",
            ErrorCode::PlayerAlreadyAtTable => "PLAYER_ALREADY_AT_TABLE",
            ErrorCode::PlayerNotAtTable => "PLAYER_NOT_AT_TABLE",
            ErrorCode::PositionOccupied => "POSITION_OCCUPIED",
            ErrorCode::InvalidPosition => "INVALID_POSITION",
            ErrorCode::ObserversNotAllowed => "OBSERVERS_NOT_ALLOWED",
            ErrorCode::InvalidPassword => "INVALID_PASSWORD",
            ErrorCode::NotTableCreator => "NOT_TABLE_CREATOR",
            ErrorCode::InvalidJoinMode => "INVALID_JOIN_MODE",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::ValidationFailed => "VALIDATION_FAILED",
            ErrorCode::AccessDenied => "ACCESS_DENIED",
            ErrorCode::GameNotInProgress => "GAME_NOT_IN_PROGRESS",
            ErrorCode::InvalidAction => "INVALID_ACTION",
            ErrorCode::NotPlayersTurn => "NOT_PLAYERS_TURN",
            ErrorCode::InsufficientChips => "INSUFFICIENT_CHIPS",
            ErrorCode::DeckEmpty => "DECK_EMPTY",
            ErrorCode::Cancelled => "CANCELLED",
        }
    }

    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorCode::TableNotFound => ErrorCategory::NotFound,
            ErrorCode::TableFull
            | ErrorCode::TableNotJoinable
            | ErrorCode::PlayerAlreadyAtTable
            | ErrorCode::PlayerNotAtTable
            | ErrorCode::PositionOccupied
            | ErrorCode::GameNotInProgress
            | ErrorCode::NotPlayersTurn
            | ErrorCode::InsufficientChips => ErrorCategory::Conflict,
            ErrorCode::InvalidPosition
            | ErrorCode::InvalidJoinMode
            | ErrorCode::ValidationFailed
            | ErrorCode::InvalidAction => ErrorCategory::Invalid,
            ErrorCode::ObserversNotAllowed
            | ErrorCode::InvalidPassword
            | ErrorCode::NotTableCreator
            | ErrorCode::AccessDenied => ErrorCategory::Denied,
            ErrorCode::RateLimitExceeded => ErrorCategory::Limited,
            ErrorCode::Cancelled => ErrorCategory::Cancelled,
            ErrorCode::DeckEmpty => ErrorCategory::Internal,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one error type the subsystem surfaces.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_action(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidAction, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "caller deadline fired")
    }

    pub fn table_not_found(id: &str) -> Self {
        Self::new(ErrorCode::TableNotFound, format!("no such table: {id}"))
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }
}

/// Convenience alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;
