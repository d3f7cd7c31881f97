//! Untrusted action payload parsing.
//!
//! The transport hands the engine raw JSON. Everything here treats the
//! payload as adversarial: bounded traversal depth, an exact action
//! token set with no normalization, and rejection of any key the
//! contract does not name.

use serde_json::Value;

use pokerd_shared::{Error, Result};

/// Maximum nesting depth tolerated in an action payload.
const MAX_PAYLOAD_DEPTH: usize = 10;

/// The exact action tokens the engine accepts.
const ACTION_TOKENS: [&str; 6] = ["fold", "call", "raise", "bet", "check", "all_in"];

/// Keys commonly mistyped for `action`; called out explicitly.
const TYPO_KEYS: [&str; 3] = ["Action", "type", "Type"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Fold,
    Call,
    Raise,
    Bet,
    Check,
    AllIn,
}

impl ActionKind {
    fn from_token(token: &str) -> Option<ActionKind> {
        match token {
            "fold" => Some(ActionKind::Fold),
            "call" => Some(ActionKind::Call),
            "raise" => Some(ActionKind::Raise),
            "bet" => Some(ActionKind::Bet),
            "check" => Some(ActionKind::Check),
            "all_in" => Some(ActionKind::AllIn),
            _ => None,
        }
    }

    fn takes_amount(self) -> bool {
        matches!(self, ActionKind::Bet | ActionKind::Raise)
    }
}

/// A validated action, ready for the engine's context checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameAction {
    pub kind: ActionKind,
    pub amount: Option<u64>,
}

/// Structural screen alone: the payload must be an object nested no
/// deeper than the limit. Runs before any player-context checks so a
/// malformed payload never reaches them.
pub fn screen_shape(data: &Value) -> Result<()> {
    if !data.is_object() {
        return Err(Error::invalid_action("action payload must be a JSON object"));
    }
    check_depth(data, MAX_PAYLOAD_DEPTH)
}

/// Parse and screen an action payload. Context-dependent rules (turn
/// order, bet sizing against the current bet) stay with the engine.
pub fn parse_action(data: &Value) -> Result<GameAction> {
    screen_shape(data)?;
    let map = match data {
        Value::Object(map) => map,
        _ => return Err(Error::invalid_action("action payload must be a JSON object")),
    };

    for key in map.keys() {
        match key.as_str() {
            "action" | "amount" => {}
            typo if TYPO_KEYS.contains(&typo) => {
                return Err(Error::invalid_action(format!(
                    "unknown key {typo:?}: the action field is spelled \"action\""
                )));
            }
            other => {
                return Err(Error::invalid_action(format!(
                    "unknown key {other:?} in action payload"
                )));
            }
        }
    }

    let token = match map.get("action") {
        Some(Value::String(s)) => s.as_str(),
        Some(_) => return Err(Error::invalid_action("action field must be a string")),
        None => return Err(Error::invalid_action("missing action field")),
    };

    // The token must arrive already trimmed, printable ASCII, with
    // exact casing. Nothing is normalized here.
    if token.trim() != token || !token.chars().all(|c| c.is_ascii_graphic()) {
        return Err(Error::invalid_action(format!(
            "malformed action token {token:?}"
        )));
    }
    let kind = ActionKind::from_token(token).ok_or_else(|| {
        Error::invalid_action(format!(
            "unknown action {token:?}, expected one of {ACTION_TOKENS:?}"
        ))
    })?;

    let amount = match map.get("amount") {
        None => None,
        Some(value) if kind.takes_amount() => Some(parse_amount(value)?),
        Some(_) => {
            return Err(Error::invalid_action(format!(
                "{token:?} does not take an amount"
            )));
        }
    };

    if kind.takes_amount() && amount.is_none() {
        return Err(Error::invalid_action(format!("{token:?} requires an amount")));
    }

    Ok(GameAction { kind, amount })
}

/// Positive chip amount: an integer, or a finite number truncated to
/// one.
fn parse_amount(value: &Value) -> Result<u64> {
    let amount = match value {
        Value::Number(n) => {
            if let Some(i) = n.as_u64() {
                i
            } else if let Some(f) = n.as_f64() {
                if !f.is_finite() || f < 0.0 {
                    return Err(Error::invalid_action("amount must be a positive number"));
                }
                f.trunc() as u64
            } else {
                return Err(Error::invalid_action("amount must be a positive number"));
            }
        }
        _ => return Err(Error::invalid_action("amount must be a number")),
    };
    if amount == 0 {
        return Err(Error::invalid_action("amount must be greater than zero"));
    }
    Ok(amount)
}

/// Reject payloads nested deeper than `limit`. `serde_json` values are
/// acyclic by construction, so the depth bound is the whole safety
/// net against pathological input.
fn check_depth(value: &Value, limit: usize) -> Result<()> {
    if limit == 0 {
        return Err(Error::invalid_action("action payload is nested too deeply"));
    }
    match value {
        Value::Object(map) => {
            for v in map.values() {
                check_depth(v, limit - 1)?;
            }
        }
        Value::Array(items) => {
            for v in items {
                check_depth(v, limit - 1)?;
            }
        }
        _ => {}
    }
    Ok(())
}
