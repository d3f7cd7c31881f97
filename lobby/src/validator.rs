//! Validation and sanitization of every public-facing string.
//!
//! Pattern screening always runs against the ORIGINAL text; sanitizing
//! is never a substitute for rejection. Offending names and
//! descriptions are rejected outright, not cleaned up.

use once_cell::sync::Lazy;
use regex::{Regex, RegexSet};

use pokerd_shared::wire::{CreateTablePayload, SettingsPayload};
use pokerd_shared::{Error, Result};
use pokerd_table::TableSettings;

// ============================================================================
// LIMITS
// ============================================================================

pub const NAME_MIN: usize = 3;
pub const NAME_MAX: usize = 100;
pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;
pub const USER_ID_MAX: usize = 100;
pub const TABLE_ID_MIN: usize = 8;
pub const TABLE_ID_MAX: usize = 32;
pub const DESCRIPTION_MAX: usize = 500;
pub const TAGS_MAX: usize = 10;
pub const TAG_LEN_MAX: usize = 20;
pub const PASSWORD_MIN: usize = 4;
pub const PASSWORD_MAX: usize = 50;
pub const BLIND_MAX: u64 = 100_000;
pub const BUY_IN_MAX: u64 = 1_000_000;
pub const TURN_TIMER_MAX: u64 = 300;

/// Keys the table-list filter map may carry.
pub const FILTER_KEYS: [&str; 8] = [
    "game_type",
    "status",
    "has_space",
    "created_by",
    "max_players",
    "min_buy_in",
    "max_buy_in",
    "tags",
];

// ============================================================================
// PATTERNS
// ============================================================================

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9 \-_.!?']{3,100}$").expect("name pattern"));
static USERNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern"));
static ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-_]+$").expect("id pattern"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9\-]+$").expect("tag pattern"));

/// Injection heuristics, matched against raw input. SQL keywords,
/// script injection, path traversal, LDAP metacharacters, command
/// chaining, format strings, and embedded nulls.
static INJECTION_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new([
        // SQL
        r"(?i)'\s*(or|and)\s*'",
        r"(?i)\b(drop|truncate|alter|create)\s+(table|database|index|view)\b",
        r"(?i)\bunion\s+select\b",
        r"(?i)\bselect\b.+\bfrom\b",
        r"(?i)\binsert\s+into\b",
        r"(?i)\bdelete\s+from\b",
        r"(?i)\bexec(ute)?\s*\(",
        r"--",
        r"/\*",
        // script injection
        r"(?i)<\s*/?\s*(script|iframe|object|embed|svg|img)\b",
        r"(?i)javascript\s*:",
        r"(?i)\bon(error|load|click|focus|mouseover)\s*=",
        r"(?i)\balert\s*\(",
        r"(?i)\bdocument\s*\.",
        // path traversal
        r"\.\./",
        r"\.\.\\",
        // LDAP
        r"\)\s*\(",
        r"\*\)",
        r"\(\s*[&|]",
        // command chaining
        r"&&",
        r"\|\|",
        r"\$\(",
        r"`",
        r"(?i);\s*(rm|cat|ls|wget|curl|sh|bash|nc|chmod|python)\b",
        // format strings
        r"%[0-9]*[sdxn]",
        // embedded null
        r"\x00",
    ])
    .expect("injection patterns")
});

/// Reject input matching any injection heuristic.
pub fn screen_injection(raw: &str, field: &str) -> Result<()> {
    if INJECTION_SET.is_match(raw) {
        return Err(Error::validation(format!(
            "{field} contains a disallowed pattern"
        )));
    }
    Ok(())
}

// ============================================================================
// SANITIZATION
// ============================================================================

/// HTML-entity escaping plus null-byte removal plus whitespace trim.
pub fn sanitize(input: &str) -> String {
    let stripped: String = input.chars().filter(|&c| c != '\0').collect();
    let trimmed = stripped.trim();
    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

// ============================================================================
// FIELD CONTRACTS
// ============================================================================

/// Table name: trimmed, 3..100 chars, safe character class, and clean
/// of injection patterns in the raw form. Returns the trimmed name.
pub fn validate_table_name(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("table name must not be empty"));
    }
    let len = trimmed.chars().count();
    if !(NAME_MIN..=NAME_MAX).contains(&len) {
        return Err(Error::validation(format!(
            "table name must be {NAME_MIN}-{NAME_MAX} characters"
        )));
    }
    screen_injection(raw, "table name")?;
    if !NAME_RE.is_match(trimmed) {
        return Err(Error::validation("table name contains invalid characters"));
    }
    Ok(trimmed.to_string())
}

pub fn validate_username(raw: &str) -> Result<()> {
    let len = raw.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) || !USERNAME_RE.is_match(raw) {
        return Err(Error::validation(
            "username must be 3-30 characters of letters, digits or underscores",
        ));
    }
    Ok(())
}

pub fn validate_user_id(raw: &str) -> Result<()> {
    let len = raw.chars().count();
    if len == 0 || len > USER_ID_MAX || !ID_RE.is_match(raw) {
        return Err(Error::validation("malformed user id"));
    }
    Ok(())
}

pub fn validate_table_id(raw: &str) -> Result<()> {
    let len = raw.chars().count();
    if !(TABLE_ID_MIN..=TABLE_ID_MAX).contains(&len) || !ID_RE.is_match(raw) {
        return Err(Error::validation("malformed table id"));
    }
    Ok(())
}

/// Optional description: the RAW text must clear the injection screen,
/// and the sanitized form must fit the length cap.
pub fn validate_description(raw: Option<&str>) -> Result<Option<String>> {
    let Some(raw) = raw else { return Ok(None) };
    screen_injection(raw, "description")?;
    let clean = sanitize(raw);
    if clean.is_empty() {
        return Ok(None);
    }
    if clean.chars().count() > DESCRIPTION_MAX {
        return Err(Error::validation(format!(
            "description must be at most {DESCRIPTION_MAX} characters"
        )));
    }
    Ok(Some(clean))
}

pub fn validate_tags(tags: &[String]) -> Result<Vec<String>> {
    if tags.len() > TAGS_MAX {
        return Err(Error::validation(format!("at most {TAGS_MAX} tags allowed")));
    }
    for tag in tags {
        let len = tag.chars().count();
        if len == 0 || len > TAG_LEN_MAX || !TAG_RE.is_match(tag) {
            return Err(Error::validation(format!("malformed tag {tag:?}")));
        }
    }
    Ok(tags.to_vec())
}

/// Password: sanitized, then 4..50 chars.
pub fn validate_password(raw: &str) -> Result<String> {
    let clean = sanitize(raw);
    let len = clean.chars().count();
    if !(PASSWORD_MIN..=PASSWORD_MAX).contains(&len) {
        return Err(Error::validation(format!(
            "password must be {PASSWORD_MIN}-{PASSWORD_MAX} characters"
        )));
    }
    Ok(clean)
}

/// Public numeric limits for table settings.
pub fn validate_settings(payload: &SettingsPayload) -> Result<()> {
    if payload.small_blind < 1 || payload.big_blind <= payload.small_blind {
        return Err(Error::validation("blinds must satisfy 1 <= small < big"));
    }
    if payload.big_blind > BLIND_MAX {
        return Err(Error::validation(format!(
            "big blind must not exceed {BLIND_MAX}"
        )));
    }
    if payload.buy_in < 1 || payload.buy_in > BUY_IN_MAX {
        return Err(Error::validation(format!(
            "buy-in must be between 1 and {BUY_IN_MAX}"
        )));
    }
    if payload.max_buy_in != 0 && payload.max_buy_in < payload.buy_in {
        return Err(Error::validation("max buy-in must not undercut the buy-in"));
    }
    if payload.turn_time_limit_secs > TURN_TIMER_MAX {
        return Err(Error::validation(format!(
            "turn timer must be between 0 and {TURN_TIMER_MAX} seconds"
        )));
    }
    Ok(())
}

/// List-filter map: every key must be recognized.
pub fn validate_filters(filters: &serde_json::Value) -> Result<()> {
    let map = filters
        .as_object()
        .ok_or_else(|| Error::validation("filters must be an object"))?;
    for key in map.keys() {
        if !FILTER_KEYS.contains(&key.as_str()) {
            return Err(Error::validation(format!("unknown filter key {key:?}")));
        }
    }
    Ok(())
}

// ============================================================================
// COMPOSITE: TABLE CREATION
// ============================================================================

/// A creation request with every field validated and sanitized.
#[derive(Debug, Clone)]
pub struct ValidatedCreate {
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub settings: TableSettings,
}

pub fn validate_create(payload: &CreateTablePayload) -> Result<ValidatedCreate> {
    let name = validate_table_name(&payload.name)?;
    let description = validate_description(payload.description.as_deref())?;
    let tags = validate_tags(&payload.tags)?;
    validate_settings(&payload.settings)?;

    let mut settings_payload = payload.settings.clone();
    if let Some(password) = settings_payload.password.as_deref() {
        settings_payload.password = Some(validate_password(password)?);
    }
    let settings = TableSettings::from_payload(&settings_payload)?;

    Ok(ValidatedCreate {
        name,
        description,
        tags,
        settings,
    })
}
