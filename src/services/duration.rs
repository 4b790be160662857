//! Duration shorthand codec (`30s`, `10m`, `5h`, `1d`).

use thiserror::Error;

pub const SECOND_MS: u64 = 1_000;
pub const MINUTE_MS: u64 = 60 * SECOND_MS;
pub const HOUR_MS: u64 = 60 * MINUTE_MS;
pub const DAY_MS: u64 = 24 * HOUR_MS;
/// Longest accepted duration (ten years)
pub const MAX_MS: u64 = 3650 * DAY_MS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DurationError {
    #[error("Invalid duration format: `{0}` (expected e.g. 30s, 10m, 5h, 1d)")]
    InvalidFormat(String),

    #[error("Duration `{0}` is too long (at most 3650 days)")]
    TooLong(String),
}

/// Parse `<integer><unit>` shorthand into milliseconds.
pub fn parse(input: &str) -> Result<u64, DurationError> {
    let invalid = || DurationError::InvalidFormat(input.to_string());
    let trimmed = input.trim();

    let unit = trimmed.chars().last().ok_or_else(invalid)?;
    let digits = &trimmed[..trimmed.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let multiplier = match unit.to_ascii_lowercase() {
        's' => SECOND_MS,
        'm' => MINUTE_MS,
        'h' => HOUR_MS,
        'd' => DAY_MS,
        _ => return Err(invalid()),
    };

    let ms = digits
        .parse::<u64>()
        .ok()
        .and_then(|n| n.checked_mul(multiplier))
        .ok_or_else(|| DurationError::TooLong(input.to_string()))?;
    if ms > MAX_MS {
        return Err(DurationError::TooLong(input.to_string()));
    }
    Ok(ms)
}

/// Time left of `total` after `elapsed`, clamped to zero.
pub fn remaining(total: u64, elapsed: i64) -> u64 {
    total.saturating_sub(elapsed.max(0) as u64)
}

/// Render milliseconds as e.g. "1 day, 2 hours".
pub fn format(ms: u64) -> String {
    let units = [
        (DAY_MS, "day"),
        (HOUR_MS, "hour"),
        (MINUTE_MS, "minute"),
        (SECOND_MS, "second"),
    ];

    let mut rest = ms;
    let mut parts = Vec::new();
    for (size, name) in units {
        let n = rest / size;
        rest %= size;
        if n > 0 {
            parts.push(format!("{} {}{}", n, name, if n == 1 { "" } else { "s" }));
        }
    }

    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(", ")
    }
}
