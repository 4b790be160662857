/// How often the mute expiry scheduler reconciles active mutes (default)
pub const DEFAULT_MUTE_CHECK_INTERVAL_SECONDS: u64 = 60;

/// `/lockdown clear` is refused when less than this remains
pub const LOCKDOWN_CLEAR_GRACE_MS: u64 = 10_000;

/// Days of message history purged by ban and softban
pub const BAN_DELETE_MESSAGE_DAYS: u8 = 7;

/// Capacity of the lockdown expiry broadcast channel
pub const LOCKDOWN_EVENT_CAPACITY: usize = 64;

/// Delay before a lockdown timer retries after failing to persist its expiry
pub const LOCKDOWN_RETRY_MS: u64 = 30_000;
