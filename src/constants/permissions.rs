use serenity::all::Permissions;

/// Denied to the muted role on every channel
pub const MUTED_DENY: Permissions = Permissions::SEND_MESSAGES
    .union(Permissions::SEND_TTS_MESSAGES)
    .union(Permissions::EMBED_LINKS)
    .union(Permissions::ATTACH_FILES)
    .union(Permissions::SPEAK);

/// Denied to @everyone while a channel is locked down
pub const LOCKDOWN_DENY: Permissions = Permissions::SEND_MESSAGES;
