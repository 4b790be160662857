mod action;
mod guild_settings;
mod lockdown_entry;
mod mute_record;

pub use action::ActionType;
pub use guild_settings::GuildSettings;
pub use lockdown_entry::{LockdownEntry, LockdownTable, StoredLockdown};
pub use mute_record::{ActiveMuteTable, MuteDuration, MuteRecord};
