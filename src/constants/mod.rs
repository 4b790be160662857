pub mod embeds;
pub mod permissions;
pub mod timeouts;
