pub mod clock;
pub mod duration;
pub mod moderation;
pub mod platform;
