pub mod engine;
pub mod lockdown;
pub mod mute_scheduler;
pub mod recorder;

pub use engine::ModerationEngine;
