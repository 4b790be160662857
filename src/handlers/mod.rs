pub mod event_handler;
pub mod lockdown_events;
