pub mod bot;
pub mod commands;
pub mod config;
pub mod constants;
pub mod db;
pub mod handlers;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;
