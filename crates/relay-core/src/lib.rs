//! Core domain + application logic for the support relay bot.
//!
//! This crate is framework-agnostic. Telegram and Redis live behind ports
//! (`MessagingPort`, `KvStore`) implemented in adapter crates.

pub mod actions;
pub mod blocklist;
pub mod broadcast;
pub mod buttons;
pub mod commands;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod logging;
pub mod messaging;
pub mod relay;
pub mod state;
pub mod store;
pub mod welcome;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
