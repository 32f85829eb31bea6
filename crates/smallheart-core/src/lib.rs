//! `smallheart` Core Library
//!
//! Shared functionality for the smallheart daemon:
//! - Account identity and credential (cookie) parsing
//! - Channel references and validity rules
//! - The per-day quota counter shared by channel sessions
//! - Wall-clock day-window math
//! - Configuration loading and common error types

pub mod account;
pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod quota;
pub mod tracing_init;

pub use account::Account;
pub use channel::ChannelRef;
pub use config::Config;
pub use error::{Error, Result};
pub use quota::QuotaCounter;
