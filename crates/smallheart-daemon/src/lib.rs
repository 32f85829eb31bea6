//! `smallheart` Daemon
//!
//! Per-account daily engagement cycle against a live-broadcast platform:
//! a [`scheduler::DailyScheduler`] realigns each account's round of work to
//! wall-clock day boundaries, the [`orchestrator::AccountOrchestrator`]
//! composes discovery, the shared quota counter, and the
//! [`dispatcher::SessionDispatcher`], and each [`session::ChannelSession`]
//! drives one channel's handshake-plus-heartbeat protocol until the day's
//! quota is exhausted or the round is cancelled.

pub mod discovery;
pub mod dispatcher;
pub mod orchestrator;
pub mod platform;
pub mod scheduler;
pub mod session;

pub use orchestrator::{AccountOrchestrator, RoundError};
pub use platform::PlatformApi;
pub use scheduler::{DailyScheduler, DayWork, RoundOutcome};
