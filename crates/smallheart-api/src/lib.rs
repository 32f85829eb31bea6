//! Remote live-platform API client for smallheart.
//!
//! Wraps the platform's web endpoints behind [`ApiClient`]: medal listing,
//! room resolution, and the enter/in-channel heartbeat pair. Transient
//! connectivity failures are retried for a short bounded window before
//! surfacing; non-zero envelope codes surface as request errors.
//!
//! The in-channel heartbeat signature is produced by an injected [`Signer`],
//! invoked on the blocking pool so a slow signing function never stalls the
//! scheduler.

pub mod client;
pub mod signing;
pub mod types;

pub use client::{ApiClient, ApiError, obtain_device_id};
pub use signing::{HmacChainSigner, SignError, SignPayload, Signer};
pub use types::{HeartbeatState, Medal, MedalPage, PageInfo, RoomInfo};
