//! Heartbeat signing.
//!
//! The platform requires each in-channel heartbeat to carry a signature over
//! the heartbeat payload, computed under a server-supplied rule list. The
//! algorithm is pluggable through [`Signer`]; the shipped implementation is
//! [`HmacChainSigner`], which applies the published HMAC chain: the payload
//! is serialized to JSON, then each rule id selects a digest for one HMAC
//! round, the hex digest of each round feeding the next.
//!
//! Signing is a synchronous, potentially CPU-heavy computation; the API
//! client invokes it via `spawn_blocking`.

use hmac::{Hmac, Mac};
use md5::Md5;
use serde::Serialize;
use sha1::Sha1;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use thiserror::Error;

/// HMAC key of the published signing chain.
const SIGNING_KEY: &[u8] = b"axoaadsffcazxksectbbb";

/// Errors produced while computing a heartbeat signature.
#[derive(Debug, Error)]
pub enum SignError {
    #[error("Failed to serialize signing payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Unknown signing rule id: {0}")]
    UnknownRule(u8),
}

/// Fields of the in-channel heartbeat that participate in the signature,
/// in wire order.
#[derive(Debug, Clone, Serialize)]
pub struct SignPayload {
    /// `"[parent_category, category, sequence, channel]"`
    pub id: String,
    /// `"[\"device_id\", \"session_id\"]"`
    pub device: String,
    /// Expiry timestamp from the previous response.
    pub ets: i64,
    /// Benchmark/secret from the previous response.
    pub benchmark: String,
    /// Interval that was waited before this heartbeat, in seconds.
    pub time: u64,
    /// Current timestamp, milliseconds.
    pub ts: i64,
    /// User agent string, must match the request header.
    pub ua: String,
}

/// Strategy interface for the heartbeat signing function.
///
/// Implementations must be cheap to share (`Send + Sync`) and are invoked on
/// the blocking pool, so they may be computationally non-trivial.
pub trait Signer: Send + Sync {
    fn sign(&self, payload: &SignPayload, rules: &[u8]) -> Result<String, SignError>;
}

/// The published HMAC-chain signing algorithm.
#[derive(Debug, Default, Clone, Copy)]
pub struct HmacChainSigner;

macro_rules! hmac_round {
    ($alg:ty, $message:expr) => {{
        #[allow(clippy::expect_used)]
        let mut mac = Hmac::<$alg>::new_from_slice(SIGNING_KEY)
            .expect("HMAC accepts keys of any length");
        mac.update($message.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }};
}

impl Signer for HmacChainSigner {
    fn sign(&self, payload: &SignPayload, rules: &[u8]) -> Result<String, SignError> {
        let mut message = serde_json::to_string(payload)?;
        for &rule in rules {
            message = match rule {
                0 => hmac_round!(Md5, message),
                1 => hmac_round!(Sha1, message),
                2 => hmac_round!(Sha256, message),
                3 => hmac_round!(Sha224, message),
                4 => hmac_round!(Sha512, message),
                5 => hmac_round!(Sha384, message),
                other => return Err(SignError::UnknownRule(other)),
            };
        }
        Ok(message)
    }
}
