//! Wire types for the platform's JSON API.

use serde::Deserialize;

/// Standard response envelope: `{code, message, data}`. A non-zero code
/// means the request failed at the application level.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// Heartbeat cycle state returned by both heartbeat endpoints.
///
/// Every response supersedes the previous state in full: the next heartbeat
/// must use the new interval, benchmark, signing rules, and expiry.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HeartbeatState {
    /// Seconds until the next in-channel heartbeat is due.
    #[serde(rename = "heartbeat_interval")]
    pub interval_secs: u64,
    /// Expiry timestamp (`ets`) echoed back in the next heartbeat.
    pub timestamp: i64,
    /// Secret/benchmark material for the next signature.
    #[serde(rename = "secret_key")]
    pub benchmark: String,
    /// Server-supplied signing-rule set for the next signature.
    #[serde(rename = "secret_rule")]
    pub signing_rules: Vec<u8>,
}

/// One page of an account's medal affiliations.
#[derive(Debug, Deserialize)]
pub struct MedalPage {
    #[serde(rename = "pageinfo")]
    pub page_info: PageInfo,
    #[serde(rename = "fansMedalList")]
    pub medals: Vec<Medal>,
}

#[derive(Debug, Deserialize)]
pub struct PageInfo {
    #[serde(rename = "curPage")]
    pub current_page: u32,
    #[serde(rename = "totalpages")]
    pub total_pages: u32,
}

/// One medal affiliation entry. Only the room id matters here; the rest of
/// the medal metadata is not used by the daemon.
#[derive(Debug, Deserialize)]
pub struct Medal {
    #[serde(rename = "roomid")]
    pub room_id: u64,
}

/// Resolved room identity and category classification.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RoomInfo {
    /// Canonical room id (resolves short aliases).
    pub room_id: u64,
    pub parent_area_id: u64,
    pub area_id: u64,
}

/// Wrapper shape of the fallback room-info endpoint.
#[derive(Debug, Deserialize)]
pub struct RoomInfoWrapper {
    pub room_info: RoomInfo,
}
