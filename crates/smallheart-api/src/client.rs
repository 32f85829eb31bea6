//! HTTP client for the platform's web API.
//!
//! One [`ApiClient`] is built per account per daily round and shared by all
//! of that account's channel sessions; sessions never create their own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

use smallheart_core::account::{self, Account};
use smallheart_core::channel::ChannelRef;
use smallheart_core::config::ApiConfig;

use crate::signing::{SignError, SignPayload, Signer};
use crate::types::{Envelope, HeartbeatState, MedalPage, RoomInfo, RoomInfoWrapper};

/// Browser user agent sent with every request and echoed in signed payloads.
const UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                  (KHTML, like Gecko) Chrome/83.0.4103.116 Safari/537.36";

/// Window in which transient connectivity failures are retried before
/// surfacing to the caller.
const CONNECT_RETRY_WINDOW: Duration = Duration::from_secs(5);
/// Upper bound of the random wait between connectivity retries.
const CONNECT_RETRY_JITTER_MS: u64 = 1000;

/// Medal list page size.
const MEDAL_PAGE_SIZE: u32 = 10;

/// Platform API client errors.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform reported a non-success status code in the envelope.
    #[error("Platform error ({code}): {message}")]
    Request { code: i64, message: String },

    #[error("Platform response carried no data")]
    MissingData,

    #[error("Signing failed: {0}")]
    Sign(#[from] SignError),

    #[error("Signing task failed: {0}")]
    SignOffload(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

/// Client over the platform's web endpoints, carrying one account's cookie.
pub struct ApiClient {
    http: reqwest::Client,
    endpoints: ApiConfig,
    signer: Arc<dyn Signer>,
}

impl ApiClient {
    /// Build a client with the account's cookie baked into every request.
    pub fn new(
        endpoints: &ApiConfig,
        cookie: &str,
        signer: Arc<dyn Signer>,
    ) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        let cookie_val = HeaderValue::from_str(cookie)
            .map_err(|_| ApiError::Config("cookie contains invalid header bytes".into()))?;
        headers.insert(COOKIE, cookie_val);
        let referer_val = HeaderValue::from_str(&endpoints.portal_base)
            .map_err(|_| ApiError::Config("portal base is not a valid header value".into()))?;
        headers.insert(REFERER, referer_val);
        headers.insert(USER_AGENT, HeaderValue::from_static(UA));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http,
            endpoints: endpoints.clone(),
            signer,
        })
    }

    // =========================================================================
    // Discovery endpoints
    // =========================================================================

    /// Fetch one page of the account's medal affiliations.
    pub async fn list_medals(&self, page: u32) -> Result<MedalPage, ApiError> {
        let url = format!("{}/i/api/medal", self.endpoints.api_base);
        let query = [
            ("page", page.to_string()),
            ("pageSize", MEDAL_PAGE_SIZE.to_string()),
        ];
        self.get_json(&url, &query).await
    }

    /// Resolve a room to its canonical id and category classification.
    ///
    /// Falls back to the secondary endpoint when the primary fails, matching
    /// rooms the primary endpoint cannot serve.
    pub async fn room_info(&self, room_id: u64) -> Result<RoomInfo, ApiError> {
        let url = format!("{}/room/v1/Room/get_info", self.endpoints.api_base);
        let query = [("room_id", room_id.to_string())];
        match self.get_json::<RoomInfo>(&url, &query).await {
            Ok(info) => Ok(info),
            Err(primary) => {
                debug!(room_id, error = %primary, "Primary room info failed, using fallback");
                let url = format!(
                    "{}/xlive/web-room/v1/index/getInfoByRoom",
                    self.endpoints.api_base
                );
                let wrapper: RoomInfoWrapper = self.get_json(&url, &query).await?;
                Ok(wrapper.room_info)
            }
        }
    }

    // =========================================================================
    // Heartbeat endpoints
    // =========================================================================

    /// Enter-channel handshake: the first heartbeat of a channel session.
    ///
    /// Establishes the initial interval, benchmark/secret, signing rules,
    /// and expiry for the in-channel heartbeat loop.
    pub async fn enter_channel_heartbeat(
        &self,
        account: &Account,
        channel: ChannelRef,
    ) -> Result<HeartbeatState, ApiError> {
        let url = format!(
            "{}/xlive/data-interface/v1/x25Kn/E",
            self.endpoints.trace_base
        );
        let form = [
            ("id", id_field(channel, 0)),
            ("device", device_field(account)),
            ("ts", now_ms().to_string()),
            ("is_patch", "0".to_string()),
            ("heart_beat", "[]".to_string()),
            ("ua", UA.to_string()),
            ("csrf_token", account.csrf.clone()),
            ("csrf", account.csrf.clone()),
            ("visit_id", String::new()),
        ];
        self.post_form(&url, &form, channel.channel_id).await
    }

    /// In-channel heartbeat: periodic, sequence-numbered, signed.
    ///
    /// The signature covers the payload fields plus the server-supplied rule
    /// set from the previous response; it is computed on the blocking pool.
    pub async fn in_channel_heartbeat(
        &self,
        account: &Account,
        channel: ChannelRef,
        sequence: u32,
        state: &HeartbeatState,
    ) -> Result<HeartbeatState, ApiError> {
        let payload = SignPayload {
            id: id_field(channel, sequence),
            device: device_field(account),
            ets: state.timestamp,
            benchmark: state.benchmark.clone(),
            time: state.interval_secs,
            ts: now_ms(),
            ua: UA.to_string(),
        };
        let signature = self
            .offload_sign(payload.clone(), state.signing_rules.clone())
            .await?;

        let url = format!(
            "{}/xlive/data-interface/v1/x25Kn/X",
            self.endpoints.trace_base
        );
        let form = [
            ("id", payload.id),
            ("device", payload.device),
            ("ets", payload.ets.to_string()),
            ("benchmark", payload.benchmark),
            ("time", payload.time.to_string()),
            ("ts", payload.ts.to_string()),
            ("ua", payload.ua),
            ("csrf_token", account.csrf.clone()),
            ("csrf", account.csrf.clone()),
            ("visit_id", String::new()),
            ("s", signature),
        ];
        self.post_form(&url, &form, channel.channel_id).await
    }

    /// Run the signing function on the blocking pool.
    async fn offload_sign(
        &self,
        payload: SignPayload,
        rules: Vec<u8>,
    ) -> Result<String, ApiError> {
        let signer = Arc::clone(&self.signer);
        tokio::task::spawn_blocking(move || signer.sign(&payload, &rules))
            .await
            .map_err(|e| ApiError::SignOffload(e.to_string()))?
            .map_err(ApiError::from)
    }

    // =========================================================================
    // Transport
    // =========================================================================

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let started = Instant::now();
        loop {
            match self.http.get(url).query(query).send().await {
                Ok(resp) => return take_data(resp.json().await?),
                Err(e) => self.backoff_or_fail(e, started).await?,
            }
        }
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &[(&str, String)],
        channel_id: u64,
    ) -> Result<T, ApiError> {
        let referer = format!("{}/{}", self.endpoints.portal_base, channel_id);
        let started = Instant::now();
        loop {
            let request = self
                .http
                .post(url)
                .header(REFERER, &referer)
                .form(form);
            match request.send().await {
                Ok(resp) => return take_data(resp.json().await?),
                Err(e) => self.backoff_or_fail(e, started).await?,
            }
        }
    }

    /// Sleep a jittered beat if `error` is transient and the retry window is
    /// still open; surface it otherwise.
    async fn backoff_or_fail(&self, error: reqwest::Error, started: Instant) -> Result<(), ApiError> {
        let transient = error.is_connect() || error.is_timeout();
        if !transient || started.elapsed() >= CONNECT_RETRY_WINDOW {
            return Err(ApiError::Http(error));
        }
        let jitter = rand::rng().random_range(0..=CONNECT_RETRY_JITTER_MS);
        debug!(error = %error, jitter_ms = jitter, "Transient transport failure, retrying");
        tokio::time::sleep(Duration::from_millis(jitter)).await;
        Ok(())
    }
}

/// Unwrap the platform envelope, mapping non-zero codes to request errors.
fn take_data<T>(envelope: Envelope<T>) -> Result<T, ApiError> {
    if envelope.code != 0 {
        return Err(ApiError::Request {
            code: envelope.code,
            message: envelope.message,
        });
    }
    envelope.data.ok_or(ApiError::MissingData)
}

/// The `id` form field: `[parent_category, category, sequence, channel]`.
fn id_field(channel: ChannelRef, sequence: u32) -> String {
    format!(
        "[{}, {}, {}, {}]",
        channel.parent_category_id, channel.category_id, sequence, channel.channel_id
    )
}

/// The `device` form field: `["device_id", "session_id"]`.
fn device_field(account: &Account) -> String {
    format!("[\"{}\", \"{}\"]", account.device_id, account.session_id)
}

/// Current timestamp in milliseconds, at whole-second precision as the
/// platform expects.
fn now_ms() -> i64 {
    chrono::Utc::now().timestamp() * 1000
}

/// Fetch the persistent device id from the portal for cookies that lack it.
///
/// The portal issues `LIVE_BUVID` via `Set-Cookie` on any room page.
pub async fn obtain_device_id(portal_base: &str, cookie: &str) -> Result<String, ApiError> {
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{portal_base}/3"))
        .header(COOKIE, cookie)
        .header(USER_AGENT, UA)
        .send()
        .await?;
    for value in resp.headers().get_all(reqwest::header::SET_COOKIE) {
        if let Ok(raw) = value.to_str()
            && let Some(id) = account::extract_device_id(raw)
        {
            return Ok(id);
        }
    }
    Err(ApiError::Config(
        "platform did not issue a device id".into(),
    ))
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn take_data_unwraps_success() {
        let envelope = Envelope {
            code: 0,
            message: String::new(),
            data: Some(7u32),
        };
        assert_eq!(take_data(envelope).unwrap(), 7);
    }

    #[test]
    fn take_data_maps_error_codes() {
        let envelope: Envelope<u32> = Envelope {
            code: 1011,
            message: "room is sleeping".to_string(),
            data: None,
        };
        match take_data(envelope) {
            Err(ApiError::Request { code, message }) => {
                assert_eq!(code, 1011);
                assert_eq!(message, "room is sleeping");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn take_data_rejects_success_without_data() {
        let envelope: Envelope<u32> = Envelope {
            code: 0,
            message: String::new(),
            data: None,
        };
        assert!(matches!(take_data(envelope), Err(ApiError::MissingData)));
    }

    #[test]
    fn id_field_embeds_sequence_and_channel() {
        let channel = ChannelRef::new(92_613, 1, 199);
        assert_eq!(id_field(channel, 0), "[1, 199, 0, 92613]");
        assert_eq!(id_field(channel, 17), "[1, 199, 17, 92613]");
    }

    #[test]
    fn device_field_quotes_both_ids() {
        let account = Account::new("a", 1, "cookie", "csrf", "DEV123");
        let field = device_field(&account);
        assert!(field.starts_with("[\"DEV123\", \""));
        assert!(field.ends_with("\"]"));
    }
}
