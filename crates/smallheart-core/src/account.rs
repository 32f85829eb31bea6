//! Account identity and credential parsing.
//!
//! An account is configured with a display name and a raw cookie string.
//! The CSRF token (`bili_jct`) and the persistent device id (`LIVE_BUVID`)
//! are extracted from the cookie; the device id may be absent, in which case
//! the caller obtains it from the platform before constructing the account.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

#[allow(clippy::expect_used)]
static CSRF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"bili_jct=([^;]+)").expect("valid pattern"));

#[allow(clippy::expect_used)]
static DEVICE_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"LIVE_BUVID=([^;]+)").expect("valid pattern"));

/// One configured platform account. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Account {
    /// Display name, used only in log output.
    pub name: String,
    /// 1-based ordinal assigned by whoever builds the account list.
    pub index: usize,
    /// Raw cookie string, sent verbatim as the `Cookie` header.
    pub cookie: String,
    /// CSRF token extracted from the cookie.
    pub csrf: String,
    /// Persistent device id (`LIVE_BUVID`), from the cookie or the platform.
    pub device_id: String,
    /// Random session id, generated once at process start.
    pub session_id: Uuid,
}

impl Account {
    pub fn new(
        name: impl Into<String>,
        index: usize,
        cookie: impl Into<String>,
        csrf: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            index,
            cookie: cookie.into(),
            csrf: csrf.into(),
            device_id: device_id.into(),
            session_id: Uuid::new_v4(),
        }
    }
}

/// Extract the CSRF token (`bili_jct`) from a raw cookie string.
pub fn extract_csrf(cookie: &str) -> Option<String> {
    CSRF_RE
        .captures(cookie)
        .map(|c| c[1].trim().to_string())
}

/// Extract the persistent device id (`LIVE_BUVID`) from a raw cookie string.
pub fn extract_device_id(cookie: &str) -> Option<String> {
    DEVICE_ID_RE
        .captures(cookie)
        .map(|c| c[1].trim().to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const COOKIE: &str = "buvid3=abc; bili_jct=0f3c1a9e; LIVE_BUVID=AUTO42; sid=xyz";

    #[test]
    fn extracts_csrf_token() {
        assert_eq!(extract_csrf(COOKIE).as_deref(), Some("0f3c1a9e"));
    }

    #[test]
    fn extracts_device_id() {
        assert_eq!(extract_device_id(COOKIE).as_deref(), Some("AUTO42"));
    }

    #[test]
    fn csrf_works_without_trailing_semicolon() {
        assert_eq!(extract_csrf("bili_jct=tail").as_deref(), Some("tail"));
    }

    #[test]
    fn missing_fields_yield_none() {
        assert!(extract_csrf("sid=only").is_none());
        assert!(extract_device_id("sid=only").is_none());
    }

    #[test]
    fn each_account_gets_a_fresh_session_id() {
        let a = Account::new("a", 1, COOKIE, "t", "d");
        let b = Account::new("b", 2, COOKIE, "t", "d");
        assert_ne!(a.session_id, b.session_id);
    }
}
