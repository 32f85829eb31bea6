//! Channel session state machine.
//!
//! One session per channel per round. A session performs the enter-channel
//! handshake, then loops: sleep the server-given interval, send the signed
//! in-channel heartbeat, adopt the superseding cycle state, and claim one
//! quota token every time enough connected time has accumulated. Transport
//! and protocol failures put the session into a fixed cooldown before it
//! re-enters the channel; only quota exhaustion, an invariant violation, or
//! cancellation by the dispatcher end it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info};

use smallheart_api::client::ApiError;
use smallheart_core::account::Account;
use smallheart_core::channel::ChannelRef;
use smallheart_core::config::RoundConfig;
use smallheart_core::quota::QuotaCounter;

use crate::platform::PlatformApi;

/// Errors ending one pass through the enter-plus-heartbeat cycle.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The enter-channel handshake failed (sequence 0).
    #[error("Enter-channel heartbeat failed: {0}")]
    Enter(#[source] ApiError),

    /// An in-channel heartbeat failed (sequence > 0).
    #[error("In-channel heartbeat {sequence} failed: {source}")]
    Heartbeat {
        sequence: u32,
        #[source]
        source: ApiError,
    },

    /// Protocol assumption breach, not an ordinary failure: credit is
    /// counted in whole heartbeats, so the server interval must evenly
    /// divide the credit interval or the session would miscount.
    #[error(
        "Server heartbeat interval {interval_secs}s does not divide \
         the credit interval {credit_interval_secs}s"
    )]
    IntervalMismatch {
        interval_secs: u64,
        credit_interval_secs: u64,
    },
}

/// Terminal state of a channel session.
#[derive(Debug)]
pub enum SessionEnd {
    /// The day's quota was exhausted; clean end.
    Exhausted,
    /// The session aborted on an invariant violation. Other sessions of the
    /// account are unaffected.
    Aborted(SessionError),
}

enum CycleEnd {
    Exhausted,
}

/// State machine driving one channel's heartbeat protocol.
pub struct ChannelSession<A> {
    account: Arc<Account>,
    channel: ChannelRef,
    api: Arc<A>,
    quota: Arc<QuotaCounter>,
    credit_interval: Duration,
    retry_cooldown: Duration,
}

impl<A: PlatformApi> ChannelSession<A> {
    pub fn new(
        account: Arc<Account>,
        channel: ChannelRef,
        api: Arc<A>,
        quota: Arc<QuotaCounter>,
        round: &RoundConfig,
    ) -> Self {
        Self {
            account,
            channel,
            api,
            quota,
            credit_interval: Duration::from_secs(round.credit_interval_secs),
            retry_cooldown: Duration::from_secs(round.retry_cooldown_secs),
        }
    }

    pub const fn channel_id(&self) -> u64 {
        self.channel.channel_id
    }

    /// Drive the session until the quota is exhausted or the session aborts
    /// on an invariant violation. Cancellation arrives as task abort from
    /// the dispatcher and unwinds from whichever await point is pending.
    pub async fn run(self) -> SessionEnd {
        loop {
            match self.cycle().await {
                Ok(CycleEnd::Exhausted) => {
                    debug!(
                        account = %self.account.name,
                        channel = self.channel.channel_id,
                        "Daily quota exhausted, session ending"
                    );
                    return SessionEnd::Exhausted;
                }
                Err(e @ SessionError::IntervalMismatch { .. }) => {
                    error!(
                        account = %self.account.name,
                        channel = self.channel.channel_id,
                        error = %e,
                        "Channel session aborted: protocol invariant violated"
                    );
                    return SessionEnd::Aborted(e);
                }
                Err(SessionError::Enter(source)) => {
                    error!(
                        account = %self.account.name,
                        channel = self.channel.channel_id,
                        error = %source,
                        "Enter-channel heartbeat failed"
                    );
                }
                Err(SessionError::Heartbeat { sequence, source }) => {
                    error!(
                        account = %self.account.name,
                        channel = self.channel.channel_id,
                        sequence,
                        error = %source,
                        "In-channel heartbeat failed"
                    );
                }
            }

            info!(
                account = %self.account.name,
                channel = self.channel.channel_id,
                cooldown_secs = self.retry_cooldown.as_secs(),
                "Retrying channel heartbeats after cooldown"
            );
            sleep(self.retry_cooldown).await;
        }
    }

    /// One pass: enter the channel, then heartbeat until a failure or the
    /// quota runs out. The sequence number resets with every re-entry.
    async fn cycle(&self) -> Result<CycleEnd, SessionError> {
        let mut state = self
            .api
            .enter_channel(&self.account, self.channel)
            .await
            .map_err(SessionError::Enter)?;
        debug!(
            account = %self.account.name,
            channel = self.channel.channel_id,
            interval_secs = state.interval_secs,
            "Entered channel"
        );

        let mut sequence: u32 = 0;
        loop {
            let interval_secs = state.interval_secs;
            sleep(Duration::from_secs(interval_secs)).await;
            sequence += 1;

            state = self
                .api
                .channel_heartbeat(&self.account, self.channel, sequence, &state)
                .await
                .map_err(|source| SessionError::Heartbeat { sequence, source })?;
            debug!(
                account = %self.account.name,
                channel = self.channel.channel_id,
                sequence,
                "Heartbeat acknowledged"
            );

            let credit_secs = self.credit_interval.as_secs();
            if interval_secs == 0 || credit_secs % interval_secs != 0 {
                return Err(SessionError::IntervalMismatch {
                    interval_secs,
                    credit_interval_secs: credit_secs,
                });
            }
            let heartbeats_per_credit = credit_secs / interval_secs;

            if u64::from(sequence) % heartbeats_per_credit == 0 {
                match self.quota.try_claim() {
                    Some(ordinal) => info!(
                        account = %self.account.name,
                        channel = self.channel.channel_id,
                        heart = ordinal,
                        target = self.quota.capacity(),
                        "Earned daily heart"
                    ),
                    None => return Ok(CycleEnd::Exhausted),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::{AtomicU32, Ordering};

    use smallheart_api::types::{HeartbeatState, MedalPage, RoomInfo};

    use super::*;

    fn cycle_state(interval_secs: u64) -> HeartbeatState {
        HeartbeatState {
            interval_secs,
            timestamp: 0,
            benchmark: "seed".to_string(),
            signing_rules: Vec::new(),
        }
    }

    fn account() -> Arc<Account> {
        Arc::new(Account::new("tester", 1, "cookie", "csrf", "dev"))
    }

    fn round(credit_interval_secs: u64) -> RoundConfig {
        RoundConfig {
            credit_interval_secs,
            retry_cooldown_secs: 60,
            ..RoundConfig::default()
        }
    }

    /// Scripted platform: configurable interval, optional scripted failures.
    struct FlakyPlatform {
        interval_secs: u64,
        /// Number of leading enter calls that fail.
        failing_enters: u32,
        /// 1-based heartbeat call ordinal that fails once, if any.
        failing_heartbeat: Option<u32>,
        enter_calls: AtomicU32,
        heartbeat_calls: AtomicU32,
    }

    impl FlakyPlatform {
        fn reliable(interval_secs: u64) -> Self {
            Self {
                interval_secs,
                failing_enters: 0,
                failing_heartbeat: None,
                enter_calls: AtomicU32::new(0),
                heartbeat_calls: AtomicU32::new(0),
            }
        }

        fn request_error() -> ApiError {
            ApiError::Request {
                code: -352,
                message: "risk control".to_string(),
            }
        }
    }

    impl PlatformApi for FlakyPlatform {
        fn enter_channel(
            &self,
            _account: &Account,
            _channel: ChannelRef,
        ) -> impl Future<Output = Result<HeartbeatState, ApiError>> + Send {
            async move {
                let call = self.enter_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= self.failing_enters {
                    Err(Self::request_error())
                } else {
                    Ok(cycle_state(self.interval_secs))
                }
            }
        }

        fn channel_heartbeat(
            &self,
            _account: &Account,
            _channel: ChannelRef,
            _sequence: u32,
            _state: &HeartbeatState,
        ) -> impl Future<Output = Result<HeartbeatState, ApiError>> + Send {
            async move {
                let call = self.heartbeat_calls.fetch_add(1, Ordering::SeqCst) + 1;
                if self.failing_heartbeat == Some(call) {
                    Err(Self::request_error())
                } else {
                    Ok(cycle_state(self.interval_secs))
                }
            }
        }

        fn list_medals(
            &self,
            _page: u32,
        ) -> impl Future<Output = Result<MedalPage, ApiError>> + Send {
            async move { panic!("not used by session tests") }
        }

        fn room_info(
            &self,
            _room_id: u64,
        ) -> impl Future<Output = Result<RoomInfo, ApiError>> + Send {
            async move { panic!("not used by session tests") }
        }
    }

    fn session(api: Arc<FlakyPlatform>, quota: Arc<QuotaCounter>) -> ChannelSession<FlakyPlatform> {
        ChannelSession::new(
            account(),
            ChannelRef::new(42, 1, 199),
            api,
            quota,
            &round(300),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn session_claims_until_exhausted() {
        // 300s credit interval at 60s heartbeats: a claim every 5th beat.
        let api = Arc::new(FlakyPlatform::reliable(60));
        let quota = Arc::new(QuotaCounter::new(1));

        let end = session(Arc::clone(&api), Arc::clone(&quota)).run().await;

        assert!(matches!(end, SessionEnd::Exhausted));
        assert_eq!(quota.claimed(), 1);
        // Claim at beat 5, empty observed at beat 10.
        assert_eq!(api.heartbeat_calls.load(Ordering::SeqCst), 10);
        assert_eq!(api.enter_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn enter_failures_retry_until_success() {
        let api = Arc::new(FlakyPlatform {
            failing_enters: 2,
            ..FlakyPlatform::reliable(60)
        });
        let quota = Arc::new(QuotaCounter::new(1));

        let end = session(Arc::clone(&api), quota).run().await;

        assert!(matches!(end, SessionEnd::Exhausted));
        assert_eq!(api.enter_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeat_failure_reenters_with_sequence_reset() {
        let api = Arc::new(FlakyPlatform {
            failing_heartbeat: Some(3),
            ..FlakyPlatform::reliable(60)
        });
        let quota = Arc::new(QuotaCounter::new(1));

        let end = session(Arc::clone(&api), Arc::clone(&quota)).run().await;

        assert!(matches!(end, SessionEnd::Exhausted));
        // Failure forces a second handshake; the credit still lands.
        assert_eq!(api.enter_calls.load(Ordering::SeqCst), 2);
        assert_eq!(quota.claimed(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn indivisible_interval_aborts_the_session() {
        // 300 % 70 != 0: counting credit would drift.
        let api = Arc::new(FlakyPlatform::reliable(70));
        let quota = Arc::new(QuotaCounter::new(24));

        let end = session(Arc::clone(&api), Arc::clone(&quota)).run().await;

        match end {
            SessionEnd::Aborted(SessionError::IntervalMismatch {
                interval_secs,
                credit_interval_secs,
            }) => {
                assert_eq!(interval_secs, 70);
                assert_eq!(credit_interval_secs, 300);
            }
            other => panic!("expected interval mismatch, got {other:?}"),
        }
        // The violation is detected on the first heartbeat; nothing claimed.
        assert_eq!(api.heartbeat_calls.load(Ordering::SeqCst), 1);
        assert_eq!(quota.claimed(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_is_an_invariant_violation() {
        let api = Arc::new(FlakyPlatform::reliable(0));
        let quota = Arc::new(QuotaCounter::new(24));

        let end = session(api, quota).run().await;
        assert!(matches!(
            end,
            SessionEnd::Aborted(SessionError::IntervalMismatch { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn session_observing_empty_quota_ends_cleanly() {
        let api = Arc::new(FlakyPlatform::reliable(60));
        let quota = Arc::new(QuotaCounter::new(2));
        quota.try_claim();
        quota.try_claim();

        let end = session(Arc::clone(&api), quota).run().await;

        assert!(matches!(end, SessionEnd::Exhausted));
        // First claim attempt (beat 5) already observes empty.
        assert_eq!(api.heartbeat_calls.load(Ordering::SeqCst), 5);
    }
}
