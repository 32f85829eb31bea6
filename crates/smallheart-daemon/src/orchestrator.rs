//! Per-account orchestration of one day's round.
//!
//! The orchestrator owns everything one account needs for a round: it builds
//! the account's single shared HTTP client, discovers channels, creates the
//! day's quota counter, dispatches one session per channel, and waits for
//! quota exhaustion. On any completion path every session is cancelled and
//! the client is released after all of them have stopped.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use smallheart_api::client::{ApiClient, ApiError};
use smallheart_api::signing::Signer;
use smallheart_core::account::Account;
use smallheart_core::config::{ApiConfig, RoundConfig};
use smallheart_core::quota::QuotaCounter;

use crate::discovery::{self, DiscoveryError};
use crate::dispatcher::SessionDispatcher;
use crate::platform::PlatformApi;
use crate::scheduler::{DailyScheduler, DayWork, RoundOutcome};
use crate::session::ChannelSession;

/// Errors ending a round early. Logged by the scheduler; the next day's
/// round proceeds normally.
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("Channel discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("API client construction failed: {0}")]
    Client(#[from] ApiError),
}

/// Composes the daily scheduler, session dispatcher, and quota counter for
/// a single account. Accounts are fully independent of each other.
pub struct AccountOrchestrator {
    account: Arc<Account>,
    endpoints: ApiConfig,
    round: RoundConfig,
    signer: Arc<dyn Signer>,
}

impl AccountOrchestrator {
    pub fn new(
        account: Account,
        endpoints: ApiConfig,
        round: RoundConfig,
        signer: Arc<dyn Signer>,
    ) -> Self {
        Self {
            account: Arc::new(account),
            endpoints,
            round,
            signer,
        }
    }

    /// Run this account's daily cycle forever. The only exit is
    /// cancellation of the enclosing task.
    pub async fn run(mut self) {
        let scheduler = DailyScheduler::from_round(&self.round);
        scheduler.run(&mut self).await;
    }

    /// One day's round over an already-connected platform handle.
    ///
    /// Generic over [`PlatformApi`] so tests can drive it with a scripted
    /// platform.
    pub async fn run_round<A: PlatformApi>(
        &self,
        api: Arc<A>,
    ) -> Result<RoundOutcome, RoundError> {
        info!(
            account = %self.account.name,
            index = self.account.index,
            "Starting today's heart round"
        );

        let channels = discovery::discover_channels(
            api.as_ref(),
            &self.account,
            self.round.max_concurrent_channels,
        )
        .await?;
        if channels.is_empty() {
            warn!(
                account = %self.account.name,
                "No valid medal channels; nothing to do today"
            );
            return Ok(RoundOutcome::NothingToDo);
        }

        let quota = Arc::new(QuotaCounter::new(self.round.max_hearts_per_day));
        let mut dispatcher = SessionDispatcher::new();
        for channel in channels {
            dispatcher.dispatch(ChannelSession::new(
                Arc::clone(&self.account),
                channel,
                Arc::clone(&api),
                Arc::clone(&quota),
                &self.round,
            ));
        }
        info!(
            account = %self.account.name,
            sessions = dispatcher.len(),
            target = quota.capacity(),
            "Channel sessions dispatched"
        );

        quota.exhausted().await;
        let _ = dispatcher.shutdown().await;

        info!(
            account = %self.account.name,
            hearts = quota.claimed(),
            "Daily heart target reached"
        );
        Ok(RoundOutcome::Completed)
    }
}

impl DayWork for AccountOrchestrator {
    type Error = RoundError;

    fn round(&mut self) -> impl Future<Output = Result<RoundOutcome, Self::Error>> + Send {
        async move {
            // A fresh client per round: the shared handle lives exactly as
            // long as the day's sessions and is dropped after they stop.
            let api = Arc::new(ApiClient::new(
                &self.endpoints,
                &self.account.cookie,
                Arc::clone(&self.signer),
            )?);
            self.run_round(api).await
        }
    }

    fn on_deadline_missed(&self) {
        warn!(
            account = %self.account.name,
            index = self.account.index,
            "Today's heart round missed the end-of-day deadline"
        );
    }
}
