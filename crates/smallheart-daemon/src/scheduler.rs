//! Daily cycle scheduling.
//!
//! Runs one round of work per calendar day, realigned to wall-clock
//! midnight: the round runs under a deadline of "time to end of day minus a
//! tolerated deviation", and afterwards the scheduler sleeps until the same
//! deviation past the boundary, guaranteeing the platform's daily reset has
//! happened before the next round starts. The overnight sleep polls the
//! wall clock instead of arming one oversized timer, so a host
//! suspend/resume cannot overshoot by more than one poll period.

use std::future::Future;
use std::time::{Duration, SystemTime};

use tokio::time::{sleep, timeout};
use tracing::{debug, error, info};

use smallheart_core::clock;
use smallheart_core::config::RoundConfig;

/// How one day's round ended, short of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    /// The day's quota target was reached.
    Completed,
    /// No work was available (e.g. no valid channels discovered).
    NothingToDo,
}

/// One account's day of work, driven by [`DailyScheduler::run`].
pub trait DayWork: Send {
    type Error: std::fmt::Display + Send;

    /// Perform one day's round. Cancelled by drop when the deadline
    /// elapses; dropping must release every resource the round acquired.
    fn round(&mut self) -> impl Future<Output = Result<RoundOutcome, Self::Error>> + Send;

    /// Invoked once when a round is cut off by the end-of-day deadline.
    fn on_deadline_missed(&self);
}

/// Drives a [`DayWork`] implementation once per calendar day, forever.
#[derive(Debug, Clone, Copy)]
pub struct DailyScheduler {
    deviation: Duration,
    sleep_poll: Duration,
}

impl DailyScheduler {
    pub const fn new(deviation: Duration, sleep_poll: Duration) -> Self {
        Self {
            deviation,
            sleep_poll,
        }
    }

    pub const fn from_round(round: &RoundConfig) -> Self {
        Self::new(
            Duration::from_secs(round.deviation_secs),
            Duration::from_secs(round.sleep_poll_secs),
        )
    }

    /// Run `work` once per day, indefinitely. The only exit is cancellation
    /// of the enclosing task, which propagates from any await point here.
    pub async fn run<W: DayWork>(&self, work: &mut W) {
        loop {
            // Recomputed every iteration: never reuse a pre-sleep value.
            let budget = clock::seconds_until_day_end().saturating_sub(self.deviation);
            debug!(budget_secs = budget.as_secs(), "Starting today's round");

            match timeout(budget, work.round()).await {
                Ok(Ok(RoundOutcome::Completed)) => {
                    debug!("Round completed before the deadline");
                }
                Ok(Ok(RoundOutcome::NothingToDo)) => {
                    debug!("Round had nothing to do");
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Round failed; retrying with tomorrow's round");
                }
                Err(_) => work.on_deadline_missed(),
            }

            let overnight = clock::seconds_until_day_end() + self.deviation;
            info!(
                sleep_secs = overnight.as_secs(),
                "Sleeping past the day boundary"
            );
            self.sleep_wall_clock(overnight).await;
        }
    }

    /// Sleep approximately `duration` against the wall clock, waking every
    /// poll period to re-check. Overshoot is bounded by one poll period
    /// even across host suspend/resume.
    async fn sleep_wall_clock(&self, duration: Duration) {
        let target = SystemTime::now() + duration;
        while SystemTime::now() < target {
            sleep(self.sleep_poll).await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct CountingWork {
        rounds: Arc<AtomicU32>,
        missed: Arc<AtomicU32>,
        hang: bool,
    }

    impl DayWork for CountingWork {
        type Error = std::convert::Infallible;

        fn round(&mut self) -> impl Future<Output = Result<RoundOutcome, Self::Error>> + Send {
            let rounds = Arc::clone(&self.rounds);
            let hang = self.hang;
            async move {
                rounds.fetch_add(1, Ordering::SeqCst);
                if hang {
                    std::future::pending::<()>().await;
                }
                Ok(RoundOutcome::Completed)
            }
        }

        fn on_deadline_missed(&self) {
            self.missed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn runs_one_round_then_sleeps_until_tomorrow() {
        let rounds = Arc::new(AtomicU32::new(0));
        let missed = Arc::new(AtomicU32::new(0));
        let mut work = CountingWork {
            rounds: Arc::clone(&rounds),
            missed: Arc::clone(&missed),
            hang: false,
        };

        // Zero deviation keeps the budget positive at any time of day.
        let scheduler = DailyScheduler::new(Duration::ZERO, Duration::from_millis(10));
        let runner = tokio::spawn(async move { scheduler.run(&mut work).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.abort();

        assert_eq!(rounds.load(Ordering::SeqCst), 1);
        assert_eq!(missed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_budget_reports_missed_deadline_once() {
        let rounds = Arc::new(AtomicU32::new(0));
        let missed = Arc::new(AtomicU32::new(0));
        let mut work = CountingWork {
            rounds: Arc::clone(&rounds),
            missed: Arc::clone(&missed),
            hang: true,
        };

        // A deviation longer than any possible day remainder forces an
        // immediate deadline, cutting off the hanging round.
        let scheduler =
            DailyScheduler::new(Duration::from_secs(90_000), Duration::from_millis(10));
        let runner = tokio::spawn(async move { scheduler.run(&mut work).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.abort();

        assert_eq!(missed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wall_clock_sleep_waits_at_least_the_duration() {
        let scheduler = DailyScheduler::new(Duration::from_secs(60), Duration::from_millis(5));
        let started = std::time::Instant::now();
        scheduler.sleep_wall_clock(Duration::from_millis(30)).await;
        assert!(started.elapsed() >= Duration::from_millis(30));
    }
}
