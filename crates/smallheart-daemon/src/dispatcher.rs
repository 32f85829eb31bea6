//! Session dispatch and cancellation for one day's round.

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::platform::PlatformApi;
use crate::session::{ChannelSession, SessionEnd};

/// Owns the channel-session tasks of one round.
///
/// Dropping the dispatcher aborts every session still running, so the
/// deadline path (which drops the whole round future) cancels cleanly.
pub struct SessionDispatcher {
    sessions: JoinSet<SessionEnd>,
}

impl SessionDispatcher {
    pub fn new() -> Self {
        Self {
            sessions: JoinSet::new(),
        }
    }

    /// Launch one channel session as an independently cancellable task.
    pub fn dispatch<A: PlatformApi>(&mut self, session: ChannelSession<A>) {
        let channel_id = session.channel_id();
        self.sessions.spawn(session.run());
        debug!(channel = channel_id, "Channel session task started");
    }

    /// Number of sessions launched and not yet reaped.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Cancel every still-running session and wait for all tasks to settle.
    ///
    /// Returns the terminal states of sessions that ended on their own
    /// before cancellation reached them.
    pub async fn shutdown(&mut self) -> Vec<SessionEnd> {
        self.sessions.abort_all();
        let mut ends = Vec::new();
        while let Some(result) = self.sessions.join_next().await {
            match result {
                Ok(end) => ends.push(end),
                Err(e) if e.is_cancelled() => {}
                Err(e) => warn!(error = %e, "Channel session task panicked"),
            }
        }
        ends
    }
}

impl Default for SessionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
