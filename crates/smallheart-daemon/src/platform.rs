//! Seam between the scheduler core and the remote API client.
//!
//! The daemon's round logic is generic over [`PlatformApi`] so tests can
//! substitute a scripted platform for the HTTP client.

use std::future::Future;

use smallheart_api::client::{ApiClient, ApiError};
use smallheart_api::types::{HeartbeatState, MedalPage, RoomInfo};
use smallheart_core::account::Account;
use smallheart_core::channel::ChannelRef;

/// The platform operations the daily round depends on.
///
/// All calls of one account go through a single shared instance; sessions
/// never create their own.
pub trait PlatformApi: Send + Sync + 'static {
    /// Enter-channel handshake, establishing the heartbeat cycle state.
    fn enter_channel(
        &self,
        account: &Account,
        channel: ChannelRef,
    ) -> impl Future<Output = Result<HeartbeatState, ApiError>> + Send;

    /// Signed in-channel heartbeat; returns the superseding cycle state.
    fn channel_heartbeat(
        &self,
        account: &Account,
        channel: ChannelRef,
        sequence: u32,
        state: &HeartbeatState,
    ) -> impl Future<Output = Result<HeartbeatState, ApiError>> + Send;

    /// One page of the account's medal affiliations.
    fn list_medals(&self, page: u32) -> impl Future<Output = Result<MedalPage, ApiError>> + Send;

    /// Canonical room identity and category classification.
    fn room_info(&self, room_id: u64) -> impl Future<Output = Result<RoomInfo, ApiError>> + Send;
}

impl PlatformApi for ApiClient {
    fn enter_channel(
        &self,
        account: &Account,
        channel: ChannelRef,
    ) -> impl Future<Output = Result<HeartbeatState, ApiError>> + Send {
        self.enter_channel_heartbeat(account, channel)
    }

    fn channel_heartbeat(
        &self,
        account: &Account,
        channel: ChannelRef,
        sequence: u32,
        state: &HeartbeatState,
    ) -> impl Future<Output = Result<HeartbeatState, ApiError>> + Send {
        self.in_channel_heartbeat(account, channel, sequence, state)
    }

    fn list_medals(&self, page: u32) -> impl Future<Output = Result<MedalPage, ApiError>> + Send {
        Self::list_medals(self, page)
    }

    fn room_info(&self, room_id: u64) -> impl Future<Output = Result<RoomInfo, ApiError>> + Send {
        Self::room_info(self, room_id)
    }
}
