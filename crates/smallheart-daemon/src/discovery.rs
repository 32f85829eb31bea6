//! Channel discovery: medal affiliations to farmable channels.
//!
//! Walks the account's paginated medal list, resolves every room to its
//! canonical id and categories, and keeps the first `limit` valid entries.
//! Rooms with an unresolved (zero) category are discarded with a warning,
//! never retried.

use thiserror::Error;
use tracing::warn;

use smallheart_api::client::ApiError;
use smallheart_core::account::Account;
use smallheart_core::channel::ChannelRef;

use crate::platform::PlatformApi;

/// Errors surfaced by channel discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The server answered a different page than requested; pagination
    /// cannot be trusted, so the whole discovery pass fails.
    #[error("Medal page mismatch: requested {requested}, server answered {returned}")]
    PageMismatch { requested: u32, returned: u32 },
}

/// Discover up to `limit` valid channels for `account`.
pub async fn discover_channels<A: PlatformApi>(
    api: &A,
    account: &Account,
    limit: usize,
) -> Result<Vec<ChannelRef>, DiscoveryError> {
    let mut channels = Vec::new();
    let mut page: u32 = 1;

    loop {
        let medal_page = api.list_medals(page).await?;
        if medal_page.page_info.current_page != page {
            return Err(DiscoveryError::PageMismatch {
                requested: page,
                returned: medal_page.page_info.current_page,
            });
        }

        for medal in &medal_page.medals {
            let info = api.room_info(medal.room_id).await?;
            let channel = ChannelRef::new(info.room_id, info.parent_area_id, info.area_id);
            if !channel.is_valid() {
                warn!(
                    account = %account.name,
                    room = medal.room_id,
                    parent_category = channel.parent_category_id,
                    category = channel.category_id,
                    "Discarding channel with unresolved category"
                );
                continue;
            }
            channels.push(channel);
            if channels.len() == limit {
                return Ok(channels);
            }
        }

        if page >= medal_page.page_info.total_pages {
            break;
        }
        page += 1;
    }

    Ok(channels)
}
