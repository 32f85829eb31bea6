//! Channel references.

/// Resolved canonical identifier of a live channel plus its category
/// classification, as required by the heartbeat endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    /// Canonical channel id (never the short alias).
    pub channel_id: u64,
    /// Parent category id.
    pub parent_category_id: u64,
    /// Category id.
    pub category_id: u64,
}

impl ChannelRef {
    pub const fn new(channel_id: u64, parent_category_id: u64, category_id: u64) -> Self {
        Self {
            channel_id,
            parent_category_id,
            category_id,
        }
    }

    /// A channel is usable only when both category ids are resolved.
    /// Entries with a zero category id are discarded, not retried.
    pub const fn is_valid(&self) -> bool {
        self.parent_category_id != 0 && self.category_id != 0
    }
}
