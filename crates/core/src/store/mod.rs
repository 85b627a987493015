//! Durable record of channels, items and notification receipts.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteStateStore;
pub use store::{ChannelFilter, ItemFilter, StateStore, StoreError};
pub use types::{
    Channel, ChannelHealth, ChannelStats, Item, ItemCandidate, ItemStatus, NewChannel, NewReceipt,
    NotificationReceipt, ResetSummary, Watermark,
};
