//! Content module - resolves navigation paths to pages and republishes them

mod page;
mod store;

pub use page::Page;
pub use store::{ContentError, ContentStore, StoreEvent, SubscriptionId};
