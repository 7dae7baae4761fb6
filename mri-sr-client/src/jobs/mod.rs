//! Job cache, cached queries and mutation triggers.

pub mod cache;
pub mod events;
mod mutations;
pub mod service;

pub use cache::{CacheStats, DEFAULT_DETAIL_TTL, DEFAULT_LIST_TTL, JobCache, StoreKind, Stored};
pub use events::{InvalidateTarget, JobEvent, JobEventBroadcaster};
pub use service::JobService;
