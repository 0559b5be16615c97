//! Resolved-URL cache with TTL eviction and a debounced on-disk snapshot.

mod persist;
mod snapshot;
mod store;

pub use persist::SnapshotWriter;
pub use snapshot::{CacheEntry, canonical_key, is_video_id};
pub use store::{CacheConfig, CacheStats, DEFAULT_DEBOUNCE, DEFAULT_TTL, VodCache};
pub(crate) use store::InFlightRequest;
