//! The web-cache layer's black-box half: a bounded LRU+TTL map keyed by
//! ring `Id`, single-flight origin-fetch deduplication, and a hotspot rate
//! estimator. Ownership checks, cross-node forwarding, and the HTTP surface
//! live in `dht-node`, which composes these with `dht-routing`.

pub mod hotspot;
pub mod single_flight;
pub mod store;

pub use hotspot::HotspotTracker;
pub use single_flight::{FetchResult, SingleFlight};
pub use store::{BoundedStore, CacheStats, StoredValue};
