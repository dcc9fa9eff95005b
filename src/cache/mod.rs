//! Client-side response caching for the movie API.
//!
//! This module decides when to hit the network and when to serve from memory:
//! - `ResponseCache` holds decoded responses with per-class TTLs
//! - `Deduplicator` collapses concurrent identical requests into one
//! - `CacheLayer` combines both into a cache-first fetch
//! - keys are `scope:params` strings so a resource category can be
//!   invalidated by prefix after a mutation

mod dedup;
mod keys;
mod layer;
mod response;
mod traits;

pub use dedup::Deduplicator;
pub use keys::{CacheKey, Scope, Selector, TtlPolicy};
pub use layer::CacheLayer;
pub use response::ResponseCache;
pub use traits::{CacheResult, CacheSource};
