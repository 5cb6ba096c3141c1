//! Generic caching layer for the post collection.
//!
//! This module provides a source-agnostic caching mechanism that:
//! - Persists a whole collection as one unit (warm) or nothing (cold)
//! - Looks up single entities by cache key in a warm collection
//! - Coalesces concurrent cold fetches into one upstream call
//! - Invalidates and repopulates on forced refresh

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{CacheStorage, CachedCollection, CorruptPolicy, FileStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, Cacheable};
