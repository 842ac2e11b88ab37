//! Local caching module for offline data access.
//!
//! Provides the `CacheManager` for storing the contributor roster in
//! JSON form so the dashboard has something to show before a refresh
//! completes (or without a connection). Data is considered stale after
//! 60 minutes.

pub mod manager;

pub use manager::{CacheManager, CachedData};
