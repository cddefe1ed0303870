//! Lightbox Cache Library
//!
//! Decoded-image cache with cost-aware LRU eviction, plus the independent
//! memory budget that gates admissions against system memory pressure.

pub mod config;
pub mod lru;
pub mod memory_budget;

pub use config::{CacheConfig, ConfigError};
pub use lru::{CacheInfo, CacheStatistics, DecodedImage, Evicted, ImageCache, ImageKey};
pub use memory_budget::{
    format_bytes, MemoryBudgetConfig, MemoryBudgetManager, MemoryStatistics, MemoryUsage,
};
