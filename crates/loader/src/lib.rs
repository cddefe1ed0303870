//! Lightbox Loader Library
//!
//! Image loading pipeline with request de-duplication and cancellation.
//!
//! This crate turns image keys into decoded, cached pixel buffers. Requests
//! for the same key are coalesced so each image decodes at most once no
//! matter how many callers ask for it; decodes run on a small worker pool,
//! results pass a memory-budget admission check before entering the cache,
//! and callers can cancel a request they no longer need. Bounded preloading
//! warms the cache for keys likely to be viewed next.
//!
//! # Example
//!
//! ```no_run
//! use lightbox_cache::{ImageCache, ImageKey, MemoryBudgetManager};
//! use lightbox_loader::{ImageLoader, LoaderConfig};
//! use std::sync::Arc;
//!
//! let cache = Arc::new(ImageCache::new(200, 256 * 1024 * 1024));
//! let budget = Arc::new(MemoryBudgetManager::with_limit_mb(512));
//! let loader = ImageLoader::with_defaults(cache, budget, LoaderConfig::default());
//!
//! // Show the current image, warm the neighbors.
//! let ticket = loader.load_image(&ImageKey::for_path("/photos/042.png"));
//! let neighbors = [
//!     ImageKey::for_path("/photos/041.png"),
//!     ImageKey::for_path("/photos/043.png"),
//! ];
//! loader.preload_images(&neighbors, 2);
//!
//! let image = ticket.wait()?;
//! println!("{}x{}", image.width(), image.height());
//! # Ok::<(), lightbox_loader::LoadError>(())
//! ```

mod cancel;
mod decode;
mod error;
mod loader;
mod queue;
mod resolver;

// Re-export public API
pub use cancel::CancellationToken;
pub use decode::{DecodeBackend, RasterDecoder};
pub use error::{LoadError, LoadResult};
pub use loader::{ImageLoader, LoadTicket, LoaderConfig};
pub use queue::{LoadPriority, LoadQueue};
pub use resolver::{FsResolver, ResourceResolver};
