//! Fixed-chunk memory pool with a heap fallback.
//!
//! Lots of small, same-sized, short-lived allocations are served from
//! [`Pool`] pages: contiguous pieces of memory split into equal chunks and
//! tracked with a bitmap. Anything else goes to a [`HeapAllocator`] that
//! supports any size and alignment on top of the platform allocator.
//!
//! ```text
//! +------------------------------------------------------------------+
//! |                              Pool                                |
//! |                                                                  |
//! |  +-----------+ +-----------+ +-----------+       +-----------+   |
//! |  |  Page 0   | |  Page 1   | |  Page 2   |  ...  |  Page N-1 |   |
//! |  | [bitmap]  | | [bitmap]  | | (no mem)  |       | (no mem)  |   |
//! |  +-----|-----+ +-----|-----+ +-----------+       +-----------+   |
//! +--------|-------------|-------------------------------------------+
//!          |             |             oversized / pool full
//!          v             v                      |
//! +------------------------------------------------------------------+
//! |                         HeapAllocator                            |
//! |           [ padding | BlockHeader | payload ... ]                |
//! +------------------------------------------------------------------+
//! |                   PlatformMemory (malloc / free)                 |
//! +------------------------------------------------------------------+
//! ```
//!
//! See [`GlobalPool`] to install a pool as the `#[global_allocator]`.

mod bitmap;
mod block;
mod page;
mod utils;

pub mod config;
pub mod error;
pub mod global;
pub mod heap;
pub mod kernel;
pub mod pool;
pub mod stats;

pub use config::PoolConfig;
pub use error::{ConfigError, PoolError};
pub use global::GlobalPool;
pub use heap::HeapAllocator;
pub use kernel::{PlatformMemory, SystemMemory};
pub use pool::Pool;
pub use stats::{PageUsage, PoolCounters, UsageReport};
