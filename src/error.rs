use thiserror::Error;

/// Rejections from [`crate::config::PoolConfig::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("chunk size must be greater than zero")]
    ZeroChunkSize,

    #[error("a pool needs at least one page")]
    ZeroPages,

    #[error("chunk alignment {0} is not a power of two")]
    AlignmentNotPowerOfTwo(usize),

    #[error("chunk size {chunk_size} is not a multiple of the chunk alignment {alignment}")]
    ChunkNotAligned { chunk_size: usize, alignment: usize },

    #[error("page size {page_size} is not a multiple of the chunk size {chunk_size}")]
    PageNotChunkMultiple { page_size: usize, chunk_size: usize },

    #[error("page size {page_size} cannot hold a single chunk of {chunk_size} bytes")]
    PageTooSmall { page_size: usize, chunk_size: usize },
}

/// Failures surfaced by the pool lifecycle. Allocation entry points never
/// return these, they report exhaustion as `None`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("platform allocator could not provide {requested} bytes")]
    OutOfMemory { requested: usize },

    #[error("page index {index} out of range (pool has {max_pages} pages)")]
    PageIndex { index: usize, max_pages: usize },

    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T, E = PoolError> = std::result::Result<T, E>;
