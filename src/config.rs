//! Pool geometry. These values are fixed for the lifetime of a [`crate::Pool`].

use crate::{error::ConfigError, utils};

/// Size of every pool page in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 1024 * 1024;
/// Size of the only allocation unit the pool hands out.
pub const DEFAULT_CHUNK_SIZE: usize = 64;
/// Alignment of every page (and so of every chunk).
pub const DEFAULT_CHUNK_ALIGNMENT: usize = 16;
/// Number of page slots. Pages are backed lazily.
pub const DEFAULT_MAX_PAGES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    pub page_size: usize,
    pub chunk_size: usize,
    pub chunk_alignment: usize,
    pub max_pages: usize,
}

impl PoolConfig {
    pub const fn new(page_size: usize, chunk_size: usize, chunk_alignment: usize, max_pages: usize) -> Self {
        Self {
            page_size,
            chunk_size,
            chunk_alignment,
            max_pages,
        }
    }

    /// Checks the geometry. Every chunk must start on a `chunk_alignment`
    /// boundary and a page must be made of whole chunks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }

        if self.max_pages == 0 {
            return Err(ConfigError::ZeroPages);
        }

        if !self.chunk_alignment.is_power_of_two() {
            return Err(ConfigError::AlignmentNotPowerOfTwo(self.chunk_alignment));
        }

        if self.chunk_size % self.chunk_alignment != 0 {
            return Err(ConfigError::ChunkNotAligned {
                chunk_size: self.chunk_size,
                alignment: self.chunk_alignment,
            });
        }

        if self.page_size < self.chunk_size {
            return Err(ConfigError::PageTooSmall {
                page_size: self.page_size,
                chunk_size: self.chunk_size,
            });
        }

        if self.page_size % self.chunk_size != 0 {
            return Err(ConfigError::PageNotChunkMultiple {
                page_size: self.page_size,
                chunk_size: self.chunk_size,
            });
        }

        Ok(())
    }

    #[inline]
    pub fn chunks_per_page(&self) -> usize {
        self.page_size / self.chunk_size
    }

    #[inline]
    pub fn bitmap_words_per_page(&self) -> usize {
        utils::bitmap_words(self.page_size, self.chunk_size)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_PAGE_SIZE,
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_ALIGNMENT,
            DEFAULT_MAX_PAGES,
        )
    }
}
