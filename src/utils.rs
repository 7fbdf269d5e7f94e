//! This file contains all the helper functions for the allocator.
//! This are functions that don't particularly belong to any concrete module of the program.

/// Number of bits in a bitmap word. See [`crate::bitmap::ChunkBitmap`].
pub(crate) const BITS_PER_WORD: usize = usize::BITS as usize;

/// It aligns `to_be_aligned` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two. This is used to slide raw addresses
/// handed to us by the platform allocator, which give no alignment guarantee
/// beyond a word, up to the alignment the caller asked for.
#[inline]
pub const fn align(to_be_aligned: usize, alignment: usize) -> usize {
    (to_be_aligned + alignment - 1) & !(alignment - 1)
}

/// Number of `usize` words needed to hold one bit per chunk of a page.
#[inline]
pub(crate) const fn bitmap_words(page_size: usize, chunk_size: usize) -> usize {
    (page_size / chunk_size).div_ceil(BITS_PER_WORD)
}
