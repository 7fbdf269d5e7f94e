use crate::utils::{BITS_PER_WORD, bitmap_words};

/// Occupancy of the chunks of one page, one bit per chunk.
///
/// ```text
///          word 0                      word 1
/// +---------------------------+---------------------------+
/// | 1 1 1 0 1 0 0 ... 0 0 0 0 | 0 0 0 0 0 ... 0 0 0 0 0 0 |
/// +---------------------------+---------------------------+
///   ^ bit 0 (chunk 0)            ^ bit 0 (chunk 64)
/// ```
///
/// A set bit means the chunk is handed out. Allocation is first-fit: the first
/// word that isn't full, then its lowest clear bit. All chunks have the same
/// size so there is nothing to gain from a smarter search.
///
/// If the number of chunks is not a multiple of the word size the tail of the
/// last word stays clear forever, we just never hand those bits out.
///
/// The bitmap has no locking of its own, it lives inside the page lock.
#[derive(Debug)]
pub(crate) struct ChunkBitmap {
    words: Box<[usize]>,
    chunks: usize,
}

impl ChunkBitmap {
    pub fn new(page_size: usize, chunk_size: usize) -> Self {
        Self {
            words: vec![0; bitmap_words(page_size, chunk_size)].into_boxed_slice(),
            chunks: page_size / chunk_size,
        }
    }

    /// Marks the first free chunk as used and returns its index, or `None` if
    /// every chunk is taken.
    pub fn allocate(&mut self) -> Option<usize> {
        let (word_index, word) = self
            .words
            .iter_mut()
            .enumerate()
            .find(|(_, word)| **word != usize::MAX)?;

        let bit_index = word.trailing_ones() as usize;
        let chunk_index = word_index * BITS_PER_WORD + bit_index;

        if chunk_index >= self.chunks {
            return None;
        }

        *word |= 1 << bit_index;

        Some(chunk_index)
    }

    /// Marks `chunk_index` as free again.
    ///
    /// Releasing a chunk that isn't in use is a double free, the caller is the
    /// one that has to make sure this never happens.
    pub fn release(&mut self, chunk_index: usize) {
        debug_assert!(chunk_index < self.chunks, "chunk {chunk_index} out of range");

        debug_assert!(self.is_used(chunk_index), "double free of chunk {chunk_index}");

        let (word_index, bit_index) = (chunk_index / BITS_PER_WORD, chunk_index % BITS_PER_WORD);
        self.words[word_index] &= !(1 << bit_index);
    }

    #[inline]
    pub fn is_used(&self, chunk_index: usize) -> bool {
        self.words[chunk_index / BITS_PER_WORD] & (1 << (chunk_index % BITS_PER_WORD)) != 0
    }

    /// Number of chunks currently in use.
    pub fn used(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|word| *word == 0)
    }

    pub fn clear(&mut self) {
        self.words.fill(0);
    }
}
