//! Scope-local ID allocation.
//!
//! Every protection domain owns two allocators: one for child-domain IDs and one for
//! channel slots (shared by channel ends and IRQs). The allocator is the only place an ID is
//! marked as used, so every serialized ID is unique within its scope.

use crate::common::constants::MAX_ID;

/// Why an allocation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Every ID in the legal range is taken.
    Exhausted,
    /// The requested ID is already taken.
    Collision(u8),
}

const WORDS: usize = (MAX_ID as usize + 1) / 64;

/// Bit set over the legal ID range `0..=MAX_ID`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdAllocator {
    used: [u64; WORDS],
}

impl IdAllocator {
    /// Creates an allocator with every ID free.
    pub const fn new() -> Self {
        Self { used: [0; WORDS] }
    }

    /// Allocates an ID.
    ///
    /// # Arguments
    ///
    /// * `requested` - A specific ID to claim, or `None` for the lowest free one.
    ///
    /// # Returns
    ///
    /// The claimed ID, `AllocError::Collision` if the requested ID is taken, or
    /// `AllocError::Exhausted` if no ID is free.
    pub fn allocate(&mut self, requested: Option<u8>) -> Result<u8, AllocError> {
        let id = match requested {
            Some(id) if self.is_used(id) => return Err(AllocError::Collision(id)),
            Some(id) => id,
            None => self.lowest_free().ok_or(AllocError::Exhausted)?,
        };
        let (word, bit) = Self::slot(id);
        self.used[word] |= bit;
        Ok(id)
    }

    /// Frees an ID. Only used to roll back a multi-step operation that failed part way.
    pub(crate) fn release(&mut self, id: u8) {
        let (word, bit) = Self::slot(id);
        self.used[word] &= !bit;
    }

    /// Returns `true` if `id` is taken.
    pub const fn is_used(&self, id: u8) -> bool {
        let (word, bit) = Self::slot(id);
        self.used[word] & bit != 0
    }

    /// Returns the number of IDs taken.
    pub fn len(&self) -> usize {
        self.used.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Returns `true` if no ID is taken.
    pub fn is_empty(&self) -> bool {
        self.used.iter().all(|&w| w == 0)
    }

    fn lowest_free(&self) -> Option<u8> {
        self.used.iter().enumerate().find_map(|(word, &bits)| {
            (bits != u64::MAX).then(|| {
                let index = word * 64 + bits.trailing_ones() as usize;
                // `index` is at most 255 because `WORDS * 64 == 256`.
                u8::try_from(index).unwrap_or(MAX_ID)
            })
        })
    }

    const fn slot(id: u8) -> (usize, u64) {
        ((id as usize) / 64, 1u64 << (id % 64))
    }
}
