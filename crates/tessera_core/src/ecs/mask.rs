//! # Component Masks
//!
//! Fixed-width bitset naming a set of component types. Bit `i` is set iff
//! component type `i` is present. Used as the archetype key and for query
//! filter terms.
//!
//! ## Performance
//!
//! - Equality/hash: 4 words, no allocation
//! - Subset / disjoint tests: 4 AND operations
//! - Iterate set bits: O(set bits) via `trailing_zeros`

use std::fmt;

/// Number of 64-bit words in a mask.
const WORDS: usize = 4;

/// Maximum number of component types a mask can name.
pub const MAX_COMPONENT_TYPES: usize = WORDS * 64;

/// A fixed-width set of component type indices.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentMask {
    /// Bitset: 1 = present. 64 component types per word.
    words: [u64; WORDS],
}

impl ComponentMask {
    /// The empty set.
    pub const EMPTY: Self = Self { words: [0; WORDS] };

    /// Builds a mask from component indices. Out-of-range indices are ignored.
    #[must_use]
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        indices.into_iter().fold(Self::EMPTY, Self::with)
    }

    /// Returns a copy with `index` set.
    #[inline]
    #[must_use]
    pub fn with(mut self, index: usize) -> Self {
        if index < MAX_COMPONENT_TYPES {
            self.words[index / 64] |= 1u64 << (index % 64);
        }
        self
    }

    /// Returns a copy with `index` cleared.
    #[inline]
    #[must_use]
    pub fn without(mut self, index: usize) -> Self {
        if index < MAX_COMPONENT_TYPES {
            self.words[index / 64] &= !(1u64 << (index % 64));
        }
        self
    }

    /// Checks whether `index` is set.
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < MAX_COMPONENT_TYPES && (self.words[index / 64] >> (index % 64)) & 1 == 1
    }

    /// True if no bit is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of set bits.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if every bit of `other` is also set here.
    #[inline]
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// True if at least one bit is set in both masks.
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Set union.
    #[inline]
    #[must_use]
    pub fn union(mut self, other: &Self) -> Self {
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
        self
    }

    /// Iterates over set indices in ascending order.
    #[must_use]
    pub fn iter(&self) -> MaskIter<'_> {
        MaskIter {
            words: &self.words,
            word_idx: 0,
            current_word: self.words[0],
        }
    }

    /// Renders the first `len` bits as `'1'`/`'0'`, bit 0 first.
    ///
    /// A mask holding types 0 and 1 renders as `"11"` for `len == 2`.
    #[must_use]
    pub fn to_bitstring(&self, len: usize) -> String {
        (0..len.min(MAX_COMPONENT_TYPES))
            .map(|i| if self.contains(i) { '1' } else { '0' })
            .collect()
    }
}

/// Iterator over set indices of a [`ComponentMask`].
pub struct MaskIter<'a> {
    words: &'a [u64; WORDS],
    word_idx: usize,
    current_word: u64,
}

impl Iterator for MaskIter<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                // Find lowest set bit, then clear it
                let bit = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1;
                return Some(self.word_idx * 64 + bit);
            }

            self.word_idx += 1;
            if self.word_idx >= WORDS {
                return None;
            }
            self.current_word = self.words[self.word_idx];
        }
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for ComponentMask {
    /// Comma-separated set indices, e.g. `0,2,5`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, index) in self.iter().enumerate() {
            if n > 0 {
                f.write_str(",")?;
            }
            write!(f, "{index}")?;
        }
        Ok(())
    }
}
