//! A growable bitset over 64-bit words.
//!
//! Used for the per-sample evaluation masks of the lifting tree and the
//! columns of the conflict graph. Grows on demand; all binary operations
//! treat missing words as zero.

use std::fmt;

const WORD_BITS: usize = 64;

/// A dynamically sized set of bit indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bitset {
    words: Vec<u64>,
}

impl Bitset {
    /// The empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// A set containing the given indices.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new();
        for i in indices {
            set.set(i);
        }
        set
    }

    /// Insert an index.
    pub fn set(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (index % WORD_BITS);
    }

    /// Remove an index.
    pub fn clear(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if word < self.words.len() {
            self.words[word] &= !(1 << (index % WORD_BITS));
            self.trim();
        }
    }

    /// Drop trailing zero words so that equality and hashing are
    /// structural.
    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }

    /// Whether an index is present.
    pub fn test(&self, index: usize) -> bool {
        let word = index / WORD_BITS;
        word < self.words.len() && self.words[word] & (1 << (index % WORD_BITS)) != 0
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Number of elements.
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &Bitset) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w |= o;
        }
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &Bitset) {
        for (i, w) in self.words.iter_mut().enumerate() {
            *w &= other.words.get(i).copied().unwrap_or(0);
        }
        self.trim();
    }

    /// In-place difference (`self \ other`).
    pub fn difference_with(&mut self, other: &Bitset) {
        for (w, o) in self.words.iter_mut().zip(&other.words) {
            *w &= !o;
        }
        self.trim();
    }

    /// Whether the two sets intersect.
    pub fn intersects(&self, other: &Bitset) -> bool {
        self.words
            .iter()
            .zip(&other.words)
            .any(|(w, o)| w & o != 0)
    }

    /// Whether `self` is a subset of `other`.
    pub fn is_subset_of(&self, other: &Bitset) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Iterate over the contained indices, ascending.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..WORD_BITS).filter_map(move |b| {
                if word & (1 << b) != 0 {
                    Some(wi * WORD_BITS + b)
                } else {
                    None
                }
            })
        })
    }
}

impl FromIterator<usize> for Bitset {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self::from_indices(iter)
    }
}

impl fmt::Display for Bitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (k, i) in self.iter().enumerate() {
            if k > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{i}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_test_clear() {
        let mut s = Bitset::new();
        s.set(3);
        s.set(70);
        assert!(s.test(3));
        assert!(s.test(70));
        assert!(!s.test(4));
        assert_eq!(s.count(), 2);
        s.clear(3);
        assert!(!s.test(3));
    }

    #[test]
    fn union_and_subset() {
        let a = Bitset::from_indices([1, 2, 65]);
        let b = Bitset::from_indices([2, 3]);
        let mut u = a.clone();
        u.union_with(&b);
        assert_eq!(u.count(), 4);
        assert!(a.is_subset_of(&u));
        assert!(b.is_subset_of(&u));
        assert!(!u.is_subset_of(&a));
    }

    #[test]
    fn difference_and_intersection() {
        let mut a = Bitset::from_indices([1, 2, 3]);
        let b = Bitset::from_indices([2, 4]);
        assert!(a.intersects(&b));
        a.difference_with(&b);
        assert_eq!(a, Bitset::from_indices([1, 3]));
        let mut c = Bitset::from_indices([1, 3, 5]);
        c.intersect_with(&Bitset::from_indices([3, 5, 7]));
        assert_eq!(c, Bitset::from_indices([3, 5]));
    }

    #[test]
    fn iteration_is_ascending() {
        let s = Bitset::from_indices([100, 5, 64]);
        let collected: Vec<usize> = s.iter().collect();
        assert_eq!(collected, vec![5, 64, 100]);
    }

    #[test]
    fn equality_ignores_trailing_zero_words() {
        let mut a = Bitset::from_indices([1]);
        let b = Bitset::from_indices([1]);
        a.set(100);
        a.clear(100);
        assert_eq!(a, b);
    }
}
