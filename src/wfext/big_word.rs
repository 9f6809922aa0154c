use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::{smallvec, SmallVec};

const WORD_BITS: usize = u64::BITS as usize;

#[inline]
fn word_count(num_bits: usize) -> usize {
    (num_bits + WORD_BITS - 1) / WORD_BITS
}

#[inline]
fn locate(bit: usize) -> (usize, u64) {
    (bit / WORD_BITS, 1 << (bit % WORD_BITS))
}

/// A fixed-width bit vector with one bit per participating thread.
///
/// Cloning a `BigWord` produces an independent snapshot. Bucket states rely on
/// this: the `applied` vector of a published state must never change when the
/// bucket's live toggle does.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BigWord {
    words: SmallVec<[u64; 2]>,
}

impl BigWord {
    pub(crate) fn with_bits(num_bits: usize) -> Self {
        Self {
            words: smallvec![0; word_count(num_bits)],
        }
    }

    pub(crate) fn test_bit(&self, bit: usize) -> bool {
        let (index, mask) = locate(bit);
        self.words[index] & mask != 0
    }

    #[cfg(test)]
    pub(crate) fn set_bit(&mut self, bit: usize) {
        let (index, mask) = locate(bit);
        self.words[index] |= mask;
    }

    #[cfg(test)]
    pub(crate) fn clear_bit(&mut self, bit: usize) {
        let (index, mask) = locate(bit);
        self.words[index] &= !mask;
    }

    #[cfg(test)]
    pub(crate) fn flip_bit(&mut self, bit: usize) {
        if self.test_bit(bit) {
            self.clear_bit(bit);
        } else {
            self.set_bit(bit);
        }
    }
}

/// The live `toggle` vector of a bucket.
///
/// Every bit is written by its owning thread only, so flips never race on the
/// same bit; they may race on the same word, hence the atomic `fetch_xor`.
pub(crate) struct AtomicBigWord {
    words: Box<[AtomicU64]>,
}

impl AtomicBigWord {
    pub(crate) fn from_snapshot(snapshot: &BigWord) -> Self {
        Self {
            words: snapshot.words.iter().map(|w| AtomicU64::new(*w)).collect(),
        }
    }

    pub(crate) fn flip_bit(&self, bit: usize) {
        let (index, mask) = locate(bit);
        self.words[index].fetch_xor(mask, Ordering::SeqCst);
    }

    pub(crate) fn test_bit(&self, bit: usize) -> bool {
        let (index, mask) = locate(bit);
        self.words[index].load(Ordering::SeqCst) & mask != 0
    }

    pub(crate) fn snapshot(&self) -> BigWord {
        BigWord {
            words: self
                .words
                .iter()
                .map(|w| w.load(Ordering::SeqCst))
                .collect(),
        }
    }
}
