//! Pending-notification bitmaps

use core_types::ProcessSlot;
use serde::{Deserialize, Serialize};

const WORD_BITS: usize = 64;

/// One bit per possible notifier slot
///
/// Setting a bit that is already set is a no-op, so repeated notifications
/// from the same source collapse into one pending delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyBitmap {
    words: Vec<u64>,
}

impl NotifyBitmap {
    /// Creates an empty bitmap sized for `slots` notifiers
    pub fn with_capacity(slots: usize) -> Self {
        Self {
            words: vec![0; slots.div_ceil(WORD_BITS)],
        }
    }

    /// Marks `slot` pending; returns `true` if it was not pending before
    pub fn set(&mut self, slot: ProcessSlot) -> bool {
        let (word, bit) = Self::position(slot);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let was_set = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !was_set
    }

    /// Clears `slot`; returns `true` if it was pending
    pub fn clear(&mut self, slot: ProcessSlot) -> bool {
        let (word, bit) = Self::position(slot);
        match self.words.get_mut(word) {
            Some(w) if *w & bit != 0 => {
                *w &= !bit;
                true
            }
            _ => false,
        }
    }

    /// Checks whether `slot` is pending
    pub fn is_set(&self, slot: ProcessSlot) -> bool {
        let (word, bit) = Self::position(slot);
        self.words.get(word).is_some_and(|w| w & bit != 0)
    }

    /// True if nothing is pending
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of pending notifiers
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Pending slots in ascending order
    pub fn iter(&self) -> impl Iterator<Item = ProcessSlot> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(index, word)| {
                let word = *word;
                (0..WORD_BITS)
                    .filter(move |bit| word & (1u64 << bit) != 0)
                    .map(move |bit| ProcessSlot((index * WORD_BITS + bit) as u32))
            })
    }

    /// Clears and returns the lowest pending slot accepted by `accept`
    pub fn take_first<F>(&mut self, mut accept: F) -> Option<ProcessSlot>
    where
        F: FnMut(ProcessSlot) -> bool,
    {
        let found = self.iter().find(|slot| accept(*slot))?;
        self.clear(found);
        Some(found)
    }

    /// Clears every pending bit
    pub fn clear_all(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    fn position(slot: ProcessSlot) -> (usize, u64) {
        let index = slot.index();
        (index / WORD_BITS, 1u64 << (index % WORD_BITS))
    }
}
