//! Fixed-capacity slot arena.
//!
//! Entries keep their slot index for their whole lifetime, so an index
//! handed out by [`Slots::insert`] stays meaningful until that entry is
//! removed. All accesses are bounds-checked.

/// A fixed array of optional entries.
pub struct Slots<T, const N: usize> {
    entries: [Option<T>; N],
}

impl<T, const N: usize> Slots<T, N> {
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|_| None),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.is_some()).count()
    }

    pub fn is_full(&self) -> bool {
        self.entries.iter().all(|e| e.is_some())
    }

    /// Store `value` in the lowest free slot. Hands the value back when full.
    pub fn insert(&mut self, value: T) -> Result<usize, T> {
        match self.entries.iter().position(|e| e.is_none()) {
            Some(index) => {
                self.entries[index] = Some(value);
                Ok(index)
            }
            None => Err(value),
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.entries.get_mut(index).and_then(Option::take)
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.entries.get_mut(index).and_then(Option::as_mut)
    }

    /// Index of the first occupied slot matching `pred`.
    pub fn position(&self, mut pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.as_ref().map_or(false, &mut pred))
    }

    /// Occupied slots with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|v| (i, v)))
    }
}

impl<T, const N: usize> Default for Slots<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
