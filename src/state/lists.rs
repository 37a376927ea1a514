//! Indexed lists announced by a count line
//!
//! The processor reports e.g. `!SRCCOUNT(3)` followed by three
//! `!SRC(index,"name")` lines. Once all entries have arrived, further
//! single-index lines (`!SRC(2)`) select the current entry.

use super::ListEntry;

#[derive(Debug, Clone, Default)]
pub struct IndexedList {
    capacity: usize,
    entries: Vec<ListEntry>,
}

/// What an entry line did to the list
#[derive(Debug, Clone, PartialEq)]
pub enum ListUpdate {
    /// Entry recorded, more expected
    Added,
    /// Entry recorded and the list is now complete
    Completed,
    /// Ignored (duplicate index, missing name, or list already full)
    Ignored,
}

impl IndexedList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over with a new expected size.
    pub fn reset(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.entries.clear();
    }

    /// A list with capacity zero counts as full, so a selection line that
    /// arrives before any count line resolves to nothing.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn add(&mut self, index: i64, name: &str) -> ListUpdate {
        if self.is_full() || self.entries.iter().any(|e| e.index == index) {
            return ListUpdate::Ignored;
        }
        self.entries.push(ListEntry {
            index,
            name: name.to_string(),
        });
        if self.is_full() {
            ListUpdate::Completed
        } else {
            ListUpdate::Added
        }
    }

    pub fn name_of(&self, index: i64) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.index == index)
            .map(|e| e.name.as_str())
    }

    pub fn entries(&self) -> &[ListEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Find the index of a named entry.
pub fn index_of(entries: &[ListEntry], name: &str) -> Option<i64> {
    entries.iter().find(|e| e.name == name).map(|e| e.index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_then_completes() {
        let mut list = IndexedList::new();
        list.reset(2);
        assert!(!list.is_full());
        assert_eq!(list.add(1, "TV"), ListUpdate::Added);
        assert_eq!(list.add(2, "Roon"), ListUpdate::Completed);
        assert!(list.is_full());
        assert_eq!(list.name_of(2), Some("Roon"));
        assert_eq!(list.name_of(3), None);
    }

    #[test]
    fn test_rejects_duplicates_and_overflow() {
        let mut list = IndexedList::new();
        list.reset(2);
        list.add(1, "TV");
        assert_eq!(list.add(1, "TV again"), ListUpdate::Ignored);
        list.add(2, "Roon");
        assert_eq!(list.add(3, "Extra"), ListUpdate::Ignored);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_reset_clears_entries() {
        let mut list = IndexedList::new();
        list.reset(1);
        list.add(1, "TV");
        list.reset(3);
        assert!(list.is_empty());
        assert!(!list.is_full());
    }

    #[test]
    fn test_zero_capacity_is_full() {
        let list = IndexedList::new();
        assert!(list.is_full());
    }

    #[test]
    fn test_index_of() {
        let mut list = IndexedList::new();
        list.reset(2);
        list.add(4, "Movie");
        list.add(7, "Music");
        assert_eq!(index_of(list.entries(), "Music"), Some(7));
        assert_eq!(index_of(list.entries(), "Party"), None);
    }
}
