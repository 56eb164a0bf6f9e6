//! In-memory snapshot of the content held for each selection slot.
//!
//! The store only offers a wholesale [`SelectionStore::replace`]; there is no
//! way to patch a single format. A responder therefore never observes a
//! half-populated snapshot.

use crate::selection::{Slot, Value, is_synthetic_format};
use std::collections::BTreeMap;
use tracing::warn;

/// Format name to value mapping for one slot.
pub type FormatMap = BTreeMap<String, Value>;

/// Snapshot of the owned content of every slot.
#[derive(Debug, Default)]
pub struct SelectionStore {
    slots: [FormatMap; 2],
}

impl SelectionStore {
    /// Create a store with empty snapshots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the value stored for `format` in `slot`.
    pub fn get(&self, slot: Slot, format: &str) -> Option<&Value> {
        self.slots[slot.index()].get(format)
    }

    /// Format names stored for `slot`.
    ///
    /// The order is stable for a given snapshot (lexicographic).
    pub fn formats(&self, slot: Slot) -> Vec<&str> {
        self.slots[slot.index()].keys().map(String::as_str).collect()
    }

    /// Swap in a new snapshot for `slot`, dropping the previous one.
    ///
    /// Synthetic formats (`TARGETS`, `SAVE_TARGETS`) are removed; they are
    /// always generated on demand.
    pub fn replace(&mut self, slot: Slot, mut formats: FormatMap) {
        formats.retain(|name, _| {
            let keep = !is_synthetic_format(name);
            if !keep {
                warn!("Dropping synthetic format {} from {} snapshot", name, slot);
            }
            keep
        });
        self.slots[slot.index()] = formats;
    }

    /// Number of formats stored for `slot`.
    pub fn len(&self, slot: Slot) -> usize {
        self.slots[slot.index()].len()
    }

    /// Return `true` if nothing is stored for `slot`.
    pub fn is_empty(&self, slot: Slot) -> bool {
        self.slots[slot.index()].is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::PropFormat;

    fn text(s: &str) -> Value {
        Value::new(s.as_bytes().to_vec(), PropFormat::Bits8, 100)
    }

    #[test]
    fn test_new_store_is_empty() {
        let store = SelectionStore::new();
        assert!(store.is_empty(Slot::Primary));
        assert!(store.is_empty(Slot::Clipboard));
        assert!(store.formats(Slot::Clipboard).is_empty());
    }

    #[test]
    fn test_replace_is_wholesale() {
        let mut store = SelectionStore::new();
        let mut first = FormatMap::new();
        first.insert("UTF8_STRING".to_string(), text("one"));
        first.insert("text/html".to_string(), text("<b>one</b>"));
        store.replace(Slot::Clipboard, first);
        assert_eq!(store.len(Slot::Clipboard), 2);

        let mut second = FormatMap::new();
        second.insert("UTF8_STRING".to_string(), text("two"));
        store.replace(Slot::Clipboard, second);

        assert_eq!(store.len(Slot::Clipboard), 1);
        assert!(store.get(Slot::Clipboard, "text/html").is_none());
        assert_eq!(
            store.get(Slot::Clipboard, "UTF8_STRING").unwrap().bytes,
            b"two"
        );
    }

    #[test]
    fn test_slots_are_independent() {
        let mut store = SelectionStore::new();
        let mut map = FormatMap::new();
        map.insert("STRING".to_string(), text("primary"));
        store.replace(Slot::Primary, map);

        assert_eq!(store.len(Slot::Primary), 1);
        assert!(store.is_empty(Slot::Clipboard));
    }

    #[test]
    fn test_replace_drops_synthetic_formats() {
        let mut store = SelectionStore::new();
        let mut map = FormatMap::new();
        map.insert("TARGETS".to_string(), text("bogus"));
        map.insert("SAVE_TARGETS".to_string(), text("bogus"));
        map.insert("STRING".to_string(), text("kept"));
        store.replace(Slot::Primary, map);

        assert_eq!(store.formats(Slot::Primary), vec!["STRING"]);
    }

    #[test]
    fn test_formats_order_is_stable() {
        let mut store = SelectionStore::new();
        let mut map = FormatMap::new();
        map.insert("text/plain".to_string(), text("a"));
        map.insert("STRING".to_string(), text("a"));
        map.insert("UTF8_STRING".to_string(), text("a"));
        store.replace(Slot::Clipboard, map);

        let first = store.formats(Slot::Clipboard);
        let second = store.formats(Slot::Clipboard);
        assert_eq!(first, second);
        assert_eq!(first, vec!["STRING", "UTF8_STRING", "text/plain"]);
    }
}
