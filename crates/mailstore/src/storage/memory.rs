//! In-memory storage implementation
//!
//! Messages live in a ring buffer with an optional capacity. Once the ring
//! is full every new message overwrites the oldest one.
//!
//! ```text
//!   capacity 4, after storing m0..m5:
//!
//!   slot:     0    1    2    3
//!   records: [m4] [m5] [m2] [m3]
//!                       ^ write_cursor (oldest, overwritten next)
//!
//!   position 0 (newest) => slot (cursor + len - 1) % len = 1
//!   position p          => slot (cursor + len - 1 - p) % len
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::RwLock;

use log::debug;

use super::MessageStore;
use crate::error::{Result, StoreError};
use crate::models::{Message, MessageId};
use crate::search::{SearchKind, SearchPage, matches, normalize_query};

/// Identifier <-> slot mapping, kept in lockstep
///
/// `by_slot[s]` is the identifier stored in slot `s` and
/// `by_id[by_slot[s]] == s` for every slot.
#[derive(Debug, Default)]
struct SlotIndex {
    by_id: HashMap<MessageId, usize>,
    by_slot: Vec<MessageId>,
}

impl SlotIndex {
    fn slot_of(&self, id: &MessageId) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Index `id` at the next free slot
    fn push(&mut self, id: MessageId) -> usize {
        let slot = self.by_slot.len();
        self.by_id.insert(id.clone(), slot);
        self.by_slot.push(id);
        slot
    }

    /// Point `slot` at `id`, returning the identifier it held before
    fn replace(&mut self, slot: usize, id: MessageId) -> MessageId {
        let evicted = std::mem::replace(&mut self.by_slot[slot], id.clone());
        self.by_id.remove(&evicted);
        self.by_id.insert(id, slot);
        evicted
    }

    /// Drop `slot` and shift every later slot down by one
    fn remove(&mut self, slot: usize) -> MessageId {
        let id = self.by_slot.remove(slot);
        self.by_id.remove(&id);
        for s in self.by_id.values_mut() {
            if *s > slot {
                *s -= 1;
            }
        }
        id
    }

    fn rotate_left(&mut self, mid: usize) {
        self.by_slot.rotate_left(mid);
        for (slot, id) in self.by_slot.iter().enumerate() {
            self.by_id.insert(id.clone(), slot);
        }
    }

    fn clear(&mut self) {
        self.by_id.clear();
        self.by_slot.clear();
    }
}

/// Ring buffer state guarded by the store's lock
#[derive(Debug)]
struct Ring {
    records: Vec<Message>,
    index: SlotIndex,
    capacity: Option<NonZeroUsize>,
    /// Next slot to overwrite once saturated; always 0 while growing
    write_cursor: usize,
}

impl Ring {
    fn new(capacity: Option<NonZeroUsize>) -> Self {
        Self {
            records: Vec::new(),
            index: SlotIndex::default(),
            capacity,
            write_cursor: 0,
        }
    }

    fn is_saturated(&self) -> bool {
        self.capacity
            .is_some_and(|capacity| self.records.len() >= capacity.get())
    }

    fn insert(&mut self, message: Message) -> MessageId {
        let id = message.id.clone();

        if self.remove(&id).is_some() {
            debug!("[MEMORY] Replacing message {}", id);
        }

        if self.is_saturated() {
            let slot = self.write_cursor;
            let evicted = self.index.replace(slot, id.clone());
            self.records[slot] = message;
            self.write_cursor = (slot + 1) % self.records.len();
            debug!("[MEMORY] Evicted message {} from slot {}", evicted, slot);
        } else {
            self.index.push(id.clone());
            self.records.push(message);
        }

        id
    }

    /// Rotate a wrapped ring so slot 0 holds the oldest message
    fn unroll(&mut self) {
        if self.write_cursor == 0 {
            return;
        }
        self.records.rotate_left(self.write_cursor);
        self.index.rotate_left(self.write_cursor);
        self.write_cursor = 0;
    }

    fn remove(&mut self, id: &MessageId) -> Option<Message> {
        self.index.slot_of(id)?;

        // Compaction shifts slots, which is only order-preserving
        // when the oldest message sits in slot 0.
        self.unroll();
        let slot = self.index.slot_of(id)?;
        self.index.remove(slot);
        Some(self.records.remove(slot))
    }

    fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
        self.write_cursor = 0;
    }

    /// Slot holding the message at `position` (0 = newest); `position < len`
    fn slot_at(&self, position: usize) -> usize {
        let len = self.records.len();
        (self.write_cursor + len - 1 - position) % len
    }

    fn newest_first(&self) -> impl Iterator<Item = &Message> {
        (0..self.records.len()).map(move |position| &self.records[self.slot_at(position)])
    }

    fn window(&self, offset: usize, limit: usize) -> Vec<Message> {
        let len = self.records.len();
        if offset >= len {
            return Vec::new();
        }

        let end = offset.saturating_add(limit).min(len);
        (offset..end)
            .map(|position| self.records[self.slot_at(position)].clone())
            .collect()
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let len = self.records.len();
        assert_eq!(self.index.by_id.len(), len, "by_id out of step with records");
        assert_eq!(self.index.by_slot.len(), len, "by_slot out of step with records");

        for (slot, record) in self.records.iter().enumerate() {
            assert_eq!(self.index.by_slot[slot], record.id);
            assert_eq!(self.index.by_id[&record.id], slot);
        }

        if let Some(capacity) = self.capacity {
            assert!(len <= capacity.get());
        }
        if self.is_saturated() {
            assert!(self.write_cursor < len);
        } else {
            assert_eq!(self.write_cursor, 0);
        }
    }
}

/// In-memory implementation of MessageStore
///
/// The whole ring sits behind one RwLock: writes hold the write lock for
/// the full operation, reads share the read lock and always see a
/// consistent index.
pub struct InMemoryMessageStore {
    ring: RwLock<Ring>,
    capacity: Option<NonZeroUsize>,
}

impl InMemoryMessageStore {
    /// Create an unbounded store
    pub fn new() -> Self {
        Self {
            ring: RwLock::new(Ring::new(None)),
            capacity: None,
        }
    }

    /// Create a store holding at most `limit` messages (0 means unbounded)
    ///
    /// When full, each new message overwrites the oldest one.
    pub fn with_capacity(limit: usize) -> Self {
        let capacity = NonZeroUsize::new(limit);
        Self {
            ring: RwLock::new(Ring::new(capacity)),
            capacity,
        }
    }

    /// Configured capacity, `None` when unbounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        self.ring.read().unwrap().check_invariants();
    }
}

impl Default for InMemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn store(&self, message: Message) -> Result<MessageId> {
        let mut ring = self.ring.write()?;
        Ok(ring.insert(message))
    }

    fn count(&self) -> Result<usize> {
        let ring = self.ring.read()?;
        Ok(ring.records.len())
    }

    fn load(&self, id: &MessageId) -> Result<Message> {
        let ring = self.ring.read()?;
        ring.index
            .slot_of(id)
            .map(|slot| ring.records[slot].clone())
            .ok_or_else(|| StoreError::not_found(id))
    }

    fn list(&self, offset: usize, limit: usize) -> Result<Vec<Message>> {
        let ring = self.ring.read()?;
        Ok(ring.window(offset, limit))
    }

    fn search(
        &self,
        kind: SearchKind,
        query: &str,
        offset: usize,
        limit: usize,
    ) -> Result<SearchPage> {
        let query = normalize_query(query);
        let ring = self.ring.read()?;

        let matched: Vec<&Message> = ring
            .newest_first()
            .filter(|message| matches(message, kind, &query))
            .collect();
        let total = matched.len();
        let messages = matched
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();

        Ok(SearchPage { messages, total })
    }

    fn delete_one(&self, id: &MessageId) -> Result<()> {
        let mut ring = self.ring.write()?;
        if ring.remove(id).is_some() {
            debug!("[MEMORY] Deleted message {}", id);
        }
        Ok(())
    }

    fn delete_all(&self) -> Result<()> {
        let mut ring = self.ring.write()?;
        ring.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Path;
    use std::collections::VecDeque;

    fn make_test_message(id: &str) -> Message {
        Message::builder(id)
            .from(Path::parse("from@email.com"))
            .to(vec![Path::parse("to@email.com")])
            .body("some data string")
            .build()
    }

    fn ids(messages: &[Message]) -> Vec<String> {
        messages.iter().map(|m| m.id.0.clone()).collect()
    }

    fn fill(store: &InMemoryMessageStore, count: usize) {
        for i in 0..count {
            store.store(make_test_message(&i.to_string())).unwrap();
            store.check_invariants();
        }
    }

    #[test]
    fn test_store_and_count() {
        let store = InMemoryMessageStore::new();
        assert_eq!(store.count().unwrap(), 0);

        fill(&store, 25);

        assert_eq!(store.count().unwrap(), 25);
    }

    #[test]
    fn test_store_returns_identifier() {
        let store = InMemoryMessageStore::new();
        let id = store.store(make_test_message("abc")).unwrap();
        assert_eq!(id, MessageId::new("abc"));
    }

    #[test]
    fn test_concurrent_store() {
        let store = InMemoryMessageStore::new();

        std::thread::scope(|scope| {
            for i in 0..25 {
                let store = &store;
                scope.spawn(move || {
                    store.store(make_test_message(&i.to_string())).unwrap();
                });
            }
        });

        assert_eq!(store.count().unwrap(), 25);
        store.check_invariants();
    }

    #[test]
    fn test_concurrent_store_bounded() {
        let store = InMemoryMessageStore::with_capacity(10);

        std::thread::scope(|scope| {
            for i in 0..50 {
                let store = &store;
                scope.spawn(move || {
                    store.store(make_test_message(&i.to_string())).unwrap();
                });
            }
        });

        assert_eq!(store.count().unwrap(), 10);
        store.check_invariants();
    }

    #[test]
    fn test_load() {
        let store = InMemoryMessageStore::new();
        store.store(make_test_message("123")).unwrap();

        let loaded = store.load(&MessageId::new("123")).unwrap();
        assert_eq!(loaded.id.as_str(), "123");

        let err = store.load(&MessageId::new("321")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_unbounded_reverse_order() {
        let store = InMemoryMessageStore::new();
        fill(&store, 25);

        let expected: Vec<String> = (0..25).rev().map(|i| i.to_string()).collect();
        assert_eq!(ids(&store.list(0, 25).unwrap()), expected);
    }

    #[test]
    fn test_list_pagination() {
        let store = InMemoryMessageStore::new();
        fill(&store, 25);

        let page = store.list(0, 10).unwrap();
        let expected: Vec<String> = (15..25).rev().map(|i| i.to_string()).collect();
        assert_eq!(ids(&page), expected);

        assert_eq!(ids(&store.list(20, 30).unwrap()), vec!["4", "3", "2", "1", "0"]);
        assert_eq!(store.list(20, 24).unwrap().len(), 5);
        assert!(store.list(30, 40).unwrap().is_empty());
        assert!(store.list(25, 1).unwrap().is_empty());
        assert!(store.list(0, 0).unwrap().is_empty());
    }

    #[test]
    fn test_list_empty_store() {
        let store = InMemoryMessageStore::new();
        assert!(store.list(0, 10).unwrap().is_empty());
    }

    #[test]
    fn test_list_huge_limit() {
        let store = InMemoryMessageStore::new();
        fill(&store, 3);
        assert_eq!(store.list(1, usize::MAX).unwrap().len(), 2);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let store = InMemoryMessageStore::with_capacity(10);
        fill(&store, 25);

        assert_eq!(store.count().unwrap(), 10);
        for i in 0..15 {
            assert!(store.load(&MessageId::new(i.to_string())).unwrap_err().is_not_found());
        }
        for i in 15..25 {
            assert!(store.load(&MessageId::new(i.to_string())).is_ok());
        }
    }

    #[test]
    fn test_list_wraps_around_ring() {
        let store = InMemoryMessageStore::with_capacity(4);
        fill(&store, 6);

        assert_eq!(ids(&store.list(0, 10).unwrap()), vec!["5", "4", "3", "2"]);
        assert_eq!(ids(&store.list(1, 2).unwrap()), vec!["4", "3"]);
        assert_eq!(ids(&store.list(3, 2).unwrap()), vec!["2"]);
        assert!(store.list(4, 2).unwrap().is_empty());
    }

    #[test]
    fn test_with_capacity_zero_is_unbounded() {
        let store = InMemoryMessageStore::with_capacity(0);
        assert_eq!(store.capacity(), None);
        assert_eq!(InMemoryMessageStore::with_capacity(7).capacity(), Some(7));
        fill(&store, 30);
        assert_eq!(store.count().unwrap(), 30);
    }

    #[test]
    fn test_poisoned_lock_is_unavailable() {
        let store = InMemoryMessageStore::with_capacity(4);
        fill(&store, 2);

        std::thread::scope(|scope| {
            let writer = scope.spawn(|| {
                let _guard = store.ring.write().unwrap();
                panic!("writer panicked while holding the ring");
            });
            assert!(writer.join().is_err());
        });
        assert!(store.ring.is_poisoned());

        assert!(matches!(store.count(), Err(StoreError::Unavailable { .. })));
        assert!(matches!(
            store.store(make_test_message("late")),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(matches!(store.list(0, 10), Err(StoreError::Unavailable { .. })));
        assert!(matches!(
            store.search(SearchKind::Containing, "data", 0, 10),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(matches!(
            store.load(&MessageId::new("0")),
            Err(StoreError::Unavailable { .. })
        ));
        assert!(matches!(store.delete_all(), Err(StoreError::Unavailable { .. })));
        assert_eq!(store.capacity(), Some(4));
    }

    #[test]
    fn test_delete_one() {
        let store = InMemoryMessageStore::new();
        fill(&store, 25);

        store.delete_one(&MessageId::new("1")).unwrap();
        store.check_invariants();
        assert_eq!(store.count().unwrap(), 24);
        assert!(store.load(&MessageId::new("1")).unwrap_err().is_not_found());

        for i in (0..25).filter(|i| *i != 1) {
            let loaded = store.load(&MessageId::new(i.to_string())).unwrap();
            assert_eq!(loaded.id.0, i.to_string());
        }

        store.delete_one(&MessageId::new("34789")).unwrap();
        assert_eq!(store.count().unwrap(), 24);
    }

    #[test]
    fn test_delete_one_from_wrapped_ring() {
        let store = InMemoryMessageStore::with_capacity(4);
        fill(&store, 6);

        store.delete_one(&MessageId::new("4")).unwrap();
        store.check_invariants();
        assert_eq!(ids(&store.list(0, 10).unwrap()), vec!["5", "3", "2"]);

        // Back to growing: the next store fills the freed slot
        store.store(make_test_message("6")).unwrap();
        store.check_invariants();
        assert_eq!(ids(&store.list(0, 10).unwrap()), vec!["6", "5", "3", "2"]);

        // Saturated again: the oldest is evicted
        store.store(make_test_message("7")).unwrap();
        store.check_invariants();
        assert_eq!(ids(&store.list(0, 10).unwrap()), vec!["7", "6", "5", "3"]);
    }

    #[test]
    fn test_delete_all() {
        let store = InMemoryMessageStore::with_capacity(5);
        fill(&store, 12);

        store.delete_all().unwrap();
        store.check_invariants();
        assert_eq!(store.count().unwrap(), 0);

        store.store(make_test_message("fresh")).unwrap();
        let ring = store.ring.read().unwrap();
        assert_eq!(ring.index.slot_of(&MessageId::new("fresh")), Some(0));
        assert_eq!(ring.write_cursor, 0);
    }

    #[test]
    fn test_duplicate_identifier_replaces_previous() {
        let store = InMemoryMessageStore::new();
        fill(&store, 3);

        let replacement = Message::builder("1").body("replacement").build();
        store.store(replacement).unwrap();
        store.check_invariants();

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(ids(&store.list(0, 10).unwrap()), vec!["1", "2", "0"]);
        assert_eq!(
            store.load(&MessageId::new("1")).unwrap().content.body,
            "replacement"
        );
    }

    #[test]
    fn test_duplicate_identifier_in_saturated_ring() {
        let store = InMemoryMessageStore::with_capacity(3);
        fill(&store, 5);

        store.store(make_test_message("3")).unwrap();
        store.check_invariants();

        assert_eq!(store.count().unwrap(), 3);
        assert_eq!(ids(&store.list(0, 10).unwrap()), vec!["3", "4", "2"]);
    }

    #[test]
    fn test_search() {
        let store = InMemoryMessageStore::new();
        for i in 0..10 {
            let to = if i % 2 == 0 { "even@example.com" } else { "odd@example.com" };
            let message = Message::builder(i.to_string())
                .to(vec![Path::parse(to)])
                .header("Subject", format!("Message {}", i))
                .body(if i < 3 { "contains DATA" } else { "nothing" })
                .build();
            store.store(message).unwrap();
        }

        let page = store.search(SearchKind::To, "EVEN@", 0, 2).unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(ids(&page.messages), vec!["8", "6"]);

        let page = store.search(SearchKind::To, "even@", 4, 10).unwrap();
        assert_eq!(ids(&page.messages), vec!["0"]);

        let page = store.search(SearchKind::Containing, "data", 0, 10).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(ids(&page.messages), vec!["2", "1", "0"]);

        let page = store.search(SearchKind::Containing, "data", 5, 10).unwrap();
        assert_eq!(page.total, 3);
        assert!(page.messages.is_empty());

        let page = store.search(SearchKind::From, "nobody", 0, 10).unwrap();
        assert_eq!(page.total, 0);
        assert!(page.messages.is_empty());
    }

    #[test]
    fn test_search_is_repeatable() {
        let store = InMemoryMessageStore::with_capacity(7);
        fill(&store, 12);

        let first = store.search(SearchKind::Containing, "data", 0, 10).unwrap();
        let second = store.search(SearchKind::Containing, "data", 0, 10).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total, 7);
        assert_eq!(ids(&first.messages)[0], "11");
    }

    /// Drive the ring with a mixed sequence of operations and compare it
    /// against a plain VecDeque holding the expected insertion order.
    #[test]
    fn test_matches_reference_model() {
        for capacity in [0usize, 1, 2, 5, 8] {
            let store = InMemoryMessageStore::with_capacity(capacity);
            let mut model: VecDeque<String> = VecDeque::new();
            let mut seed: u64 = 0x2545_f491_4f6c_dd1d ^ capacity as u64;

            for step in 0..400 {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let roll = (seed >> 33) % 10;
                let pick = ((seed >> 13) % 12).to_string();

                match roll {
                    _ if step % 97 == 96 => {
                        store.delete_all().unwrap();
                        model.clear();
                    }
                    0 | 1 => {
                        store.delete_one(&MessageId::new(&pick)).unwrap();
                        model.retain(|id| *id != pick);
                    }
                    _ => {
                        store.store(make_test_message(&pick)).unwrap();
                        model.retain(|id| *id != pick);
                        model.push_back(pick);
                        if capacity > 0 && model.len() > capacity {
                            model.pop_front();
                        }
                    }
                }

                store.check_invariants();
                let expected: Vec<String> = model.iter().rev().cloned().collect();
                assert_eq!(ids(&store.list(0, usize::MAX).unwrap()), expected);
                assert_eq!(store.count().unwrap(), model.len());
            }
        }
    }
}
