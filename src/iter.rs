//! Iteration over every entry of a dictionary.
//!
//! Two styles are offered. [`Iter`] borrows the dictionary and is the
//! everyday choice. [`DictIterator`] is a detached cursor that does not hold
//! a borrow between steps, so the dictionary can be modified while it is
//! live:
//!
//! * a *safe* iterator pauses automatic rehash steps until it is released, so
//!   the caller may insert, delete, and look up keys in between steps;
//! * an *unsafe* iterator forbids modification. It fingerprints the tables
//!   on creation and [`Dict::release_iterator`] reports misuse if they
//!   changed.

use tracing::error;

use crate::dict::Dict;
use crate::dict_type::DictType;
use crate::error::DictError;
use crate::table::Arena;
use crate::table::DictEntry;
use crate::table::EntryId;
use crate::table::Table;

/// Detached iteration state. Advance it with [`Dict::next_entry`] and hand it
/// back through [`Dict::release_iterator`].
#[derive(Debug)]
pub struct DictIterator {
    table: usize,
    index: Option<usize>,
    entry: Option<EntryId>,
    next_entry: Option<EntryId>,
    safe: bool,
    fingerprint: u64,
}

impl DictIterator {
    fn new(safe: bool, fingerprint: u64) -> Self {
        Self {
            table: 0,
            index: None,
            entry: None,
            next_entry: None,
            safe,
            fingerprint,
        }
    }

    /// Returns `true` for iterators created by [`Dict::safe_iterator`].
    pub fn is_safe(&self) -> bool {
        self.safe
    }
}

/// Thomas Wang's 64-bit integer mix, folded over `parts`.
fn mix_fingerprint(parts: &[u64]) -> u64 {
    parts.iter().fold(0u64, |hash, &part| {
        let mut h = hash.wrapping_add(part);
        h = (!h).wrapping_add(h << 21);
        h ^= h >> 24;
        h = h.wrapping_add(h << 3).wrapping_add(h << 8);
        h ^= h >> 14;
        h = h.wrapping_add(h << 2).wrapping_add(h << 4);
        h ^= h >> 28;
        h.wrapping_add(h << 31)
    })
}

impl<K, V, T> Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    /// Summarizes the shape of both tables. Any insert, delete, resize, or
    /// rehash step changes it.
    pub(crate) fn fingerprint(&self) -> u64 {
        let [t0, t1] = &self.tables;
        mix_fingerprint(&[
            t0.storage_addr() as u64,
            t0.size() as u64,
            t0.used as u64,
            t1.storage_addr() as u64,
            t1.size() as u64,
            t1.used as u64,
        ])
    }

    /// Borrowing iterator over every entry, primary table first.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            entries: &self.entries,
            tables: &self.tables,
            table: 0,
            bucket: 0,
            cur: None,
            remaining: self.len(),
        }
    }

    /// Creates an iterator under which the dictionary must not change.
    pub fn iterator(&self) -> DictIterator {
        DictIterator::new(false, self.fingerprint())
    }

    /// Creates an iterator that tolerates inserts, deletes, and lookups
    /// between steps. Automatic rehash steps pause until it is released.
    ///
    /// Entries added during iteration may or may not be returned. Every entry
    /// present for the whole iteration is returned at least once, whatever
    /// else is deleted in between steps.
    pub fn safe_iterator(&mut self) -> DictIterator {
        self.safe_iterators += 1;
        DictIterator::new(true, self.fingerprint())
    }

    fn advance(&self, it: &mut DictIterator) -> Option<EntryId> {
        loop {
            let candidate = match it.entry {
                Some(cur) => self.chain_successor(it, cur),
                None => {
                    let mut index = it.index.map_or(0, |i| i + 1);
                    if index >= self.tables[it.table].size() {
                        if it.table == 0 && self.is_rehashing() {
                            it.table = 1;
                            index = 0;
                        } else {
                            it.index = Some(index);
                            return None;
                        }
                    }
                    it.index = Some(index);
                    self.tables[it.table].head(index)
                }
            };

            it.entry = None;
            if let Some(id) = candidate {
                if let Some(entry) = self.entries.get(id) {
                    it.entry = Some(id);
                    it.next_entry = entry.next;
                    return Some(id);
                }
            }
        }
    }

    /// Where to continue after `cur`. A live entry's own link is current,
    /// since unlinking a neighbour re-points it. If `cur` was deleted, the
    /// link saved when it was returned is used, and if that entry is gone
    /// too the bucket is walked again from its head.
    fn chain_successor(&self, it: &DictIterator, cur: EntryId) -> Option<EntryId> {
        if let Some(entry) = self.entries.get(cur) {
            return entry.next;
        }
        match it.next_entry {
            Some(next) if self.entries.contains_key(next) => Some(next),
            _ => it.index.and_then(|index| self.tables[it.table].head(index)),
        }
    }

    /// Advances `it` and returns the entry it lands on, or `None` once every
    /// bucket has been visited.
    pub fn next_entry(&self, it: &mut DictIterator) -> Option<&DictEntry<K, V>> {
        let id = self.advance(it)?;
        self.entries.get(id)
    }

    /// Like [`next_entry`](Self::next_entry) with mutable access to the
    /// entry's value slot.
    pub fn next_entry_mut(&mut self, it: &mut DictIterator) -> Option<&mut DictEntry<K, V>> {
        let id = self.advance(it)?;
        self.entries.get_mut(id)
    }

    /// Ends an iteration. Releasing a safe iterator resumes automatic rehash
    /// steps once no other safe iterator is live. Releasing an unsafe
    /// iterator checks that the dictionary did not change while it was live.
    pub fn release_iterator(&mut self, it: DictIterator) -> Result<(), DictError> {
        if it.safe {
            self.safe_iterators = self.safe_iterators.saturating_sub(1);
            return Ok(());
        }
        if it.fingerprint != self.fingerprint() {
            error!(
                len = self.len(),
                rehashing = self.is_rehashing(),
                "dictionary modified under an unsafe iterator"
            );
            return Err(DictError::IteratorMisuse);
        }
        Ok(())
    }
}

/// Borrowing iterator returned by [`Dict::iter`].
pub struct Iter<'a, K, V> {
    entries: &'a Arena<K, V>,
    tables: &'a [Table; 2],
    table: usize,
    bucket: usize,
    cur: Option<EntryId>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = &'a DictEntry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(id) = self.cur.take() {
                if let Some(entry) = self.entries.get(id) {
                    self.cur = entry.next;
                    self.remaining = self.remaining.saturating_sub(1);
                    return Some(entry);
                }
            }

            let table = self.tables.get(self.table)?;
            if self.bucket >= table.size() {
                self.table += 1;
                self.bucket = 0;
                continue;
            }
            self.cur = table.head(self.bucket);
            self.bucket += 1;
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<'a, K, V, T> IntoIterator for &'a Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    type Item = &'a DictEntry<K, V>;
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    use super::*;
    use crate::config::DictConfig;
    use crate::dict_type::HashKeys;
    use crate::hashing::HashSeed;

    /// Sends every key to bucket 0.
    struct Colliding;

    impl DictType<u64, u64> for Colliding {
        type Context = ();

        fn hash(&self, _seed: &HashSeed, _key: &u64) -> u64 {
            0
        }
    }

    fn one_chain(n: u64) -> Dict<u64, u64, Colliding> {
        let config = DictConfig::default().with_initial_size(64).with_rng_seed(5);
        let mut dict = Dict::with_config(Colliding, (), config);
        for k in 0..n {
            dict.insert(k, k).unwrap();
        }
        dict
    }

    fn filled(n: u64) -> Dict<u64, u64, HashKeys<u64>> {
        let config = DictConfig::default().with_rng_seed(11);
        let mut dict = Dict::with_config(HashKeys::new(), (), config);
        for k in 0..n {
            dict.insert(k, k * 2).unwrap();
        }
        dict
    }

    fn drain_keys(dict: &Dict<u64, u64, HashKeys<u64>>, it: &mut DictIterator) -> Vec<u64> {
        let mut keys = Vec::new();
        while let Some(entry) = dict.next_entry(it) {
            keys.push(*entry.key());
        }
        keys
    }

    #[test]
    fn fingerprint_is_stable_without_changes() {
        let dict = filled(50);
        assert_eq!(dict.fingerprint(), dict.fingerprint());
    }

    #[test]
    fn fingerprint_tracks_inserts() {
        let mut dict = filled(50);
        let before = dict.fingerprint();
        dict.insert(1000, 0).unwrap();
        assert_ne!(before, dict.fingerprint());
    }

    #[test]
    fn iter_visits_everything_once() {
        let dict = filled(300);
        assert_eq!(dict.iter().len(), 300);
        let keys: BTreeSet<u64> = dict.iter().map(|e| *e.key()).collect();
        assert_eq!(keys, (0..300).collect());
        let total: u64 = (&dict).into_iter().filter_map(|e| e.val()).sum();
        assert_eq!(total, (0..300u64).map(|k| k * 2).sum());
    }

    #[test]
    fn iter_covers_both_tables_mid_rehash() {
        let mut dict = filled(100);
        while dict.rehash(100) {}
        dict.expand(2048).unwrap();
        dict.rehash(5);
        assert!(dict.is_rehashing());
        let keys: BTreeSet<u64> = dict.iter().map(|e| *e.key()).collect();
        assert_eq!(keys.len(), 100);
    }

    #[test]
    fn unsafe_iterator_clean_release() {
        let mut dict = filled(64);
        let mut it = dict.iterator();
        assert!(!it.is_safe());
        let keys = drain_keys(&dict, &mut it);
        assert_eq!(keys.len(), 64);
        assert_eq!(dict.next_entry(&mut it).map(|e| *e.key()), None);
        assert_eq!(dict.release_iterator(it), Ok(()));
    }

    #[test]
    fn unsafe_iterator_detects_modification() {
        let mut dict = filled(64);
        let mut it = dict.iterator();
        let first = dict.next_entry(&mut it).map(|e| *e.key());
        assert!(first.is_some());
        dict.insert(500, 1).unwrap();
        assert_eq!(dict.release_iterator(it), Err(DictError::IteratorMisuse));
    }

    #[test]
    fn safe_iterator_allows_deleting_current() {
        let mut dict = filled(200);
        let mut it = dict.safe_iterator();
        assert!(it.is_safe());
        let mut seen = BTreeMap::new();
        while let Some(entry) = dict.next_entry(&mut it) {
            let key = *entry.key();
            *seen.entry(key).or_insert(0) += 1;
            if key % 3 == 0 {
                dict.delete(&key).unwrap();
            }
        }
        dict.release_iterator(it).unwrap();
        assert_eq!(seen.len(), 200);
        assert!(seen.values().all(|&n| n == 1));
        assert_eq!(dict.len(), 200 - (0..200u64).filter(|k| k % 3 == 0).count());
    }

    #[test]
    fn safe_iterator_survives_deleting_chain_neighbour() {
        let mut dict = one_chain(3);
        // chain: 2 -> 1 -> 0
        let mut it = dict.safe_iterator();
        let mut seen = Vec::new();
        while let Some(entry) = dict.next_entry(&mut it) {
            let key = *entry.key();
            seen.push(key);
            if key == 2 {
                dict.delete(&1).unwrap();
            }
        }
        dict.release_iterator(it).unwrap();
        assert_eq!(seen, [2, 0]);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn safe_iterator_survives_deleting_current_and_successor() {
        let mut dict = one_chain(5);
        // chain: 4 -> 3 -> 2 -> 1 -> 0
        let mut it = dict.safe_iterator();
        let mut seen = BTreeSet::new();
        while let Some(entry) = dict.next_entry(&mut it) {
            let key = *entry.key();
            seen.insert(key);
            if key == 3 {
                dict.delete(&3).unwrap();
                dict.delete(&2).unwrap();
            }
        }
        dict.release_iterator(it).unwrap();
        assert!([0, 1, 4].iter().all(|k| seen.contains(k)));
        assert_eq!(dict.len(), 3);
    }

    #[test]
    fn safe_iterator_sees_survivors_when_others_are_deleted() {
        let mut dict = filled(300);
        let mut it = dict.safe_iterator();
        let mut seen = BTreeSet::new();
        let mut victims = (0..300u64).rev().filter(|k| k % 4 == 1);
        while let Some(entry) = dict.next_entry(&mut it) {
            seen.insert(*entry.key());
            // delete some other key, seen or not
            if let Some(victim) = victims.next() {
                dict.delete(&victim).unwrap();
            }
        }
        dict.release_iterator(it).unwrap();
        let survivors: BTreeSet<u64> = (0..300u64).filter(|k| k % 4 != 1).collect();
        assert!(survivors.is_subset(&seen));
        assert_eq!(dict.len(), survivors.len());
    }

    #[test]
    fn safe_iterator_sees_survivors_in_one_chain() {
        let mut dict = one_chain(40);
        let mut it = dict.safe_iterator();
        let mut seen = BTreeSet::new();
        while let Some(entry) = dict.next_entry(&mut it) {
            let key = *entry.key();
            seen.insert(key);
            // odd keys sit right behind their even predecessor in the chain
            if key % 2 == 0 && key > 0 && dict.contains_key(&(key - 1)) {
                dict.delete(&(key - 1)).unwrap();
            }
        }
        dict.release_iterator(it).unwrap();
        assert!((0..40u64).filter(|k| k % 2 == 0).all(|k| seen.contains(&k)));
        assert!(seen.contains(&39));
        // 1, 3, .., 37 were deleted
        assert_eq!(dict.len(), 21);
    }

    #[test]
    fn safe_iterator_tolerates_inserts() {
        let mut dict = filled(40);
        let mut it = dict.safe_iterator();
        let mut originals = BTreeSet::new();
        let mut next_key = 10_000u64;
        while let Some(entry) = dict.next_entry(&mut it) {
            let key = *entry.key();
            if key < 10_000 {
                assert!(originals.insert(key), "{key} returned twice");
                dict.insert(next_key, 0).unwrap();
                next_key += 1;
            }
        }
        dict.release_iterator(it).unwrap();
        assert_eq!(originals.len(), 40);
        assert_eq!(dict.len(), 80);
    }

    #[test]
    fn safe_iterator_pauses_rehash_steps() {
        let mut dict = filled(100);
        while dict.rehash(100) {}
        dict.expand(1024).unwrap();
        let it = dict.safe_iterator();
        let index = dict.rehash_index();
        for k in 0..100u64 {
            assert!(dict.find(&k).is_some());
        }
        assert_eq!(dict.rehash_index(), index);
        // explicit rehashing is still honored
        dict.rehash(1);
        assert_ne!(dict.rehash_index(), index);
        dict.release_iterator(it).unwrap();
        let index = dict.rehash_index();
        dict.find(&0);
        assert_ne!(dict.rehash_index(), index);
    }

    #[test]
    fn next_entry_mut_edits_values() {
        let mut dict = filled(30);
        let mut it = dict.safe_iterator();
        while let Some(entry) = dict.next_entry_mut(&mut it) {
            if let Some(v) = entry.val_mut() {
                *v += 1;
            }
        }
        dict.release_iterator(it).unwrap();
        for k in 0..30u64 {
            assert_eq!(dict.get(&k).and_then(|e| e.val()), Some(&(k * 2 + 1)));
        }
    }

    #[test]
    fn empty_dict_iterates_nothing() {
        let mut dict = filled(0);
        assert_eq!(dict.iter().count(), 0);
        let mut it = dict.iterator();
        assert!(dict.next_entry(&mut it).is_none());
        dict.release_iterator(it).unwrap();
    }
}
