//! Random sampling of entries.

use std::collections::HashSet;

use rand::Rng;

use crate::dict::Dict;
use crate::dict_type::DictType;
use crate::table::Chain;
use crate::table::DictEntry;
use crate::table::EntryId;

/// Consecutive empty buckets after which `get_some_keys` jumps to a random
/// position (once the run is also longer than the requested count).
const EMPTY_RUN_RESTART: usize = 5;

/// Bucket visits allowed per requested key.
const SAMPLE_STEPS_PER_KEY: usize = 10;

impl<K, V, T> Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    /// Returns a random entry, or `None` if the dictionary is empty.
    ///
    /// A random non-empty bucket is picked first and then a random entry of
    /// its chain, so entries in long chains are somewhat less likely to be
    /// returned. Takes one piggybacked rehash step.
    pub fn random_entry(&mut self) -> Option<&DictEntry<K, V>> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();

        let head = match self.rehash_index {
            Some(rehash_index) => {
                let [s0, s1] = self.table_sizes();
                // buckets of table 0 below the rehash index are known empty
                let span = s0 + s1 - rehash_index;
                loop {
                    let h = rehash_index + self.rng.random_range(0..span);
                    let head = if h >= s0 {
                        self.tables[1].head(h - s0)
                    } else {
                        self.tables[0].head(h)
                    };
                    if head.is_some() {
                        break head;
                    }
                }
            }
            None => {
                let mask = self.tables[0].mask();
                loop {
                    let head = self.tables[0].head(self.rng.random::<u64>() as usize & mask);
                    if head.is_some() {
                        break head;
                    }
                }
            }
        };

        let len = Chain::starting_at(&self.entries, head).count();
        let pick = self.rng.random_range(0..len);
        Chain::starting_at(&self.entries, head).nth(pick)
    }

    /// Samples up to `count` distinct entries from a random position.
    ///
    /// Much faster than calling [`random_entry`](Self::random_entry) `count`
    /// times, but the result is not uniformly distributed: neighbouring
    /// buckets are read in sequence. May return fewer than `count` entries,
    /// even when the dictionary holds enough, since at most `count * 10`
    /// bucket positions are probed.
    pub fn get_some_keys(&mut self, count: usize) -> Vec<&DictEntry<K, V>> {
        let count = count.min(self.len());
        if count == 0 {
            return Vec::new();
        }
        for _ in 0..count {
            if !self.is_rehashing() {
                break;
            }
            self.rehash_step();
        }

        let ids = self.sample_ids(count);
        ids.into_iter().filter_map(|id| self.entries.get(id)).collect()
    }

    fn sample_ids(&mut self, count: usize) -> Vec<EntryId> {
        let rehash_index = self.rehash_index;
        let tables = if rehash_index.is_some() { 2 } else { 1 };
        let [s0, s1] = self.table_sizes();
        let mut max_mask = self.tables[0].mask();
        if tables > 1 {
            max_mask = max_mask.max(self.tables[1].mask());
        }

        let mut stored: Vec<EntryId> = Vec::with_capacity(count);
        let mut seen: HashSet<EntryId> = HashSet::with_capacity(count);
        let mut i = self.rng.random::<u64>() as usize & max_mask;
        let mut empty_run = 0usize;
        let mut steps = count.saturating_mul(SAMPLE_STEPS_PER_KEY);

        while stored.len() < count && steps > 0 {
            steps -= 1;
            for j in 0..tables {
                if let Some(rehash_index) = rehash_index {
                    if j == 0 && i < rehash_index {
                        // table 0 is already drained below the rehash index;
                        // past the end of table 1 there is nothing to read
                        // in either table, so jump ahead
                        if i >= s1 {
                            i = rehash_index;
                        } else {
                            continue;
                        }
                    }
                }
                let size = if j == 0 { s0 } else { s1 };
                if i >= size {
                    continue;
                }

                let head = self.tables[j].head(i);
                if head.is_none() {
                    empty_run += 1;
                    if empty_run >= EMPTY_RUN_RESTART && empty_run > count {
                        i = self.rng.random::<u64>() as usize & max_mask;
                        empty_run = 0;
                    }
                    continue;
                }

                empty_run = 0;
                let mut chain = Chain::starting_at(&self.entries, head);
                while let Some((id, _)) = chain.next_with_id() {
                    if seen.insert(id) {
                        stored.push(id);
                        if stored.len() == count {
                            return stored;
                        }
                    }
                }
            }
            i = (i + 1) & max_mask;
        }
        stored
    }
}
