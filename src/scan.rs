//! Stateless cursor scanning.
//!
//! The cursor is a bucket index whose bits are incremented from the most
//! significant end. Because every table size is a power of two, the buckets
//! visited before a resize map onto a contiguous prefix of the buckets in the
//! new size, so a full scan returns every entry that was present for the
//! whole scan at least once, even if the table grew or shrank in between
//! calls. Entries may be returned more than once.

use crate::dict::Dict;
use crate::dict_type::DictType;
use crate::dict_type::Value;
use crate::table::Arena;
use crate::table::DictEntry;
use crate::table::EntryId;

#[inline]
fn next_cursor(v: u64, mask: u64) -> u64 {
    (v | !mask).reverse_bits().wrapping_add(1).reverse_bits()
}

/// Calls `visit(table, bucket)` for every bucket covered by cursor `v` and
/// returns the next cursor. While rehashing, the smaller table's bucket is
/// visited first, then every bucket of the larger table it expands into.
pub(crate) fn walk_cursor(
    sizes: [usize; 2],
    rehashing: bool,
    mut v: u64,
    mut visit: impl FnMut(usize, usize),
) -> u64 {
    if !rehashing {
        let mask = sizes[0].saturating_sub(1) as u64;
        visit(0, (v & mask) as usize);
        return next_cursor(v, mask);
    }

    let (small, large) = if sizes[0] > sizes[1] { (1, 0) } else { (0, 1) };
    let m0 = sizes[small].saturating_sub(1) as u64;
    let m1 = sizes[large].saturating_sub(1) as u64;

    visit(small, (v & m0) as usize);
    loop {
        visit(large, (v & m1) as usize);
        v = next_cursor(v, m1);
        if v & (m0 ^ m1) == 0 {
            break;
        }
    }
    v
}

/// One bucket chain handed to the bucket callback of [`Dict::scan_buckets`].
pub struct ScanBucket<'a, K, V> {
    entries: &'a mut Arena<K, V>,
    head: Option<EntryId>,
}

impl<K, V> ScanBucket<'_, K, V> {
    /// Number of entries chained in this bucket.
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head;
        while let Some(entry) = cur.and_then(|id| self.entries.get(id)) {
            n += 1;
            cur = entry.next;
        }
        n
    }

    /// Returns `true` for an empty bucket.
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Runs `f` on every entry of the bucket with mutable access to its value
    /// slot. Keys stay read-only since they determine the bucket.
    pub fn for_each_value(&mut self, mut f: impl FnMut(&K, &mut Value<V>)) {
        let mut cur = self.head;
        while let Some(id) = cur {
            let Some(entry) = self.entries.get_mut(id) else {
                break;
            };
            f(&entry.key, &mut entry.value);
            cur = entry.next;
        }
    }
}

impl<K, V, T> Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    /// Visits the entries of the buckets covered by `cursor` and returns the
    /// cursor for the next call. Start with `0`; a returned `0` means the
    /// scan is complete.
    ///
    /// Never advances a rehash, so a caller may modify the dictionary
    /// between calls.
    ///
    /// ```rust
    /// use rehash_dict::Dict;
    /// use rehash_dict::HashKeys;
    ///
    /// let mut dict: Dict<u32, (), _> = Dict::new(HashKeys::new());
    /// for k in 0..100 {
    ///     dict.insert(k, ()).unwrap();
    /// }
    ///
    /// let mut seen = std::collections::HashSet::new();
    /// let mut cursor = 0;
    /// loop {
    ///     cursor = dict.scan(cursor, |entry| {
    ///         seen.insert(*entry.key());
    ///     });
    ///     if cursor == 0 {
    ///         break;
    ///     }
    /// }
    /// assert_eq!(seen.len(), 100);
    /// ```
    pub fn scan(&self, cursor: u64, mut visit: impl FnMut(&DictEntry<K, V>)) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let tables = &self.tables;
        let entries = &self.entries;
        walk_cursor(self.table_sizes(), self.is_rehashing(), cursor, |table, bucket| {
            tables[table].chain(entries, bucket).for_each(&mut visit);
        })
    }

    /// Like [`scan`](Self::scan), additionally handing each visited bucket to
    /// `bucket_visit` before its entries are passed to `visit`.
    pub fn scan_buckets(
        &mut self,
        cursor: u64,
        mut visit: impl FnMut(&DictEntry<K, V>),
        mut bucket_visit: impl FnMut(ScanBucket<'_, K, V>),
    ) -> u64 {
        if self.is_empty() {
            return 0;
        }
        let sizes = self.table_sizes();
        let rehashing = self.is_rehashing();
        let tables = &self.tables;
        let entries = &mut self.entries;
        walk_cursor(sizes, rehashing, cursor, |table, bucket| {
            let head = tables[table].head(bucket);
            bucket_visit(ScanBucket {
                entries: &mut *entries,
                head,
            });
            tables[table].chain(entries, bucket).for_each(&mut visit);
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::config::DictConfig;
    use crate::dict_type::HashKeys;

    type IntDict = Dict<u64, u64, HashKeys<u64>>;

    fn filled(n: u64) -> IntDict {
        let config = DictConfig::default().with_rng_seed(21);
        let mut dict = Dict::with_config(HashKeys::new(), (), config);
        for k in 0..n {
            dict.insert(k, k).unwrap();
        }
        while dict.rehash(100) {}
        dict
    }

    #[test]
    fn cursor_walks_reverse_binary_order() {
        let mut order = Vec::new();
        let mut v = 0;
        loop {
            v = walk_cursor([8, 0], false, v, |_, bucket| order.push(bucket));
            if v == 0 {
                break;
            }
        }
        assert_eq!(order, [0, 4, 2, 6, 1, 5, 3, 7]);
    }

    #[test]
    fn rehashing_cursor_expands_small_bucket() {
        let mut visited = Vec::new();
        let next = walk_cursor([4, 16], true, 1, |table, bucket| visited.push((table, bucket)));
        assert_eq!(visited, [(0, 1), (1, 1), (1, 9), (1, 5), (1, 13)]);
        assert_eq!(next, 3);

        visited.clear();
        walk_cursor([16, 4], true, 1, |table, bucket| visited.push((table, bucket)));
        assert_eq!(visited, [(1, 1), (0, 1), (0, 9), (0, 5), (0, 13)]);
    }

    #[test]
    fn empty_dict_scan_ends_immediately() {
        let dict = filled(0);
        let mut calls = 0;
        assert_eq!(dict.scan(0, |_| calls += 1), 0);
        assert_eq!(dict.scan(12345, |_| calls += 1), 0);
        assert_eq!(calls, 0);
    }

    #[test]
    fn full_scan_sees_every_key() {
        let dict = filled(500);
        let mut seen = BTreeSet::new();
        let mut cursor = 0;
        loop {
            cursor = dict.scan(cursor, |entry| {
                seen.insert(*entry.key());
            });
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(seen, (0..500).collect());
    }

    #[test]
    fn scan_survives_growth() {
        let mut dict = filled(100);
        let mut seen = BTreeSet::new();
        let mut cursor = 0;
        let mut next_key = 1_000u64;
        loop {
            cursor = dict.scan(cursor, |entry| {
                seen.insert(*entry.key());
            });
            // bounded so the table stops growing and the cursor can wrap
            if next_key < 1_600 {
                for _ in 0..20 {
                    dict.insert(next_key, 0).unwrap();
                    next_key += 1;
                }
            }
            if cursor == 0 {
                break;
            }
        }
        assert!((0..100).all(|k| seen.contains(&k)));
    }

    #[test]
    fn scan_survives_shrink() {
        let mut dict = filled(1000);
        let mut seen = BTreeSet::new();
        let mut cursor = 0;
        let mut steps = 0;
        loop {
            cursor = dict.scan(cursor, |entry| {
                seen.insert(*entry.key());
            });
            steps += 1;
            if steps == 10 {
                for k in 100..1000u64 {
                    dict.delete(&k).unwrap();
                }
                dict.resize().unwrap();
            }
            dict.rehash(3);
            if cursor == 0 {
                break;
            }
        }
        assert!((0..100).all(|k| seen.contains(&k)));
    }

    #[test]
    fn bucket_callback_sees_each_bucket_once() {
        let mut dict = filled(300);
        let mut bucket_total = 0;
        let mut entry_total = 0;
        let mut cursor = 0;
        loop {
            cursor = dict.scan_buckets(
                cursor,
                |_| entry_total += 1,
                |bucket| bucket_total += bucket.len(),
            );
            if cursor == 0 {
                break;
            }
        }
        assert_eq!(bucket_total, 300);
        assert_eq!(entry_total, 300);
    }

    #[test]
    fn bucket_callback_edits_values() {
        let mut dict = filled(64);
        let mut cursor = 0;
        loop {
            cursor = dict.scan_buckets(
                cursor,
                |_| {},
                |mut bucket| {
                    bucket.for_each_value(|key, value| *value = Value::Unsigned(key + 1));
                },
            );
            if cursor == 0 {
                break;
            }
        }
        for k in 0..64u64 {
            assert_eq!(dict.get(&k).and_then(|e| e.unsigned()), Some(k + 1));
        }
    }
}
