//! A single power-of-two bucket array and the entries chained from it.

use alloc::vec::Vec;

use slotmap::SlotMap;

use crate::dict_type::Value;
use crate::error::DictError;

slotmap::new_key_type! {
    /// Stable handle to an entry in a dictionary's arena.
    pub(crate) struct EntryId;
}

/// Arena owning every entry of a dictionary. Buckets and chain links refer
/// into it by [`EntryId`], so moving an entry between tables only relinks it.
pub(crate) type Arena<K, V> = SlotMap<EntryId, DictEntry<K, V>>;

/// A key, its value slot, and its link to the next entry of the same bucket.
#[derive(Debug)]
pub struct DictEntry<K, V> {
    pub(crate) key: K,
    pub(crate) value: Value<V>,
    pub(crate) hash: u64,
    pub(crate) next: Option<EntryId>,
}

impl<K, V> DictEntry<K, V> {
    pub(crate) fn new(key: K, hash: u64) -> Self {
        Self {
            key,
            value: Value::Unsigned(0),
            hash,
            next: None,
        }
    }

    /// The stored key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The hash computed when the entry was inserted.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// The value slot.
    pub fn value(&self) -> &Value<V> {
        &self.value
    }

    /// Mutable access to the value slot.
    pub fn value_mut(&mut self) -> &mut Value<V> {
        &mut self.value
    }

    /// The payload, if the slot holds [`Value::Ref`].
    pub fn val(&self) -> Option<&V> {
        self.value.payload()
    }

    /// Mutable payload, if the slot holds [`Value::Ref`].
    pub fn val_mut(&mut self) -> Option<&mut V> {
        self.value.payload_mut()
    }

    /// Overwrites the value slot and returns the previous one.
    ///
    /// This bypasses the descriptor's `val_dup` and `val_destroy` hooks.
    pub fn set_value(&mut self, value: Value<V>) -> Value<V> {
        core::mem::replace(&mut self.value, value)
    }

    /// The number, if the slot holds [`Value::Signed`].
    pub fn signed(&self) -> Option<i64> {
        self.value.as_signed()
    }

    /// Stores a signed integer, returning the previous slot.
    pub fn set_signed(&mut self, n: i64) -> Value<V> {
        self.set_value(Value::Signed(n))
    }

    /// The number, if the slot holds [`Value::Unsigned`].
    pub fn unsigned(&self) -> Option<u64> {
        self.value.as_unsigned()
    }

    /// Stores an unsigned integer, returning the previous slot.
    pub fn set_unsigned(&mut self, n: u64) -> Value<V> {
        self.set_value(Value::Unsigned(n))
    }

    /// The number, if the slot holds [`Value::Double`].
    pub fn double(&self) -> Option<f64> {
        self.value.as_double()
    }

    /// Stores a float, returning the previous slot.
    pub fn set_double(&mut self, n: f64) -> Value<V> {
        self.set_value(Value::Double(n))
    }

    /// Splits the entry into its key and value slot.
    pub fn into_parts(self) -> (K, Value<V>) {
        (self.key, self.value)
    }
}

/// One bucket array. `size` is zero or a power of two.
#[derive(Debug)]
pub(crate) struct Table {
    pub(crate) buckets: Vec<Option<EntryId>>,
    pub(crate) used: usize,
}

impl Table {
    pub(crate) const fn empty() -> Self {
        Self {
            buckets: Vec::new(),
            used: 0,
        }
    }

    /// Allocates `size` empty buckets, reporting allocation failure instead
    /// of aborting.
    pub(crate) fn try_with_size(size: usize) -> Result<Self, DictError> {
        debug_assert!(size.is_power_of_two());
        let mut buckets = Vec::new();
        buckets
            .try_reserve_exact(size)
            .map_err(|_| DictError::AllocFailure { buckets: size })?;
        buckets.resize(size, None);
        Ok(Self { buckets, used: 0 })
    }

    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn mask(&self) -> usize {
        self.size().saturating_sub(1)
    }

    #[inline]
    pub(crate) fn bucket_of(&self, hash: u64) -> usize {
        hash as usize & self.mask()
    }

    #[inline]
    pub(crate) fn head(&self, bucket: usize) -> Option<EntryId> {
        self.buckets.get(bucket).copied().flatten()
    }

    /// Address of the bucket array, used to fingerprint the table.
    pub(crate) fn storage_addr(&self) -> usize {
        self.buckets.as_ptr() as usize
    }

    /// Links `id` in front of `bucket`'s chain.
    pub(crate) fn push_front<K, V>(&mut self, arena: &mut Arena<K, V>, bucket: usize, id: EntryId) {
        if let Some(entry) = arena.get_mut(id) {
            entry.next = self.buckets[bucket];
            self.buckets[bucket] = Some(id);
            self.used += 1;
        }
    }

    /// Splices `id` out of `bucket`'s chain; `prev` is its predecessor.
    pub(crate) fn unlink<K, V>(
        &mut self,
        arena: &mut Arena<K, V>,
        bucket: usize,
        prev: Option<EntryId>,
        id: EntryId,
    ) {
        let next = arena.get_mut(id).and_then(|entry| entry.next.take());
        match prev {
            Some(prev) => {
                if let Some(prev) = arena.get_mut(prev) {
                    prev.next = next;
                }
            }
            None => self.buckets[bucket] = next,
        }
        self.used -= 1;
    }

    /// Detaches the whole chain of `bucket`, leaving the bucket empty. The
    /// caller takes over the chain's entries and the `used` bookkeeping.
    pub(crate) fn take_chain(&mut self, bucket: usize) -> Option<EntryId> {
        self.buckets.get_mut(bucket).and_then(Option::take)
    }

    pub(crate) fn chain<'a, K, V>(&self, arena: &'a Arena<K, V>, bucket: usize) -> Chain<'a, K, V> {
        Chain::starting_at(arena, self.head(bucket))
    }

    pub(crate) fn chain_len<K, V>(&self, arena: &Arena<K, V>, bucket: usize) -> usize {
        self.chain(arena, bucket).count()
    }
}

/// Walks one bucket chain.
pub(crate) struct Chain<'a, K, V> {
    arena: &'a Arena<K, V>,
    cur: Option<EntryId>,
}

impl<'a, K, V> Chain<'a, K, V> {
    /// Walks the chain that starts at `head`.
    pub(crate) fn starting_at(arena: &'a Arena<K, V>, head: Option<EntryId>) -> Self {
        Self { arena, cur: head }
    }

    /// Like `next`, but also yields the entry's id.
    pub(crate) fn next_with_id(&mut self) -> Option<(EntryId, &'a DictEntry<K, V>)> {
        let id = self.cur?;
        let entry = self.arena.get(id)?;
        self.cur = entry.next;
        Some((id, entry))
    }
}

impl<'a, K, V> Iterator for Chain<'a, K, V> {
    type Item = &'a DictEntry<K, V>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_with_id().map(|(_, entry)| entry)
    }
}
