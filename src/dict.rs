use core::mem;
use std::time::Duration;
use std::time::Instant;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::config::DictConfig;
use crate::dict_type::DictType;
use crate::dict_type::Value;
use crate::error::DictError;
use crate::hashing::HashSeed;
use crate::table::Arena;
use crate::table::DictEntry;
use crate::table::EntryId;
use crate::table::Table;

/// Rehash units performed per batch by [`Dict::rehash_for`].
const REHASH_BATCH: usize = 100;

/// `clear_with` invokes its callback once per this many buckets.
const CLEAR_CALLBACK_PERIOD: usize = 65536;

/// Result of [`Dict::replace`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// The key was absent and a new entry was added.
    Inserted,
    /// The key was present and its value was overwritten.
    Replaced,
}

/// Result of [`Dict::resize`] and [`Dict::enable_resize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeOutcome {
    /// A new bucket array was installed, or a rehash toward one started.
    Resized,
    /// Nothing to do, or not allowed right now.
    Skipped,
}

/// Location of an entry found by a lookup.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Slot {
    pub(crate) table: usize,
    pub(crate) bucket: usize,
    pub(crate) prev: Option<EntryId>,
    pub(crate) id: EntryId,
}

enum RawInsert {
    Inserted(EntryId),
    Existing(EntryId),
}

/// A chained hash table that grows and shrinks by incremental rehashing.
///
/// The dictionary owns two bucket arrays. While idle only the first holds
/// entries. A resize installs a second array and then migrates one bucket at
/// a time: every insert, lookup, and delete moves a bucket along, and callers
/// may push the migration with [`rehash`](Self::rehash) or
/// [`rehash_for`](Self::rehash_for). Lookups consult both arrays while a
/// migration is in progress, and new entries always land in the second.
///
/// Hashing, key/value copying, key comparison, and disposal are delegated to
/// the [`DictType`] descriptor `T`, which receives the instance's context.
///
/// Dropping a `Dict` releases every entry through the descriptor's destroy
/// hooks.
///
/// # Examples
///
/// ```rust
/// use rehash_dict::Dict;
/// use rehash_dict::DictError;
/// use rehash_dict::HashKeys;
///
/// let mut dict: Dict<u64, &str, _> = Dict::new(HashKeys::new());
/// dict.insert(1, "one").unwrap();
/// assert_eq!(dict.insert(1, "uno"), Err(DictError::KeyExists));
/// assert_eq!(dict.find(&1).and_then(|e| e.val()), Some(&"one"));
/// dict.delete(&1).unwrap();
/// assert!(dict.is_empty());
/// ```
pub struct Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    pub(crate) ty: T,
    pub(crate) ctx: T::Context,
    pub(crate) entries: Arena<K, V>,
    pub(crate) tables: [Table; 2],
    /// Next bucket of `tables[0]` to migrate; `None` while idle.
    pub(crate) rehash_index: Option<usize>,
    /// Outstanding safe iterators. Automatic rehash steps pause while > 0.
    pub(crate) safe_iterators: usize,
    pub(crate) config: DictConfig,
    resize_enabled: bool,
    resize_pending: bool,
    seed: HashSeed,
    pub(crate) rng: SmallRng,
}

impl<K, V, T> core::fmt::Debug for Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Dict")
            .field("len", &self.len())
            .field("sizes", &self.table_sizes())
            .field("used", &self.table_used())
            .field("rehash_index", &self.rehash_index)
            .field("safe_iterators", &self.safe_iterators)
            .field("resize_enabled", &self.resize_enabled)
            .finish()
    }
}

impl<K, V, T> Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
    T::Context: Default,
{
    /// Creates an empty dictionary with a default context and configuration.
    pub fn new(ty: T) -> Self {
        Self::with_context(ty, T::Context::default())
    }
}

impl<K, V, T> Drop for Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, T> Dict<K, V, T>
where
    K: PartialEq,
    T: DictType<K, V>,
{
    /// Creates an empty dictionary. No buckets are allocated until the first
    /// insert.
    pub fn with_context(ty: T, ctx: T::Context) -> Self {
        Self::with_config(ty, ctx, DictConfig::default())
    }

    /// Creates an empty dictionary with explicit tunables.
    pub fn with_config(ty: T, ctx: T::Context, config: DictConfig) -> Self {
        let seed = config.hash_seed.unwrap_or_else(HashSeed::random);
        let rng = match config.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::try_from_os_rng().unwrap_or_else(|err| {
                warn!(%err, "OS entropy unavailable, seeding sampling from the hash seed");
                SmallRng::seed_from_u64(seed.fold_u64())
            }),
        };
        Self {
            ty,
            ctx,
            entries: Arena::with_key(),
            tables: [Table::empty(), Table::empty()],
            rehash_index: None,
            safe_iterators: 0,
            resize_enabled: config.resize_enabled,
            resize_pending: false,
            config,
            seed,
            rng,
        }
    }

    /// Number of entries across both tables.
    pub fn len(&self) -> usize {
        self.tables[0].used + self.tables[1].used
    }

    /// Returns `true` if the dictionary holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bucket count across both tables.
    pub fn slots(&self) -> usize {
        self.tables[0].size() + self.tables[1].size()
    }

    /// Bucket counts of the primary table and the rehash target.
    pub fn table_sizes(&self) -> [usize; 2] {
        [self.tables[0].size(), self.tables[1].size()]
    }

    /// Entry counts of the primary table and the rehash target.
    pub fn table_used(&self) -> [usize; 2] {
        [self.tables[0].used, self.tables[1].used]
    }

    /// Returns `true` while entries are being migrated to a new table.
    pub fn is_rehashing(&self) -> bool {
        self.rehash_index.is_some()
    }

    /// Next bucket of the primary table to migrate, or `None` while idle.
    pub fn rehash_index(&self) -> Option<usize> {
        self.rehash_index
    }

    /// The descriptor.
    pub fn dict_type(&self) -> &T {
        &self.ty
    }

    /// The context handed to every hook.
    pub fn context(&self) -> &T::Context {
        &self.ctx
    }

    /// Mutable access to the context.
    pub fn context_mut(&mut self) -> &mut T::Context {
        &mut self.ctx
    }

    /// The configuration this instance was created with.
    pub fn config(&self) -> &DictConfig {
        &self.config
    }

    /// The seed handed to the descriptor's `hash` hook.
    pub fn hash_seed(&self) -> HashSeed {
        self.seed
    }

    /// Replaces the hash seed. Refused while the dictionary holds entries,
    /// since their stored hashes and bucket positions depend on it.
    pub fn set_hash_seed(&mut self, seed: HashSeed) -> Result<(), DictError> {
        if !self.is_empty() {
            return Err(DictError::InvalidState("hash seed changed on a populated dictionary"));
        }
        self.seed = seed;
        Ok(())
    }

    /// Hashes `key` the way this dictionary does.
    pub fn key_hash(&self, key: &K) -> u64 {
        self.ty.hash(&self.seed, key)
    }

    /// Returns `true` if automatic growth and [`resize`](Self::resize) are
    /// allowed.
    pub fn resize_enabled(&self) -> bool {
        self.resize_enabled
    }

    /// Stops automatic growth (short of the forced ratio) and defers
    /// [`resize`](Self::resize) requests.
    pub fn disable_resize(&mut self) {
        self.resize_enabled = false;
    }

    /// Re-enables resizing and replays a resize deferred while disabled.
    pub fn enable_resize(&mut self) -> Result<ResizeOutcome, DictError> {
        self.resize_enabled = true;
        if !mem::take(&mut self.resize_pending) {
            return Ok(ResizeOutcome::Skipped);
        }
        debug!(len = self.len(), "replaying deferred resize");
        self.resize()
    }

    /// Smallest allowed table size for `used` entries.
    fn target_size(&self, used: usize) -> usize {
        used.saturating_mul(2)
            .checked_next_power_of_two()
            .unwrap_or(usize::MAX / 2 + 1)
            .max(self.config.initial_buckets())
    }

    /// Creates or grows the table to hold at least `size` buckets.
    ///
    /// On an unallocated dictionary the new table is installed directly.
    /// Otherwise it becomes the rehash target and entries migrate to it
    /// incrementally.
    pub fn expand(&mut self, size: usize) -> Result<(), DictError> {
        if self.is_rehashing() {
            return Err(DictError::InvalidState("expand while rehashing"));
        }
        if self.tables[0].used > size {
            return Err(DictError::InvalidState("expand below the element count"));
        }
        let real_size = size
            .checked_next_power_of_two()
            .ok_or(DictError::InvalidState("expand size overflows"))?
            .max(self.config.initial_buckets());
        if real_size == self.tables[0].size() {
            return Err(DictError::InvalidState("table already has the requested size"));
        }

        let table = Table::try_with_size(real_size)?;
        if self.tables[0].size() == 0 {
            self.tables[0] = table;
            return Ok(());
        }

        debug!(
            from = self.tables[0].size(),
            to = real_size,
            used = self.tables[0].used,
            "rehash started"
        );
        self.tables[1] = table;
        self.rehash_index = Some(0);
        Ok(())
    }

    /// Resizes to the smallest power of two holding twice the element count
    /// (never below the initial size).
    ///
    /// While resizing is disabled the request is recorded and replayed by
    /// [`enable_resize`](Self::enable_resize).
    pub fn resize(&mut self) -> Result<ResizeOutcome, DictError> {
        if !self.resize_enabled {
            self.resize_pending = true;
            debug!(len = self.len(), "resize deferred while disabled");
            return Ok(ResizeOutcome::Skipped);
        }
        if self.is_rehashing() {
            return Ok(ResizeOutcome::Skipped);
        }
        let target = self.target_size(self.tables[0].used);
        if target == self.tables[0].size() {
            return Ok(ResizeOutcome::Skipped);
        }
        match self.expand(target) {
            Ok(()) => Ok(ResizeOutcome::Resized),
            Err(err @ DictError::AllocFailure { .. }) => Err(err),
            Err(_) => Ok(ResizeOutcome::Skipped),
        }
    }

    /// Grows before an insert if one more entry would push the load factor
    /// past one half.
    fn expand_if_needed(&mut self) -> Result<(), DictError> {
        if self.is_rehashing() {
            return Ok(());
        }
        let size = self.tables[0].size();
        if size == 0 {
            return self.expand(self.config.initial_buckets());
        }

        let needed = self.tables[0].used + 1;
        if needed.saturating_mul(2) <= size {
            return Ok(());
        }
        if !self.resize_enabled && self.tables[0].used / size <= self.config.force_ratio() {
            if !self.resize_pending {
                debug!(
                    used = self.tables[0].used,
                    size, "growth deferred while resize is disabled"
                );
            }
            self.resize_pending = true;
            return Ok(());
        }
        self.expand(self.target_size(needed))
    }

    /// Performs up to `steps` units of migration work. Each unit moves one
    /// non-empty bucket of the primary table to the rehash target, skipping
    /// at most `steps * empty_visits_per_step` empty buckets per call.
    ///
    /// Returns `true` while there is still work left.
    pub fn rehash(&mut self, steps: usize) -> bool {
        let Some(mut index) = self.rehash_index else {
            return false;
        };
        let mut empty_visits = steps.saturating_mul(self.config.empty_visits());
        let mut remaining = steps;

        while remaining > 0 && self.tables[0].used != 0 {
            remaining -= 1;
            debug_assert!(index < self.tables[0].size());
            while self.tables[0].head(index).is_none() {
                index += 1;
                empty_visits -= 1;
                if empty_visits == 0 {
                    self.rehash_index = Some(index);
                    return true;
                }
            }

            let mut cur = self.tables[0].take_chain(index);
            while let Some(id) = cur {
                let Some(entry) = self.entries.get_mut(id) else {
                    break;
                };
                cur = entry.next.take();
                let bucket = self.tables[1].bucket_of(entry.hash);
                self.tables[0].used -= 1;
                self.tables[1].push_front(&mut self.entries, bucket, id);
            }
            index += 1;
        }

        if self.tables[0].used == 0 {
            self.tables[0] = mem::replace(&mut self.tables[1], Table::empty());
            self.rehash_index = None;
            debug!(size = self.tables[0].size(), used = self.tables[0].used, "rehash complete");
            return false;
        }

        trace!(index, remaining = self.tables[0].used, "rehash progress");
        self.rehash_index = Some(index);
        true
    }

    /// Rehashes in batches of 100 units until done or until `budget` has
    /// elapsed. Returns `true` if any migration work was performed.
    pub fn rehash_for(&mut self, budget: Duration) -> bool {
        if !self.is_rehashing() {
            return false;
        }
        let start = Instant::now();
        let mut batches = 0usize;
        loop {
            batches += 1;
            if !self.rehash(REHASH_BATCH) || start.elapsed() > budget {
                break;
            }
        }
        debug!(batches, done = !self.is_rehashing(), "timed rehash");
        true
    }

    /// The single piggybacked step taken by regular operations, skipped while
    /// safe iterators are outstanding.
    pub(crate) fn rehash_step(&mut self) {
        if self.safe_iterators == 0 && self.is_rehashing() {
            self.rehash(1);
        }
    }

    /// Finds the entry matching `matches` among the entries stored under
    /// `hash`, probing the rehash target too while migrating.
    pub(crate) fn locate(&self, hash: u64, mut matches: impl FnMut(&K) -> bool) -> Option<Slot> {
        if self.is_empty() {
            return None;
        }
        for table in 0..=1 {
            let t = &self.tables[table];
            if t.size() != 0 {
                let bucket = t.bucket_of(hash);
                let mut prev = None;
                let mut chain = t.chain(&self.entries, bucket);
                while let Some((id, entry)) = chain.next_with_id() {
                    if entry.hash == hash && matches(&entry.key) {
                        return Some(Slot {
                            table,
                            bucket,
                            prev,
                            id,
                        });
                    }
                    prev = Some(id);
                }
            }
            if !self.is_rehashing() {
                break;
            }
        }
        None
    }

    fn locate_key(&self, hash: u64, key: &K) -> Option<Slot> {
        self.locate(hash, |stored| self.ty.key_compare(&self.ctx, key, stored))
    }

    fn add_raw(&mut self, key: K) -> Result<RawInsert, DictError> {
        let hash = self.ty.hash(&self.seed, &key);
        self.rehash_step();
        self.expand_if_needed()?;
        if let Some(slot) = self.locate_key(hash, &key) {
            return Ok(RawInsert::Existing(slot.id));
        }

        let key = self.ty.key_dup(&self.ctx, key);
        let table = usize::from(self.is_rehashing());
        let bucket = self.tables[table].bucket_of(hash);
        let id = self.entries.insert(DictEntry::new(key, hash));
        self.tables[table].push_front(&mut self.entries, bucket, id);
        Ok(RawInsert::Inserted(id))
    }

    fn entry_mut(&mut self, id: EntryId) -> Result<&mut DictEntry<K, V>, DictError> {
        self.entries
            .get_mut(id)
            .ok_or(DictError::InvalidState("entry missing from arena"))
    }

    /// Adds `key` with `val` (passed through `val_dup`).
    ///
    /// Fails with [`DictError::KeyExists`] if an equal key is present. No
    /// entry is added or changed in that case, but the call may still take a
    /// rehash step or start growing the table, like any other insert.
    pub fn insert(&mut self, key: K, val: V) -> Result<(), DictError> {
        match self.add_raw(key)? {
            RawInsert::Existing(_) => Err(DictError::KeyExists),
            RawInsert::Inserted(id) => {
                let val = self.ty.val_dup(&self.ctx, val);
                self.entry_mut(id)?.value = Value::Ref(val);
                Ok(())
            }
        }
    }

    /// Adds `key` with an unset value (`Value::Unsigned(0)`) and returns the
    /// new entry so the caller can fill in the value slot.
    pub fn insert_raw(&mut self, key: K) -> Result<&mut DictEntry<K, V>, DictError> {
        match self.add_raw(key)? {
            RawInsert::Existing(_) => Err(DictError::KeyExists),
            RawInsert::Inserted(id) => self.entry_mut(id),
        }
    }

    /// Returns the entry for `key`, adding one with an unset value if absent.
    pub fn insert_or_find(&mut self, key: K) -> Result<&mut DictEntry<K, V>, DictError> {
        match self.add_raw(key)? {
            RawInsert::Existing(id) | RawInsert::Inserted(id) => self.entry_mut(id),
        }
    }

    /// Sets `key` to `val`, adding the key if absent. An overwritten
    /// [`Value::Ref`] payload goes through `val_destroy` after the new value
    /// is stored.
    pub fn replace(&mut self, key: K, val: V) -> Result<ReplaceOutcome, DictError> {
        let (id, outcome) = match self.add_raw(key)? {
            RawInsert::Inserted(id) => (id, ReplaceOutcome::Inserted),
            RawInsert::Existing(id) => (id, ReplaceOutcome::Replaced),
        };
        let val = self.ty.val_dup(&self.ctx, val);
        let old = mem::replace(&mut self.entry_mut(id)?.value, Value::Ref(val));
        if outcome == ReplaceOutcome::Replaced {
            if let Some(old) = old.into_ref() {
                self.ty.val_destroy(&self.ctx, old);
            }
        }
        Ok(outcome)
    }

    fn find_id(&mut self, key: &K) -> Option<EntryId> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();
        let hash = self.ty.hash(&self.seed, key);
        self.locate_key(hash, key).map(|slot| slot.id)
    }

    /// Looks up `key`, taking one piggybacked rehash step.
    pub fn find(&mut self, key: &K) -> Option<&DictEntry<K, V>> {
        let id = self.find_id(key)?;
        self.entries.get(id)
    }

    /// Mutable lookup, taking one piggybacked rehash step.
    pub fn find_mut(&mut self, key: &K) -> Option<&mut DictEntry<K, V>> {
        let id = self.find_id(key)?;
        self.entries.get_mut(id)
    }

    /// The value slot stored for `key`.
    pub fn fetch_value(&mut self, key: &K) -> Option<&Value<V>> {
        self.find(key).map(DictEntry::value)
    }

    /// Looks up `key` without advancing any rehash.
    pub fn get(&self, key: &K) -> Option<&DictEntry<K, V>> {
        let hash = self.ty.hash(&self.seed, key);
        let slot = self.locate_key(hash, key)?;
        self.entries.get(slot.id)
    }

    /// Returns `true` if an equal key is present. Never advances a rehash.
    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Finds the entry stored under `hash` whose key satisfies `is_same`,
    /// without calling the hash or compare hooks. Meant for callers holding
    /// the stored key itself (e.g. comparing with `Arc::ptr_eq`).
    pub fn find_by_identity(
        &self,
        hash: u64,
        is_same: impl FnMut(&K) -> bool,
    ) -> Option<&DictEntry<K, V>> {
        let slot = self.locate(hash, is_same)?;
        self.entries.get(slot.id)
    }

    fn unlink_id(&mut self, key: &K) -> Option<EntryId> {
        if self.is_empty() {
            return None;
        }
        self.rehash_step();
        let hash = self.ty.hash(&self.seed, key);
        let slot = self.locate_key(hash, key)?;
        self.tables[slot.table].unlink(&mut self.entries, slot.bucket, slot.prev, slot.id);
        Some(slot.id)
    }

    /// Removes `key` and disposes of its key and value through the
    /// descriptor.
    pub fn delete(&mut self, key: &K) -> Result<(), DictError> {
        let id = self.unlink_id(key).ok_or(DictError::NotFound)?;
        let entry = self.entries.remove(id).ok_or(DictError::NotFound)?;
        self.release_entry(entry);
        Ok(())
    }

    /// Removes `key` and hands the entry to the caller without running the
    /// destroy hooks. Pass it to [`release_entry`](Self::release_entry) when
    /// done with it, or drop it to skip the hooks entirely.
    pub fn unlink(&mut self, key: &K) -> Result<DictEntry<K, V>, DictError> {
        let id = self.unlink_id(key).ok_or(DictError::NotFound)?;
        self.entries.remove(id).ok_or(DictError::NotFound)
    }

    /// Runs the destroy hooks on an entry obtained from
    /// [`unlink`](Self::unlink).
    pub fn release_entry(&self, entry: DictEntry<K, V>) {
        let (key, value) = entry.into_parts();
        self.ty.key_destroy(&self.ctx, key);
        if let Some(val) = value.into_ref() {
            self.ty.val_destroy(&self.ctx, val);
        }
    }

    /// Removes every entry and frees both tables.
    pub fn clear(&mut self) {
        self.clear_with(|_| {});
    }

    /// Like [`clear`](Self::clear), calling `callback` with the context every
    /// 65536 buckets so that long clears can cooperate with the caller.
    pub fn clear_with(&mut self, mut callback: impl FnMut(&T::Context)) {
        for table in 0..2 {
            let drained = mem::replace(&mut self.tables[table], Table::empty());
            let mut remaining = drained.used;
            for (i, head) in drained.buckets.into_iter().enumerate() {
                if remaining == 0 {
                    break;
                }
                if i % CLEAR_CALLBACK_PERIOD == 0 {
                    callback(&self.ctx);
                }
                let mut cur = head;
                while let Some(id) = cur {
                    let Some(entry) = self.entries.remove(id) else {
                        break;
                    };
                    cur = entry.next;
                    remaining = remaining.saturating_sub(1);
                    self.release_entry(entry);
                }
            }
        }
        debug_assert!(self.entries.is_empty());
        self.rehash_index = None;
    }
}
