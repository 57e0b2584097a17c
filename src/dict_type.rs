//! Per-instance behavior hooks and the stored value representation.

use alloc::sync::Arc;
use core::hash::Hash;
use core::marker::PhantomData;

use crate::hashing::HashSeed;
use crate::hashing::gen_hash;

/// Heap string used by the ready-made descriptors.
pub type SharedStr = Arc<str>;

/// Behavior hooks consulted by a [`Dict`](crate::Dict).
///
/// Only `hash` is required. The other hooks default to storing keys and
/// values as given, comparing keys with `==`, and dropping them on removal.
/// Every hook except `hash` receives the dictionary's context value; `hash`
/// receives the dictionary's seed instead.
///
/// A descriptor is usually a zero-sized type. Implementations for `&T` and
/// `Arc<T>` let several dictionaries share one stateful descriptor.
///
/// # Examples
///
/// ```rust
/// use rehash_dict::Dict;
/// use rehash_dict::DictType;
/// use rehash_dict::HashSeed;
/// use rehash_dict::gen_case_hash;
///
/// /// Case-insensitive keys; the context counts destroyed values.
/// struct CaseInsensitive;
///
/// impl DictType<String, u32> for CaseInsensitive {
///     type Context = core::cell::Cell<usize>;
///
///     fn hash(&self, seed: &HashSeed, key: &String) -> u64 {
///         gen_case_hash(seed, key.as_bytes())
///     }
///
///     fn key_compare(&self, _ctx: &Self::Context, a: &String, b: &String) -> bool {
///         a.eq_ignore_ascii_case(b)
///     }
///
///     fn val_destroy(&self, ctx: &Self::Context, _val: u32) {
///         ctx.set(ctx.get() + 1);
///     }
/// }
///
/// let mut dict = Dict::with_context(CaseInsensitive, Default::default());
/// dict.insert("Key".to_string(), 1).unwrap();
/// assert!(dict.contains_key(&"KEY".to_string()));
/// dict.delete(&"kEy".to_string()).unwrap();
/// assert_eq!(dict.context().get(), 1);
/// ```
pub trait DictType<K: PartialEq, V> {
    /// Opaque value threaded through the hooks; owned by the dictionary.
    type Context;

    /// Hashes a key under the dictionary's seed.
    fn hash(&self, seed: &HashSeed, key: &K) -> u64;

    /// Produces the key that gets stored when a new entry is created.
    fn key_dup(&self, _ctx: &Self::Context, key: K) -> K {
        key
    }

    /// Produces the value that gets stored by `insert` and `replace`.
    fn val_dup(&self, _ctx: &Self::Context, val: V) -> V {
        val
    }

    /// Key equality.
    fn key_compare(&self, _ctx: &Self::Context, a: &K, b: &K) -> bool {
        a == b
    }

    /// Disposes of a key removed from the dictionary.
    fn key_destroy(&self, _ctx: &Self::Context, key: K) {
        drop(key);
    }

    /// Disposes of a [`Value::Ref`] payload removed or overwritten.
    fn val_destroy(&self, _ctx: &Self::Context, val: V) {
        drop(val);
    }
}

impl<K: PartialEq, V, T: DictType<K, V> + ?Sized> DictType<K, V> for &T {
    type Context = T::Context;

    fn hash(&self, seed: &HashSeed, key: &K) -> u64 {
        (**self).hash(seed, key)
    }

    fn key_dup(&self, ctx: &Self::Context, key: K) -> K {
        (**self).key_dup(ctx, key)
    }

    fn val_dup(&self, ctx: &Self::Context, val: V) -> V {
        (**self).val_dup(ctx, val)
    }

    fn key_compare(&self, ctx: &Self::Context, a: &K, b: &K) -> bool {
        (**self).key_compare(ctx, a, b)
    }

    fn key_destroy(&self, ctx: &Self::Context, key: K) {
        (**self).key_destroy(ctx, key)
    }

    fn val_destroy(&self, ctx: &Self::Context, val: V) {
        (**self).val_destroy(ctx, val)
    }
}

impl<K: PartialEq, V, T: DictType<K, V> + ?Sized> DictType<K, V> for Arc<T> {
    type Context = T::Context;

    fn hash(&self, seed: &HashSeed, key: &K) -> u64 {
        (**self).hash(seed, key)
    }

    fn key_dup(&self, ctx: &Self::Context, key: K) -> K {
        (**self).key_dup(ctx, key)
    }

    fn val_dup(&self, ctx: &Self::Context, val: V) -> V {
        (**self).val_dup(ctx, val)
    }

    fn key_compare(&self, ctx: &Self::Context, a: &K, b: &K) -> bool {
        (**self).key_compare(ctx, a, b)
    }

    fn key_destroy(&self, ctx: &Self::Context, key: K) {
        (**self).key_destroy(ctx, key)
    }

    fn val_destroy(&self, ctx: &Self::Context, val: V) {
        (**self).val_destroy(ctx, val)
    }
}

/// String keys copied into a fresh allocation on insert; values stored as
/// given.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStringCopyKey;

impl<V> DictType<SharedStr, V> for HeapStringCopyKey {
    type Context = ();

    fn hash(&self, seed: &HashSeed, key: &SharedStr) -> u64 {
        gen_hash(seed, key.as_bytes())
    }

    fn key_dup(&self, _ctx: &(), key: SharedStr) -> SharedStr {
        Arc::from(&*key)
    }
}

/// String keys and values stored by reference, without copying.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStrings;

impl DictType<SharedStr, SharedStr> for HeapStrings {
    type Context = ();

    fn hash(&self, seed: &HashSeed, key: &SharedStr) -> u64 {
        gen_hash(seed, key.as_bytes())
    }
}

/// String keys and string values, both copied on insert.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeapStringCopyKeyValue;

impl DictType<SharedStr, SharedStr> for HeapStringCopyKeyValue {
    type Context = ();

    fn hash(&self, seed: &HashSeed, key: &SharedStr) -> u64 {
        gen_hash(seed, key.as_bytes())
    }

    fn key_dup(&self, _ctx: &(), key: SharedStr) -> SharedStr {
        Arc::from(&*key)
    }

    fn val_dup(&self, _ctx: &(), val: SharedStr) -> SharedStr {
        Arc::from(&*val)
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        fn hash_native<K: Hash + ?Sized>(seed: &HashSeed, key: &K) -> u64 {
            use core::hash::BuildHasher;

            foldhash::fast::FixedState::with_seed(seed.fold_u64()).hash_one(key)
        }
    } else {
        fn hash_native<K: Hash + ?Sized>(seed: &HashSeed, key: &K) -> u64 {
            use core::hash::Hasher;

            let mut hasher = seed.hasher();
            key.hash(&mut hasher);
            hasher.finish()
        }
    }
}

/// Descriptor for any `K: Hash + Eq`, hashing through `core::hash::Hash`.
///
/// Uses foldhash when the `foldhash` feature is enabled and seeded
/// SipHash-1-3 otherwise.
pub struct HashKeys<K>(PhantomData<fn(&K)>);

impl<K> HashKeys<K> {
    /// Creates the descriptor.
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K> Default for HashKeys<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for HashKeys<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for HashKeys<K> {}

impl<K> core::fmt::Debug for HashKeys<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("HashKeys")
    }
}

impl<K: Hash + Eq, V> DictType<K, V> for HashKeys<K> {
    type Context = ();

    fn hash(&self, seed: &HashSeed, key: &K) -> u64 {
        hash_native(seed, key)
    }
}

/// The value slot of an entry: an opaque payload or an inline number.
///
/// Exactly one variant is active. The dictionary runs `val_dup` and
/// `val_destroy` on [`Value::Ref`] payloads only; switching an entry between
/// variants after insertion is up to the caller and is not validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<V> {
    /// Caller data.
    Ref(V),
    /// Signed integer.
    Signed(i64),
    /// Unsigned integer.
    Unsigned(u64),
    /// Floating point.
    Double(f64),
}

impl<V> Value<V> {
    /// Returns the payload when this is a [`Value::Ref`].
    pub fn payload(&self) -> Option<&V> {
        match self {
            Value::Ref(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable access to a [`Value::Ref`] payload.
    pub fn payload_mut(&mut self) -> Option<&mut V> {
        match self {
            Value::Ref(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the number when this is a [`Value::Signed`].
    pub fn as_signed(&self) -> Option<i64> {
        match *self {
            Value::Signed(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the number when this is a [`Value::Unsigned`].
    pub fn as_unsigned(&self) -> Option<u64> {
        match *self {
            Value::Unsigned(n) => Some(n),
            _ => None,
        }
    }

    /// Returns the number when this is a [`Value::Double`].
    pub fn as_double(&self) -> Option<f64> {
        match *self {
            Value::Double(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn into_ref(self) -> Option<V> {
        match self {
            Value::Ref(v) => Some(v),
            _ => None,
        }
    }
}
