use core::fmt::Debug;
use core::hash::Hasher;

use rand::TryRngCore;
use rand::rngs::OsRng;
use siphasher::sip::SipHasher13;
use tracing::warn;

/// Stack buffer size used when lowercasing input for [`gen_case_hash`].
const CASE_CHUNK: usize = 64;

/// A 16-byte SipHash key.
///
/// Every [`Dict`](crate::Dict) carries one and hands it to its descriptor's
/// `hash` hook, so two dictionaries seeded differently place the same keys in
/// unrelated buckets.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashSeed([u8; 16]);

impl Debug for HashSeed {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // The seed protects against collision flooding; don't leak it in logs.
        f.write_str("HashSeed(..)")
    }
}

impl HashSeed {
    /// Wraps raw key bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Draws a seed from the operating system's entropy source.
    ///
    /// Falls back to the all-zero key, with a warning, if the OS source is
    /// unavailable. Such a dictionary has no protection against crafted
    /// colliding keys.
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        if let Err(err) = OsRng.try_fill_bytes(&mut bytes) {
            warn!(%err, "OS entropy unavailable, using the all-zero hash seed");
            bytes = [0u8; 16];
        }
        Self(bytes)
    }

    /// Returns the raw key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Folds the key into a single `u64`, for hashers that take a smaller seed.
    pub fn fold_u64(&self) -> u64 {
        let (lo, hi) = self.0.split_at(8);
        let mut a = [0u8; 8];
        let mut b = [0u8; 8];
        a.copy_from_slice(lo);
        b.copy_from_slice(hi);
        u64::from_le_bytes(a) ^ u64::from_le_bytes(b).rotate_left(32)
    }

    pub(crate) fn hasher(&self) -> SipHasher13 {
        SipHasher13::new_with_key(&self.0)
    }
}

impl Default for HashSeed {
    fn default() -> Self {
        Self::random()
    }
}

/// Hashes `bytes` with SipHash-1-3 keyed by `seed`.
pub fn gen_hash(seed: &HashSeed, bytes: &[u8]) -> u64 {
    let mut hasher = seed.hasher();
    hasher.write(bytes);
    hasher.finish()
}

/// Like [`gen_hash`], but ASCII letters are folded to lowercase first, so
/// inputs that differ only in ASCII case hash identically.
pub fn gen_case_hash(seed: &HashSeed, bytes: &[u8]) -> u64 {
    let mut hasher = seed.hasher();
    let mut buf = [0u8; CASE_CHUNK];
    for chunk in bytes.chunks(CASE_CHUNK) {
        let lowered = &mut buf[..chunk.len()];
        lowered.copy_from_slice(chunk);
        lowered.make_ascii_lowercase();
        hasher.write(lowered);
    }
    hasher.finish()
}
