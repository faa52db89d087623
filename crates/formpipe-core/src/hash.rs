//! Key hashing.
//!
//! Form keys are identified by a 64-bit FNV-1a hash of their raw bytes; the
//! original key bytes are never stored. The store has no collision
//! resolution: two distinct keys that hash equal would silently merge into
//! one field. With a 64-bit hash over the handful of keys a form carries
//! this is vanishingly unlikely, but it is a deliberate trade, not an
//! oversight. Callers that need hard correctness must keep their own copy
//! of the key bytes and compare the returned values.
//!
//! Hash `0` is reserved as the "no key seen yet" sentinel in the multipart
//! header state. FNV-1a starts from a non-zero offset basis, so every real
//! key (the empty key included) hashes non-zero in practice.

use std::hash::Hasher;

use fnv::FnvHasher;

/// A hashed form key.
pub type KeyHash = u64;

/// Sentinel meaning "no key captured".
pub const NO_KEY: KeyHash = 0;

/// Hash raw key bytes.
#[must_use]
pub fn hash_key(key: &[u8]) -> KeyHash {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    hasher.finish()
}
