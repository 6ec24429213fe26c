use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Hash whatever `f` feeds into a fresh `DefaultHasher`.
///
/// `DefaultHasher::new()` uses fixed keys, so results repeat across runs of the
/// same build.
pub fn stable_hash_with(f: impl FnOnce(&mut DefaultHasher)) -> u64 {
    let mut hasher = DefaultHasher::new();
    f(&mut hasher);
    hasher.finish()
}

/// Seeded hash of a string key.
pub fn stable_hash_str(seed: u64, value: &str) -> u64 {
    stable_hash_with(|hasher| {
        seed.hash(hasher);
        value.hash(hasher);
    })
}

/// Seeded hash of a row position, used when a row has no `review_id`.
pub fn stable_hash_row(seed: u64, row: usize) -> u64 {
    stable_hash_with(|hasher| {
        seed.hash(hasher);
        (row as u64).hash(hasher);
    })
}
