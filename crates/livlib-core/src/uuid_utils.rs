//! UUID v7 utilities for time-ordered identifiers.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// UUIDv7 embeds a Unix timestamp (milliseconds) in the first 48 bits, so
/// fragment and link ids sort by creation time.
///
/// # Example
///
/// ```
/// use livlib_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Derive a stable 64-bit key from a UUID for `pg_advisory_xact_lock`.
///
/// Folds both halves of the UUID so keys differ even for ids created in the
/// same millisecond.
pub fn advisory_lock_key(id: Uuid) -> i64 {
    let (hi, lo) = id.as_u64_pair();
    (hi ^ lo) as i64
}
