use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const ID_HEX_LEN: usize = 32;
const SUFFIX_LEN: usize = 6;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier for change records and scratch directories.
///
/// Hook processes for the same project can run concurrently, so the clock is
/// mixed with the pid and a per-process sequence before hashing.
pub fn new_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or(0);

    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    hasher.update(&SEQUENCE.fetch_add(1, Ordering::Relaxed).to_le_bytes());
    hasher.update(format!("{:?}", std::thread::current().id()).as_bytes());

    let mut hex = hasher.finalize().to_hex().to_string();
    hex.truncate(ID_HEX_LEN);
    hex
}

/// Six hex characters for disambiguating branch names.
pub fn short_suffix() -> String {
    let mut id = new_id();
    id.truncate(SUFFIX_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn ids_do_not_repeat_within_a_process() {
        let seen: BTreeSet<String> = (0..256).map(|_| new_id()).collect();
        assert_eq!(seen.len(), 256);
        assert!(seen.iter().all(|id| id.len() == ID_HEX_LEN));
    }

    #[test]
    fn suffix_is_lowercase_hex() {
        let suffix = short_suffix();
        assert_eq!(suffix.len(), SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
