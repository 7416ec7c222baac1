use std::sync::atomic::{AtomicU64, Ordering};

static ID_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

/// Returns the next value of the process-wide counter shared by every id.
pub fn next_sequence() -> u64 {
    ID_ALLOCATOR.fetch_add(1, Ordering::Relaxed)
}

/// Allocates a `"<kind>/<n>"` identifier.
///
/// Ids are unique within the process and never reused, but they are not
/// stable across restarts and must not be persisted.
pub fn next_id(kind: &str) -> String {
    format!("{kind}/{}", next_sequence())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_kind_prefix() {
        let id = next_id("FieldNode");
        let (kind, counter) = id.split_once('/').expect("id must contain a separator");
        assert_eq!(kind, "FieldNode");
        assert!(counter.parse::<u64>().is_ok());
    }

    #[test]
    fn ids_are_unique_across_kinds() {
        let ids = [
            next_id("FieldNode"),
            next_id("FieldArray"),
            next_id("FieldNode"),
            next_id("Form"),
        ];
        for (index, id) in ids.iter().enumerate() {
            assert!(ids[index + 1..].iter().all(|other| other != id));
        }
    }

    #[test]
    fn sequence_is_monotonic() {
        let first = next_sequence();
        let second = next_sequence();
        assert!(second > first);
    }
}
