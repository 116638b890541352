//! Proptest generators for property-based testing.

use proptest::prelude::*;

use zerosync_core::{Checksum, FileFlags, FileOperation, FileRecord, IndexEntry, PeerId, State};

/// Generate a root-relative path of one to three components.
pub fn rel_path() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z][a-z0-9_]{0,7}", 1..=3).prop_map(|parts| parts.join("/"))
}

/// Generate file content of at most `max_len` bytes.
pub fn content(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate the checksum of some content.
pub fn checksum() -> impl Strategy<Value = Checksum> {
    content(64).prop_map(|c| Checksum::of(&c))
}

/// Generate a reasonable timestamp (Unix ms).
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=4_102_444_800_000
}

/// Generate a state of a non-empty log.
pub fn state() -> impl Strategy<Value = State> {
    (1u64..=10_000).prop_map(State)
}

pub fn peer_id() -> impl Strategy<Value = PeerId> {
    "[a-f0-9]{32}".prop_map(PeerId::new)
}

/// Generate any combination of record flags.
pub fn file_flags() -> impl Strategy<Value = FileFlags> {
    any::<[bool; 5]>().prop_map(|f| FileFlags {
        changed: f[0],
        updated: f[1],
        renamed: f[2],
        deleted: f[3],
        changed_self: f[4],
    })
}

/// Generate a record with arbitrary flags.
pub fn file_record() -> impl Strategy<Value = FileRecord> {
    (rel_path(), timestamp(), checksum(), 0u64..1 << 32, file_flags()).prop_map(
        |(path, ts, checksum, size, flags)| {
            FileRecord::new(path, ts, checksum, size).with_flags(flags)
        },
    )
}

/// Generate an operation with only the fields its variant carries.
pub fn operation() -> impl Strategy<Value = FileOperation> {
    prop_oneof![
        (0u64..1 << 32, checksum()).prop_map(|(size, checksum)| FileOperation::Update { size, checksum }),
        rel_path().prop_map(|new_path| FileOperation::Rename { new_path }),
        Just(FileOperation::Delete),
    ]
}

/// Generate an entry of the given state.
pub fn index_entry_at(state: State) -> impl Strategy<Value = IndexEntry> {
    (rel_path(), timestamp(), operation(), any::<bool>()).prop_map(
        move |(path, timestamp, operation, changed_self)| IndexEntry {
            state,
            path,
            timestamp,
            operation,
            changed_self,
        },
    )
}

/// Generate an entry of any state.
pub fn index_entry() -> impl Strategy<Value = IndexEntry> {
    state().prop_flat_map(index_entry_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn rel_paths_resolve_inside_root(path in rel_path()) {
            let root = zerosync_index::SyncRoot::new("/base");
            let resolved = root.resolve(&path).unwrap();
            prop_assert!(resolved.starts_with("/base"));
        }

        #[test]
        fn entries_keep_their_state(entry in index_entry_at(State(7))) {
            prop_assert_eq!(entry.state, State(7));
            prop_assert_eq!(entry.code(), entry.operation.code());
        }
    }
}
