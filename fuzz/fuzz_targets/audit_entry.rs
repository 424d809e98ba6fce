#![no_main]

use gatehouse_events::{AuditEntry, Filter};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Fuzz decoding of audit log lines and query filters.
    // Tests handling of:
    // - Malformed JSON
    // - Invalid timestamps and ids
    // - Missing fields
    let Ok(entry) = serde_json::from_slice::<AuditEntry>(data) else {
        return;
    };

    // A decoded entry must survive re-encoding unchanged
    let json = serde_json::to_vec(&entry).unwrap();
    let decoded: AuditEntry = serde_json::from_slice(&json).unwrap();
    assert_eq!(entry, decoded);

    // Filtering a single entry never yields more than that entry
    let filter = serde_json::from_slice::<Filter>(data).unwrap_or_default();
    let selected = filter.apply(std::iter::once(&entry));
    assert!(selected.len() <= 1);
    if let Some(first) = selected.first() {
        assert_eq!(first, &entry);
    }
});
