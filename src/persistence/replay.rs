//! Startup replay of the append-only file.

use crate::commands::execute;
use crate::persistence::AofRecord;
use crate::storage::Store;
use tracing::{debug, info, warn};

/// Outcome of a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    /// Records executed without error
    pub applied: usize,
    /// Records the engine rejected
    pub failed: usize,
}

/// Re-executes logged commands against `store`, oldest first.
///
/// Nothing is appended to the log while replaying. A record the engine
/// rejects is logged and skipped; later records still run.
///
/// # Example
///
/// ```
/// use ledgerkv::persistence::{replay, AofRecord};
/// use ledgerkv::storage::Store;
///
/// let records = vec![
///     AofRecord::new("SET", vec!["k".into(), "v1".into()]),
///     AofRecord::new("SET", vec!["k".into(), "v2".into()]),
///     AofRecord::new("DEL", vec!["k".into()]),
/// ];
///
/// let mut store = Store::new();
/// let stats = replay(&mut store, &records);
/// assert_eq!(stats.applied, 3);
/// assert!(store.get("k").is_none());
/// ```
pub fn replay(store: &mut Store, records: &[AofRecord]) -> ReplayStats {
    let mut stats = ReplayStats::default();

    for (index, record) in records.iter().enumerate() {
        let operation = record.operation.to_uppercase();
        match execute(store, &operation, &record.args) {
            Ok(_) => {
                stats.applied += 1;
                debug!(index, operation = %operation, "Replayed record");
            }
            Err(e) => {
                stats.failed += 1;
                warn!(index, operation = %operation, error = %e, "Failed to replay record");
            }
        }
    }

    info!(
        applied = stats.applied,
        failed = stats.failed,
        keys = store.len(),
        "Replay complete"
    );
    stats
}
