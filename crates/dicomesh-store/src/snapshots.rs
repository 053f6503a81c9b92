use serde_json::Value;

use dicomesh_core::models::Snapshot;

use crate::migrate;
use crate::records::{FsRecordStore, RecordSchema};

pub const SNAPSHOTS_FILE: &str = "snapshots.json";

/// Layout of `snapshots.json`
#[derive(Debug, Clone, Copy)]
pub struct SnapshotFile;

impl RecordSchema for SnapshotFile {
    type Record = Snapshot;

    const FILE_NAME: &'static str = SNAPSHOTS_FILE;

    fn upgrade(raw: Value, job_id: &str, index: usize) -> Result<Snapshot, String> {
        let snapshot = migrate::upgrade_snapshot(raw, job_id, index)?;
        if let Some(owner) = foreign_owner(&snapshot, job_id) {
            tracing::warn!(
                "Snapshot {} in {} of {} belongs to {}",
                snapshot.snapshot_id,
                SNAPSHOTS_FILE,
                job_id,
                owner
            );
        }
        Ok(snapshot)
    }

    /// Only fills in a missing owner; snapshots filed under another job keep theirs
    fn normalize(mut record: Snapshot, job_id: &str) -> Snapshot {
        if record.job_id.trim().is_empty() {
            record.job_id = job_id.to_string();
        }
        record
    }

    fn record_id(record: &Snapshot) -> &str {
        &record.snapshot_id
    }
}

/// Per-job image snapshots on disk
pub type FsSnapshotStore = FsRecordStore<SnapshotFile>;

/// The other job a snapshot names, when it is filed under `job_id`
fn foreign_owner<'a>(snapshot: &'a Snapshot, job_id: &str) -> Option<&'a str> {
    let owner = snapshot.job_id.trim();
    (!owner.is_empty() && owner != job_id).then_some(owner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn legacy(job_id: Option<&str>) -> Value {
        let mut raw = json!({
            "snapshot_id": "snap-1",
            "source_stl": "mesh.stl",
            "filename": "a.png",
            "timestamp": 1700000000,
            "data_base64": "cG5n"
        });
        if let Some(job_id) = job_id {
            raw["job_id"] = json!(job_id);
        }
        raw
    }

    #[test]
    fn test_foreign_owner_is_kept_and_detected() {
        let snapshot = SnapshotFile::upgrade(legacy(Some("job-0")), "job-1", 0).unwrap();
        assert_eq!(snapshot.job_id, "job-0");
        assert_eq!(foreign_owner(&snapshot, "job-1"), Some("job-0"));
    }

    #[test]
    fn test_own_or_missing_owner_is_not_foreign() {
        let snapshot = SnapshotFile::upgrade(legacy(None), "job-1", 0).unwrap();
        assert_eq!(snapshot.job_id, "job-1");
        assert_eq!(foreign_owner(&snapshot, "job-1"), None);

        let snapshot = SnapshotFile::upgrade(legacy(Some("job-1")), "job-1", 0).unwrap();
        assert_eq!(foreign_owner(&snapshot, "job-1"), None);
    }
}
