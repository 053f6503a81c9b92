//! Crash-safe JSON persistence

use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::{DicomeshError, Result};

/// Serialize `value` as pretty JSON and atomically replace `path`.
///
/// The payload goes to a temporary file in the destination directory first,
/// then is renamed into place, so readers never observe a truncated file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().ok_or_else(|| {
        DicomeshError::Serialization(format!("{} has no parent directory", path.display()))
    })?;
    fs::create_dir_all(parent)?;

    let payload = serde_json::to_vec_pretty(value)?;

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(&payload)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| DicomeshError::Io(e.error))?;

    tracing::debug!("Wrote {} ({} bytes)", path.display(), payload.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replaces_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("records.json");

        write_json_atomic(&path, &vec![1, 2, 3]).unwrap();
        write_json_atomic(&path, &vec![4]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let values: Vec<i32> = serde_json::from_str(&content).unwrap();
        assert_eq!(values, vec![4]);

        let leftovers = fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
