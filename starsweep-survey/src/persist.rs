//! Durable JSON writes
//!
//! Both persisted datasets go through the same sequence: serialize to
//! `<path>.tmp`, fsync, atomically rename over the destination. A crash
//! at any point leaves either the old file or the new one intact.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use starsweep_common::{Error, Result};

/// Serialize `value` as pretty JSON and atomically replace `path` with it
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = PathBuf::from(format!("{}.tmp", path.display()));
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Persistence(format!("serialize {}: {}", path.display(), e)))?;

    let mut file = File::create(&tmp)
        .map_err(|e| Error::Persistence(format!("create {}: {}", tmp.display(), e)))?;
    file.write_all(json.as_bytes())
        .map_err(|e| Error::Persistence(format!("write {}: {}", tmp.display(), e)))?;
    file.sync_all()
        .map_err(|e| Error::Persistence(format!("fsync {}: {}", tmp.display(), e)))?;
    drop(file);

    std::fs::rename(&tmp, path).map_err(|e| {
        Error::Persistence(format!("rename {} -> {}: {}", tmp.display(), path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Doc {
        n: u32,
    }

    #[test]
    fn replaces_destination_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");

        write_json_atomic(&path, &Doc { n: 1 }).unwrap();
        write_json_atomic(&path, &Doc { n: 2 }).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let doc: Doc = serde_json::from_str(&raw).unwrap();
        assert_eq!(doc, Doc { n: 2 });
        assert!(!dir.path().join("doc.json.tmp").exists());
    }
}
