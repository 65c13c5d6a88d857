//! JSON-file store backends
//!
//! Each store is one JSON document rewritten in full on every change:
//! read everything, mutate, write everything. Every cycle holds an advisory
//! lock on a `.<name>.lock` sibling file, exclusive for writers and shared for
//! readers, so handles in different processes (a running server and a resolver
//! batch) never interleave their cycles. Writes go to a fresh temporary file in
//! the same directory that is persisted over the target.

use super::{MissingAddressStore, ProcessedLedger, ProcessedRecord, ProcessedStatus};
use anyhow::{anyhow, Result};
use fs4::fs_std::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;

/// Serialize `value` with four-space indentation and atomically replace `path`
fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| anyhow!("Failed to serialize {:?}: {}", path, e))?;

    let mut tmp = NamedTempFile::new_in(parent_dir(path))
        .map_err(|e| anyhow!("Failed to create temporary file for {:?}: {}", path, e))?;
    tmp.write_all(&buf)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| anyhow!("Failed to write {:?}: {}", tmp.path(), e))?;

    tmp.persist(path)
        .map_err(|e| anyhow!("Failed to replace {:?}: {}", path, e.error))?;
    Ok(())
}

/// Read a JSON document, returning `None` if the file does not exist
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).map_err(|e| anyhow!("Failed to read {:?}: {}", path, e))?;
    let value =
        serde_json::from_str(&content).map_err(|e| anyhow!("Failed to parse {:?}: {}", path, e))?;
    Ok(Some(value))
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    let parent = parent_dir(path);
    fs::create_dir_all(parent)
        .map_err(|e| anyhow!("Failed to create directory {:?}: {}", parent, e))
}

fn lock_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("Store path {:?} has no file name", path))?
        .to_string_lossy();
    Ok(path.with_file_name(format!(".{}.lock", file_name)))
}

/// Advisory lock on a store's lock file, released when dropped
struct StoreLock {
    _file: fs::File,
}

impl StoreLock {
    fn shared(lock_path: &Path) -> Result<Self> {
        Self::acquire(lock_path, false)
    }

    fn exclusive(lock_path: &Path) -> Result<Self> {
        Self::acquire(lock_path, true)
    }

    fn acquire(lock_path: &Path, exclusive: bool) -> Result<Self> {
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(lock_path)
            .map_err(|e| anyhow!("Failed to open lock file {:?}: {}", lock_path, e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| anyhow!("Failed to lock {:?}: {}", lock_path, e))?;
        Ok(Self { _file: file })
    }
}

// =============================================================================
// Missing addresses
// =============================================================================

/// Missing-address set stored as a JSON array of strings
pub struct JsonMissingStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonMissingStore {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        let lock_path = lock_path(&path)?;
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<String>> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }
}

impl MissingAddressStore for JsonMissingStore {
    fn contains(&self, ip: &str) -> Result<bool> {
        let _lock = StoreLock::shared(&self.lock_path)?;
        Ok(self.load()?.iter().any(|entry| entry == ip))
    }

    fn add(&self, ip: &str) -> Result<bool> {
        let _lock = StoreLock::exclusive(&self.lock_path)?;
        let mut entries = self.load()?;
        if entries.iter().any(|entry| entry == ip) {
            return Ok(false);
        }
        entries.push(ip.to_string());
        write_json_atomic(&self.path, &entries)?;
        Ok(true)
    }

    fn entries(&self) -> Result<Vec<String>> {
        let _lock = StoreLock::shared(&self.lock_path)?;
        self.load()
    }
}

// =============================================================================
// Processed ledger
// =============================================================================

/// Resolver ledger stored as a JSON array of `{ip, comment}` objects
pub struct JsonProcessedLedger {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonProcessedLedger {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        ensure_parent(&path)?;
        let lock_path = lock_path(&path)?;
        Ok(Self { path, lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An unreadable or malformed ledger is treated as empty
    fn load(&self) -> Vec<ProcessedRecord> {
        match read_json::<Vec<ProcessedRecord>>(&self.path) {
            Ok(records) => records.unwrap_or_default(),
            Err(e) => {
                warn!("Error reading processed IPs file, starting empty: {}", e);
                vec![]
            }
        }
    }
}

impl ProcessedLedger for JsonProcessedLedger {
    fn get(&self, ip: &str) -> Result<Option<ProcessedStatus>> {
        let _lock = StoreLock::shared(&self.lock_path)?;
        Ok(self
            .load()
            .iter()
            .find(|r| r.ip == ip)
            .map(ProcessedRecord::status))
    }

    fn record(&self, ip: &str, status: ProcessedStatus) -> Result<()> {
        let _lock = StoreLock::exclusive(&self.lock_path)?;
        let mut records = self.load();
        match records.iter_mut().find(|r| r.ip == ip) {
            Some(existing) => existing.comment = status.comment().to_string(),
            None => records.push(ProcessedRecord::new(ip, status)),
        }
        write_json_atomic(&self.path, &records)
    }

    fn records(&self) -> Result<Vec<ProcessedRecord>> {
        let _lock = StoreLock::shared(&self.lock_path)?;
        Ok(self.load())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_missing_store_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_ips.json");
        let store = JsonMissingStore::new(&path).unwrap();

        assert!(!store.contains("9.9.9.9").unwrap());
        assert!(store.add("9.9.9.9").unwrap());
        assert!(!store.add("9.9.9.9").unwrap());
        assert!(store.contains("9.9.9.9").unwrap());

        let on_disk: Vec<String> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, vec!["9.9.9.9"]);
    }

    #[test]
    fn test_missing_store_keeps_literals_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonMissingStore::new(dir.path().join("missing_ips.json")).unwrap();

        store.add("2001:db8::1").unwrap();
        store.add("2001:DB8::1").unwrap();
        assert_eq!(store.entries().unwrap(), vec!["2001:db8::1", "2001:DB8::1"]);
    }

    #[test]
    fn test_missing_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("missing_ips.json");
        {
            let store = JsonMissingStore::new(&path).unwrap();
            store.add("192.0.2.1").unwrap();
            store.add("192.0.2.2").unwrap();
        }
        let store = JsonMissingStore::new(&path).unwrap();
        assert_eq!(store.entries().unwrap(), vec!["192.0.2.1", "192.0.2.2"]);
    }

    #[test]
    fn test_missing_store_file_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_ips.json");
        let store = JsonMissingStore::new(&path).unwrap();
        store.add("192.0.2.1").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "[\n    \"192.0.2.1\"\n]");
        // only the document and its lock file, no temporary file left behind
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec![".missing_ips.json.lock", "missing_ips.json"]);
    }

    #[test]
    fn test_missing_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_ips.json");
        fs::write(&path, "not json").unwrap();
        let store = JsonMissingStore::new(&path).unwrap();
        assert!(store.contains("1.1.1.1").is_err());
        assert!(store.add("1.1.1.1").is_err());
    }

    #[test]
    fn test_missing_store_concurrent_adds_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonMissingStore::new(dir.path().join("missing_ips.json")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                thread::spawn(move || {
                    for j in 0..10 {
                        store.add(&format!("10.0.{}.{}", i, j)).unwrap();
                        store.add("10.255.255.255").unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 81);
        assert_eq!(entries.iter().filter(|e| *e == "10.255.255.255").count(), 1);
    }

    #[test]
    fn test_missing_store_independent_handles_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_ips.json");

        // one handle per thread, as separate processes would open the file
        let handles: Vec<_> = (0..2)
            .map(|i| {
                let path = path.clone();
                thread::spawn(move || {
                    let store = JsonMissingStore::new(&path).unwrap();
                    for j in 0..200 {
                        store.add(&format!("10.{}.{}.{}", i, j / 256, j % 256)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let entries = JsonMissingStore::new(&path).unwrap().entries().unwrap();
        assert_eq!(entries.len(), 400);
    }

    #[test]
    fn test_ledger_independent_handles_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_ips.json");

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let path = path.clone();
                thread::spawn(move || {
                    let ledger = JsonProcessedLedger::new(&path).unwrap();
                    for j in 0..100 {
                        ledger
                            .record(&format!("10.{}.0.{}", i, j), ProcessedStatus::Success)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let records = JsonProcessedLedger::new(&path).unwrap().records().unwrap();
        assert_eq!(records.len(), 200);
    }

    #[test]
    fn test_ledger_record_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_ips.json");
        let ledger = JsonProcessedLedger::new(&path).unwrap();

        assert_eq!(ledger.get("8.8.8.8").unwrap(), None);
        ledger.record("8.8.8.8", ProcessedStatus::Success).unwrap();
        ledger
            .record("10.1.1.1", ProcessedStatus::InvalidData)
            .unwrap();

        assert_eq!(
            ledger.get("8.8.8.8").unwrap(),
            Some(ProcessedStatus::Success)
        );

        let on_disk: Vec<ProcessedRecord> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk,
            vec![
                ProcessedRecord::new("8.8.8.8", ProcessedStatus::Success),
                ProcessedRecord {
                    ip: "10.1.1.1".to_string(),
                    comment: "Not processed due to invalid data".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_ledger_one_record_per_ip() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = JsonProcessedLedger::new(dir.path().join("processed_ips.json")).unwrap();

        ledger
            .record("8.8.8.8", ProcessedStatus::WhoisError { timed_out: true })
            .unwrap();
        ledger.record("8.8.8.8", ProcessedStatus::Success).unwrap();

        let records = ledger.records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status(), ProcessedStatus::Success);
    }

    #[test]
    fn test_ledger_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed_ips.json");
        fs::write(&path, r#"{"ip": "not a list"}"#).unwrap();

        let ledger = JsonProcessedLedger::new(&path).unwrap();
        assert!(ledger.records().unwrap().is_empty());
        ledger.record("1.1.1.1", ProcessedStatus::Exception).unwrap();
        assert_eq!(ledger.records().unwrap().len(), 1);
    }
}
