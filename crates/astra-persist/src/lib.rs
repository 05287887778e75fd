//! Atomic JSON file persistence for AstraGuard service state.
//!
//! Provides [`JournalStore`], the array-shaped journal backing the feedback
//! recorder. Writes go through a temp file and rename into place so a crash
//! never leaves a partially written journal behind, and a corrupt journal is
//! replaced rather than allowed to block the decision path.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Write `content` to `path` atomically: write a sibling temp file, fsync it,
/// then rename over the target.
fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        use std::io::Write;
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

/// An array-shaped JSON journal, used for append-mostly event records.
///
/// The on-disk format is a plain JSON array of event objects so operators can
/// inspect and edit it with standard tooling. Every mutation rewrites the
/// file atomically; a corrupt journal is replaced with a fresh one rather
/// than blocking the writer.
pub struct JournalStore {
    path: PathBuf,
}

impl JournalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load all events. Missing file → empty; corrupt file → empty + warning.
    pub fn load<T: for<'de> Deserialize<'de>>(&self) -> Vec<T> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "corrupt journal, starting fresh");
                Vec::new()
            }),
            Err(_) => {
                debug!(path = %self.path.display(), "no journal file, starting fresh");
                Vec::new()
            }
        }
    }

    /// Append one event: read-modify-write with an atomic replace.
    pub fn append<T: Serialize>(&self, event: &T) -> std::io::Result<usize> {
        let mut events: Vec<serde_json::Value> = self.load();
        events.push(serde_json::to_value(event).map_err(std::io::Error::other)?);
        self.save_values(&events)?;
        Ok(events.len())
    }

    /// Replace the full journal contents atomically.
    pub fn save<T: Serialize>(&self, events: &[T]) -> std::io::Result<()> {
        let values: Vec<serde_json::Value> = events
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()
            .map_err(std::io::Error::other)?;
        self.save_values(&values)
    }

    fn save_values(&self, events: &[serde_json::Value]) -> std::io::Result<()> {
        let content =
            serde_json::to_string_pretty(events).map_err(std::io::Error::other)?;
        atomic_write(&self.path, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_append_and_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = JournalStore::new(dir.path().join("pending.json"));

        assert_eq!(journal.append(&"first".to_string()).expect("append"), 1);
        assert_eq!(journal.append(&"second".to_string()).expect("append"), 2);

        let events: Vec<String> = journal.load();
        assert_eq!(events, vec!["first", "second"]);
    }

    #[test]
    fn test_journal_missing_file_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = JournalStore::new(dir.path().join("never_written.json"));
        let events: Vec<String> = journal.load();
        assert!(events.is_empty());
    }

    #[test]
    fn test_journal_corrupt_starts_fresh() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pending.json");
        std::fs::write(&path, "{ definitely not an array").expect("write");

        let journal = JournalStore::new(&path);
        let count = journal.append(&"event".to_string()).expect("append");
        assert_eq!(count, 1);

        let events: Vec<String> = journal.load();
        assert_eq!(events, vec!["event"]);
    }

    #[test]
    fn test_journal_empty_file_treated_as_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pending.json");
        std::fs::write(&path, "  \n").expect("write");

        let journal = JournalStore::new(&path);
        let events: Vec<String> = journal.load();
        assert!(events.is_empty());
    }

    #[test]
    fn test_journal_save_replaces_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = JournalStore::new(dir.path().join("pending.json"));

        journal.append(&"old".to_string()).expect("append");
        journal
            .save(&["new1".to_string(), "new2".to_string()])
            .expect("save");

        let events: Vec<String> = journal.load();
        assert_eq!(events, vec!["new1", "new2"]);
    }

    #[test]
    fn test_journal_leaves_no_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = JournalStore::new(dir.path().join("pending.json"));
        journal.append(&"event".to_string()).expect("append");

        // Only the journal itself survives a successful write
        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name())
            .collect();
        assert_eq!(entries, vec![std::ffi::OsString::from("pending.json")]);
    }

    #[test]
    fn test_journal_creates_parent_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("journals").join("pending.json");

        let journal = JournalStore::new(&path);
        journal.append(&"event".to_string()).expect("append with nested dirs");

        let events: Vec<String> = journal.load();
        assert_eq!(events.len(), 1);
    }
}
