// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! The History Store: an append-only, durable log of executed requests
//! (§4.5).
//!
//! Entries are recorded one JSON object per line (NDJSON) in a file under
//! the user's per-app data directory. Each append is a single `write` of a
//! newline-terminated line in append mode — atomic at the OS level for the
//! short writes a history entry produces. A line left truncated by a crash
//! mid-write is detected and discarded the next time the store opens, per
//! the correctness property in §4.5.

use chrono::{DateTime, Utc};
use gottp_error::Error;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// One executed request/response pair, immutable after write (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Auto-assigned, unique identity.
    pub id: String,
    /// When the request was sent.
    pub timestamp: DateTime<Utc>,
    /// Protocol string, e.g. `"http"`.
    pub protocol: String,
    /// Method.
    pub method: String,
    /// Request URL.
    pub url: String,
    /// Response status code, or `0` when the request never transmitted
    /// successfully (§4.5's correctness properties).
    pub status_code: u16,
    /// Duration in milliseconds.
    pub duration_ms: u64,
    /// Response size in bytes.
    pub size: usize,
    /// A serialized snapshot of the outgoing request.
    pub request_snapshot: serde_json::Value,
    /// A serialized snapshot of the response (or error cause, when
    /// `status_code == 0`).
    pub response_snapshot: serde_json::Value,
}

/// Filter parameters for [`Store::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Only entries for this protocol, if set.
    pub protocol: Option<String>,
    /// Maximum number of entries to return.
    pub page_size: Option<usize>,
    /// Skip this many matching entries before collecting `page_size`.
    pub offset: usize,
}

/// An append-only history store backed by an NDJSON file.
pub struct Store {
    path: PathBuf,
}

impl Store {
    /// Open (or prepare to create) a store at an explicit path.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the store at the default per-user data directory
    /// (`directories::ProjectDirs`), e.g.
    /// `~/.local/share/gottp/history.ndjson` on Linux.
    pub fn open_default() -> Result<Self, Error> {
        let dirs = directories::ProjectDirs::from("dev", "gottp", "gottp")
            .ok_or_else(|| Error::internal("could not determine a per-user data directory"))?;
        let dir = dirs.data_dir();
        std::fs::create_dir_all(dir).map_err(|e| Error::internal("failed to create history data directory").with_source(Box::new(e)))?;
        Ok(Self::at_path(dir.join("history.ndjson")))
    }

    /// Append one entry, returning its id. Every successful dispatch yields
    /// exactly one append; an aborted dispatch that transmitted no bytes
    /// yields none (§4.5's correctness properties — enforced by the caller,
    /// not this store).
    pub fn append(&self, entry: &HistoryEntry) -> Result<String, Error> {
        let line = serde_json::to_string(entry).map_err(|e| Error::internal("failed to serialize history entry").with_source(Box::new(e)))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::internal("failed to create history directory").with_source(Box::new(e)))?;
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::internal(format!("failed to open history file {}", self.path.display())).with_source(Box::new(e)))?;

        writeln!(file, "{line}").map_err(|e| Error::internal("failed to append history entry").with_source(Box::new(e)))?;
        file.sync_data().map_err(|e| Error::internal("failed to flush history entry to disk").with_source(Box::new(e)))?;

        Ok(entry.id.clone())
    }

    /// Read every well-formed entry in the store, discarding a trailing
    /// line left truncated by a crash mid-write.
    fn read_all(&self) -> Result<Vec<HistoryEntry>, Error> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::internal("failed to open history file").with_source(Box::new(e))),
        };
        let reader = std::io::BufReader::new(file);
        let lines: Vec<String> = reader
            .lines()
            .collect::<Result<_, _>>()
            .map_err(|e| Error::internal("failed to read history file").with_source(Box::new(e)))?;

        let mut entries = Vec::with_capacity(lines.len());
        let last_index = lines.len().saturating_sub(1);
        for (i, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<HistoryEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(_) if i == last_index => {
                    tracing::warn!("discarding truncated trailing history entry");
                }
                Err(e) => return Err(Error::parse("corrupt history entry").with_source(Box::new(e))),
            }
        }
        Ok(entries)
    }

    /// List entries most-recent-first, applying `filter`.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<HistoryEntry>, Error> {
        let mut entries = self.read_all()?;
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(protocol) = &filter.protocol {
            entries.retain(|e| &e.protocol == protocol);
        }
        let page = entries.into_iter().skip(filter.offset);
        Ok(match filter.page_size {
            Some(n) => page.take(n).collect(),
            None => page.collect(),
        })
    }

    /// Fetch a single entry by id.
    pub fn fetch(&self, id: &str) -> Result<HistoryEntry, Error> {
        self.read_all()?
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| Error::not_found(format!("history entry `{id}` not found")))
    }

    /// Delete every entry older than `older_than`, returning the number
    /// removed. Rewritten atomically (write-temp-then-rename).
    pub fn prune(&self, older_than: DateTime<Utc>) -> Result<usize, Error> {
        let all = self.read_all()?;
        let (kept, pruned): (Vec<_>, Vec<_>) = all.into_iter().partition(|e| e.timestamp >= older_than);

        let dir = self.path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::internal("failed to create temp file for prune").with_source(Box::new(e)))?;
        for entry in &kept {
            let line = serde_json::to_string(entry).map_err(|e| Error::internal("failed to serialize history entry").with_source(Box::new(e)))?;
            writeln!(tmp, "{line}").map_err(|e| Error::internal("failed to write pruned history file").with_source(Box::new(e)))?;
        }
        tmp.flush().map_err(|e| Error::internal("failed to flush pruned history file").with_source(Box::new(e)))?;
        tmp.persist(&self.path).map_err(|e| Error::internal("failed to rename pruned history file into place").with_source(Box::new(e.error)))?;

        Ok(pruned.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: &str, ts: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            timestamp: ts,
            protocol: "http".to_string(),
            method: "GET".to_string(),
            url: "https://example.com".to_string(),
            status_code: 200,
            duration_ms: 12,
            size: 2,
            request_snapshot: serde_json::json!({}),
            response_snapshot: serde_json::json!({}),
        }
    }

    #[test]
    fn append_then_fetch_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at_path(dir.path().join("history.ndjson"));
        let e = entry("abc", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        store.append(&e).unwrap();
        let fetched = store.fetch("abc").unwrap();
        assert_eq!(fetched, e);
    }

    #[test]
    fn fetch_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at_path(dir.path().join("history.ndjson"));
        let err = store.fetch("nope").unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::NotFound);
    }

    #[test]
    fn list_is_most_recent_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at_path(dir.path().join("history.ndjson"));
        store.append(&entry("a", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())).unwrap();
        store.append(&entry("b", Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap())).unwrap();
        store.append(&entry("c", Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap())).unwrap();

        let listed = store.list(&ListFilter::default()).unwrap();
        let ids: Vec<_> = listed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[test]
    fn list_respects_page_size_and_offset() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at_path(dir.path().join("history.ndjson"));
        for i in 0..5 {
            store.append(&entry(&i.to_string(), Utc.with_ymd_and_hms(2026, 1, 1 + i, 0, 0, 0).unwrap())).unwrap();
        }
        let page = store.list(&ListFilter { protocol: None, page_size: Some(2), offset: 1 }).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, "3");
    }

    #[test]
    fn truncated_trailing_line_is_discarded_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.ndjson");
        let store = Store::at_path(&path);
        store.append(&entry("a", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())).unwrap();

        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        write!(file, "{{\"id\":\"trunc").unwrap();

        let listed = store.list(&ListFilter::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "a");
    }

    #[test]
    fn prune_removes_only_older_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at_path(dir.path().join("history.ndjson"));
        store.append(&entry("old", Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap())).unwrap();
        store.append(&entry("new", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap())).unwrap();

        let cutoff = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let removed = store.prune(cutoff).unwrap();
        assert_eq!(removed, 1);

        let remaining = store.list(&ListFilter::default()).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "new");
    }

    #[test]
    fn status_zero_records_aborted_transmission() {
        let mut e = entry("aborted", Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap());
        e.status_code = 0;
        e.response_snapshot = serde_json::json!({"error": "connection reset"});
        let dir = tempfile::tempdir().unwrap();
        let store = Store::at_path(dir.path().join("history.ndjson"));
        store.append(&e).unwrap();
        let fetched = store.fetch("aborted").unwrap();
        assert_eq!(fetched.status_code, 0);
    }
}
