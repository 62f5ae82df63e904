// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loading and saving collections to disk.
//!
//! Saves are atomic (write to a temp file in the destination directory, then
//! rename over the target) so that a crash or codec error never leaves a
//! truncated or partially-written collection file behind.

use crate::collection::Collection;
use gottp_error::Error;
use std::io::Write;
use std::path::Path;

/// Parse a collection from an in-memory YAML document.
///
/// Assigns a fresh id to any Request loaded without one (Invariant 1); the
/// rest of the structure is preserved unchanged.
pub fn load_bytes(data: &[u8]) -> Result<Collection, Error> {
    let mut collection: Collection = serde_yaml::from_slice(data)
        .map_err(|e| Error::parse("invalid collection YAML").with_source(Box::new(e)))?;
    collection.assign_missing_ids();
    Ok(collection)
}

/// Load a collection from a `.gottp.yaml` file.
pub fn load(path: impl AsRef<Path>) -> Result<Collection, Error> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| {
        Error::not_found(format!("cannot read collection file {}", path.display()))
            .with_source(Box::new(e))
    })?;
    load_bytes(&data).map_err(|e| e.with_context("path", serde_json::json!(path.display().to_string())))
}

/// Save a collection to `path`, atomically.
///
/// The temp file is created in the same directory as `path` so the final
/// rename is guaranteed to stay on one filesystem.
pub fn save(collection: &Collection, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    let yaml = serde_yaml::to_string(collection)
        .map_err(|e| Error::internal("failed to serialize collection").with_source(Box::new(e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        Error::internal(format!("cannot create temp file in {}", dir.display())).with_source(Box::new(e))
    })?;
    tmp.write_all(yaml.as_bytes())
        .map_err(|e| Error::internal("failed to write temp collection file").with_source(Box::new(e)))?;
    tmp.flush()
        .map_err(|e| Error::internal("failed to flush temp collection file").with_source(Box::new(e)))?;
    tmp.persist(path)
        .map_err(|e| Error::internal(format!("failed to rename into {}", path.display())).with_source(Box::new(e.error)))?;
    Ok(())
}

/// Load every `*.gottp.yaml` file directly within `dir` (non-recursive).
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<Collection>, Error> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir).map_err(|e| {
        Error::not_found(format!("cannot read directory {}", dir.display())).with_source(Box::new(e))
    })?;

    let mut paths: Vec<_> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.to_string_lossy().ends_with(".gottp.yaml"))
        .collect();
    paths.sort();

    paths.into_iter().map(load).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Item, Request};

    fn sample() -> Collection {
        let mut c = Collection::new("Demo");
        c.items.push(Item::Request(Request::new("Ping", "GET", "https://example.com/ping")));
        c
    }

    #[test]
    fn save_then_load_yields_equal_collection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.gottp.yaml");
        let c = sample();
        save(&c, &path).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(c, loaded);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let err = load("/nonexistent/path/demo.gottp.yaml").unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::NotFound);
    }

    #[test]
    fn load_bytes_rejects_invalid_yaml() {
        let err = load_bytes(b"not: [valid yaml").unwrap_err();
        assert_eq!(err.kind, gottp_error::ErrorKind::Parse);
    }

    #[test]
    fn load_dir_finds_suffixed_files_only() {
        let dir = tempfile::tempdir().unwrap();
        save(&sample(), dir.path().join("a.gottp.yaml")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();
        let found = load_dir(dir.path()).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn version_defaults_to_one_when_absent() {
        let yaml = "name: Demo\nitems: []\n";
        let c = load_bytes(yaml.as_bytes()).unwrap();
        assert_eq!(c.version, "1");
    }

    #[test]
    fn load_assigns_id_to_request_missing_one() {
        let yaml = "name: Demo\nitems:\n  - request:\n      name: Ping\n      method: GET\n      url: https://example.com/ping\n";
        let c = load_bytes(yaml.as_bytes()).unwrap();
        match &c.items[0] {
            Item::Request(r) => assert!(!r.id.is_empty()),
            _ => panic!("expected a request item"),
        }
    }
}
