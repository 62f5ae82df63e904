// SPDX-License-Identifier: MIT OR Apache-2.0
//! The top-level [`Collection`] document and its in-memory tree operations.

use crate::auth::Auth;
use crate::item::Item;
use gottp_error::Error;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

fn default_version() -> String {
    "1".to_string()
}

/// An ordered tree of [`Item`]s, plus collection-scoped variables and auth.
///
/// Persisted as YAML with a stable key order (`name`, `version`, `variables`,
/// `auth`, `items`) so that diffs in version control stay minimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Collection {
    /// Display name.
    pub name: String,
    /// Schema version. Defaults to `"1"` when absent on load.
    #[serde(default = "default_version")]
    pub version: String,
    /// Collection-scoped literal variables, in insertion order.
    #[serde(default)]
    pub variables: IndexMap<String, String>,
    /// Collection-level auth, inherited by requests that don't override it.
    #[serde(default, skip_serializing_if = "Auth::is_none")]
    pub auth: Auth,
    /// Top-level items, in source order.
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Collection {
    /// Construct an empty, unnamed collection with defaults applied.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: default_version(),
            variables: IndexMap::new(),
            auth: Auth::None,
            items: Vec::new(),
        }
    }

    /// Pre-order walk of every [`crate::item::Request`] in the tree, assigning a
    /// display depth and dotted path to each (used to build [`crate::FlatItem`]
    /// rows and to validate request-id uniqueness).
    pub fn flatten(&self) -> Vec<crate::FlatItem> {
        let mut out = Vec::new();
        flatten_into(&self.items, 0, "", &mut out);
        out
    }

    /// Assign a fresh id to every [`crate::item::Request`] in the tree whose
    /// id is empty (Invariant 1). Called on load so every Request has a
    /// stable identity at rest, regardless of how it entered the tree.
    pub fn assign_missing_ids(&mut self) {
        assign_missing_ids_into(&mut self.items);
    }

    /// Validate Invariant 3: request identities are unique within the
    /// collection. Returns the offending id on the first duplicate found.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = std::collections::HashSet::new();
        for flat in self.flatten() {
            if let crate::FlatItemKind::Request(req) = &flat.kind {
                if !seen.insert(req.id.clone()) {
                    return Err(Error::validation(format!(
                        "duplicate request id `{}` at {}",
                        req.id, flat.path
                    ))
                    .with_context("request_id", serde_json::json!(req.id))
                    .with_context("path", serde_json::json!(flat.path)));
                }
            }
        }
        Ok(())
    }
}

fn assign_missing_ids_into(items: &mut [Item]) {
    for item in items {
        match item {
            Item::Folder(folder) => assign_missing_ids_into(&mut folder.items),
            Item::Request(request) => {
                if request.id.is_empty() {
                    request.id = uuid::Uuid::new_v4().to_string();
                }
            }
        }
    }
}

fn flatten_into(items: &[Item], depth: usize, prefix: &str, out: &mut Vec<crate::FlatItem>) {
    for item in items {
        let path = if prefix.is_empty() {
            item.name().to_string()
        } else {
            format!("{prefix}/{}", item.name())
        };
        match item {
            Item::Folder(folder) => {
                out.push(crate::FlatItem {
                    depth,
                    path: path.clone(),
                    kind: crate::FlatItemKind::Folder,
                });
                flatten_into(&folder.items, depth + 1, &path, out);
            }
            Item::Request(request) => {
                out.push(crate::FlatItem {
                    depth,
                    path,
                    kind: crate::FlatItemKind::Request(request.clone()),
                });
            }
        }
    }
}
