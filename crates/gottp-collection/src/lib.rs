// SPDX-License-Identifier: MIT OR Apache-2.0
//! The collection model: the persistent, version-controllable description of
//! a tree of API requests, their auth, and their variables.
//!
//! A [`Collection`] is an ordered tree of [`Item`]s (folders and requests),
//! plus collection-scoped variables and auth. It round-trips to YAML with a
//! stable key order and is saved atomically. [`Environment`] and
//! [`EnvironmentsFile`] hold the named variable scopes that feed the
//! variable resolver at request time.

mod auth;
mod body;
mod collection;
mod environment;
mod item;
mod kv;
mod persistence;
mod protocol_blocks;

pub use auth::{ApiKeyPlacement, Auth, OAuth2Grant};
pub use body::{Body, BodyType};
pub use collection::Collection;
pub use environment::{Environment, EnvironmentValue, EnvironmentsFile};
pub use item::{Folder, Item, Request};
pub use kv::{enabled_pairs, KeyValue};
pub use persistence::{load, load_bytes, load_dir, save};
pub use protocol_blocks::{GraphQlBlock, GrpcBlock, Protocol, WebSocketBlock, WebSocketMessage};

/// One row of a [`Collection::flatten`] traversal: a display-oriented
/// projection of the tree used by terminal renderers, distinct from the
/// persistent data model.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatItem {
    /// Nesting depth, root items at `0`.
    pub depth: usize,
    /// Slash-joined path from the collection root, e.g. `"Auth/Login"`.
    pub path: String,
    /// The folder marker or the request itself.
    pub kind: FlatItemKind,
}

/// What a [`FlatItem`] row represents.
#[derive(Debug, Clone, PartialEq)]
pub enum FlatItemKind {
    /// A folder heading row (no request payload).
    Folder,
    /// A request row.
    Request(Request),
}
