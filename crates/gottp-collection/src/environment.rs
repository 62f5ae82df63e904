// SPDX-License-Identifier: MIT OR Apache-2.0
//! Named variable scopes (§6.2), loaded from a file sibling to the collection.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single variable entry within an [`Environment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EnvironmentValue {
    /// Literal value.
    pub value: String,
    /// Marks the value as sensitive (e.g. for masked display); does not
    /// change resolution semantics.
    #[serde(default)]
    pub secret: bool,
}

impl EnvironmentValue {
    /// Construct a plain, non-secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: false,
        }
    }

    /// Construct a secret value.
    pub fn secret(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            secret: true,
        }
    }
}

/// A named variable scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct Environment {
    /// Display name, e.g. `"staging"`.
    pub name: String,
    /// Variables, in insertion order.
    #[serde(default)]
    pub variables: IndexMap<String, EnvironmentValue>,
}

impl Environment {
    /// Construct an empty named environment.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            variables: IndexMap::new(),
        }
    }
}

/// The contents of an `environments.yaml` file: a list of named environments.
/// Exactly one is active at a time in interactive use; that selection is a
/// runtime concern, not part of the persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub struct EnvironmentsFile {
    /// All environments defined in this file.
    #[serde(default)]
    pub environments: Vec<Environment>,
}

impl EnvironmentsFile {
    /// Find an environment by name.
    pub fn find(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.name == name)
    }
}
