// SPDX-License-Identifier: MIT OR Apache-2.0
//! Variable resolution: substitutes `{{name}}` references in request
//! templates using a layered scope (dynamic built-ins → environment →
//! collection).
//!
//! Resolution is single-pass: the output of substituting one reference is
//! never re-scanned for further references. This bounds worst-case cost and
//! rules out substitution loops by construction.

use gottp_collection::{Collection, Environment};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Supplies the current time to the resolver. Exists so tests can observe a
/// fixed instant instead of depending on wall-clock time.
pub trait Clock: Send + Sync {
    /// Seconds since the Unix epoch.
    fn now_unix_seconds(&self) -> u64;
}

/// The default [`Clock`], backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

/// A flattened, read-only variable scope for one resolution pass.
///
/// Built once per request dispatch from an optional active [`Environment`]
/// and the owning [`Collection`]; lookup order is environment first, then
/// collection (§4.2).
pub struct Scope<'a> {
    environment: Option<&'a Environment>,
    collection: &'a Collection,
    clock: &'a dyn Clock,
}

impl<'a> Scope<'a> {
    /// Build a scope from an active environment (if any) and the owning
    /// collection, using the default wall-clock [`SystemClock`].
    pub fn new(environment: Option<&'a Environment>, collection: &'a Collection) -> ScopeWithClock<'a> {
        ScopeWithClock {
            environment,
            collection,
            clock: &SystemClock,
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(env) = self.environment {
            if let Some(v) = env.variables.get(name) {
                return Some(v.value.clone());
            }
        }
        self.collection.variables.get(name).cloned()
    }

    fn lookup_dynamic(&self, name: &str) -> Option<String> {
        match name {
            "$timestamp" => Some(self.clock.now_unix_seconds().to_string()),
            "$uuid" => Some(uuid::Uuid::new_v4().to_string()),
            "$randomInt" => Some((rand::random::<u16>() % 10_000).to_string()),
            _ => None,
        }
    }
}

/// Builder handle returned by [`Scope::new`]; lets callers swap in a custom
/// [`Clock`] via [`ScopeWithClock::with_clock`] before calling [`resolve`].
pub struct ScopeWithClock<'a> {
    environment: Option<&'a Environment>,
    collection: &'a Collection,
    clock: &'a dyn Clock,
}

impl<'a> ScopeWithClock<'a> {
    /// Override the clock used for `$timestamp` resolution.
    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    fn into_scope(self) -> Scope<'a> {
        Scope {
            environment: self.environment,
            collection: self.collection,
            clock: self.clock,
        }
    }
}

/// Substitute every `{{identifier}}` reference in `template` per §4.2.
///
/// * `\{{` is an escape, yielding a literal `{{` with no closing-brace
///   search.
/// * Identifiers starting with `$` resolve against the dynamic built-ins
///   (`$timestamp`, `$uuid`, `$randomInt`); anything else is looked up in
///   the environment, then the collection.
/// * References with no resolution (and not a recognized dynamic built-in)
///   are left untouched, literal braces included.
pub fn resolve(template: &str, scope: ScopeWithClock<'_>) -> String {
    let scope = scope.into_scope();
    resolve_with(template, &scope)
}

fn resolve_with(template: &str, scope: &Scope<'_>) -> String {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && template[i..].starts_with("\\{{") {
            out.push_str("{{");
            i += 3;
            continue;
        }
        if template[i..].starts_with("{{") {
            if let Some(close_rel) = template[i + 2..].find("}}") {
                let ident = &template[i + 2..i + 2 + close_rel];
                let trimmed = ident.trim();
                let resolved = if trimmed.starts_with('$') {
                    scope.lookup_dynamic(trimmed)
                } else {
                    scope.lookup(trimmed)
                };
                match resolved {
                    Some(value) => {
                        out.push_str(&value);
                        i += 2 + close_rel + 2;
                        continue;
                    }
                    None => {
                        // Unresolved reference: left literal, including braces.
                        out.push_str(&template[i..i + 2 + close_rel + 2]);
                        i += 2 + close_rel + 2;
                        continue;
                    }
                }
            }
        }
        let ch_len = template[i..].chars().next().map(|c| c.len_utf8()).unwrap_or(1);
        out.push_str(&template[i..i + ch_len]);
        i += ch_len;
    }

    out
}

/// Resolve every `{{}}` reference across a map of header/param-style string
/// pairs, preserving key order. Convenience wrapper over [`resolve`] for
/// call sites that need to resolve many templates against one scope.
pub fn resolve_all<'a>(
    templates: impl IntoIterator<Item = (&'a str, &'a str)>,
    environment: Option<&Environment>,
    collection: &Collection,
) -> HashMap<String, String> {
    let scope = Scope::new(environment, collection);
    let scope = scope.into_scope();
    templates
        .into_iter()
        .map(|(k, v)| (k.to_string(), resolve_with(v, &scope)))
        .collect()
}
