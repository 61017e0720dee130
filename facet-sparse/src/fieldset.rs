//! Field lists: validation, query parsing, and cache keys.

use alloc::string::String;
use alloc::vec::Vec;

use indexmap::IndexMap;

use crate::FormatError;

/// How a field list is turned into a formatter cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyOrder {
    /// Sort paths first: permutations of one set share a formatter, and
    /// fields are emitted in sorted path order.
    #[default]
    Canonical,

    /// Keep the request order: `a,b` and `b,a` are distinct formatters, and
    /// fields are emitted in first-appearance order.
    AsRequested,
}

/// Rejects a field list in which any path appears more than once.
///
/// Paths are compared as exact strings, so `a` and `a.b` never collide.
/// Each duplicate is reported once, in order of first occurrence.
pub fn check_duplicates<S: AsRef<str>>(fields: &[S]) -> Result<(), FormatError> {
    let mut counts: IndexMap<&str, usize> = IndexMap::with_capacity(fields.len());
    for field in fields {
        *counts.entry(field.as_ref()).or_insert(0) += 1;
    }

    let duplicates: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(field, _)| field.into())
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        Err(FormatError::DuplicateFields { fields: duplicates })
    }
}

/// Splits a comma-separated `fields=` query value into paths.
///
/// Whitespace around each entry is trimmed and empty entries are dropped, so
/// `"name, address.city,"` yields `["name", "address.city"]`.
pub fn parse_fields(query: &str) -> Vec<&str> {
    query
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .collect()
}

/// A field list in the order a formatter is built from, plus its cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldKey<'a> {
    paths: Vec<&'a str>,
    key: String,
}

impl<'a> FieldKey<'a> {
    /// Computes the key for `fields` under `order`.
    pub fn new<S: AsRef<str>>(fields: &'a [S], order: KeyOrder) -> Self {
        let mut paths: Vec<&'a str> = fields.iter().map(AsRef::as_ref).collect();
        if order == KeyOrder::Canonical {
            paths.sort_unstable();
        }
        let key = paths.join(",");
        Self { paths, key }
    }

    /// Paths in build order.
    pub fn paths(&self) -> &[&'a str] {
        &self.paths
    }

    /// The cache key.
    pub fn key(&self) -> &str {
        &self.key
    }
}
