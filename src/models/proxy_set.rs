//! Ordered, name-keyed proxy collections and the merge rules between them.

use std::collections::HashSet;

use linked_hash_map::LinkedHashMap;
use log::warn;
use serde::Serialize;
use serde_yaml::Value;

use crate::error::{CuratorError, Result};
use crate::models::ProxyRecord;

/// An ordered mapping of proxy name to record.
///
/// Names are unique. Replacing a record keeps its original position, so the
/// output order is the order in which each name was first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxySet {
    proxies: LinkedHashMap<String, ProxyRecord>,
}

impl ProxySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.proxies.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ProxyRecord> {
        self.proxies.get(name)
    }

    /// Insert a record under its name, returning the record it replaced.
    pub fn insert(&mut self, record: ProxyRecord) -> Option<ProxyRecord> {
        if let Some(slot) = self.proxies.get_mut(&record.name) {
            return Some(std::mem::replace(slot, record));
        }
        self.proxies.insert(record.name.clone(), record);
        None
    }

    pub fn remove(&mut self, name: &str) -> Option<ProxyRecord> {
        self.proxies.remove(name)
    }

    /// Keep only the records for which `keep` returns true.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&ProxyRecord) -> bool,
    {
        let proxies = std::mem::take(&mut self.proxies);
        self.proxies = proxies
            .into_iter()
            .filter(|(_, record)| keep(record))
            .collect();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyRecord> {
        self.proxies.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.proxies.keys().map(String::as_str)
    }

    pub fn into_records(self) -> Vec<ProxyRecord> {
        self.proxies.into_iter().map(|(_, record)| record).collect()
    }

    /// Copy of the records listening on `port`.
    pub fn filter_by_port(&self, port: u16) -> ProxySet {
        self.iter()
            .filter(|record| record.port == port)
            .cloned()
            .collect()
    }

    /// Copy of this set with every record dialing `server` instead.
    ///
    /// `servername` is left alone, so TLS still presents the original host.
    pub fn with_server(&self, server: &str) -> ProxySet {
        self.iter()
            .cloned()
            .map(|mut record| {
                record.server = server.to_string();
                record
            })
            .collect()
    }

    /// Parse a document with a top-level `proxies` sequence.
    ///
    /// `origin` only labels errors. A document without a `proxies` key is
    /// rejected; a `proxies: null` entry reads as an empty set.
    pub fn from_yaml_str(content: &str, origin: &str) -> Result<ProxySet> {
        let document: Value =
            serde_yaml::from_str(content).map_err(|e| CuratorError::yaml(origin, e))?;

        let proxies = match document.get("proxies") {
            Some(Value::Null) => return Ok(ProxySet::new()),
            Some(proxies) => proxies.clone(),
            None => return Err(CuratorError::MissingProxies(origin.to_string())),
        };

        let records: Vec<ProxyRecord> =
            serde_yaml::from_value(proxies).map_err(|e| CuratorError::yaml(origin, e))?;
        Ok(records.into_iter().collect())
    }

    /// Render as a `proxies:` document, preserving record order.
    pub fn to_yaml_string(&self) -> std::result::Result<String, serde_yaml::Error> {
        #[derive(Serialize)]
        struct ProxyDocument<'a> {
            proxies: Vec<&'a ProxyRecord>,
        }

        serde_yaml::to_string(&ProxyDocument {
            proxies: self.iter().collect(),
        })
    }
}

impl FromIterator<ProxyRecord> for ProxySet {
    fn from_iter<I: IntoIterator<Item = ProxyRecord>>(iter: I) -> Self {
        let mut set = ProxySet::new();
        for record in iter {
            set.insert(record);
        }
        set
    }
}

impl IntoIterator for ProxySet {
    type Item = ProxyRecord;
    type IntoIter = std::vec::IntoIter<ProxyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.into_records().into_iter()
    }
}

/// Result of [`merge`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub merged: ProxySet,
    /// True iff at least one incoming name was absent from the existing set.
    /// Replacing a record that already existed does not count.
    pub has_new_entries: bool,
}

/// Merge `incoming` into `existing` by name, last write wins.
pub fn merge(incoming: &ProxySet, existing: &ProxySet) -> MergeOutcome {
    let mut merged = existing.clone();
    let mut has_new_entries = false;

    for record in incoming.iter() {
        if merged.insert(record.clone()).is_none() {
            has_new_entries = true;
        }
    }

    MergeOutcome {
        merged,
        has_new_entries,
    }
}

/// Records of `incoming` whose full content does not appear in `existing`.
///
/// This compares every field, not just the name: a same-named record whose
/// content changed is reported here even though [`merge`] would not flag it
/// as new.
pub fn content_diff<'a>(incoming: &'a ProxySet, existing: &ProxySet) -> Vec<&'a ProxyRecord> {
    let known: HashSet<String> = existing
        .iter()
        .filter_map(|record| record.canonical_key().ok())
        .collect();

    incoming
        .iter()
        .filter(|record| match record.canonical_key() {
            Ok(key) => !known.contains(&key),
            Err(e) => {
                warn!("Cannot serialize proxy '{}' for comparison: {}", record.name, e);
                true
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, server: &str) -> ProxyRecord {
        ProxyRecord::new(name, server, 443)
    }

    fn set(records: &[ProxyRecord]) -> ProxySet {
        records.iter().cloned().collect()
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut proxies = set(&[record("A", "a"), record("B", "b"), record("C", "c")]);
        let old = proxies.insert(record("A", "a2"));

        assert_eq!(old.map(|r| r.server), Some("a".to_string()));
        assert_eq!(proxies.names().collect::<Vec<_>>(), vec!["A", "B", "C"]);
        assert_eq!(proxies.get("A").unwrap().server, "a2");
    }

    #[test]
    fn test_merge_with_self_is_idempotent() {
        let proxies = set(&[record("A", "a"), record("B", "b")]);
        let outcome = merge(&proxies, &proxies);

        assert!(!outcome.has_new_entries);
        assert_eq!(outcome.merged, proxies);
    }

    #[test]
    fn test_merge_same_name_last_write_wins() {
        let existing = set(&[record("A", "v1")]);
        let incoming = set(&[record("A", "v2")]);
        let outcome = merge(&incoming, &existing);

        assert!(!outcome.has_new_entries);
        assert_eq!(outcome.merged.len(), 1);
        assert_eq!(outcome.merged.get("A").unwrap().server, "v2");
    }

    #[test]
    fn test_merge_disjoint_names() {
        let existing = set(&[record("A", "v1")]);
        let incoming = set(&[record("B", "v2")]);
        let outcome = merge(&incoming, &existing);

        assert!(outcome.has_new_entries);
        assert_eq!(outcome.merged.names().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn test_content_diff_reports_changed_and_new() {
        let existing = set(&[record("A", "a"), record("B", "b")]);
        let incoming = set(&[record("B", "b-changed"), record("C", "c"), record("A", "a")]);

        let added: Vec<&str> = content_diff(&incoming, &existing)
            .into_iter()
            .map(|r| r.name.as_str())
            .collect();
        assert_eq!(added, vec!["B", "C"]);
    }

    #[test]
    fn test_filter_by_port_and_rewrite_server() {
        let mut on_80 = record("A", "a.example.com");
        on_80.port = 80;
        on_80.servername = "a.example.com".to_string();
        let proxies = set(&[on_80, record("B", "b.example.com")]);

        let filtered = proxies.filter_by_port(80);
        assert_eq!(filtered.names().collect::<Vec<_>>(), vec!["A"]);

        let rewritten = filtered.with_server("104.26.6.171");
        let a = rewritten.get("A").unwrap();
        assert_eq!(a.server, "104.26.6.171");
        assert_eq!(a.servername, "a.example.com");
        // the source set is untouched
        assert_eq!(proxies.get("A").unwrap().server, "a.example.com");
    }

    #[test]
    fn test_yaml_document_requires_proxies_key() {
        let err = ProxySet::from_yaml_str("rules: []\n", "test.yaml").unwrap_err();
        assert!(matches!(err, CuratorError::MissingProxies(_)));

        let empty = ProxySet::from_yaml_str("proxies:\n", "test.yaml").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_yaml_document_round_trip_keeps_order() {
        let proxies = set(&[record("Z", "z"), record("A", "a")]);
        let yaml = proxies.to_yaml_string().unwrap();
        let loaded = ProxySet::from_yaml_str(&yaml, "mem").unwrap();
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["Z", "A"]);
    }
}
