//! # Structural Diff
//!
//! Turns "here is the whole new snapshot" into the minimal list of
//! added / changed / removed entries against the previous snapshot. Every
//! live-state service runs its snapshots through here before anything is
//! pushed to subscribers.
//!
//! ## Shape of a snapshot
//!
//! A snapshot is a flat, insertion-ordered `serde_json` map from a stable key
//! to a value. The value is either a scalar (transfer summary fields) or an
//! attribute object (one torrent, keyed by its info-hash). The diff treats the
//! two uniformly:
//!
//! - scalar changed: the entry carries the whole new value;
//! - object changed: the entry carries only the attributes that differ. An
//!   attribute that disappeared from the object is reported as `null`.
//!
//! A key whose value is `null` is treated as absent on both sides, so a value
//! replaced by `null` shows up as a removal and never as "changed to null".
//!
//! ## Ordering
//!
//! Additions and changes come first, in the iteration order of the new
//! snapshot. Removals are appended afterwards, in the iteration order of the
//! previous snapshot. A key never appears twice.
//!
//! ## Removal scan
//!
//! Finding removals needs a second pass over the previous snapshot. Two
//! short-circuit rules decide whether that pass runs; both are exact (they
//! only skip the pass when no removal is possible):
//!
//! - [`RemovalScan::ShrinkOrChurn`]: scan when the map shrank or anything was
//!   added. Used for flat summaries.
//! - [`RemovalScan::NetDelta`]: additionally skip the scan when the number of
//!   additions fully explains the growth. Used for keyed collections.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

use serde::ser::{Error as _, Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

/// A flat key → value mapping captured once per poll cycle.
pub type Snapshot = Map<String, Value>;

/// Captures a serializable struct as a snapshot of its fields.
pub fn snapshot_of<T: Serialize>(value: &T) -> Result<Snapshot, serde_json::Error> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(serde_json::Error::custom(format!("expected an object, got {other}"))),
    }
}

/// # Diff Action
///
/// What happened to one key between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffAction {
    /// The key is new; carries the full value.
    Added(Value),
    /// The key existed and its value differs; carries the new scalar, or the
    /// differing attributes when the value is an object.
    Changed(Value),
    /// The key is gone; the key alone identifies it.
    Removed,
}

impl DiffAction {
    /// Wire label of the action.
    pub fn label(&self) -> &'static str {
        match self {
            DiffAction::Added(_) => "ITEM_ADDED",
            DiffAction::Changed(_) => "ITEM_CHANGED",
            DiffAction::Removed => "ITEM_REMOVED",
        }
    }

    /// The payload carried by the action, if any.
    pub fn data(&self) -> Option<&Value> {
        match self {
            DiffAction::Added(data) | DiffAction::Changed(data) => Some(data),
            DiffAction::Removed => None,
        }
    }
}

/// # Diff Entry
///
/// One key's change. Serialized as `{"key": .., "action": .., "data": ..}`,
/// with `data` omitted for removals.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffEntry {
    /// The snapshot key the entry refers to.
    pub key: String,
    /// What happened to it.
    pub action: DiffAction,
}

impl DiffEntry {
    fn added(key: &str, value: &Value) -> Self {
        Self {
            key: key.to_string(),
            action: DiffAction::Added(value.clone()),
        }
    }

    fn changed(key: &str, patch: Value) -> Self {
        Self {
            key: key.to_string(),
            action: DiffAction::Changed(patch),
        }
    }

    fn removed(key: &str) -> Self {
        Self {
            key: key.to_string(),
            action: DiffAction::Removed,
        }
    }
}

impl Serialize for DiffEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = self.action.data();
        let mut map = serializer.serialize_map(Some(if data.is_some() { 3 } else { 2 }))?;
        map.serialize_entry("key", &self.key)?;
        map.serialize_entry("action", self.action.label())?;
        if let Some(data) = data {
            map.serialize_entry("data", data)?;
        }
        map.end()
    }
}

/// Rule deciding whether the removal pass runs. See the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalScan {
    /// Scan when the snapshot shrank or at least one key was added.
    ShrinkOrChurn,
    /// Like `ShrinkOrChurn`, but skip when additions exactly account for growth.
    NetDelta,
    /// Always scan.
    Always,
}

impl RemovalScan {
    fn should_scan(self, prev_len: usize, next_len: usize, added: usize) -> bool {
        match self {
            RemovalScan::Always => true,
            RemovalScan::ShrinkOrChurn => next_len < prev_len || added > 0,
            RemovalScan::NetDelta => {
                if added == 0 {
                    return next_len < prev_len;
                }
                // Pure growth: every extra key is one of the additions.
                !(next_len >= prev_len && added == next_len - prev_len)
            }
        }
    }
}

/// Diffs two flat summaries (see [`RemovalScan::ShrinkOrChurn`]).
pub fn get_diff(prev: &Snapshot, next: &Snapshot) -> Vec<DiffEntry> {
    diff_with(prev, next, RemovalScan::ShrinkOrChurn)
}

/// Diffs two keyed collections (see [`RemovalScan::NetDelta`]).
pub fn get_collection_diff(prev: &Snapshot, next: &Snapshot) -> Vec<DiffEntry> {
    diff_with(prev, next, RemovalScan::NetDelta)
}

/// Diffs `prev` against `next` using the given removal-scan rule.
pub fn diff_with(prev: &Snapshot, next: &Snapshot, scan: RemovalScan) -> Vec<DiffEntry> {
    let mut entries = Vec::new();
    let mut added = 0usize;

    for (key, next_value) in next {
        if next_value.is_null() {
            continue;
        }

        match present(prev, key) {
            None => {
                added += 1;
                entries.push(DiffEntry::added(key, next_value));
            }
            Some(prev_value) => {
                if let Some(patch) = changed_fields(prev_value, next_value) {
                    entries.push(DiffEntry::changed(key, patch));
                }
            }
        }
    }

    if scan.should_scan(present_len(prev), present_len(next), added) {
        for (key, prev_value) in prev {
            if !prev_value.is_null() && present(next, key).is_none() {
                entries.push(DiffEntry::removed(key));
            }
        }
    }

    entries
}

/// Returns the patch describing how `next` differs from `prev`, or `None` when
/// they are equal.
///
/// Objects yield only the differing attributes (dropped attributes as `null`);
/// anything else yields the whole new value.
pub fn changed_fields(prev: &Value, next: &Value) -> Option<Value> {
    if prev == next {
        return None;
    }

    match (prev, next) {
        (Value::Object(prev_attrs), Value::Object(next_attrs)) => {
            let mut patch = Map::new();
            for (attr, value) in next_attrs {
                if prev_attrs.get(attr) != Some(value) {
                    patch.insert(attr.clone(), value.clone());
                }
            }
            for attr in prev_attrs.keys() {
                if !next_attrs.contains_key(attr) {
                    patch.insert(attr.clone(), Value::Null);
                }
            }
            Some(Value::Object(patch))
        }
        _ => Some(next.clone()),
    }
}

fn present<'a>(map: &'a Snapshot, key: &str) -> Option<&'a Value> {
    map.get(key).filter(|value| !value.is_null())
}

fn present_len(map: &Snapshot) -> usize {
    map.values().filter(|value| !value.is_null()).count()
}
