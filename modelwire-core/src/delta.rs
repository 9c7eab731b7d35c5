//! Change deltas delivered by the model watcher
//!
//! A watcher `Next` result carries a list of deltas, each encoded as a
//! three-element array `[kind, verb, snapshot]`:
//!
//! ```json
//! {"deltas": [["unit", "change", {"name": "mysql/0", "application": "mysql"}]]}
//! ```
//!
//! Kinds and verbs this client does not know are dropped rather than
//! rejected, so newer servers can add entity kinds without breaking older
//! clients. An entry that is not a well-formed triple makes the whole batch
//! malformed.

use crate::error::{Error, Result};
use crate::protocol::ProtocolGeneration;
use serde_json::Value;
use std::fmt;

/// Entity kinds reported by the watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Machine,
    Application,
    Unit,
    Relation,
    Annotation,
    Action,
}

impl EntityKind {
    /// Parse a wire kind; V1 servers still call applications "service"
    pub fn parse(generation: ProtocolGeneration, kind: &str) -> Option<Self> {
        match kind {
            "machine" => Some(EntityKind::Machine),
            "application" => Some(EntityKind::Application),
            "service" if generation == ProtocolGeneration::V1 => Some(EntityKind::Application),
            "unit" => Some(EntityKind::Unit),
            "relation" => Some(EntityKind::Relation),
            "annotation" => Some(EntityKind::Annotation),
            "action" => Some(EntityKind::Action),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Machine => "machine",
            EntityKind::Application => "application",
            EntityKind::Unit => "unit",
            EntityKind::Relation => "relation",
            EntityKind::Annotation => "annotation",
            EntityKind::Action => "action",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeVerb {
    Add,
    Change,
    Remove,
}

impl ChangeVerb {
    pub fn parse(verb: &str) -> Option<Self> {
        match verb {
            "add" => Some(ChangeVerb::Add),
            "change" => Some(ChangeVerb::Change),
            "remove" => Some(ChangeVerb::Remove),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeVerb::Add => "add",
            ChangeVerb::Change => "change",
            ChangeVerb::Remove => "remove",
        }
    }
}

/// One entity change
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaRecord {
    pub kind: EntityKind,
    pub verb: ChangeVerb,
    /// Entity snapshot as sent by the server, field names unchanged
    pub snapshot: Value,
}

impl DeltaRecord {
    pub fn new(kind: EntityKind, verb: ChangeVerb, snapshot: Value) -> Self {
        Self {
            kind,
            verb,
            snapshot,
        }
    }

    /// Read a snapshot field by its canonical (hyphenated) name
    pub fn field(&self, generation: ProtocolGeneration, name: &'static str) -> Option<&Value> {
        self.snapshot.get(generation.field(name).as_ref())
    }
}

/// Decode the result of a watcher `Next` call
pub fn decode_batch(generation: ProtocolGeneration, result: &Value) -> Result<Vec<DeltaRecord>> {
    let key = generation.field("deltas");
    let entries = match result.get(key.as_ref()) {
        Some(Value::Array(entries)) => entries,
        Some(Value::Null) => return Ok(Vec::new()),
        _ => return Err(Error::malformed(format!("missing {} in watcher result", key))),
    };

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let (kind, verb, snapshot) = match entry.as_array().map(Vec::as_slice) {
            Some([Value::String(kind), Value::String(verb), snapshot]) => (kind, verb, snapshot),
            _ => return Err(Error::malformed(format!("invalid delta {}", entry))),
        };

        match (EntityKind::parse(generation, kind), ChangeVerb::parse(verb)) {
            (Some(kind), Some(verb)) => records.push(DeltaRecord::new(kind, verb, snapshot.clone())),
            _ => tracing::debug!(kind = %kind, verb = %verb, "Dropping unknown delta"),
        }
    }

    Ok(records)
}

/// Decode the result of a `WatchAll` call into the watcher id
pub fn decode_watcher_id(generation: ProtocolGeneration, result: &Value) -> Result<String> {
    let key = generation.field("watcher-id");
    result
        .get(key.as_ref())
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::malformed(format!("missing {} in watch result", key)))
}
