//! Entity encoding: flat (display attributes only) and relationship-aware (bounded depth,
//! cycle-safe expansion of requested relationships).

use crate::config::{RelationshipKind, ResolvedEntity, ResolvedModel};
use crate::graph::{EntityGraph, Link, Record, RecordKey};
use crate::store::Row;
use crate::value::Scalar;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const DEFAULT_MAX_DEPTH: u32 = 2;

/// Display attributes under their external names. A value that cannot be encoded is
/// emitted as null under its attribute name.
pub fn encode_attributes(entity: &ResolvedEntity, row: &Row) -> Map<String, Value> {
    let mut fields = Map::new();
    for attr in &entity.display_members {
        match row.get(attr).map(Scalar::to_json).unwrap_or(Ok(Value::Null)) {
            Ok(v) => {
                fields.insert(entity.alias(attr).to_string(), v);
            }
            Err(e) => {
                tracing::warn!(entity = %entity.name, attribute = %attr, error = %e, "attribute not encodable");
                fields.insert(attr.clone(), Value::Null);
            }
        }
    }
    fields
}

pub fn encode_flat(entity: &ResolvedEntity, row: &Row) -> Value {
    Value::Object(encode_attributes(entity, row))
}

/// Walks a loaded [`EntityGraph`]. Each root starts with a fresh visited set; every
/// expansion hands its children a copy that includes itself, so siblings never see
/// each other's records.
pub struct RelationEncoder<'a> {
    model: &'a ResolvedModel,
    graph: &'a EntityGraph,
    relationships: &'a [&'a str],
    max_depth: u32,
}

impl<'a> RelationEncoder<'a> {
    pub fn new(
        model: &'a ResolvedModel,
        graph: &'a EntityGraph,
        relationships: &'a [&'a str],
        max_depth: u32,
    ) -> Self {
        RelationEncoder {
            model,
            graph,
            relationships,
            max_depth,
        }
    }

    pub fn encode_roots(&self) -> Vec<Value> {
        self.graph.roots().map(|r| self.encode(r)).collect()
    }

    pub fn encode(&self, record: &Record) -> Value {
        self.encode_at(record, self.max_depth, &HashSet::new())
    }

    fn encode_at(&self, record: &Record, depth: u32, visited: &HashSet<RecordKey>) -> Value {
        let Some(entity) = self.model.entity_by_path(&record.key.entity) else {
            return Value::Null;
        };
        if depth == 0 || visited.contains(&record.key) {
            return identity(entity, record);
        }
        let mut visited = visited.clone();
        visited.insert(record.key.clone());

        let mut fields = encode_attributes(entity, &record.values);
        for rel in entity
            .relationships
            .iter()
            .filter(|r| self.relationships.contains(&r.name.as_str()))
        {
            let value = match record.links.get(&rel.name) {
                Some(Link::One(Some(key))) => self.child(key, depth - 1, &visited),
                Some(Link::One(None)) => Value::Null,
                Some(Link::Many(keys)) => Value::Array(
                    keys.iter()
                        .map(|k| self.child(k, depth - 1, &visited))
                        .collect(),
                ),
                None => match rel.direction {
                    RelationshipKind::ToOne => Value::Null,
                    RelationshipKind::ToMany => Value::Array(Vec::new()),
                },
            };
            fields.insert(entity.alias(&rel.name).to_string(), value);
        }
        Value::Object(fields)
    }

    fn child(&self, key: &RecordKey, depth: u32, visited: &HashSet<RecordKey>) -> Value {
        self.graph
            .get(key)
            .map(|r| self.encode_at(r, depth, visited))
            .unwrap_or(Value::Null)
    }
}

/// Depth-limited fallback: the record's primary key value.
fn identity(entity: &ResolvedEntity, record: &Record) -> Value {
    record
        .values
        .get(&entity.pk_column)
        .and_then(|v| v.to_json().ok())
        .unwrap_or(Value::Null)
}
