//! Related-row loading for relationship-aware serialization.
//!
//! Rows are loaded breadth-first into an identity map keyed by (entity path, primary key),
//! one `fetch_where_in` per entity, relationship and level. Serialization then walks the
//! graph without touching the store.

use crate::config::{RelationshipKind, RelationshipSpec, ResolvedEntity, ResolvedModel};
use crate::store::{Row, Session, StoreError};
use crate::value::Scalar;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Identity of a loaded record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub entity: String,
    pub id: String,
}

impl RecordKey {
    pub fn of(entity: &ResolvedEntity, row: &Row) -> Self {
        RecordKey {
            entity: entity.path_segment.clone(),
            id: row
                .get(&entity.pk_column)
                .and_then(Scalar::to_text)
                .unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Link {
    One(Option<RecordKey>),
    Many(Vec<RecordKey>),
}

#[derive(Clone, Debug)]
pub struct Record {
    pub key: RecordKey,
    pub values: Row,
    /// Loaded relationships by name. Absent when the record was reached at the depth limit.
    pub links: HashMap<String, Link>,
}

#[derive(Debug, Default)]
pub struct EntityGraph {
    records: HashMap<RecordKey, Record>,
    roots: Vec<RecordKey>,
}

impl EntityGraph {
    /// Graph of the given rows with no relationships loaded.
    pub fn flat(entity: &ResolvedEntity, rows: Vec<Row>) -> Self {
        let mut graph = EntityGraph::default();
        for row in rows {
            let key = graph.add(entity, row);
            graph.roots.push(key);
        }
        graph
    }

    /// Load `relationships` (names not declared by an entity are ignored there) up to
    /// `max_depth` levels below the given rows.
    pub async fn load(
        session: &mut dyn Session,
        model: &ResolvedModel,
        entity: &ResolvedEntity,
        rows: Vec<Row>,
        relationships: &[&str],
        max_depth: u32,
    ) -> Result<Self, StoreError> {
        let mut graph = Self::flat(entity, rows);
        let mut frontier = graph.roots.clone();

        for level in 0..max_depth {
            if frontier.is_empty() || relationships.is_empty() {
                break;
            }
            let mut by_entity: BTreeMap<String, Vec<RecordKey>> = BTreeMap::new();
            for key in frontier.drain(..) {
                by_entity.entry(key.entity.clone()).or_default().push(key);
            }

            for (path, keys) in by_entity {
                let Some(owner) = model.entity_by_path(&path) else {
                    continue;
                };
                for rel in owner
                    .relationships
                    .iter()
                    .filter(|r| relationships.contains(&r.name.as_str()))
                {
                    let Some(target) = model.entity_by_path(&rel.related_path_segment) else {
                        tracing::warn!(relationship = %rel.name, target = %rel.related_path_segment, "related entity is not configured");
                        continue;
                    };
                    let added = graph.load_relationship(session, rel, target, &keys).await?;
                    frontier.extend(added);
                }
            }
            tracing::debug!(level, pending = frontier.len(), "relationship level loaded");
        }
        Ok(graph)
    }

    async fn load_relationship(
        &mut self,
        session: &mut dyn Session,
        rel: &RelationshipSpec,
        target: &ResolvedEntity,
        owners: &[RecordKey],
    ) -> Result<Vec<RecordKey>, StoreError> {
        let mut seen = HashSet::new();
        let values: Vec<Scalar> = owners
            .iter()
            .filter_map(|k| self.records.get(k))
            .filter_map(|r| r.values.get(&rel.our_key_column))
            .filter(|v| !v.is_null())
            .filter(|v| v.to_text().is_some_and(|t| seen.insert(t)))
            .cloned()
            .collect();

        let rows = if values.is_empty() {
            Vec::new()
        } else {
            session.fetch_where_in(target, &rel.their_key_column, &values).await?
        };

        let mut added = Vec::new();
        let mut by_remote: HashMap<String, Vec<RecordKey>> = HashMap::new();
        for row in rows {
            let remote = row.get(&rel.their_key_column).and_then(Scalar::to_text);
            let key = RecordKey::of(target, &row);
            if !self.records.contains_key(&key) {
                self.add(target, row);
                added.push(key.clone());
            }
            if let Some(remote) = remote {
                by_remote.entry(remote).or_default().push(key);
            }
        }

        for owner in owners {
            let Some(record) = self.records.get_mut(owner) else {
                continue;
            };
            let matched = record
                .values
                .get(&rel.our_key_column)
                .and_then(Scalar::to_text)
                .and_then(|v| by_remote.get(&v))
                .cloned()
                .unwrap_or_default();
            let link = match rel.direction {
                RelationshipKind::ToOne => Link::One(matched.into_iter().next()),
                RelationshipKind::ToMany => Link::Many(matched),
            };
            record.links.insert(rel.name.clone(), link);
        }
        Ok(added)
    }

    fn add(&mut self, entity: &ResolvedEntity, row: Row) -> RecordKey {
        let key = RecordKey::of(entity, &row);
        self.records.entry(key.clone()).or_insert_with(|| Record {
            key: key.clone(),
            values: row,
            links: HashMap::new(),
        });
        key
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Record> {
        self.records.get(key)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Record> {
        self.roots.iter().filter_map(|k| self.records.get(k))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use crate::store::{MemoryStore, Store};
    use serde_json::json;

    fn owners_and_vehicles() -> ResolvedModel {
        let full = FullConfig {
            entities: serde_json::from_value(json!([
                {
                    "name": "Owner", "table": "owners", "path": "owners", "primary_key": "id",
                    "columns": [{"name": "id", "type": "integer"}, {"name": "name", "type": "text"}],
                    "relationships": [
                        {"name": "vehicles", "entity": "vehicles", "kind": "to_many", "local_column": "id", "remote_column": "owner_id"}
                    ]
                },
                {
                    "name": "Vehicle", "table": "vehicles", "path": "vehicles", "primary_key": "id",
                    "columns": [
                        {"name": "id", "type": "integer"},
                        {"name": "vin", "type": "text"},
                        {"name": "owner_id", "type": "integer"}
                    ],
                    "relationships": [
                        {"name": "owner", "entity": "owners", "kind": "to_one", "local_column": "owner_id", "remote_column": "id"}
                    ]
                }
            ]))
            .unwrap(),
        };
        resolve(&full).unwrap()
    }

    #[tokio::test]
    async fn loads_levels_into_identity_map() {
        let model = owners_and_vehicles();
        let owners = model.entity_by_path("owners").unwrap();
        let vehicles = model.entity_by_path("vehicles").unwrap();
        let store = MemoryStore::new();
        store.seed(owners, json!([{"id": 1, "name": "Ana"}])).unwrap();
        store
            .seed(vehicles, json!([{"id": 10, "vin": "A", "owner_id": 1}, {"id": 11, "vin": "B", "owner_id": 1}]))
            .unwrap();

        let mut session = store.open().await.unwrap();
        let roots = session.fetch_where_in(vehicles, "id", &[Scalar::Int(10)]).await.unwrap();
        let graph = EntityGraph::load(session.as_mut(), &model, vehicles, roots, &["owner", "vehicles"], 2)
            .await
            .unwrap();
        session.rollback().await.unwrap();

        let root = graph.roots().next().unwrap();
        let owner_key = RecordKey {
            entity: "owners".into(),
            id: "1".into(),
        };
        assert_eq!(root.links.get("owner"), Some(&Link::One(Some(owner_key.clone()))));
        let owner = graph.get(&owner_key).unwrap();
        match owner.links.get("vehicles") {
            Some(Link::Many(keys)) => assert_eq!(keys.len(), 2),
            other => panic!("unexpected link {:?}", other),
        }
        // vehicle 10 is shared, not duplicated
        assert_eq!(graph.len(), 3);
    }

    #[tokio::test]
    async fn missing_target_links_to_nothing() {
        let model = owners_and_vehicles();
        let vehicles = model.entity_by_path("vehicles").unwrap();
        let store = MemoryStore::new();
        store.seed(vehicles, json!([{"id": 10, "vin": "A"}])).unwrap();

        let mut session = store.open().await.unwrap();
        let roots = session.fetch_where_in(vehicles, "id", &[Scalar::Int(10)]).await.unwrap();
        let graph = EntityGraph::load(session.as_mut(), &model, vehicles, roots, &["owner"], 2)
            .await
            .unwrap();
        session.rollback().await.unwrap();
        assert_eq!(graph.roots().next().unwrap().links.get("owner"), Some(&Link::One(None)));
    }
}
