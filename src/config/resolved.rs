//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::{RelationshipKind, ValidationRule};
use crate::value::ColumnKind;
use std::collections::{HashMap, HashSet};

/// How one relationship joins to its related entity.
#[derive(Clone, Debug)]
pub struct RelationshipSpec {
    pub name: String,
    pub direction: RelationshipKind,
    /// Path segment of the related entity (for lookup in model).
    pub related_path_segment: String,
    pub our_key_column: String,
    pub their_key_column: String,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    /// PostgreSQL type name used for casts when binding text parameters.
    pub pg_type: String,
    pub nullable: bool,
    pub has_default: bool,
    pub is_pk: bool,
}

#[derive(Clone, Debug)]
pub enum ExportSource {
    Field(String),
    Related { relation: String, attr: String },
}

#[derive(Clone, Debug)]
pub struct ExportColumn {
    pub alias: String,
    pub source: ExportSource,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub name: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub connection: String,
    pub pk_column: String,
    pub columns: Vec<ColumnInfo>,
    pub filter_columns: HashSet<String>,
    pub search_columns: HashSet<String>,
    pub soft_delete_column: Option<String>,
    pub relationships: Vec<RelationshipSpec>,
    pub property_map: HashMap<String, String>,
    /// Attributes emitted by the serializer, in order.
    pub display_members: Vec<String>,
    pub rules_for_store: HashMap<String, ValidationRule>,
    pub rules_for_update: HashMap<String, ValidationRule>,
    pub export_columns: Vec<ExportColumn>,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn pk(&self) -> &ColumnInfo {
        self.columns
            .iter()
            .find(|c| c.is_pk)
            .unwrap_or(&self.columns[0])
    }

    pub fn has_soft_delete(&self) -> bool {
        self.soft_delete_column.is_some()
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipSpec> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// External name of an attribute after the property map is applied.
    pub fn alias<'a>(&'a self, attr: &'a str) -> &'a str {
        self.property_map.get(attr).map(String::as_str).unwrap_or(attr)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: Vec<ResolvedEntity>,
    pub entity_by_path: HashMap<String, ResolvedEntity>,
}

impl ResolvedModel {
    pub fn entity_by_path(&self, path: &str) -> Option<&ResolvedEntity> {
        self.entity_by_path.get(path)
    }

    /// Distinct connection names referenced by entities.
    pub fn connections(&self) -> HashSet<&str> {
        self.entities.iter().map(|e| e.connection.as_str()).collect()
    }
}
