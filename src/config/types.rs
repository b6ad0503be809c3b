//! Raw entity metadata as declared in JSON.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. serial, NOW()).
    #[serde(default)]
    pub has_default: bool,
}

fn default_true() -> bool {
    true
}

fn default_schema() -> String {
    "public".into()
}

fn default_connection() -> String {
    "default".into()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    ToOne,
    ToMany,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipConfig {
    pub name: String,
    /// Path segment of the related entity.
    pub entity: String,
    pub kind: RelationshipKind,
    /// Our column used in the join (our FK for to_one; usually our PK for to_many).
    pub local_column: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub remote_column: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// One CSV column: either an own attribute (`field`, defaulting to the alias) or
/// an attribute of a to-one relationship (`relation` + `attr`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportColumnConfig {
    pub alias: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub attr: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    pub table: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    pub path: String,
    #[serde(default = "default_connection")]
    pub connection: String,
    pub primary_key: String,
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub filter_columns: Vec<String>,
    #[serde(default)]
    pub search_columns: Vec<String>,
    #[serde(default)]
    pub soft_delete_column: Option<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
    /// Attribute name -> external field name.
    #[serde(default)]
    pub property_map: HashMap<String, String>,
    #[serde(default)]
    pub display_members: Vec<String>,
    #[serde(default)]
    pub rules_for_store: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub rules_for_update: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub export_columns: Vec<ExportColumnConfig>,
}

/// All entity declarations in one struct for in-memory loading.
#[derive(Clone, Debug, Default)]
pub struct FullConfig {
    pub entities: Vec<EntityConfig>,
}
