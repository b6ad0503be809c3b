//! Load entity metadata from JSON and resolve it into the runtime model.

use crate::config::resolved::{ColumnInfo, ExportColumn, ExportSource, RelationshipSpec, ResolvedEntity, ResolvedModel};
use crate::config::types::*;
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use crate::value::ColumnKind;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Build resolved model from full config (validates first).
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let mut entities = Vec::with_capacity(config.entities.len());
    let mut entity_by_path = HashMap::new();

    for e in &config.entities {
        let columns: Vec<ColumnInfo> = e
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                kind: ColumnKind::from_sql_type(&c.type_),
                pg_type: column_pg_type_name(&c.type_),
                nullable: c.nullable,
                has_default: c.has_default,
                is_pk: c.name == e.primary_key,
            })
            .collect();

        let relationships = e
            .relationships
            .iter()
            .map(|r| RelationshipSpec {
                name: r.name.clone(),
                direction: r.kind,
                related_path_segment: r.entity.clone(),
                our_key_column: r.local_column.clone(),
                their_key_column: r.remote_column.clone(),
            })
            .collect();

        let display_members = if e.display_members.is_empty() {
            e.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            e.display_members.clone()
        };

        let export_columns = if e.export_columns.is_empty() {
            display_members
                .iter()
                .map(|name| ExportColumn {
                    alias: name.clone(),
                    source: ExportSource::Field(name.clone()),
                })
                .collect()
        } else {
            e.export_columns.iter().map(export_column).collect()
        };

        let entity = ResolvedEntity {
            name: e.name.clone(),
            schema_name: e.schema.clone(),
            table_name: e.table.clone(),
            path_segment: e.path.clone(),
            connection: e.connection.clone(),
            pk_column: e.primary_key.clone(),
            columns,
            filter_columns: e.filter_columns.iter().cloned().collect(),
            search_columns: e.search_columns.iter().cloned().collect(),
            soft_delete_column: e.soft_delete_column.clone(),
            relationships,
            property_map: e.property_map.clone(),
            display_members,
            rules_for_store: e.rules_for_store.clone(),
            rules_for_update: e.rules_for_update.clone(),
            export_columns,
        };
        entity_by_path.insert(e.path.clone(), entity.clone());
        entities.push(entity);
    }

    Ok(ResolvedModel {
        entities,
        entity_by_path,
    })
}

fn export_column(x: &ExportColumnConfig) -> ExportColumn {
    let source = match (&x.relation, &x.attr) {
        (Some(relation), Some(attr)) => ExportSource::Related {
            relation: relation.clone(),
            attr: attr.clone(),
        },
        _ => ExportSource::Field(x.field.clone().unwrap_or_else(|| x.alias.clone())),
    };
    ExportColumn {
        alias: x.alias.clone(),
        source,
    }
}

/// Base type name for casts: parameters dropped, custom schema-qualified types kept as-is.
fn column_pg_type_name(ty: &str) -> String {
    let trimmed = ty.trim();
    if trimmed.contains('.') {
        return trimmed.to_string();
    }
    let base = trimmed.split('(').next().unwrap_or(trimmed).trim().to_lowercase();
    match base.as_str() {
        "serial" | "int" | "int4" => "integer".into(),
        "bigserial" | "int8" => "bigint".into(),
        "smallserial" | "int2" => "smallint".into(),
        _ => base,
    }
}

/// Load entity declarations from a JSON file (array or single entity) or from every `*.json`
/// file in a directory, in file-name order.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;

    let mut files = Vec::new();
    if meta.is_dir() {
        let mut dir = tokio::fs::read_dir(path)
            .await
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        while let Some(entry) = dir.next_entry().await.map_err(|e| ConfigError::Load(e.to_string()))? {
            let p = entry.path();
            if p.extension().and_then(|x| x.to_str()) == Some("json") {
                files.push(p);
            }
        }
        files.sort();
    } else {
        files.push(path.to_path_buf());
    }

    let mut entities = Vec::new();
    for file in files {
        let text = tokio::fs::read_to_string(&file)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
        let v: Value = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?;
        entities.extend(entities_from_value(v).map_err(|e| ConfigError::Load(format!("{}: {}", file.display(), e)))?);
    }
    tracing::debug!(path = %path.display(), count = entities.len(), "entity metadata loaded");
    Ok(FullConfig { entities })
}

fn entities_from_value(v: Value) -> Result<Vec<EntityConfig>, serde_json::Error> {
    match v {
        Value::Array(_) => serde_json::from_value(v),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(entities: Value) -> FullConfig {
        FullConfig {
            entities: serde_json::from_value(entities).unwrap(),
        }
    }

    fn owners_and_vehicles() -> Value {
        json!([
            {
                "name": "Owner", "table": "owners", "path": "owners", "primary_key": "id",
                "columns": [{"name": "id", "type": "serial"}, {"name": "name", "type": "varchar(64)"}],
                "relationships": [
                    {"name": "vehicles", "entity": "vehicles", "kind": "to_many", "local_column": "id", "remote_column": "owner_id"}
                ]
            },
            {
                "name": "Vehicle", "table": "vehicles", "path": "vehicles", "primary_key": "id",
                "columns": [
                    {"name": "id", "type": "integer"},
                    {"name": "vin", "type": "varchar(128)"},
                    {"name": "price", "type": "numeric(10,2)"},
                    {"name": "owner_id", "type": "integer"},
                    {"name": "deleted_at", "type": "timestamptz"}
                ],
                "filter_columns": ["vin"],
                "soft_delete_column": "deleted_at",
                "relationships": [
                    {"name": "owner", "entity": "owners", "kind": "to_one", "local_column": "owner_id", "remote_column": "id"}
                ],
                "export_columns": [
                    {"alias": "VIN", "field": "vin"},
                    {"alias": "Owner", "relation": "owner", "attr": "name"}
                ]
            }
        ])
    }

    #[test]
    fn resolves_kinds_casts_and_defaults() {
        let model = resolve(&config(owners_and_vehicles())).unwrap();
        let v = model.entity_by_path("vehicles").unwrap();
        assert_eq!(v.schema_name, "public");
        assert_eq!(v.connection, "default");
        assert_eq!(v.pk().name, "id");
        let price = v.column("price").unwrap();
        assert_eq!(price.kind, ColumnKind::Decimal);
        assert_eq!(price.pg_type, "numeric");
        assert_eq!(model.entity_by_path("owners").unwrap().pk().pg_type, "integer");
        assert_eq!(v.display_members.len(), 5);
        assert!(matches!(
            &v.export_columns[1].source,
            ExportSource::Related { relation, attr } if relation == "owner" && attr == "name"
        ));
    }

    #[test]
    fn rejects_unknown_filter_column() {
        let mut raw = owners_and_vehicles();
        raw[1]["filter_columns"] = json!(["colour"]);
        let err = resolve(&config(raw)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingReference { kind: "column", .. }));
    }

    #[test]
    fn rejects_unknown_relationship_target() {
        let mut raw = owners_and_vehicles();
        raw[1]["relationships"][0]["entity"] = json!("people");
        let err = resolve(&config(raw)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingReference { kind: "entity", .. }));
    }

    #[test]
    fn rejects_duplicate_paths_and_non_temporal_soft_delete() {
        let mut raw = owners_and_vehicles();
        raw[0]["path"] = json!("vehicles");
        assert!(matches!(
            resolve(&config(raw)).unwrap_err(),
            ConfigError::DuplicatePathSegment(_)
        ));

        let mut raw = owners_and_vehicles();
        raw[1]["soft_delete_column"] = json!("vin");
        assert!(matches!(resolve(&config(raw)).unwrap_err(), ConfigError::Validation(_)));
    }

    #[tokio::test]
    async fn loads_directory_of_entity_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = owners_and_vehicles();
        std::fs::write(dir.path().join("a_owners.json"), raw[0].to_string()).unwrap();
        std::fs::write(dir.path().join("b_vehicles.json"), json!([raw[1]]).to_string()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let full = load_from_path(dir.path()).await.unwrap();
        assert_eq!(full.entities.len(), 2);
        assert_eq!(full.entities[0].path, "owners");
        assert!(resolve(&full).is_ok());
    }
}
