//! Config validation: referential integrity and allow-list consistency.

use crate::config::{EntityConfig, FullConfig, RelationshipKind};
use crate::error::ConfigError;
use crate::value::ColumnKind;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut path_segments = HashSet::new();
    for e in &config.entities {
        if !path_segments.insert(e.path.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(e.path.clone()));
        }
    }

    let columns_by_path: HashMap<&str, HashSet<&str>> = config
        .entities
        .iter()
        .map(|e| (e.path.as_str(), e.columns.iter().map(|c| c.name.as_str()).collect()))
        .collect();

    for e in &config.entities {
        validate_entity(e, &columns_by_path)?;
    }
    Ok(())
}

fn validate_entity(
    e: &EntityConfig,
    columns_by_path: &HashMap<&str, HashSet<&str>>,
) -> Result<(), ConfigError> {
    let own = &columns_by_path[e.path.as_str()];
    let missing_column = |col: &str| ConfigError::MissingReference {
        kind: "column",
        id: format!("{}.{}", e.name, col),
    };

    if !own.contains(e.primary_key.as_str()) {
        return Err(ConfigError::InvalidPrimaryKey {
            entity: e.name.clone(),
            column: e.primary_key.clone(),
        });
    }

    let mut seen = HashSet::new();
    for c in &e.columns {
        if !seen.insert(c.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "{}: duplicate column {}",
                e.name, c.name
            )));
        }
    }

    let listed = e
        .filter_columns
        .iter()
        .chain(&e.search_columns)
        .chain(&e.display_members)
        .chain(e.property_map.keys())
        .chain(e.rules_for_store.keys())
        .chain(e.rules_for_update.keys());
    for col in listed {
        if !own.contains(col.as_str()) {
            return Err(missing_column(col));
        }
    }

    if let Some(sd) = &e.soft_delete_column {
        let col = e
            .columns
            .iter()
            .find(|c| &c.name == sd)
            .ok_or_else(|| missing_column(sd))?;
        if !ColumnKind::from_sql_type(&col.type_).is_temporal() {
            return Err(ConfigError::Validation(format!(
                "{}: soft delete column {} must be a date or timestamp",
                e.name, sd
            )));
        }
    }

    let mut rel_names = HashSet::new();
    for r in &e.relationships {
        if !rel_names.insert(r.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "{}: duplicate relationship {}",
                e.name, r.name
            )));
        }
        if own.contains(r.name.as_str()) {
            return Err(ConfigError::Validation(format!(
                "{}: relationship {} shadows a column",
                e.name, r.name
            )));
        }
        let related = columns_by_path
            .get(r.entity.as_str())
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "entity",
                id: r.entity.clone(),
            })?;
        if !own.contains(r.local_column.as_str()) {
            return Err(missing_column(&r.local_column));
        }
        if !related.contains(r.remote_column.as_str()) {
            return Err(ConfigError::MissingReference {
                kind: "column",
                id: format!("{}.{}", r.entity, r.remote_column),
            });
        }
    }

    for x in &e.export_columns {
        match (&x.relation, &x.attr) {
            (Some(rel), Some(attr)) => {
                let r = e
                    .relationships
                    .iter()
                    .find(|r| &r.name == rel)
                    .ok_or_else(|| ConfigError::MissingReference {
                        kind: "relationship",
                        id: format!("{}.{}", e.name, rel),
                    })?;
                if r.kind != RelationshipKind::ToOne {
                    return Err(ConfigError::Validation(format!(
                        "{}: export column {} must read a to_one relationship",
                        e.name, x.alias
                    )));
                }
                if !columns_by_path[r.entity.as_str()].contains(attr.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "column",
                        id: format!("{}.{}", r.entity, attr),
                    });
                }
            }
            (None, None) => {
                let field = x.field.as_deref().unwrap_or(&x.alias);
                if !own.contains(field) {
                    return Err(missing_column(field));
                }
            }
            _ => {
                return Err(ConfigError::Validation(format!(
                    "{}: export column {} needs both relation and attr",
                    e.name, x.alias
                )))
            }
        }
    }

    Ok(())
}
