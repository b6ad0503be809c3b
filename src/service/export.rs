//! CSV export of one filtered page.

use crate::config::{ExportSource, ResolvedEntity, ResolvedModel};
use crate::error::AppError;
use crate::graph::{EntityGraph, Link, Record};
use crate::query::QuerySpec;
use crate::store::Session;
use crate::value::Scalar;
use chrono::{DateTime, Utc};

pub fn export_filename(now: DateTime<Utc>) -> String {
    format!("export_{}.csv", now.format("%Y%m%d%H%M%S"))
}

/// CSV text for the page selected by `spec`, or `None` when the page is empty.
pub async fn export_csv(
    session: &mut dyn Session,
    model: &ResolvedModel,
    entity: &ResolvedEntity,
    spec: &QuerySpec,
) -> Result<Option<String>, AppError> {
    let rows = session.fetch_page(entity, spec).await?;
    if rows.is_empty() {
        return Ok(None);
    }

    let mut relations: Vec<&str> = Vec::new();
    for c in &entity.export_columns {
        if let ExportSource::Related { relation, .. } = &c.source {
            if !relations.contains(&relation.as_str()) {
                relations.push(relation);
            }
        }
    }
    let graph = EntityGraph::load(session, model, entity, rows, &relations, 1).await?;

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(entity.export_columns.iter().map(|c| c.alias.as_str()))?;
    for record in graph.roots() {
        let cells: Vec<String> = entity
            .export_columns
            .iter()
            .map(|c| match &c.source {
                ExportSource::Field(field) => cell(record, field),
                ExportSource::Related { relation, attr } => match record.links.get(relation) {
                    Some(Link::One(Some(key))) => graph.get(key).map(|r| cell(r, attr)).unwrap_or_default(),
                    _ => String::new(),
                },
            })
            .collect();
        writer.write_record(&cells)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| AppError::Csv(e.to_string()))?;
    let text = String::from_utf8(bytes).map_err(|e| AppError::Csv(e.to_string()))?;
    tracing::debug!(entity = %entity.name, rows = graph.roots().count(), "csv export built");
    Ok(Some(text))
}

/// Stored value as CSV text; decimals keep their scale.
fn cell(record: &Record, attr: &str) -> String {
    match record.values.get(attr) {
        Some(Scalar::Decimal(d)) => d.to_string(),
        Some(v) => v.to_text().unwrap_or_default(),
        None => String::new(),
    }
}
