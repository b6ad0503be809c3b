//! Query specification: paging, allow-listed filters, search predicates, ordering and
//! requested relationships, parsed forgivingly from query-string parameters.

use crate::config::ResolvedEntity;
use std::collections::HashMap;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PER_PAGE: u32 = 50;

const SEARCH_PREFIX: &str = "search_";

#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Exact match of a column against query-string text.
    Equals { column: String, value: String },
    IsNull { column: String },
}

#[derive(Clone, Debug, PartialEq)]
pub enum SearchPattern {
    /// SQL LIKE pattern, `%value%` for non-numeric input.
    Like(String),
    /// Purely numeric input matches exactly.
    Exact(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchPredicate {
    pub column: String,
    pub pattern: SearchPattern,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchMethod {
    #[default]
    And,
    Or,
}

impl SearchMethod {
    /// Uppercased `AND`/`OR`; anything else is `AND`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "OR" => SearchMethod::Or,
            _ => SearchMethod::And,
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            SearchMethod::And => "AND",
            SearchMethod::Or => "OR",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("desc") {
            Direction::Desc
        } else {
            Direction::Asc
        }
    }

    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuerySpec {
    pub page: u32,
    pub per_page: u32,
    pub filters: Vec<Filter>,
    pub search: Vec<SearchPredicate>,
    pub search_method: SearchMethod,
    pub order: Option<OrderBy>,
    /// `Some` when the request carried `relationships`, even if it names nothing usable.
    pub relationships: Option<Vec<String>>,
}

impl Default for QuerySpec {
    fn default() -> Self {
        QuerySpec {
            page: DEFAULT_PAGE,
            per_page: DEFAULT_PER_PAGE,
            filters: Vec::new(),
            search: Vec::new(),
            search_method: SearchMethod::And,
            order: None,
            relationships: None,
        }
    }
}

impl QuerySpec {
    /// Build from query parameters. Keys outside the entity's allow-lists are dropped.
    pub fn from_params(entity: &ResolvedEntity, params: &HashMap<String, String>) -> Self {
        let (page, per_page) = paginate_params(params);

        let mut filters: Vec<Filter> = params
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "page" | "per_page" | "relationships"))
            .filter(|(k, _)| entity.filter_columns.contains(k.as_str()))
            .map(|(k, v)| Filter::Equals {
                column: k.clone(),
                value: v.clone(),
            })
            .collect();
        filters.sort_by(|a, b| filter_column(a).cmp(filter_column(b)));
        if let Some(col) = &entity.soft_delete_column {
            filters.push(Filter::IsNull { column: col.clone() });
        }

        let mut search: Vec<SearchPredicate> = search_params(params)
            .into_iter()
            .filter(|p| entity.search_columns.contains(p.column.as_str()))
            .collect();
        search.sort_by(|a, b| a.column.cmp(&b.column));

        let search_method = if search.is_empty() {
            SearchMethod::And
        } else {
            params
                .get("searchmethod")
                .map(|s| SearchMethod::parse(s))
                .unwrap_or_default()
        };

        let order = params
            .get("order_by")
            .filter(|c| !c.is_empty())
            .map(|c| {
                if entity.column(c).is_none() {
                    tracing::warn!(entity = %entity.name, order_by = %c, "order_by names an undeclared column");
                }
                OrderBy {
                    column: c.clone(),
                    direction: params.get("order_dir").map(|d| Direction::parse(d)).unwrap_or_default(),
                }
            });

        QuerySpec {
            page,
            per_page,
            filters,
            search,
            search_method,
            order,
            relationships: relationship_params(params),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1) * self.per_page as u64
    }

    /// Requested relationship names. Each entity on the traversal expands only the ones it declares.
    pub fn relationship_names(&self) -> Vec<&str> {
        self.relationships.iter().flatten().map(String::as_str).collect()
    }

    /// Whether relationship-aware encoding was asked for.
    pub fn wants_relationships(&self) -> bool {
        self.relationships.is_some()
    }
}

fn filter_column(f: &Filter) -> &str {
    match f {
        Filter::Equals { column, .. } | Filter::IsNull { column } => column,
    }
}

/// `page` and `per_page` as positive integers; missing or invalid input takes the defaults.
pub fn paginate_params(params: &HashMap<String, String>) -> (u32, u32) {
    let positive = |k: &str| {
        params
            .get(k)
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n >= 1)
    };
    (
        positive("page").unwrap_or(DEFAULT_PAGE),
        positive("per_page").unwrap_or(DEFAULT_PER_PAGE),
    )
}

/// `search_<col>` parameters with the prefix stripped; numeric values match exactly.
pub fn search_params(params: &HashMap<String, String>) -> Vec<SearchPredicate> {
    params
        .iter()
        .filter_map(|(k, v)| {
            let column = k.strip_prefix(SEARCH_PREFIX)?;
            let pattern = if is_digits(v) {
                SearchPattern::Exact(v.clone())
            } else {
                SearchPattern::Like(format!("%{}%", v))
            };
            Some(SearchPredicate {
                column: column.to_string(),
                pattern,
            })
        })
        .collect()
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

pub fn relationship_params(params: &HashMap<String, String>) -> Option<Vec<String>> {
    params.get("relationships").map(|s| {
        s.split(',')
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve, FullConfig};
    use serde_json::json;

    fn vehicles() -> ResolvedEntity {
        let full = FullConfig {
            entities: serde_json::from_value(json!([{
                "name": "Vehicle", "table": "vehicles", "path": "vehicles", "primary_key": "id",
                "columns": [
                    {"name": "id", "type": "integer"},
                    {"name": "vin", "type": "text"},
                    {"name": "brand", "type": "text"},
                    {"name": "year", "type": "integer"},
                    {"name": "secret", "type": "text"},
                    {"name": "deleted_at", "type": "timestamptz"}
                ],
                "filter_columns": ["brand", "year"],
                "search_columns": ["vin", "brand", "year"],
                "soft_delete_column": "deleted_at",
                "relationships": [
                    {"name": "self_ref", "entity": "vehicles", "kind": "to_one", "local_column": "id", "remote_column": "id"}
                ]
            }]))
            .unwrap(),
        };
        resolve(&full).unwrap().entity_by_path("vehicles").unwrap().clone()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_apply_on_missing_or_invalid_paging() {
        assert_eq!(paginate_params(&params(&[])), (1, 50));
        assert_eq!(paginate_params(&params(&[("page", "abc"), ("per_page", "0")])), (1, 50));
        assert_eq!(paginate_params(&params(&[("page", "-2"), ("per_page", "20")])), (1, 20));
        assert_eq!(paginate_params(&params(&[("page", "3"), ("per_page", "20")])), (3, 20));
    }

    #[test]
    fn only_declared_filter_columns_apply() {
        let spec = QuerySpec::from_params(
            &vehicles(),
            &params(&[("brand", "Mazda"), ("secret", "x"), ("page", "2")]),
        );
        assert_eq!(
            spec.filters,
            vec![
                Filter::Equals {
                    column: "brand".into(),
                    value: "Mazda".into()
                },
                Filter::IsNull {
                    column: "deleted_at".into()
                },
            ]
        );
        assert_eq!(spec.page, 2);
        assert_eq!(spec.offset(), 50);
    }

    #[test]
    fn numeric_search_is_exact_and_text_is_substring() {
        let spec = QuerySpec::from_params(
            &vehicles(),
            &params(&[("search_year", "5"), ("search_vin", "abc"), ("search_secret", "x")]),
        );
        assert_eq!(
            spec.search,
            vec![
                SearchPredicate {
                    column: "vin".into(),
                    pattern: SearchPattern::Like("%abc%".into())
                },
                SearchPredicate {
                    column: "year".into(),
                    pattern: SearchPattern::Exact("5".into())
                },
            ]
        );
    }

    #[test]
    fn search_method_is_normalised_and_needs_predicates() {
        let entity = vehicles();
        let or = QuerySpec::from_params(&entity, &params(&[("search_vin", "a"), ("searchmethod", "or")]));
        assert_eq!(or.search_method, SearchMethod::Or);
        let junk = QuerySpec::from_params(&entity, &params(&[("search_vin", "a"), ("searchmethod", "xor")]));
        assert_eq!(junk.search_method, SearchMethod::And);
        let none = QuerySpec::from_params(&entity, &params(&[("searchmethod", "OR")]));
        assert_eq!(none.search_method, SearchMethod::And);
    }

    #[test]
    fn ordering_passes_through_unchecked() {
        let spec = QuerySpec::from_params(
            &vehicles(),
            &params(&[("order_by", "secret"), ("order_dir", "DESC")]),
        );
        assert_eq!(
            spec.order,
            Some(OrderBy {
                column: "secret".into(),
                direction: Direction::Desc
            })
        );
        let asc = QuerySpec::from_params(&vehicles(), &params(&[("order_by", "year")]));
        assert_eq!(asc.order.unwrap().direction, Direction::Asc);
    }

    #[test]
    fn relationships_keep_presence_even_when_empty() {
        let entity = vehicles();
        let spec = QuerySpec::from_params(&entity, &params(&[("relationships", "")]));
        assert_eq!(spec.relationships, Some(vec![]));
        assert!(spec.wants_relationships());
        let spec = QuerySpec::from_params(&entity, &params(&[("relationships", "self_ref, nope")]));
        assert_eq!(spec.relationship_names(), vec!["self_ref", "nope"]);
        assert!(!QuerySpec::from_params(&entity, &params(&[])).wants_relationships());
    }
}
