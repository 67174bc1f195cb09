//! Generic filter/sort/pagination options shared by every list endpoint.
//!
//! Options are entity-agnostic: handlers validate field names against a
//! per-entity whitelist when parsing, and the store appends the resulting
//! clauses to its base SELECT.

use anyhow::{Result, bail};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl FilterOperator {
    pub fn as_sql(self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "!=",
            FilterOperator::Gt => ">",
            FilterOperator::Gte => ">=",
            FilterOperator::Lt => "<",
            FilterOperator::Lte => "<=",
            FilterOperator::Like => "LIKE",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(FilterOperator::Eq),
            "ne" => Some(FilterOperator::Ne),
            "gt" => Some(FilterOperator::Gt),
            "gte" => Some(FilterOperator::Gte),
            "lt" => Some(FilterOperator::Lt),
            "lte" => Some(FilterOperator::Lte),
            "like" => Some(FilterOperator::Like),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FilterOption {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone)]
pub struct SortOption {
    pub field: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filters: Vec<FilterOption>,
    pub sorts: Vec<SortOption>,
    pub pagination: Option<Pagination>,
}

impl ListOptions {
    /// Parses URL query parameters of the form `filter[field]=v`,
    /// `filter[field][op]=v`, `sort=-field,other`, `limit=`/`offset=`.
    /// Fields outside `allowed_fields` are rejected, not silently dropped.
    pub fn from_query(
        params: &HashMap<String, String>,
        allowed_fields: &[&str],
    ) -> Result<Self> {
        let mut options = ListOptions::default();

        for (key, value) in params {
            let Some(rest) = key.strip_prefix("filter[") else {
                continue;
            };
            let (field, operator) = match rest.split_once(']') {
                Some((field, "")) => (field, FilterOperator::Eq),
                Some((field, tail)) => {
                    let op_name = tail.trim_start_matches('[').trim_end_matches(']');
                    let Some(op) = FilterOperator::parse(op_name) else {
                        bail!("unsupported filter operator: {}", op_name);
                    };
                    (field, op)
                }
                None => bail!("malformed filter parameter: {}", key),
            };
            if !allowed_fields.contains(&field) {
                bail!("unsupported filter field: {}", field);
            }
            options.filters.push(FilterOption {
                field: field.to_string(),
                operator,
                value: value.clone(),
            });
        }
        // Deterministic clause order regardless of HashMap iteration
        options.filters.sort_by(|a, b| a.field.cmp(&b.field));

        if let Some(sort) = params.get("sort") {
            for part in sort.split(',').filter(|p| !p.is_empty()) {
                let (field, direction) = match part.strip_prefix('-') {
                    Some(field) => (field, SortDirection::Desc),
                    None => (part, SortDirection::Asc),
                };
                if !allowed_fields.contains(&field) {
                    bail!("unsupported sort field: {}", field);
                }
                options.sorts.push(SortOption {
                    field: field.to_string(),
                    direction,
                });
            }
        }

        let limit = match params.get("limit") {
            Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
                anyhow::anyhow!("limit must be a non-negative integer")
            })?),
            None => None,
        };
        let offset = match params.get("offset") {
            Some(raw) => raw.parse::<i64>().map_err(|_| {
                anyhow::anyhow!("offset must be a non-negative integer")
            })?,
            None => 0,
        };
        if let Some(limit) = limit {
            if limit < 0 || offset < 0 {
                bail!("limit and offset must be non-negative");
            }
            options.pagination = Some(Pagination { limit, offset });
        }

        Ok(options)
    }
}

/// Appends WHERE/ORDER BY/LIMIT clauses to `base` and returns the query plus
/// positional parameters for the filter values.
pub fn append_list_options(base: &str, options: &ListOptions) -> (String, Vec<String>) {
    let mut q = base.to_string();
    let mut params = Vec::new();

    if !options.filters.is_empty() {
        let clauses: Vec<String> = options
            .filters
            .iter()
            .enumerate()
            .map(|(i, f)| format!("`{}` {} ?{}", f.field, f.operator.as_sql(), i + 1))
            .collect();
        q.push_str(" WHERE ");
        q.push_str(&clauses.join(" AND "));
        params.extend(options.filters.iter().map(|f| f.value.clone()));
    }

    if !options.sorts.is_empty() {
        let clauses: Vec<String> = options
            .sorts
            .iter()
            .map(|s| {
                let dir = match s.direction {
                    SortDirection::Asc => "ASC",
                    SortDirection::Desc => "DESC",
                };
                format!("`{}` {}", s.field, dir)
            })
            .collect();
        q.push_str(" ORDER BY ");
        q.push_str(&clauses.join(", "));
    }

    if let Some(p) = options.pagination {
        q.push_str(&format!(" LIMIT {} OFFSET {}", p.limit, p.offset));
    }

    (q, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_filters_sorts_and_pagination() {
        let params = query(&[
            ("filter[status]", "failed"),
            ("filter[started_at][gte]", "2026-01-01"),
            ("sort", "-started_at"),
            ("limit", "20"),
            ("offset", "40"),
        ]);
        let options =
            ListOptions::from_query(&params, &["status", "started_at"]).unwrap();

        assert_eq!(options.filters.len(), 2);
        assert_eq!(options.sorts.len(), 1);
        assert_eq!(options.sorts[0].direction, SortDirection::Desc);
        let p = options.pagination.unwrap();
        assert_eq!((p.limit, p.offset), (20, 40));
    }

    #[test]
    fn rejects_unknown_fields_and_operators() {
        let params = query(&[("filter[password]", "x")]);
        assert!(ListOptions::from_query(&params, &["status"]).is_err());

        let params = query(&[("filter[status][regex]", "x")]);
        assert!(ListOptions::from_query(&params, &["status"]).is_err());

        let params = query(&[("sort", "password")]);
        assert!(ListOptions::from_query(&params, &["status"]).is_err());
    }

    #[test]
    fn builds_sql_with_positional_params() {
        let options = ListOptions {
            filters: vec![
                FilterOption {
                    field: "status".into(),
                    operator: FilterOperator::Eq,
                    value: "failed".into(),
                },
                FilterOption {
                    field: "agent_id".into(),
                    operator: FilterOperator::Like,
                    value: "web-%".into(),
                },
            ],
            sorts: vec![SortOption {
                field: "started_at".into(),
                direction: SortDirection::Desc,
            }],
            pagination: Some(Pagination {
                limit: 10,
                offset: 0,
            }),
        };

        let (q, params) = append_list_options("SELECT * FROM jobs", &options);
        assert_eq!(
            q,
            "SELECT * FROM jobs WHERE `status` = ?1 AND `agent_id` LIKE ?2 \
             ORDER BY `started_at` DESC LIMIT 10 OFFSET 0"
        );
        assert_eq!(params, vec!["failed".to_string(), "web-%".to_string()]);
    }

    #[test]
    fn empty_options_leave_base_untouched() {
        let (q, params) = append_list_options("SELECT * FROM jobs", &ListOptions::default());
        assert_eq!(q, "SELECT * FROM jobs");
        assert!(params.is_empty());
    }
}
