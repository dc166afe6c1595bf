//! Filtering, sorting, field selection and pagination for list endpoints.
//!
//! Query parameters are parsed against a per-resource column allow-list, so a
//! client can only ever name columns a resource exposes. Values are always bound,
//! never interpolated.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub const DEFAULT_PAGE: i64 = 1;
pub const DEFAULT_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Number,
    Integer,
    Text,
    Date,
    Timestamp,
    Uuid,
}

/// A filterable/sortable field: its API name and the SQL expression behind it.
#[derive(Debug)]
pub struct Column {
    pub field: &'static str,
    pub sql: &'static str,
    pub kind: ColumnKind,
}

#[derive(Debug)]
pub struct Resource {
    pub columns: &'static [Column],
    /// Newest-first ordering used when `sort` is absent.
    pub created_at: &'static str,
    /// Appended to every ORDER BY so pages are stable.
    pub id: &'static str,
}

impl Resource {
    fn column(&self, field: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.field == field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Gte,
    Gt,
    Lte,
    Lt,
}

impl Op {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "gte" => Some(Op::Gte),
            "gt" => Some(Op::Gt),
            "lte" => Some(Op::Lte),
            "lt" => Some(Op::Lt),
            _ => None,
        }
    }

    fn sql(self) -> &'static str {
        match self {
            Op::Eq => " = ",
            Op::Gte => " >= ",
            Op::Gt => " > ",
            Op::Lte => " <= ",
            Op::Lt => " < ",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FilterValue {
    Number(f64),
    Integer(i64),
    Text(String),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl FilterValue {
    fn parse(kind: ColumnKind, raw: &str) -> Option<Self> {
        match kind {
            ColumnKind::Number => raw.parse().ok().map(FilterValue::Number),
            ColumnKind::Integer => raw.parse().ok().map(FilterValue::Integer),
            ColumnKind::Text => Some(FilterValue::Text(raw.to_string())),
            ColumnKind::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .map(FilterValue::Date),
            ColumnKind::Timestamp => DateTime::parse_from_rfc3339(raw)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|dt| dt.and_utc())
                })
                .map(FilterValue::Timestamp),
            ColumnKind::Uuid => raw.parse().ok().map(FilterValue::Uuid),
        }
    }

    fn push_bind(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        match self {
            FilterValue::Number(v) => qb.push_bind(*v),
            FilterValue::Integer(v) => qb.push_bind(*v),
            FilterValue::Text(v) => qb.push_bind(v.clone()),
            FilterValue::Date(v) => qb.push_bind(*v),
            FilterValue::Timestamp(v) => qb.push_bind(*v),
            FilterValue::Uuid(v) => qb.push_bind(*v),
        };
    }
}

#[derive(Debug, Clone)]
struct Filter {
    column: &'static Column,
    op: Op,
    value: FilterValue,
}

#[derive(Debug, Clone, PartialEq)]
struct SortKey {
    sql: &'static str,
    descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Everything except the internal `__v`.
    Default,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct QueryFeatures {
    resource: &'static Resource,
    filters: Vec<Filter>,
    sort: Vec<SortKey>,
    pub projection: Projection,
    pub page: i64,
    pub limit: i64,
}

impl QueryFeatures {
    pub fn parse(params: &[(String, String)], resource: &'static Resource) -> AppResult<Self> {
        let mut filters = Vec::new();
        let mut sort = Vec::new();
        let mut projection = Projection::Default;
        let mut page = DEFAULT_PAGE;
        let mut limit = DEFAULT_LIMIT;

        for (key, raw) in params {
            match key.as_str() {
                "page" => page = positive_or(raw, DEFAULT_PAGE),
                "limit" => limit = positive_or(raw, DEFAULT_LIMIT),
                "sort" => sort = parse_sort(raw, resource)?,
                "fields" => projection = parse_projection(raw)?,
                _ => filters.push(parse_filter(key, raw, resource)?),
            }
        }

        if (page - 1).checked_mul(limit).is_none() {
            return Err(AppError::Validation(format!(
                "Page {page} is out of range for a limit of {limit}"
            )));
        }

        Ok(Self {
            resource,
            filters,
            sort,
            projection,
            page,
            limit,
        })
    }

    /// Rows skipped before the current page. `parse` rejects pages whose
    /// offset would not fit in an i64.
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Appends ` AND <col> <op> $n` for each filter. The query must already
    /// contain a WHERE clause.
    pub fn push_filters(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        for filter in &self.filters {
            qb.push(" AND ");
            qb.push(filter.column.sql);
            qb.push(filter.op.sql());
            filter.value.push_bind(qb);
        }
    }

    /// Appends ORDER BY, LIMIT and OFFSET.
    pub fn push_sort_and_page(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" ORDER BY ");
        if self.sort.is_empty() {
            qb.push(self.resource.created_at);
            qb.push(" DESC");
        } else {
            for (i, key) in self.sort.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                qb.push(key.sql);
                qb.push(if key.descending { " DESC" } else { " ASC" });
            }
        }
        qb.push(", ");
        qb.push(self.resource.id);
        qb.push(" LIMIT ");
        qb.push_bind(self.limit);
        qb.push(" OFFSET ");
        qb.push_bind(self.offset());
    }

    /// Serializes `items` and applies the field selection.
    pub fn project<T: Serialize>(&self, items: &[T]) -> AppResult<Vec<Value>> {
        items
            .iter()
            .map(|item| -> AppResult<Value> {
                let value = serde_json::to_value(item).map_err(anyhow::Error::from)?;
                Ok(self.project_value(value))
            })
            .collect()
    }

    fn project_value(&self, value: Value) -> Value {
        let mut map = match value {
            Value::Object(map) => map,
            other => return other,
        };
        match &self.projection {
            Projection::Default => {
                map.remove("__v");
            }
            Projection::Include(fields) => {
                map.retain(|k, _| k == "id" || fields.iter().any(|f| f == k));
            }
            Projection::Exclude(fields) => {
                map.retain(|k, _| !fields.iter().any(|f| f == k));
            }
        }
        Value::Object(map)
    }
}

fn positive_or(raw: &str, default: i64) -> i64 {
    raw.trim().parse::<i64>().ok().filter(|v| *v > 0).unwrap_or(default)
}

/// `price[gte]` becomes ("price", Gte); a bare key is equality.
fn split_key(key: &str) -> AppResult<(&str, Op)> {
    let Some(open) = key.find('[') else {
        return Ok((key, Op::Eq));
    };
    let op = key[open..]
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .and_then(Op::parse)
        .ok_or_else(|| AppError::Validation(format!("Invalid filter operator in {key}")))?;
    Ok((&key[..open], op))
}

fn parse_filter(key: &str, raw: &str, resource: &'static Resource) -> AppResult<Filter> {
    let (field, op) = split_key(key)?;
    let column = resource
        .column(field)
        .ok_or_else(|| AppError::Validation(format!("Invalid filter field: {field}")))?;
    let value = FilterValue::parse(column.kind, raw)
        .ok_or_else(|| AppError::Validation(format!("Invalid {field}: {raw}")))?;
    Ok(Filter { column, op, value })
}

fn parse_sort(raw: &str, resource: &'static Resource) -> AppResult<Vec<SortKey>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|part| {
            let (field, descending) = match part.strip_prefix('-') {
                Some(f) => (f, true),
                None => (part, false),
            };
            let column = resource
                .column(field)
                .ok_or_else(|| AppError::Validation(format!("Invalid sort field: {field}")))?;
            Ok(SortKey {
                sql: column.sql,
                descending,
            })
        })
        .collect()
}

fn parse_projection(raw: &str) -> AppResult<Projection> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return Ok(Projection::Default);
    }

    let excluded = parts.iter().filter(|p| p.starts_with('-')).count();
    if excluded == parts.len() {
        return Ok(Projection::Exclude(
            parts.iter().map(|p| p.trim_start_matches('-').to_string()).collect(),
        ));
    }
    if excluded > 0 {
        return Err(AppError::Validation(
            "Cannot mix field inclusion and exclusion".to_string(),
        ));
    }
    Ok(Projection::Include(parts.iter().map(|p| p.to_string()).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    static TEST_RESOURCE: Resource = Resource {
        columns: &[
            Column { field: "price", sql: "price", kind: ColumnKind::Number },
            Column { field: "name", sql: "name", kind: ColumnKind::Text },
            Column {
                field: "ratingsAverage",
                sql: "ratings_average",
                kind: ColumnKind::Number,
            },
        ],
        created_at: "created_at",
        id: "id",
    };

    fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn sql_for(features: &QueryFeatures) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM t WHERE TRUE");
        features.push_filters(&mut qb);
        features.push_sort_and_page(&mut qb);
        qb.sql().to_string()
    }

    #[test]
    fn defaults_to_newest_first_with_first_page() {
        let features = QueryFeatures::parse(&[], &TEST_RESOURCE).unwrap();
        assert_eq!(features.page, 1);
        assert_eq!(features.limit, 100);
        assert_eq!(features.offset(), 0);
        assert_eq!(
            sql_for(&features),
            "SELECT * FROM t WHERE TRUE ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"
        );
    }

    #[test]
    fn comparison_filters_become_bound_predicates() {
        let features = QueryFeatures::parse(
            &params(&[
                ("price[gte]", "100"),
                ("name", "Sunny Days Nursery"),
                ("page", "3"),
                ("limit", "10"),
            ]),
            &TEST_RESOURCE,
        )
        .unwrap();
        assert_eq!(features.offset(), 20);
        assert_eq!(
            sql_for(&features),
            "SELECT * FROM t WHERE TRUE AND price >= $1 AND name = $2 \
             ORDER BY created_at DESC, id LIMIT $3 OFFSET $4"
        );
    }

    #[test]
    fn sort_accepts_descending_prefix_and_keeps_tie_breaker() {
        let features =
            QueryFeatures::parse(&params(&[("sort", "-ratingsAverage,price")]), &TEST_RESOURCE)
                .unwrap();
        assert!(sql_for(&features)
            .contains("ORDER BY ratings_average DESC, price ASC, id LIMIT"));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(QueryFeatures::parse(&params(&[("password", "x")]), &TEST_RESOURCE).is_err());
        assert!(QueryFeatures::parse(&params(&[("sort", "password")]), &TEST_RESOURCE).is_err());
        assert!(QueryFeatures::parse(&params(&[("price[ne]", "1")]), &TEST_RESOURCE).is_err());
        assert!(QueryFeatures::parse(&params(&[("price", "cheap")]), &TEST_RESOURCE).is_err());
    }

    #[test]
    fn invalid_paging_falls_back_to_defaults() {
        let features =
            QueryFeatures::parse(&params(&[("page", "0"), ("limit", "lots")]), &TEST_RESOURCE)
                .unwrap();
        assert_eq!(features.page, 1);
        assert_eq!(features.limit, 100);
    }

    #[test]
    fn huge_page_is_rejected_instead_of_overflowing() {
        let err = QueryFeatures::parse(&params(&[("page", "9223372036854775807")]), &TEST_RESOURCE)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = QueryFeatures::parse(
            &params(&[("page", "3"), ("limit", "9223372036854775807")]),
            &TEST_RESOURCE,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let last = QueryFeatures::parse(
            &params(&[("page", "9223372036854775807"), ("limit", "1")]),
            &TEST_RESOURCE,
        )
        .unwrap();
        assert_eq!(last.offset(), i64::MAX - 1);
    }

    #[test]
    fn projection_modes() {
        let doc = json!({ "id": "1", "name": "n", "price": 10, "summary": "s", "__v": 0 });

        let default = QueryFeatures::parse(&[], &TEST_RESOURCE).unwrap();
        assert_eq!(
            default.project(&[doc.clone()]).unwrap()[0],
            json!({ "id": "1", "name": "n", "price": 10, "summary": "s" })
        );

        let include =
            QueryFeatures::parse(&params(&[("fields", "name,price")]), &TEST_RESOURCE).unwrap();
        assert_eq!(
            include.project(&[doc.clone()]).unwrap()[0],
            json!({ "id": "1", "name": "n", "price": 10 })
        );

        let exclude =
            QueryFeatures::parse(&params(&[("fields", "-summary")]), &TEST_RESOURCE).unwrap();
        assert_eq!(
            exclude.project(&[doc]).unwrap()[0],
            json!({ "id": "1", "name": "n", "price": 10, "__v": 0 })
        );

        assert!(
            QueryFeatures::parse(&params(&[("fields", "name,-price")]), &TEST_RESOURCE).is_err()
        );
    }
}
