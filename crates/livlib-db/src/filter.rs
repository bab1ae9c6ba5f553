//! SQL WHERE clause generation for [`SearchFilters`].
//!
//! Vector search and lexical search share the same visibility scope and
//! attribute filters; this builder turns a filter into a parameterized SQL
//! fragment over the `fragment f` alias.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;
use uuid::Uuid;

use livlib_core::SearchFilters;

/// Type-safe parameter binding for SQL queries.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Uuid(Uuid),
    UuidArray(Vec<Uuid>),
    Timestamp(DateTime<Utc>),
    StringArray(Vec<String>),
}

impl QueryParam {
    /// Bind this parameter to a query.
    pub fn bind<'q>(
        &self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        match self {
            QueryParam::Uuid(id) => query.bind(*id),
            QueryParam::UuidArray(ids) => query.bind(ids.clone()),
            QueryParam::Timestamp(ts) => query.bind(*ts),
            QueryParam::StringArray(arr) => query.bind(arr.clone()),
        }
    }
}

/// Generates the WHERE fragment for a [`SearchFilters`] value.
pub struct FragmentFilterQueryBuilder<'a> {
    filters: &'a SearchFilters,
    param_offset: usize,
}

impl<'a> FragmentFilterQueryBuilder<'a> {
    /// `param_offset` is the number of parameters already in the query.
    pub fn new(filters: &'a SearchFilters, param_offset: usize) -> Self {
        Self {
            filters,
            param_offset,
        }
    }

    /// Build the SQL fragment and the parameters in placeholder order.
    ///
    /// The fragment is never empty; with no conditions it still carries the
    /// visibility scope.
    pub fn build(&self) -> (String, Vec<QueryParam>) {
        let mut clauses = Vec::new();
        let mut params = Vec::new();
        let mut param_idx = self.param_offset;

        match self.filters.viewer_id {
            Some(viewer) if self.filters.owner_only => {
                param_idx += 1;
                clauses.push(format!("f.user_id = ${}", param_idx));
                params.push(QueryParam::Uuid(viewer));
            }
            Some(viewer) => {
                param_idx += 1;
                clauses.push(format!(
                    "(f.user_id = ${} OR f.visibility = 'PUBLIC')",
                    param_idx
                ));
                params.push(QueryParam::Uuid(viewer));
            }
            None => clauses.push("f.visibility = 'PUBLIC'".to_string()),
        }

        // Array overlap, case-insensitive
        for (column, values) in [
            ("tags", &self.filters.tags),
            ("themes", &self.filters.themes),
            ("emotions", &self.filters.emotions),
        ] {
            if values.is_empty() {
                continue;
            }
            param_idx += 1;
            clauses.push(format!(
                "EXISTS (SELECT 1 FROM unnest(f.{}) AS v WHERE lower(v) = ANY(${}::text[]))",
                column, param_idx
            ));
            params.push(QueryParam::StringArray(
                values.iter().map(|v| v.to_lowercase()).collect(),
            ));
        }

        if let Some(after) = self.filters.created_after {
            param_idx += 1;
            clauses.push(format!("f.created_at_utc >= ${}", param_idx));
            params.push(QueryParam::Timestamp(after));
        }

        if let Some(before) = self.filters.created_before {
            param_idx += 1;
            clauses.push(format!("f.created_at_utc <= ${}", param_idx));
            params.push(QueryParam::Timestamp(before));
        }

        if !self.filters.exclude_ids.is_empty() {
            param_idx += 1;
            clauses.push(format!("f.id <> ALL(${}::uuid[])", param_idx));
            params.push(QueryParam::UuidArray(self.filters.exclude_ids.clone()));
        }

        (clauses.join(" AND "), params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_scope_is_public_only() {
        let filters = SearchFilters::default();
        let (sql, params) = FragmentFilterQueryBuilder::new(&filters, 0).build();
        assert_eq!(sql, "f.visibility = 'PUBLIC'");
        assert!(params.is_empty());
    }

    #[test]
    fn test_viewer_scope_uses_offset() {
        let viewer = Uuid::new_v4();
        let filters = SearchFilters::for_viewer(viewer);
        let (sql, params) = FragmentFilterQueryBuilder::new(&filters, 2).build();
        assert_eq!(sql, "(f.user_id = $3 OR f.visibility = 'PUBLIC')");
        assert_eq!(params, vec![QueryParam::Uuid(viewer)]);
    }

    #[test]
    fn test_owner_only_scope() {
        let viewer = Uuid::new_v4();
        let filters = SearchFilters {
            viewer_id: Some(viewer),
            owner_only: true,
            ..Default::default()
        };
        let (sql, _) = FragmentFilterQueryBuilder::new(&filters, 0).build();
        assert_eq!(sql, "f.user_id = $1");
    }

    #[test]
    fn test_attribute_filters_lowercase_values() {
        let viewer = Uuid::new_v4();
        let excluded = Uuid::new_v4();
        let filters = SearchFilters {
            themes: vec!["Family".to_string()],
            exclude_ids: vec![excluded],
            ..SearchFilters::for_viewer(viewer)
        };
        let (sql, params) = FragmentFilterQueryBuilder::new(&filters, 1).build();
        assert!(sql.contains("unnest(f.themes)"));
        assert!(sql.contains("$3::text[]"));
        assert!(sql.contains("f.id <> ALL($4::uuid[])"));
        assert_eq!(params.len(), 3);
        assert_eq!(
            params[1],
            QueryParam::StringArray(vec!["family".to_string()])
        );
        assert_eq!(params[2], QueryParam::UuidArray(vec![excluded]));
    }

    #[test]
    fn test_date_range() {
        let now = Utc::now();
        let filters = SearchFilters {
            created_after: Some(now),
            created_before: Some(now),
            ..Default::default()
        };
        let (sql, params) = FragmentFilterQueryBuilder::new(&filters, 0).build();
        assert!(sql.contains("f.created_at_utc >= $1"));
        assert!(sql.contains("f.created_at_utc <= $2"));
        assert_eq!(params.len(), 2);
    }
}
