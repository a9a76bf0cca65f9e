//! Facet predicates over structured chunk metadata.
//!
//! A predicate is a serializable expression tree evaluated against the
//! denormalized [`DocMeta`] of a chunk. The in-memory [`accepts`] evaluation
//! is the single source of truth; index-native pushdowns
//! ([`to_lance_sql`], the tantivy builder in `paperdb-text`) may only widen
//! the accepted set per clause, and the orchestrator re-applies the
//! post-filter, so pre- and post-filtering always agree.
//!
//! [`accepts`]: FacetPredicate::accepts
//! [`to_lance_sql`]: FacetPredicate::to_lance_sql

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::types::DocMeta;

/// Fields addressable by `eq`/`in` clauses.
///
/// - `category`: exact, case-sensitive match.
/// - `author`: case-insensitive substring over the joined author list
///   ("J. Smith" matches "Smith; J. Doe" entries) — the semantics the
///   corpus metadata was built around.
pub const FACET_FIELDS: &[&str] = &["author", "category"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FacetPredicate {
    Eq {
        field: String,
        value: String,
    },
    In {
        field: String,
        values: Vec<String>,
    },
    /// Inclusive range over the publication date. Open bounds allowed.
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    And {
        clauses: Vec<FacetPredicate>,
    },
    Or {
        clauses: Vec<FacetPredicate>,
    },
}

impl FacetPredicate {
    /// Reject predicates that reference fields no index knows about.
    /// Called once per request, before any retrieval work.
    pub fn validate(&self) -> Result<()> {
        match self {
            FacetPredicate::Eq { field, .. } | FacetPredicate::In { field, .. } => {
                if FACET_FIELDS.contains(&field.as_str()) {
                    Ok(())
                } else {
                    Err(SearchError::UnknownFacet(field.clone()))
                }
            }
            FacetPredicate::DateRange { .. } => Ok(()),
            FacetPredicate::And { clauses } | FacetPredicate::Or { clauses } => {
                clauses.iter().try_for_each(FacetPredicate::validate)
            }
        }
    }

    /// The accept/reject decision for one chunk. Assumes `validate` passed;
    /// an unknown field rejects rather than panics.
    pub fn accepts(&self, meta: &DocMeta) -> bool {
        match self {
            FacetPredicate::Eq { field, value } => field_matches(field, value, meta),
            FacetPredicate::In { field, values } => {
                values.iter().any(|v| field_matches(field, v, meta))
            }
            FacetPredicate::DateRange { from, to } => {
                from.is_none_or(|f| meta.published >= f)
                    && to.is_none_or(|t| meta.published <= t)
            }
            FacetPredicate::And { clauses } => clauses.iter().all(|c| c.accepts(meta)),
            FacetPredicate::Or { clauses } => clauses.iter().any(|c| c.accepts(meta)),
        }
    }

    /// Full SQL pushdown for the LanceDB `only_if` path. `LIKE` treats the
    /// author value's wildcards specially, which can only widen the match;
    /// the post-filter narrows it back.
    pub fn to_lance_sql(&self) -> String {
        match self {
            FacetPredicate::Eq { field, value } => match field.as_str() {
                "author" => format!(
                    "authors_lower LIKE '%{}%'",
                    sql_escape(&value.to_lowercase())
                ),
                _ => format!("category = '{}'", sql_escape(value)),
            },
            FacetPredicate::In { field, values } => {
                if values.is_empty() {
                    return "false".to_string();
                }
                let clauses: Vec<String> = values
                    .iter()
                    .map(|v| {
                        FacetPredicate::Eq {
                            field: field.clone(),
                            value: v.clone(),
                        }
                        .to_lance_sql()
                    })
                    .collect();
                format!("({})", clauses.join(" OR "))
            }
            FacetPredicate::DateRange { from, to } => {
                let mut parts = Vec::new();
                if let Some(f) = from {
                    parts.push(format!("published >= {}", date_to_epoch_ms(*f)));
                }
                if let Some(t) = to {
                    parts.push(format!("published <= {}", date_to_epoch_ms(*t)));
                }
                if parts.is_empty() {
                    "true".to_string()
                } else {
                    format!("({})", parts.join(" AND "))
                }
            }
            FacetPredicate::And { clauses } => join_sql(clauses, " AND ", "true"),
            FacetPredicate::Or { clauses } => join_sql(clauses, " OR ", "false"),
        }
    }
}

fn field_matches(field: &str, value: &str, meta: &DocMeta) -> bool {
    match field {
        "category" => meta.category == value,
        "author" => meta
            .authors_joined()
            .to_lowercase()
            .contains(&value.to_lowercase()),
        _ => false,
    }
}

fn join_sql(clauses: &[FacetPredicate], sep: &str, empty: &str) -> String {
    if clauses.is_empty() {
        return empty.to_string();
    }
    let parts: Vec<String> = clauses.iter().map(FacetPredicate::to_lance_sql).collect();
    format!("({})", parts.join(sep))
}

fn sql_escape(s: &str) -> String {
    s.replace('\'', "''")
}

/// Publication dates are persisted as the UTC-midnight epoch milliseconds
/// of the date, in both indexes.
pub fn date_to_epoch_ms(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

/// Inverse of [`date_to_epoch_ms`], for rebuilding metadata from stored
/// rows.
pub fn epoch_ms_to_date(ms: i64) -> Option<NaiveDate> {
    chrono::DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}
