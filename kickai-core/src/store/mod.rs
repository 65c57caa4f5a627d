//! Document store port: abstract CRUD + filtered query (§4.A).
//!
//! Collections are team-scoped by name (`kickai_{team_id}_{entity}`) except
//! `kickai_teams`, which is global. Documents are open-schema JSON maps;
//! [`Store::update_document`] implementations must preserve unknown keys.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SqliteStore, create_sqlite_store};

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by a [`Store`] implementation. Never swallowed (§4.A).
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store backend could not be reached or is overloaded.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The requested document or collection does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A uniqueness or structural constraint would be violated.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// A stored document: a server-assigned id plus an open-schema JSON map.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
}

/// Comparison operator for a [`Filter`] predicate. `Range`/`In` carry their
/// own operands; `Eq`/`Lt`/`Gt` compare against [`Filter::value`].
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    Eq,
    Lt,
    Gt,
    /// Inclusive range `[low, high]`.
    Range(Value, Value),
    /// Membership in a fixed set of values.
    In(Vec<Value>),
}

/// A single `(field, operator, value)` predicate. [`Store::query_documents`]
/// conjoins (`AND`s) all filters passed in one call.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    /// Operand for `Eq`/`Lt`/`Gt`; ignored by `Range`/`In`.
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value,
        }
    }

    pub fn lt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lt,
            value,
        }
    }

    pub fn gt(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gt,
            value,
        }
    }

    pub fn range(field: impl Into<String>, low: Value, high: Value) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Range(low, high),
            value: Value::Null,
        }
    }

    pub fn in_set(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::In(values),
            value: Value::Null,
        }
    }
}

/// Document store port. All methods are suspension points (§5).
#[async_trait]
pub trait Store: Send + Sync {
    /// Create a document. If `id` is `None`, the store assigns one (UUID v7).
    /// Returns the effective id.
    async fn create_document(
        &self,
        collection: &str,
        data: Value,
        id: Option<String>,
    ) -> Result<String, StoreError>;

    async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// Merge `patch`'s keys into the existing document, preserving any key
    /// not present in `patch`. Fails with `NotFound` if the document is absent.
    async fn update_document(
        &self,
        collection: &str,
        id: &str,
        patch: Value,
    ) -> Result<(), StoreError>;

    /// Returns `true` if a document was deleted, `false` if it was absent.
    async fn delete_document(&self, collection: &str, id: &str) -> Result<bool, StoreError>;

    /// Query a collection. Filters conjoin (AND). With no `order_by` support
    /// in this port, implementations return matches in storage order; callers
    /// must not assume a particular order unless documented otherwise.
    async fn query_documents(
        &self,
        collection: &str,
        filters: &[Filter],
        limit: Option<usize>,
    ) -> Result<Vec<Document>, StoreError>;

    async fn list_collections(&self) -> Result<Vec<String>, StoreError>;
}

/// Build the team-scoped collection name `kickai_{team_id}_{entity}`.
pub fn team_collection(team_id: &str, entity: &str) -> String {
    format!("kickai_{team_id}_{entity}")
}

/// The single global collection name for team records.
pub const TEAMS_COLLECTION: &str = "kickai_teams";

/// Evaluate one filter against a document's JSON value at `field`.
fn matches_filter(doc: &Value, filter: &Filter) -> bool {
    let Some(actual) = doc.get(&filter.field) else {
        return false;
    };
    match &filter.op {
        FilterOp::Eq => actual == &filter.value,
        FilterOp::Lt => compare_numeric(actual, &filter.value, |a, b| a < b),
        FilterOp::Gt => compare_numeric(actual, &filter.value, |a, b| a > b),
        FilterOp::Range(low, high) => {
            compare_numeric(actual, low, |a, b| a >= b) && compare_numeric(actual, high, |a, b| a <= b)
        }
        FilterOp::In(values) => values.contains(actual),
    }
}

/// Compare two JSON scalars numerically if both are numbers, else
/// lexicographically if both are strings. Mismatched/unsupported types
/// never match (fail closed rather than silently misorder).
fn compare_numeric(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return cmp(a, b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return match a.cmp(b) {
            std::cmp::Ordering::Less => cmp(0.0, 1.0),
            std::cmp::Ordering::Greater => cmp(1.0, 0.0),
            std::cmp::Ordering::Equal => cmp(0.0, 0.0),
        };
    }
    false
}

/// Apply the conjunction of `filters` to `docs`, then truncate to `limit`.
pub(crate) fn apply_filters(mut docs: Vec<Document>, filters: &[Filter], limit: Option<usize>) -> Vec<Document> {
    docs.retain(|d| filters.iter().all(|f| matches_filter(&d.data, f)));
    if let Some(limit) = limit {
        docs.truncate(limit);
    }
    docs
}
