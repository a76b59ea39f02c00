//! Document query model.
//!
//! Tours are persisted as JSON documents, so queries are expressed against
//! documents rather than typed columns: a filter document, a multi-key sort
//! order, a projection and a pagination window, assembled into an unexecuted
//! `DocQuery` handle. The executor applies a handle to a loaded collection;
//! the lifecycle wrapper fires entity hooks around every operation.

pub mod executor;
pub mod lifecycle;

pub use lifecycle::{Collection, LifecycleHooks, WriteOp};

use contracts::domain::common::ValidationError;
use serde_json::Value;
use thiserror::Error;

/// A stored document: a JSON object with camelCase fields.
pub type Document = serde_json::Map<String, Value>;

/// Identifier field, always retained by projections.
pub const ID_FIELD: &str = "id";

/// Storage version counter, hidden from clients by the default projection.
pub const VERSION_FIELD: &str = "__v";

/// Errors surfaced by collection operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

/// One sort term; terms apply in left-to-right priority.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub dir: SortDir,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            dir: SortDir::Desc,
        }
    }
}

/// Which fields of a document are returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Full document minus the internal version field.
    DefaultHidden,
    /// Inclusion projection: the listed fields plus the identifier.
    Include(Vec<String>),
}

/// An unexecuted, progressively-narrowed query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DocQuery {
    pub filter: Document,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl DocQuery {
    pub fn new() -> Self {
        Self {
            filter: Document::new(),
            sort: Vec::new(),
            projection: Projection::DefaultHidden,
            skip: 0,
            limit: None,
        }
    }
}

impl Default for DocQuery {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregate accumulator over one group of documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    Count,
    Sum(String),
    Avg(String),
    Min(String),
    Max(String),
}

/// One aggregate pipeline stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Document),
    Group {
        by: String,
        fields: Vec<(String, Accumulator)>,
    },
    Sort(Vec<SortKey>),
}

/// Coerce a JSON value into a document, losing anything that is not an
/// object. Convenience for building filters with `serde_json::json!`.
pub fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}
