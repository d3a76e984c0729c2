//! Storage module for persisting crawl data
//!
//! This module handles all database operations for the pipeline:
//! - Provisioning the database and its two tables (`html` and `pages`)
//! - Looking up records by URL
//! - Inserting records under an explicit overwrite policy
//!
//! Both tables are keyed by the source URL, used verbatim.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteGateway;
pub use traits::{StorageError, StorageGateway, StorageResult};

use crate::extract::Metadata;
use std::fmt;
use std::path::Path;

/// Opens (creating if necessary) a SQLite-backed storage gateway
///
/// The schema is not provisioned here; call
/// [`StorageGateway::ensure_schema`] once before processing.
pub fn open_storage(path: &Path) -> StorageResult<SqliteGateway> {
    SqliteGateway::open(path)
}

/// The tables managed by the storage gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Raw document bodies
    Html,
    /// Extracted page metadata
    Page,
}

impl Table {
    /// Every table in the schema, in provisioning order
    pub const ALL: [Table; 2] = [Table::Html, Table::Page];

    /// The table name in the database
    pub fn name(&self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Page => "pages",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw body of a fetched document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HtmlRecord {
    pub id: String,
    pub contents: String,
}

impl HtmlRecord {
    pub fn new(id: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            contents: contents.into(),
        }
    }
}

/// Metadata extracted from a crawled page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRecord {
    pub id: String,
    pub metadata: Metadata,
}

impl PageRecord {
    pub fn new(id: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            id: id.into(),
            metadata,
        }
    }
}

/// A record stored in one of the two tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Html(HtmlRecord),
    Page(PageRecord),
}

impl Record {
    /// The primary key of the record
    pub fn id(&self) -> &str {
        match self {
            Self::Html(record) => &record.id,
            Self::Page(record) => &record.id,
        }
    }

    /// The table this record belongs to
    pub fn table(&self) -> Table {
        match self {
            Self::Html(_) => Table::Html,
            Self::Page(_) => Table::Page,
        }
    }

    pub fn into_html(self) -> Option<HtmlRecord> {
        match self {
            Self::Html(record) => Some(record),
            Self::Page(_) => None,
        }
    }

    pub fn into_page(self) -> Option<PageRecord> {
        match self {
            Self::Page(record) => Some(record),
            Self::Html(_) => None,
        }
    }
}

impl From<HtmlRecord> for Record {
    fn from(record: HtmlRecord) -> Self {
        Self::Html(record)
    }
}

impl From<PageRecord> for Record {
    fn from(record: PageRecord) -> Self {
        Self::Page(record)
    }
}

/// Outcome of an insert
///
/// Conflicts are reported here rather than as an `Err`, so the caller decides
/// whether a non-zero error count is fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertResult {
    /// Number of new rows written
    pub inserted: u64,

    /// Number of existing rows replaced (overwrite policy only)
    pub replaced: u64,

    /// Number of rows rejected
    pub errors: u64,

    /// Description of the first rejected row
    pub first_error: Option<String>,
}

impl InsertResult {
    pub fn inserted() -> Self {
        Self {
            inserted: 1,
            ..Self::default()
        }
    }

    pub fn replaced() -> Self {
        Self {
            replaced: 1,
            ..Self::default()
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            errors: 1,
            first_error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Returns true if no row was rejected
    pub fn is_ok(&self) -> bool {
        self.errors == 0
    }
}
