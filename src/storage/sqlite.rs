//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the StorageGateway
//! trait. The database file is the logical database; `html` and `pages` are
//! its tables.

use crate::extract::Metadata;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageGateway, StorageResult};
use crate::storage::{HtmlRecord, InsertResult, PageRecord, Record, Table};
use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite storage backend
///
/// Holds one long-lived connection. Every operation runs on the blocking
/// thread pool and holds the connection lock only for the duration of that
/// operation.
#[derive(Clone)]
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Opens or creates the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteGateway)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if path.exists() {
            tracing::info!("Database already existed: {}", path.display());
        } else {
            tracing::info!("Creating database: {}", path.display());
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(conn))
    }

    /// Wraps an already-open connection
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Runs `f` against the connection on the blocking thread pool
    async fn with_conn<T, F>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StorageError::Unavailable("connection lock poisoned".to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StorageError::Unavailable(format!("storage task failed: {}", e)))?
    }
}

/// The non-key column of a table
fn value_column(table: Table) -> &'static str {
    match table {
        Table::Html => "contents",
        Table::Page => "metadata",
    }
}

fn row_exists(conn: &Connection, table: Table, id: &str) -> StorageResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            &format!("SELECT 1 FROM {} WHERE id = ?1", table.name()),
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

fn get_row(conn: &Connection, table: Table, key: &str) -> StorageResult<Option<Record>> {
    let row: Option<(String, String)> = conn
        .query_row(
            &format!(
                "SELECT id, {} FROM {} WHERE id = ?1",
                value_column(table),
                table.name()
            ),
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let Some((id, value)) = row else {
        return Ok(None);
    };

    let record = match table {
        Table::Html => Record::Html(HtmlRecord { id, contents: value }),
        Table::Page => {
            // An unreadable row means the store cannot answer for this key
            let metadata: Metadata = serde_json::from_str(&value).map_err(|e| {
                StorageError::Unavailable(format!("unreadable {} row `{}`: {}", table, id, e))
            })?;
            Record::Page(PageRecord { id, metadata })
        }
    };

    Ok(Some(record))
}

fn insert_row(
    conn: &mut Connection,
    table: Table,
    record: &Record,
    overwrite: bool,
) -> StorageResult<InsertResult> {
    let id = record.id();
    let value = match record {
        Record::Html(html) => html.contents.clone(),
        Record::Page(page) => serde_json::to_string(&page.metadata)?,
    };
    let column = value_column(table);

    if overwrite {
        // Existence check and upsert share a transaction so the replaced/inserted
        // report matches what the upsert did.
        let tx = conn.transaction()?;
        let existed = row_exists(&tx, table, id)?;
        tx.execute(
            &format!(
                "INSERT INTO {table} (id, {column}) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET {column} = excluded.{column}",
                table = table.name(),
                column = column
            ),
            params![id, value],
        )?;
        tx.commit()?;

        return Ok(if existed {
            InsertResult::replaced()
        } else {
            InsertResult::inserted()
        });
    }

    let result = conn.execute(
        &format!(
            "INSERT INTO {} (id, {}) VALUES (?1, ?2)",
            table.name(),
            column
        ),
        params![id, value],
    );

    match result {
        Ok(_) => Ok(InsertResult::inserted()),
        Err(rusqlite::Error::SqliteFailure(err, message))
            if err.code == ErrorCode::ConstraintViolation =>
        {
            let detail = message.unwrap_or_else(|| err.to_string());
            Ok(InsertResult::rejected(format!(
                "Duplicate primary key `{}` in table `{}`: {}",
                id, table, detail
            )))
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl StorageGateway for SqliteGateway {
    async fn ensure_schema(&self) -> StorageResult<()> {
        self.with_conn(|conn| {
            initialize_schema(conn).map_err(|e| StorageError::Schema(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn get(&self, table: Table, key: &str) -> StorageResult<Option<Record>> {
        let key = key.to_string();
        self.with_conn(move |conn| get_row(conn, table, &key)).await
    }

    async fn insert(
        &self,
        table: Table,
        record: Record,
        overwrite: bool,
    ) -> StorageResult<InsertResult> {
        if record.table() != table {
            return Err(StorageError::TableMismatch {
                table,
                record: record.table(),
            });
        }

        self.with_conn(move |conn| insert_row(conn, table, &record, overwrite))
            .await
    }

    async fn count(&self, table: Table) -> StorageResult<u64> {
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM {}", table.name()),
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn gateway() -> SqliteGateway {
        let gateway = SqliteGateway::open_in_memory().unwrap();
        gateway.ensure_schema().await.unwrap();
        gateway
    }

    fn metadata_with_title(title: &str) -> Metadata {
        Metadata {
            titles: vec![title.to_string()],
            ..Metadata::default()
        }
    }

    #[tokio::test]
    async fn test_get_missing_key_is_none() {
        let gateway = gateway().await;
        let record = gateway.get(Table::Html, "http://example.com/").await.unwrap();
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn test_insert_and_get_html() {
        let gateway = gateway().await;
        let result = gateway
            .insert(
                Table::Html,
                HtmlRecord::new("http://example.com/", "<html>A</html>").into(),
                false,
            )
            .await
            .unwrap();
        assert_eq!(result, InsertResult::inserted());

        let record = gateway
            .get(Table::Html, "http://example.com/")
            .await
            .unwrap()
            .and_then(Record::into_html)
            .unwrap();
        assert_eq!(record.contents, "<html>A</html>");
    }

    #[tokio::test]
    async fn test_insert_and_get_page() {
        let gateway = gateway().await;
        gateway
            .insert(
                Table::Page,
                PageRecord::new("http://example.com/", metadata_with_title("A")).into(),
                false,
            )
            .await
            .unwrap();

        let record = gateway
            .get(Table::Page, "http://example.com/")
            .await
            .unwrap()
            .and_then(Record::into_page)
            .unwrap();
        assert_eq!(record.metadata.titles, vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicate_insert_reports_conflict() {
        let gateway = gateway().await;
        let url = "http://example.com/";

        gateway
            .insert(Table::Html, HtmlRecord::new(url, "first").into(), false)
            .await
            .unwrap();
        let result = gateway
            .insert(Table::Html, HtmlRecord::new(url, "second").into(), false)
            .await
            .unwrap();

        assert!(!result.is_ok());
        assert_eq!(result.errors, 1);
        assert!(result.first_error.unwrap().contains(url));

        // The original row is untouched
        let stored = gateway.get(Table::Html, url).await.unwrap().unwrap();
        assert_eq!(stored, Record::Html(HtmlRecord::new(url, "first")));
    }

    #[tokio::test]
    async fn test_duplicate_page_insert_reports_conflict() {
        let gateway = gateway().await;
        let url = "http://example.com/";

        gateway
            .insert(Table::Page, PageRecord::new(url, metadata_with_title("first")).into(), false)
            .await
            .unwrap();
        let result = gateway
            .insert(Table::Page, PageRecord::new(url, metadata_with_title("second")).into(), false)
            .await
            .unwrap();

        assert_eq!(result.errors, 1);
        assert!(result.first_error.unwrap().contains("pages"));

        let stored = gateway
            .get(Table::Page, url)
            .await
            .unwrap()
            .and_then(Record::into_page)
            .unwrap();
        assert_eq!(stored.metadata.titles, vec!["first".to_string()]);
    }

    #[tokio::test]
    async fn test_unreadable_page_row_is_unavailable() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO pages (id, metadata) VALUES (?1, ?2)",
            params!["http://example.com/", "not json"],
        )
        .unwrap();
        let gateway = SqliteGateway::from_connection(conn);

        let result = gateway.get(Table::Page, "http://example.com/").await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_overwrite_replaces_row() {
        let gateway = gateway().await;
        let url = "http://example.com/";

        gateway
            .insert(Table::Page, PageRecord::new(url, metadata_with_title("old")).into(), true)
            .await
            .unwrap();
        let result = gateway
            .insert(Table::Page, PageRecord::new(url, metadata_with_title("new")).into(), true)
            .await
            .unwrap();

        assert_eq!(result, InsertResult::replaced());
        assert_eq!(gateway.count(Table::Page).await.unwrap(), 1);

        let stored = gateway
            .get(Table::Page, url)
            .await
            .unwrap()
            .and_then(Record::into_page)
            .unwrap();
        assert_eq!(stored.metadata.titles, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_keys_are_used_verbatim() {
        let gateway = gateway().await;

        gateway
            .insert(Table::Html, HtmlRecord::new("http://example.com/a", "x").into(), false)
            .await
            .unwrap();
        let result = gateway
            .insert(Table::Html, HtmlRecord::new("http://example.com/a/", "y").into(), false)
            .await
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(gateway.count(Table::Html).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_table_mismatch_is_rejected() {
        let gateway = gateway().await;
        let result = gateway
            .insert(Table::Page, HtmlRecord::new("http://example.com/", "x").into(), false)
            .await;

        assert!(matches!(
            result,
            Err(StorageError::TableMismatch {
                table: Table::Page,
                record: Table::Html
            })
        ));
        assert_eq!(gateway.count(Table::Page).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_without_schema_is_unavailable() {
        let gateway = SqliteGateway::open_in_memory().unwrap();
        let result = gateway.get(Table::Html, "http://example.com/").await;
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_ensure_schema_twice() {
        let gateway = gateway().await;
        assert!(gateway.ensure_schema().await.is_ok());
        assert_eq!(gateway.count(Table::Html).await.unwrap(), 0);
        assert_eq!(gateway.count(Table::Page).await.unwrap(), 0);
    }
}
