//! `SQLite`-backed task store.
//!
//! One `tasks` table holds every record. Blocking rusqlite calls run on
//! tokio's blocking pool behind a mutex-guarded connection, so the async
//! [`TaskStore`] contract holds. The database file can be shared by the API
//! server and the `update-flags` / `run-updater` commands; a busy timeout
//! covers the short write contention between them.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use taskpulse_proto::task::{OwnerId, Task, TaskId};

use crate::filter::TaskFilter;
use crate::store::{StoreError, TaskStore};

/// How long a connection waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id          TEXT PRIMARY KEY,
    owner       TEXT NOT NULL,
    title       TEXT NOT NULL,
    description TEXT,
    deadline    TEXT,
    priority    TEXT NOT NULL,
    status      TEXT NOT NULL,
    tags        TEXT,
    is_urgent   INTEGER NOT NULL DEFAULT 0,
    is_overdue  INTEGER NOT NULL DEFAULT 0,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS tasks_owner ON tasks (owner);
";

const COLUMNS: &str = "id, owner, title, description, deadline, priority, status, tags, \
                       is_urgent, is_overdue, created_at, updated_at";

/// Task store persisted in a `SQLite` database.
#[derive(Clone)]
pub struct SqliteTaskStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTaskStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or
    /// the schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if `SQLite` cannot allocate the
    /// database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Unavailable(format!("cannot open in-memory db: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Unavailable(format!("schema setup failed: {e}")))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `op` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || op(&conn.lock()))
            .await
            .map_err(|e| StoreError::Unavailable(format!("storage worker failed: {e}")))?
    }
}

impl TaskStore for SqliteTaskStore {
    async fn get(&self, id: &TaskId) -> Result<Option<Task>, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()
            .map_err(read_failed)
        })
        .await
    }

    async fn put(&self, task: &Task) -> Result<(), StoreError> {
        let task = task.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO tasks ({COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    task.id.to_string(),
                    task.owner.to_string(),
                    task.title,
                    task.description,
                    task.deadline,
                    task.priority.as_str(),
                    task.status.as_str(),
                    task.tags,
                    task.is_urgent,
                    task.is_overdue,
                    task.created_at,
                    task.updated_at,
                ],
            )
            .map(|_| ())
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
        })
        .await
    }

    async fn put_flags(&self, task: &Task) -> Result<bool, StoreError> {
        let id = task.id.to_string();
        let (is_urgent, is_overdue) = (task.is_urgent, task.is_overdue);
        let (deadline, status) = (task.deadline, task.status.as_str());
        self.with_conn(move |conn| {
            // `IS` compares NULL deadlines as equal.
            conn.execute(
                "UPDATE tasks SET is_urgent = ?1, is_overdue = ?2 \
                 WHERE id = ?3 AND status = ?4 AND deadline IS ?5",
                params![is_urgent, is_overdue, id, status, deadline],
            )
            .map(|n| n > 0)
            .map_err(|e| StoreError::WriteFailed(e.to_string()))
        })
        .await
    }

    async fn remove(&self, id: &TaskId) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])
                .map(|n| n > 0)
                .map_err(|e| StoreError::WriteFailed(e.to_string()))
        })
        .await
    }

    async fn remove_owned_by(&self, owner: &OwnerId) -> Result<usize, StoreError> {
        let owner = owner.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM tasks WHERE owner = ?1", params![owner])
                .map_err(|e| StoreError::WriteFailed(e.to_string()))
        })
        .await
    }

    async fn scan_page(&self, after: Option<TaskId>, limit: usize) -> Result<Vec<Task>, StoreError> {
        // Hyphenated lower-case UUID text sorts in the same order as the
        // UUID bytes, so text keyset pagination matches `TaskId` ordering.
        let after = after.map(|id| id.to_string()).unwrap_or_default();
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {COLUMNS} FROM tasks WHERE id > ?1 ORDER BY id LIMIT ?2"
                ))
                .map_err(read_failed)?;
            let rows = stmt
                .query_map(params![after, limit], row_to_task)
                .map_err(read_failed)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(read_failed)
        })
        .await
    }

    async fn query(&self, owner: &OwnerId, filter: &TaskFilter) -> Result<Vec<Task>, StoreError> {
        let (sql, args) = build_query(owner, filter);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql).map_err(read_failed)?;
            let rows = stmt
                .query_map(params_from_iter(args.iter()), row_to_task)
                .map_err(read_failed)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(read_failed)
        })
        .await
    }
}

/// Builds the owner-scoped listing query and its positional arguments.
fn build_query(owner: &OwnerId, filter: &TaskFilter) -> (String, Vec<String>) {
    let mut sql = format!("SELECT {COLUMNS} FROM tasks WHERE owner = ?");
    let mut args = vec![owner.to_string()];

    match (filter.urgent, filter.overdue) {
        (true, true) => sql.push_str(" AND (is_urgent = 1 OR is_overdue = 1)"),
        (true, false) => sql.push_str(" AND is_urgent = 1"),
        (false, true) => sql.push_str(" AND is_overdue = 1"),
        (false, false) => {}
    }

    if !filter.priorities.is_empty() {
        sql.push_str(" AND priority IN (");
        sql.push_str(&placeholders(filter.priorities.len()));
        sql.push(')');
        args.extend(filter.priorities.iter().map(|p| p.as_str().to_string()));
    }
    if !filter.statuses.is_empty() {
        sql.push_str(" AND status IN (");
        sql.push_str(&placeholders(filter.statuses.len()));
        sql.push(')');
        args.extend(filter.statuses.iter().map(|s| s.as_str().to_string()));
    }

    sql.push_str(" ORDER BY id");
    (sql, args)
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn read_failed(e: rusqlite::Error) -> StoreError {
    StoreError::ReadFailed(e.to_string())
}

/// Parses a text column through `FromStr`, reporting failures as a
/// conversion error on that column.
fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_task(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: parse_column(row, 0)?,
        owner: parse_column(row, 1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        deadline: row.get(4)?,
        priority: parse_column(row, 5)?,
        status: parse_column(row, 6)?,
        tags: row.get(7)?,
        is_urgent: row.get(8)?,
        is_overdue: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
