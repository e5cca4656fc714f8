use crate::errors::ImpersonatorError;
use crate::logging::append_run_log;
use crate::replay::method::MethodInvocation;
use crate::store::{decode_invocations, document_digest, encode_invocations, InvocationStore};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS recordings (
    key TEXT PRIMARY KEY,
    document TEXT NOT NULL,
    invocation_count INTEGER NOT NULL,
    digest TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);";

/// All recordings of a storage root in a single SQLite database, one row per
/// key. Rows hold the same JSON document a `FileStore` would write.
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ImpersonatorError> {
        let path = path.as_ref().to_path_buf();
        append_run_log(
            "info",
            "store.sqlite.open",
            json!({ "path": path.display().to_string() }),
        );
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ImpersonatorError::Io(e.to_string()))?;
        }
        let conn = Connection::open(&path).map_err(db_err)?;
        configure_connection(&conn)?;
        Ok(Self {
            path,
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, ImpersonatorError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        configure_connection(&conn)?;
        Ok(Self {
            path: PathBuf::from(":memory:"),
            conn: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, ImpersonatorError> {
        self.conn
            .lock()
            .map_err(|_| ImpersonatorError::Storage("sqlite connection lock poisoned".to_string()))
    }

    fn document(&self, key: &str) -> Result<Option<String>, ImpersonatorError> {
        self.conn()?
            .query_row(
                "SELECT document FROM recordings WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(db_err)
    }
}

impl InvocationStore for SqliteStore {
    fn exists(&self, key: &str) -> bool {
        match self.try_exists(key) {
            Ok(found) => found,
            Err(error) => {
                append_run_log(
                    "error",
                    "store.sqlite.exists_failed",
                    json!({ "key": key, "error": error.to_string() }),
                );
                false
            }
        }
    }

    fn try_exists(&self, key: &str) -> Result<bool, ImpersonatorError> {
        Ok(self.document(key)?.is_some())
    }

    fn read(&self, key: &str) -> Result<Vec<MethodInvocation>, ImpersonatorError> {
        let document = self
            .document(key)?
            .ok_or_else(|| ImpersonatorError::Storage(format!("no recording stored for `{key}`")))?;
        decode_invocations(&document)
    }

    fn write(&self, key: &str, invocations: &[MethodInvocation]) -> Result<(), ImpersonatorError> {
        let document = encode_invocations(invocations)?;
        let digest = document_digest(&document);
        self.conn()?
            .execute(
                "INSERT INTO recordings (key, document, invocation_count, digest, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                    document = excluded.document,
                    invocation_count = excluded.invocation_count,
                    digest = excluded.digest,
                    updated_at = excluded.updated_at",
                params![
                    key,
                    document,
                    invocations.len() as i64,
                    digest,
                    system_time_unix()
                ],
            )
            .map_err(db_err)?;
        append_run_log(
            "debug",
            "store.sqlite.written",
            json!({ "key": key, "invocations": invocations.len(), "digest": digest }),
        );
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, ImpersonatorError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT key FROM recordings ORDER BY key")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    fn remove(&self, key: &str) -> Result<bool, ImpersonatorError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM recordings WHERE key = ?1", [key])
            .map_err(db_err)?;
        append_run_log(
            "info",
            "store.sqlite.removed",
            json!({ "key": key, "removed": removed }),
        );
        Ok(removed > 0)
    }
}

fn configure_connection(conn: &Connection) -> Result<(), ImpersonatorError> {
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(db_err)?;
    conn.execute_batch(SCHEMA).map_err(db_err)
}

fn db_err(error: rusqlite::Error) -> ImpersonatorError {
    ImpersonatorError::Storage(error.to_string())
}

fn system_time_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
