//! SQLite backed [`Database`].

use super::{Database, DatabaseError, Row, SqlValue};
use crate::config::SqlConfig;
use parking_lot::Mutex;
use rusqlite::types::{ToSqlOutput, Value};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::path::{Path, PathBuf};

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Sql(Box::new(err))
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Null => Value::Null,
            Self::Integer(value) => Value::Integer(*value),
            Self::Real(value) => Value::Real(*value),
            Self::Text(value) => Value::Text(value.clone()),
            Self::Blob(value) => Value::Blob(value.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Integer(value) => Self::Integer(value),
            Value::Real(value) => Self::Real(value),
            Value::Text(value) => Self::Text(value),
            Value::Blob(value) => Self::Blob(value),
        }
    }
}

/// A single SQLite connection guarded by a mutex.
pub struct SqliteDatabase {
    name: String,
    conn: Mutex<Option<Connection>>,
}

impl SqliteDatabase {
    /// Opens (creating if needed) the database file at `path`.
    pub fn open(name: impl Into<String>, path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| DatabaseError::Open(format!("Failed to create data directory: {}", e)))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        Ok(Self::from_connection(name, conn))
    }

    /// Opens the database called `database_name` in the directory configured by `sql`.
    pub fn open_for(database_name: &str, sql: &SqlConfig) -> Result<Self, DatabaseError> {
        let path = Self::path_for(database_name, sql);
        tracing::debug!(database = database_name, path = %path.display(), "Opening SQLite database");
        Self::open(database_name, &path)
    }

    /// Creates an in-memory database (for testing)
    pub fn in_memory(name: impl Into<String>) -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::from_connection(name, conn))
    }

    pub fn path_for(database_name: &str, sql: &SqlConfig) -> PathBuf {
        sql.directory
            .join(format!("{}{}.db", sql.db_prefix, database_name))
    }

    fn from_connection(name: impl Into<String>, conn: Connection) -> Self {
        Self {
            name: name.into(),
            conn: Mutex::new(Some(conn)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, DatabaseError>,
    ) -> Result<T, DatabaseError> {
        let guard = self.conn.lock();
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(DatabaseError::Closed(self.name.clone())),
        }
    }
}

impl Database for SqliteDatabase {
    fn execute_update(&self, sql: &str, params: &[SqlValue]) -> Result<usize, DatabaseError> {
        self.with_connection(|conn| Ok(conn.execute(sql, params_from_iter(params.iter()))?))
    }

    fn first_row(&self, sql: &str, params: &[SqlValue]) -> Result<Option<Row>, DatabaseError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let columns: Vec<String> = stmt.column_names().into_iter().map(str::to_owned).collect();

            let mut rows = stmt.query(params_from_iter(params.iter()))?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };

            let values = (0..columns.len())
                .map(|index| row.get::<_, Value>(index).map(SqlValue::from))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(Row::new(columns, values)))
        })
    }

    fn close(&self) {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            if let Err((_, err)) = conn.close() {
                tracing::warn!(database = %self.name, "Failed to close database cleanly: {}", err);
            }
        }
    }

    fn is_closed(&self) -> bool {
        self.conn.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_and_query() {
        let db = SqliteDatabase::in_memory("test").unwrap();
        db.execute_update("CREATE TABLE homes (player TEXT PRIMARY KEY, x INTEGER, name TEXT)", &[])
            .unwrap();

        let inserted = db
            .execute_update(
                "INSERT INTO homes (player, x, name) VALUES (?, ?, ?)",
                &["abc".into(), 12_i64.into(), SqlValue::Null],
            )
            .unwrap();
        assert_eq!(inserted, 1);

        let row = db
            .first_row("SELECT x, name FROM homes WHERE player = ?", &["abc".into()])
            .unwrap()
            .unwrap();
        assert_eq!(row.get_i64("x"), Some(12));
        assert!(row.get("name").unwrap().is_null());

        assert!(db
            .first_row("SELECT x FROM homes WHERE player = ?", &["nobody".into()])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_closed_database_rejects_work() {
        let db = SqliteDatabase::in_memory("test").unwrap();
        db.close();
        db.close();

        assert!(db.is_closed());
        assert!(matches!(db.execute_update("SELECT 1", &[]), Err(DatabaseError::Closed(_))));
    }

    #[test]
    fn test_open_for_uses_prefix_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sql = SqlConfig {
            directory: dir.path().join("sql"),
            db_prefix: "mv_".to_owned(),
        };

        let db = SqliteDatabase::open_for("homes", &sql).unwrap();
        db.execute_update("CREATE TABLE t (v INTEGER)", &[]).unwrap();
        db.close();

        assert!(dir.path().join("sql").join("mv_homes.db").is_file());
    }
}
