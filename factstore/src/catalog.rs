use crate::config::StoreConfig;
use crate::errors::{Result, StorageError};
use crate::models::TaskLog;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};

/// Local bookkeeping: task logs per run and checkpoints per completed window.
pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        if let Some(parent) = config.catalog_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.catalog_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Ok(Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::SyncError("catalog connection poisoned".into()))
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS task_logs (
                task_id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_name TEXT,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT,
                details TEXT
            );
            CREATE TABLE IF NOT EXISTS window_checkpoints (
                source TEXT NOT NULL,
                window_key TEXT NOT NULL,
                completed_at INTEGER NOT NULL,
                units INTEGER NOT NULL,
                PRIMARY KEY (source, window_key)
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn create_task_log(&self, task_name: &str) -> Result<i64> {
        let conn = self.conn()?;
        let start_time = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO task_logs (task_name, start_time, status) VALUES (?1, ?2, 'RUNNING')",
            params![task_name, start_time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn update_task_log_status(&self, task_id: i64, status: &str, details: &str) -> Result<()> {
        let conn = self.conn()?;
        let end_time = chrono::Utc::now().timestamp();
        conn.execute(
            "UPDATE task_logs SET status = ?1, details = ?2, end_time = ?3 WHERE task_id = ?4",
            params![status, details, end_time, task_id],
        )?;
        Ok(())
    }

    pub fn get_task_log(&self, task_id: i64) -> Result<Option<TaskLog>> {
        let conn = self.conn()?;
        let log = conn
            .query_row(
                "SELECT task_id, task_name, start_time, end_time, status, details FROM task_logs WHERE task_id = ?1",
                params![task_id],
                |row| {
                    Ok(TaskLog {
                        task_id: row.get(0)?,
                        task_name: row.get(1)?,
                        start_time: row.get(2)?,
                        end_time: row.get(3)?,
                        status: row.get(4)?,
                        details: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(log)
    }

    pub fn is_window_complete(&self, source: &str, window_key: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM window_checkpoints WHERE source = ?1 AND window_key = ?2",
                params![source, window_key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn mark_window_complete(&self, source: &str, window_key: &str, units: usize) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO window_checkpoints (source, window_key, completed_at, units)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(source, window_key) DO UPDATE SET
                completed_at = excluded.completed_at,
                units = excluded.units",
            params![source, window_key, chrono::Utc::now().timestamp(), units as i64],
        )?;
        Ok(())
    }

    pub fn completed_windows(&self, source: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT window_key FROM window_checkpoints WHERE source = ?1 ORDER BY window_key",
        )?;
        let keys = stmt
            .query_map(params![source], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn setup() -> (Catalog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = StoreConfig::new(dir.path());
        let catalog = Catalog::new(&config).unwrap();
        catalog.initialize_schema().unwrap();
        (catalog, dir)
    }

    #[test]
    fn test_task_log_crud() {
        let (catalog, _dir) = setup();

        let task_id = catalog.create_task_log("ingest-log").unwrap();
        assert_eq!(task_id, 1);

        catalog
            .update_task_log_status(task_id, "SUCCESS", "processed=7 skipped=3 failed=0")
            .unwrap();
        let log = catalog.get_task_log(task_id).unwrap().unwrap();
        assert_eq!(log.status.as_deref(), Some("SUCCESS"));
        assert!(log.end_time.is_some());
        assert!(catalog.get_task_log(99).unwrap().is_none());
    }

    #[test]
    fn test_window_checkpoints() {
        let (catalog, _dir) = setup();
        let key = "2024-01-01T00:00:00..2024-04-29T00:00:00";

        assert!(!catalog.is_window_complete("nvd", key).unwrap());
        catalog.mark_window_complete("nvd", key, 12).unwrap();
        catalog.mark_window_complete("nvd", key, 13).unwrap();
        assert!(catalog.is_window_complete("nvd", key).unwrap());
        assert!(!catalog.is_window_complete("dpkg", key).unwrap());
        assert_eq!(catalog.completed_windows("nvd").unwrap(), vec![key.to_string()]);
    }

    #[test]
    fn schema_initialization_is_idempotent() {
        let catalog = Catalog::in_memory().unwrap();
        catalog.initialize_schema().unwrap();
        catalog.initialize_schema().unwrap();
        assert_eq!(catalog.create_task_log("x").unwrap(), 1);
    }
}
