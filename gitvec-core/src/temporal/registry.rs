//! `temporal/blob_registry.db` — the deduplication oracle answering "is
//! this blob already embedded?" A blob seen in a hundred commits gets
//! embedded exactly once; every later sighting costs only a `trees` row.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};

use crate::error::CoreResult;

pub struct BlobRegistry {
    conn: Connection,
}

impl BlobRegistry {
    pub fn open(temporal_dir: &Path) -> CoreResult<Self> {
        std::fs::create_dir_all(temporal_dir)?;
        let conn = Connection::open(temporal_dir.join("blob_registry.db"))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS blob_registry (blob_hash TEXT PRIMARY KEY);
             CREATE TABLE IF NOT EXISTS blob_points (
                blob_hash TEXT NOT NULL,
                point_id TEXT NOT NULL,
                PRIMARY KEY (blob_hash, point_id)
             );
             CREATE INDEX IF NOT EXISTS idx_blob_points_blob ON blob_points(blob_hash);",
        )?;
        Ok(Self { conn })
    }

    pub fn is_registered(&self, blob_hash: &str) -> CoreResult<bool> {
        Ok(self
            .conn
            .query_row("SELECT 1 FROM blob_registry WHERE blob_hash = ?1", [blob_hash], |_| Ok(()))
            .optional()?
            .is_some())
    }

    /// Registers a blob as embedded, recording the point ids its chunks
    /// produced. Idempotent — calling it twice for the same blob is a
    /// no-op for rows that already exist.
    pub fn register(&self, blob_hash: &str, point_ids: &[String]) -> CoreResult<()> {
        self.conn.execute("INSERT OR IGNORE INTO blob_registry (blob_hash) VALUES (?1)", [blob_hash])?;
        for pid in point_ids {
            self.conn.execute(
                "INSERT OR IGNORE INTO blob_points (blob_hash, point_id) VALUES (?1, ?2)",
                rusqlite::params![blob_hash, pid],
            )?;
        }
        Ok(())
    }

    pub fn point_ids_for_blob(&self, blob_hash: &str) -> CoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT point_id FROM blob_points WHERE blob_hash = ?1")?;
        let rows = stmt.query_map([blob_hash], |r| r.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn registered_count(&self) -> CoreResult<usize> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM blob_registry", [], |r| r.get::<_, i64>(0))? as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unregistered_blob_is_not_registered() {
        let dir = TempDir::new().unwrap();
        let reg = BlobRegistry::open(dir.path()).unwrap();
        assert!(!reg.is_registered("blob1").unwrap());
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let dir = TempDir::new().unwrap();
        let reg = BlobRegistry::open(dir.path()).unwrap();
        reg.register("blob1", &["p1".to_string(), "p2".to_string()]).unwrap();

        assert!(reg.is_registered("blob1").unwrap());
        let mut ids = reg.point_ids_for_blob("blob1").unwrap();
        ids.sort();
        assert_eq!(ids, vec!["p1".to_string(), "p2".to_string()]);
    }

    #[test]
    fn double_registration_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let reg = BlobRegistry::open(dir.path()).unwrap();
        reg.register("blob1", &["p1".to_string()]).unwrap();
        reg.register("blob1", &["p1".to_string()]).unwrap();
        assert_eq!(reg.registered_count().unwrap(), 1);
    }
}
