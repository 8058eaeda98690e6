//! `temporal/commits.db` — the `commits`/`trees`/`commit_branches`
//! relational store. WAL journaling keeps concurrent readers
//! unblocked by the bulk writer that ingestion uses.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension};

use crate::error::CoreResult;
use crate::gitbackend::CommitHeader;

pub struct TemporalDb {
    conn: Connection,
}

impl TemporalDb {
    pub fn open(temporal_dir: &Path) -> CoreResult<Self> {
        std::fs::create_dir_all(temporal_dir)?;
        let conn = Connection::open(temporal_dir.join("commits.db"))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -8000;
             PRAGMA temp_store = MEMORY;",
        )?;
        let db = Self { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> CoreResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS commits (
                hash TEXT PRIMARY KEY,
                date INTEGER NOT NULL,
                author_name TEXT NOT NULL,
                author_email TEXT NOT NULL,
                message TEXT NOT NULL,
                parent_hashes TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_commits_date ON commits(date, hash);

             CREATE TABLE IF NOT EXISTS trees (
                commit_hash TEXT NOT NULL,
                file_path TEXT NOT NULL,
                blob_hash TEXT NOT NULL,
                PRIMARY KEY (commit_hash, file_path)
             );
             CREATE INDEX IF NOT EXISTS idx_trees_blob ON trees(blob_hash, commit_hash);

             CREATE TABLE IF NOT EXISTS commit_branches (
                commit_hash TEXT NOT NULL,
                branch_name TEXT NOT NULL,
                is_head INTEGER NOT NULL,
                indexed_at TEXT NOT NULL,
                PRIMARY KEY (commit_hash, branch_name)
             );
             CREATE INDEX IF NOT EXISTS idx_commit_branches_commit ON commit_branches(commit_hash);
             CREATE INDEX IF NOT EXISTS idx_commit_branches_branch ON commit_branches(branch_name);",
        )?;
        Ok(())
    }

    pub fn insert_commit(&self, commit: &CommitHeader) -> CoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO commits (hash, date, author_name, author_email, message, parent_hashes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                commit.hash,
                commit.date_unix,
                commit.author_name,
                commit.author_email,
                commit.message,
                commit.parent_hashes.join(" "),
            ],
        )?;
        Ok(())
    }

    pub fn insert_tree_row(&self, commit_hash: &str, file_path: &str, blob_hash: &str) -> CoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO trees (commit_hash, file_path, blob_hash) VALUES (?1, ?2, ?3)",
            rusqlite::params![commit_hash, file_path, blob_hash],
        )?;
        Ok(())
    }

    pub fn insert_branch_row(&self, commit_hash: &str, branch_name: &str, is_head: bool, indexed_at: &str) -> CoreResult<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO commit_branches (commit_hash, branch_name, is_head, indexed_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![commit_hash, branch_name, is_head as i64, indexed_at],
        )?;
        Ok(())
    }

    /// Commits (with dates) in which `blob_hash` appears, newest first.
    pub fn commits_for_blob(&self, blob_hash: &str) -> CoreResult<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.hash, c.date FROM trees t
             JOIN commits c ON c.hash = t.commit_hash
             WHERE t.blob_hash = ?1
             ORDER BY c.date DESC",
        )?;
        let rows = stmt.query_map([blob_hash], |r| Ok((r.get(0)?, r.get(1)?)))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Blob hashes tracked in `commit_hash`'s tree — used by `at_commit`
    /// and `include_removed` query filters.
    pub fn blob_hashes_in_commit(&self, commit_hash: &str) -> CoreResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT blob_hash FROM trees WHERE commit_hash = ?1")?;
        let rows = stmt.query_map([commit_hash], |r| r.get(0))?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn commit_count(&self) -> CoreResult<usize> {
        Ok(self.conn.query_row("SELECT COUNT(*) FROM commits", [], |r| r.get::<_, i64>(0))? as usize)
    }

    /// `(author_name, message, date)` for `show_evolution` entries.
    pub fn commit_header_row(&self, commit_hash: &str) -> CoreResult<Option<(String, String, i64)>> {
        Ok(self
            .conn
            .query_row(
                "SELECT author_name, message, date FROM commits WHERE hash = ?1",
                [commit_hash],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn header(hash: &str, date: i64) -> CommitHeader {
        CommitHeader {
            hash: hash.to_string(),
            parent_hashes: vec![],
            author_name: "a".to_string(),
            author_email: "a@b.c".to_string(),
            date_unix: date,
            message: "m".to_string(),
        }
    }

    #[test]
    fn insert_and_query_commit_for_blob() {
        let dir = TempDir::new().unwrap();
        let db = TemporalDb::open(dir.path()).unwrap();
        db.insert_commit(&header("c1", 100)).unwrap();
        db.insert_tree_row("c1", "a.py", "blob1").unwrap();

        let commits = db.commits_for_blob("blob1").unwrap();
        assert_eq!(commits, vec![("c1".to_string(), 100)]);
    }

    #[test]
    fn duplicate_commit_insert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db = TemporalDb::open(dir.path()).unwrap();
        db.insert_commit(&header("c1", 100)).unwrap();
        db.insert_commit(&header("c1", 100)).unwrap();
        assert_eq!(db.commit_count().unwrap(), 1);
    }

    #[test]
    fn commit_header_row_round_trips() {
        let dir = TempDir::new().unwrap();
        let db = TemporalDb::open(dir.path()).unwrap();
        db.insert_commit(&header("c1", 100)).unwrap();

        let (author, message, date) = db.commit_header_row("c1").unwrap().unwrap();
        assert_eq!((author.as_str(), message.as_str(), date), ("a", "m", 100));
        assert!(db.commit_header_row("missing").unwrap().is_none());
    }

    #[test]
    fn blob_hashes_in_commit_reflects_tree_rows() {
        let dir = TempDir::new().unwrap();
        let db = TemporalDb::open(dir.path()).unwrap();
        db.insert_commit(&header("c1", 100)).unwrap();
        db.insert_tree_row("c1", "a.py", "blob1").unwrap();
        db.insert_tree_row("c1", "b.py", "blob2").unwrap();

        let mut blobs = db.blob_hashes_in_commit("c1").unwrap();
        blobs.sort();
        assert_eq!(blobs, vec!["blob1".to_string(), "blob2".to_string()]);
    }
}
