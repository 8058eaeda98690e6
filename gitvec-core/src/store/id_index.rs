//! Id index: `point_id -> (internal_label, vector_file_path)`, the dense
//! integer space the HNSW index addresses by plus the side index that lets
//! a label or id resolve straight to its vector file without a directory
//! scan. Persisted as `id_index.text`; rebuilt as a derived artifact
//! whenever the HNSW index is rebuilt.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreResult;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    label: u32,
    /// Vector file path, relative to the collection root.
    path: String,
}

#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    entries: HashMap<String, Entry>,
    by_label: HashMap<u32, String>,
    next_label: u32,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = fs::read_to_string(path)?;
        let entries: HashMap<String, Entry> = serde_json::from_str(&text)?;
        let next_label = entries.values().map(|e| e.label).max().map(|m| m + 1).unwrap_or(0);
        let by_label = entries.iter().map(|(id, e)| (e.label, id.clone())).collect();
        Ok(Self { entries, by_label, next_label })
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let text = serde_json::to_string_pretty(&self.entries)?;
        let tmp = path.with_extension("text.tmp");
        {
            let mut f = File::create(&tmp)?;
            f.write_all(text.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Assigns a new dense label if `id` is unseen and records its vector
    /// file path (relative to the collection root); an existing id keeps
    /// its label but has its path refreshed. Labels are never reused after
    /// a `remove`, keeping reads stable while a rebuild is in flight.
    pub fn insert(&mut self, id: &str, relative_path: &str) -> u32 {
        if let Some(entry) = self.entries.get_mut(id) {
            entry.path = relative_path.to_string();
            return entry.label;
        }
        let label = self.next_label;
        self.next_label += 1;
        self.by_label.insert(label, id.to_string());
        self.entries.insert(id.to_string(), Entry { label, path: relative_path.to_string() });
        label
    }

    pub fn remove(&mut self, id: &str) -> Option<u32> {
        let entry = self.entries.remove(id)?;
        self.by_label.remove(&entry.label);
        Some(entry.label)
    }

    pub fn get(&self, id: &str) -> Option<u32> {
        self.entries.get(id).map(|e| e.label)
    }

    /// Vector file path for `id`, relative to the collection root.
    pub fn path_for(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|e| e.path.as_str())
    }

    pub fn label_to_id(&self, label: u32) -> Option<&str> {
        self.by_label.get(&label).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn insert_assigns_dense_increasing_labels() {
        let mut idx = IdIndex::new();
        assert_eq!(idx.insert("a", "aa/a.text"), 0);
        assert_eq!(idx.insert("b", "bb/b.text"), 1);
        assert_eq!(idx.insert("a", "aa/a.text"), 0);
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn save_and_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id_index.text");
        let mut idx = IdIndex::new();
        idx.insert("x", "xx/x.text");
        idx.insert("y", "yy/y.text");
        idx.save(&path).unwrap();

        let loaded = IdIndex::load(&path).unwrap();
        assert_eq!(loaded.get("x"), Some(0));
        assert_eq!(loaded.get("y"), Some(1));
        assert_eq!(loaded.path_for("x"), Some("xx/x.text"));
    }

    #[test]
    fn next_label_continues_after_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("id_index.text");
        let mut idx = IdIndex::new();
        idx.insert("x", "xx/x.text");
        idx.save(&path).unwrap();

        let mut reloaded = IdIndex::load(&path).unwrap();
        assert_eq!(reloaded.insert("z", "zz/z.text"), 1);
    }

    #[test]
    fn label_to_id_resolves_without_scanning() {
        let mut idx = IdIndex::new();
        idx.insert("a", "aa/a.text");
        idx.insert("b", "bb/b.text");
        assert_eq!(idx.label_to_id(0), Some("a"));
        assert_eq!(idx.label_to_id(1), Some("b"));
        idx.remove("a");
        assert_eq!(idx.label_to_id(0), None);
    }
}
