//! Content materializer: given a hit's stored payload, recover the
//! user-visible snippet and a staleness verdict. Git-aware three-tier
//! fallback; non-git hits are never stale.

use crate::error::CoreResult;
use crate::gitbackend::GitBackend;
use crate::hashutil::hash_chunk;
use crate::model::{PayloadStorage, Staleness, StalenessIndicator, VectorRecord};
use std::path::Path;

/// Materialized snippet plus staleness verdict for one hit.
pub struct Materialized {
    pub content: String,
    pub staleness: Staleness,
}

/// `repo_root` is the working tree `git` commands are run against; `record`
/// is the hit being materialized.
pub fn materialize(repo_root: &Path, record: &VectorRecord) -> CoreResult<Materialized> {
    let git_blob_hash = match &record.storage {
        PayloadStorage::Inline { chunk_text } => {
            return Ok(Materialized { content: chunk_text.clone(), staleness: Staleness::default() });
        }
        PayloadStorage::GitBlob { git_blob_hash } => git_blob_hash,
    };

    let working_file = repo_root.join(&record.file_path);
    if let Ok(text) = std::fs::read_to_string(&working_file) {
        if let Some(slice) = line_range(&text, record.start_line, record.end_line) {
            if crate::hashutil::chunk_hash_hex(&hash_chunk(&slice)) == record.chunk_hash {
                return Ok(Materialized { content: slice, staleness: Staleness::default() });
            }
        }
    }

    let backend = GitBackend::new(repo_root);
    match backend.cat_file_blob(git_blob_hash) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            let content = line_range(&text, record.start_line, record.end_line).unwrap_or_default();

            let indicator = if working_file.exists() {
                StalenessIndicator::Modified
            } else {
                StalenessIndicator::Deleted
            };
            let reason = match indicator {
                StalenessIndicator::Modified => "hash_mismatch",
                StalenessIndicator::Deleted => "file_deleted",
                StalenessIndicator::Error => unreachable!(),
            };

            Ok(Materialized {
                content,
                staleness: Staleness {
                    is_stale: true,
                    staleness_indicator: Some(indicator),
                    staleness_reason: Some(reason.to_string()),
                    hash_mismatch: matches!(indicator, StalenessIndicator::Modified),
                    staleness_delta_seconds: None,
                },
            })
        }
        Err(_) => Ok(Materialized {
            content: String::new(),
            staleness: Staleness {
                is_stale: true,
                staleness_indicator: Some(StalenessIndicator::Error),
                staleness_reason: Some("retrieval_failed".to_string()),
                hash_mismatch: false,
                staleness_delta_seconds: None,
            },
        }),
    }
}

/// 0-indexed, end-exclusive like the record's `start_line..end_line`.
fn line_range(text: &str, start_line: usize, end_line: usize) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    if start_line >= lines.len() {
        return None;
    }
    let end = end_line.min(lines.len());
    Some(lines[start_line..end].join("\n"))
}
