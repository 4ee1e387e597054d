//! Report-side view of persisted inventory documents.
//!
//! A [`Snapshot`] is one loaded [`InventoryDocument`] plus the two derived
//! fields the report needs: a display tag and an ordering timestamp.
//! Timestamp derivation never fails; undated documents sort first under a
//! sentinel minimum instead of aborting report generation.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

use crate::document::InventoryDocument;
use crate::naming;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub path: PathBuf,
    pub tag: String,
    pub ordering_timestamp: NaiveDateTime,
    pub document: InventoryDocument,
}

impl Snapshot {
    pub fn load(path: &Path) -> Result<Self> {
        let document = InventoryDocument::load(path)?;
        Ok(Self::from_document(document, path))
    }

    pub fn from_document(document: InventoryDocument, path: &Path) -> Self {
        let tag = derive_tag(&document, path);
        let ordering_timestamp = document
            .created
            .as_deref()
            .and_then(parse_created)
            .unwrap_or(NaiveDateTime::MIN);
        Self {
            path: path.to_path_buf(),
            tag,
            ordering_timestamp,
            document,
        }
    }
}

/// Load every `*.xml` file in a directory, in filename order.
///
/// A file that fails to parse is a hard error: inventory documents are
/// written by this tool and expected well-formed.
pub fn load_directory(dir: &Path) -> Result<Vec<Snapshot>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read input directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().map(|e| e == "xml").unwrap_or(false))
        .collect();
    paths.sort();
    paths.iter().map(|path| Snapshot::load(path)).collect()
}

/// Derive the display tag for a document, first match wins:
/// reference suffix, repoTag suffix, filename `__<tag>.xml` pattern, bare
/// file stem.
fn derive_tag(document: &InventoryDocument, path: &Path) -> String {
    let last_seg = document
        .reference
        .rsplit('/')
        .next()
        .unwrap_or(&document.reference);
    if let Some((_, tag)) = last_seg.split_once(':') {
        if !tag.is_empty() {
            return tag.to_string();
        }
    }

    for repo_tag in &document.repo_tags {
        let repo_tag = repo_tag.trim();
        if let Some(tag) = repo_tag.rsplit(':').next().filter(|_| repo_tag.contains(':')) {
            if !tag.is_empty() {
                return tag.to_string();
            }
        }
    }

    if let Some(tag) = naming::tag_from_filename(path) {
        return tag;
    }

    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_string()
}

/// Parse a `created` attribute as a naive timestamp.
///
/// Sub-second digits and the `Z`/`+HH:MM` zone suffix are stripped first;
/// anything that still does not parse yields `None` and the caller falls
/// back to the sentinel minimum.
pub fn parse_created(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.split('Z').next().unwrap_or(raw);
    let trimmed = trimmed.split('.').next().unwrap_or(trimmed);
    let trimmed = match trimmed.rfind('+') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S").ok()
}
