//! Locating the content root inside an extracted archive.

use std::fs;
use std::path::{Path, PathBuf};

use crate::infra::storage::StorageError;

use super::error::{ContentStructureError, IngestError};

/// Top-level entries archive tools add that never hold content.
const IGNORED_TOP_LEVEL: &[&str] = &["__MACOSX"];

/// The directory that directly contains the entry document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentRoot {
    pub path: PathBuf,
    /// File name of the entry document found in `path`.
    pub entry_document: String,
    /// Name of the top-level directory, `None` when the archive root itself is the content root.
    pub directory_name: Option<String>,
}

/// Find the single content root under `extracted`.
///
/// Top-level directories holding an entry document are candidates; exactly
/// one must exist. Only when there are none does the extraction root itself
/// qualify, provided it holds an entry document directly.
pub fn locate_content_root(
    extracted: &Path,
    entry_documents: &[String],
) -> Result<ContentRoot, IngestError> {
    let entries = fs::read_dir(extracted).map_err(|source| StorageError::Io {
        action: "scan",
        path: extracted.to_path_buf(),
        source,
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StorageError::Io {
            action: "scan",
            path: extracted.to_path_buf(),
            source,
        })?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if name.starts_with('.') || IGNORED_TOP_LEVEL.contains(&name.as_str()) {
            continue;
        }
        if !entry.file_type().is_ok_and(|kind| kind.is_dir()) {
            continue;
        }

        let path = entry.path();
        if let Some(entry_document) = find_entry_document(&path, entry_documents) {
            candidates.push(ContentRoot {
                path,
                entry_document,
                directory_name: Some(name),
            });
        }
    }

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => find_entry_document(extracted, entry_documents)
            .map(|entry_document| ContentRoot {
                path: extracted.to_path_buf(),
                entry_document,
                directory_name: None,
            })
            .ok_or_else(|| {
                ContentStructureError::MissingEntryDocument {
                    expected: entry_documents.join(", "),
                }
                .into()
            }),
        _ => {
            let mut names: Vec<String> = candidates
                .into_iter()
                .filter_map(|candidate| candidate.directory_name)
                .collect();
            names.sort();
            Err(ContentStructureError::AmbiguousContentRoot { candidates: names }.into())
        }
    }
}

/// Return the first configured entry document name present as a file in `dir`.
fn find_entry_document(dir: &Path, entry_documents: &[String]) -> Option<String> {
    entry_documents
        .iter()
        .find(|name| dir.join(name.as_str()).is_file())
        .cloned()
}
