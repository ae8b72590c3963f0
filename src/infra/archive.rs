//! Extraction workspaces and bounded, path-sanitized zip extraction.

use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::{Builder, TempDir};
use thiserror::Error;
use tracing::{debug, warn};
use zip::{ZipArchive, result::ZipError};

const WORKSPACE_PREFIX: &str = "folio-ingest-";
const COPY_BUFFER_BYTES: usize = 64 * 1024;
const UNIX_FILE_TYPE_MASK: u32 = 0o170_000;
const UNIX_SYMLINK: u32 = 0o120_000;

/// Errors raised while unpacking an uploaded archive.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("archive could not be opened")]
    Corrupt(#[source] ZipError),
    #[error("archive entry `{name}` could not be decompressed")]
    Entry {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("archive entry `{name}` escapes the extraction directory")]
    UnsafeEntry { name: String },
    #[error("archive holds {count} entries, more than the limit of {limit}")]
    TooManyEntries { count: usize, limit: usize },
    #[error("archive expands beyond the limit of {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("failed to write `{path}` while extracting")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Bounds applied to untrusted archives during extraction.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionLimits {
    pub max_extracted_bytes: u64,
    pub max_entries: usize,
}

/// Totals reported after a successful extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
}

/// An exclusively owned temporary directory for one ingestion attempt.
///
/// The directory is removed when the workspace is closed or dropped; removal
/// failures are logged and otherwise ignored.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
}

impl Workspace {
    /// Create a fresh workspace under `parent`, or the system temp dir when `None`.
    pub fn create(parent: Option<&Path>) -> io::Result<Self> {
        let mut builder = Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => {
                fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "created extraction workspace");
        Ok(Self { dir: Some(dir) })
    }

    pub fn path(&self) -> &Path {
        self.dir
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Remove the workspace now rather than at the end of the scope.
    pub fn close(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };
        let path = dir.path().to_path_buf();
        match dir.close() {
            Ok(()) => debug!(path = %path.display(), "removed extraction workspace"),
            Err(err) => warn!(
                path = %path.display(),
                error = %err,
                "failed to remove extraction workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Extract every entry of the zip archive at `archive` into `destination`.
///
/// Entry names are resolved with `enclosed_name`, so absolute paths and `..`
/// components are refused. Symbolic links are skipped. The decompressed size
/// is counted while streaming, not trusted from the archive headers.
pub fn extract_zip(
    archive: &Path,
    destination: &Path,
    limits: ExtractionLimits,
) -> Result<ExtractionSummary, ExtractionError> {
    let file = File::open(archive).map_err(|source| ExtractionError::Io {
        path: archive.to_path_buf(),
        source,
    })?;
    let mut zip = ZipArchive::new(BufReader::new(file)).map_err(ExtractionError::Corrupt)?;
    // The destination exists even for archives that yield no entries.
    create_dir_all(destination)?;

    if zip.len() > limits.max_entries {
        return Err(ExtractionError::TooManyEntries {
            count: zip.len(),
            limit: limits.max_entries,
        });
    }

    let mut summary = ExtractionSummary::default();
    let mut remaining = limits.max_extracted_bytes;
    let mut buffer = vec![0u8; COPY_BUFFER_BYTES];

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index).map_err(ExtractionError::Corrupt)?;
        let name = entry.name().to_string();

        let Some(relative) = entry.enclosed_name() else {
            return Err(ExtractionError::UnsafeEntry { name });
        };

        if entry
            .unix_mode()
            .is_some_and(|mode| mode & UNIX_FILE_TYPE_MASK == UNIX_SYMLINK)
        {
            debug!(entry = %name, "skipping symbolic link entry");
            continue;
        }

        let target = destination.join(&relative);

        if entry.is_dir() {
            create_dir_all(&target)?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = target.parent() {
            create_dir_all(parent)?;
        }

        let mut output = File::create(&target).map_err(|source| ExtractionError::Io {
            path: target.clone(),
            source,
        })?;

        loop {
            let read = entry
                .read(&mut buffer)
                .map_err(|source| ExtractionError::Entry {
                    name: name.clone(),
                    source,
                })?;
            if read == 0 {
                break;
            }

            let read_bytes = read as u64;
            if read_bytes > remaining {
                return Err(ExtractionError::TooLarge {
                    limit: limits.max_extracted_bytes,
                });
            }
            remaining -= read_bytes;
            summary.bytes += read_bytes;

            output
                .write_all(&buffer[..read])
                .map_err(|source| ExtractionError::Io {
                    path: target.clone(),
                    source,
                })?;
        }

        summary.files += 1;
    }

    Ok(summary)
}

fn create_dir_all(path: &Path) -> Result<(), ExtractionError> {
    fs::create_dir_all(path).map_err(|source| ExtractionError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use zip::{ZipWriter, write::SimpleFileOptions};

    use super::*;

    const LIMITS: ExtractionLimits = ExtractionLimits {
        max_extracted_bytes: 1024 * 1024,
        max_entries: 100,
    };

    fn write_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(*name, SimpleFileOptions::default())
                    .expect("directory");
            } else {
                writer
                    .start_file(*name, SimpleFileOptions::default())
                    .expect("start file");
                writer.write_all(contents).expect("write entry");
            }
        }
        let bytes = writer.finish().expect("finish").into_inner();
        let path = dir.join("upload.zip");
        fs::write(&path, bytes).expect("write archive");
        path
    }

    #[test]
    fn extracts_nested_entries() {
        let workspace = Workspace::create(None).expect("workspace");
        let archive = write_zip(
            workspace.path(),
            &[
                ("post/", b""),
                ("post/index.md", b"---\ntitle: x\n---\n"),
                ("post/assets/cover.png", b"png"),
            ],
        );
        let output = workspace.path().join("out");

        let summary = extract_zip(&archive, &output, LIMITS).expect("extract");

        assert_eq!(summary.files, 2);
        assert_eq!(summary.directories, 1);
        assert!(output.join("post/index.md").is_file());
        assert!(output.join("post/assets/cover.png").is_file());
    }

    #[test]
    fn rejects_traversal_entries() {
        let workspace = Workspace::create(None).expect("workspace");
        let archive = write_zip(workspace.path(), &[("../evil.md", b"boom")]);

        let error = extract_zip(&archive, &workspace.path().join("out"), LIMITS).unwrap_err();
        assert!(matches!(error, ExtractionError::UnsafeEntry { .. }));
    }

    #[test]
    fn enforces_decompressed_size_budget() {
        let workspace = Workspace::create(None).expect("workspace");
        let payload = vec![b'a'; 4096];
        let archive = write_zip(workspace.path(), &[("big.md", payload.as_slice())]);
        let limits = ExtractionLimits {
            max_extracted_bytes: 1000,
            max_entries: 10,
        };

        let error = extract_zip(&archive, &workspace.path().join("out"), limits).unwrap_err();
        assert!(matches!(error, ExtractionError::TooLarge { limit: 1000 }));
    }

    #[test]
    fn enforces_entry_count() {
        let workspace = Workspace::create(None).expect("workspace");
        let archive = write_zip(workspace.path(), &[("a.md", b"a"), ("b.md", b"b")]);
        let limits = ExtractionLimits {
            max_extracted_bytes: 1000,
            max_entries: 1,
        };

        let error = extract_zip(&archive, &workspace.path().join("out"), limits).unwrap_err();
        assert!(matches!(
            error,
            ExtractionError::TooManyEntries { count: 2, limit: 1 }
        ));
    }

    #[test]
    fn empty_archive_still_creates_destination() {
        let workspace = Workspace::create(None).expect("workspace");
        let archive = write_zip(workspace.path(), &[]);
        let output = workspace.path().join("out");

        let summary = extract_zip(&archive, &output, LIMITS).expect("extract");

        assert_eq!(summary, ExtractionSummary::default());
        assert!(output.is_dir());
    }

    #[test]
    fn garbage_is_reported_as_corrupt() {
        let workspace = Workspace::create(None).expect("workspace");
        let archive = workspace.path().join("upload.zip");
        fs::write(&archive, b"definitely not a zip").expect("write");

        let error = extract_zip(&archive, &workspace.path().join("out"), LIMITS).unwrap_err();
        assert!(matches!(error, ExtractionError::Corrupt(_)));
    }

    #[test]
    fn workspace_is_removed_on_close_and_drop() {
        let closed = Workspace::create(None).expect("workspace");
        let closed_path = closed.path().to_path_buf();
        closed.close();
        assert!(!closed_path.exists());

        let dropped_path = {
            let workspace = Workspace::create(None).expect("workspace");
            fs::write(workspace.path().join("file"), b"x").expect("write");
            workspace.path().to_path_buf()
        };
        assert!(!dropped_path.exists());
    }
}
