//! Filesystem-backed post storage: slug reservation, placement and removal.
//!
//! Posts live at `<root>/posts/<slug>/`. A slug is owned by whoever manages to
//! create its directory first; `create_dir` is the atomic exclusive-create
//! primitive, so two concurrent uploads can never both believe they own the
//! same slug.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::domain::slug::{is_valid_slug, with_suffix};

const POSTS_DIR: &str = "posts";
const INCOMING_PREFIX: &str = ".incoming-";

/// Maximum number of suffixed candidates tried before giving up on a base slug.
pub const MAX_SUFFIX_ATTEMPTS: usize = 10_000;

/// Errors that can occur while interacting with the content storage root.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("`{slug}` is not a valid slug")]
    InvalidSlug { slug: String },
    #[error("path `{path}` escapes the storage root")]
    PathTraversal { path: String },
    #[error("exhausted {attempts} attempts to reserve a directory for `{base}`")]
    Exhausted { base: String, attempts: usize },
    #[error("failed to {action} `{path}`")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Post storage rooted at an absolute directory.
#[derive(Debug, Clone)]
pub struct ContentStorage {
    root: PathBuf,
    posts: PathBuf,
}

impl ContentStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    ///
    /// The root is canonicalized so every path handed out is absolute.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|err| StorageError::io("create", root, err))?;
        let root = fs::canonicalize(root).map_err(|err| StorageError::io("resolve", root, err))?;

        let posts = root.join(POSTS_DIR);
        fs::create_dir_all(&posts).map_err(|err| StorageError::io("create", &posts, err))?;

        Ok(Self { root, posts })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn posts_dir(&self) -> &Path {
        &self.posts
    }

    /// Resolve the directory of a post, rejecting anything that is not a slug.
    pub fn post_dir(&self, slug: &str) -> Result<PathBuf, StorageError> {
        if !is_valid_slug(slug) {
            return Err(StorageError::InvalidSlug {
                slug: slug.to_string(),
            });
        }
        Ok(self.posts.join(slug))
    }

    /// Reserve `base`, or the first free `base-1`, `base-2`, … by creating its directory.
    ///
    /// Only `AlreadyExists` advances to the next candidate; every other
    /// failure is returned immediately.
    pub fn reserve(&self, base: &str) -> Result<Reservation, StorageError> {
        self.post_dir(base)?;

        for attempt in 0..=MAX_SUFFIX_ATTEMPTS {
            let slug = if attempt == 0 {
                base.to_string()
            } else {
                with_suffix(base, attempt)
            };
            let path = self.posts.join(&slug);

            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!(slug = %slug, attempt, "reserved post directory");
                    return Ok(Reservation {
                        slug,
                        path,
                        armed: true,
                    });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(StorageError::io("reserve", path, err)),
            }
        }

        Err(StorageError::Exhausted {
            base: base.to_string(),
            attempts: MAX_SUFFIX_ATTEMPTS + 1,
        })
    }

    /// Copy `source` into the reserved directory.
    ///
    /// The tree is first copied into a hidden directory inside the reservation
    /// and its top-level entries are then renamed into place, so every file
    /// appears under its final name fully written. The reservation is held
    /// throughout; on failure the caller drops it and the whole directory goes.
    pub fn place(&self, reservation: &Reservation, source: &Path) -> Result<(), StorageError> {
        let incoming = reservation
            .path()
            .join(format!("{INCOMING_PREFIX}{}", Uuid::new_v4().simple()));
        fs::create_dir(&incoming).map_err(|err| StorageError::io("create", &incoming, err))?;

        copy_tree(source, &incoming)?;
        promote_entries(&incoming, reservation.path())?;
        fs::remove_dir(&incoming).map_err(|err| StorageError::io("remove", &incoming, err))
    }

    /// Remove the directory tree of `slug`. Returns whether it existed.
    pub fn delete(&self, slug: &str) -> Result<bool, StorageError> {
        let path = self.post_dir(slug)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(StorageError::io("remove", path, err)),
        }
    }

    /// List the slugs of every post directory currently present, sorted.
    pub fn list_slugs(&self) -> Result<Vec<String>, StorageError> {
        let entries =
            fs::read_dir(&self.posts).map_err(|err| StorageError::io("list", &self.posts, err))?;

        let mut slugs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StorageError::io("list", &self.posts, err))?;
            let is_dir = entry
                .file_type()
                .map_err(|err| StorageError::io("inspect", entry.path(), err))?
                .is_dir();
            if let (true, Some(name)) = (is_dir, entry.file_name().to_str()) {
                if is_valid_slug(name) {
                    slugs.push(name.to_string());
                }
            }
        }
        slugs.sort();
        Ok(slugs)
    }

    /// Ensure `path` lies lexically under the storage root.
    pub fn ensure_contains(&self, path: &Path) -> Result<(), StorageError> {
        let inside = path.strip_prefix(&self.root).is_ok_and(|relative| {
            relative
                .components()
                .all(|component| matches!(component, std::path::Component::Normal(_)))
        });
        if inside {
            Ok(())
        } else {
            Err(StorageError::PathTraversal {
                path: path.display().to_string(),
            })
        }
    }
}

/// A reserved post directory. Dropping an un-committed reservation removes it.
#[derive(Debug)]
pub struct Reservation {
    slug: String,
    path: PathBuf,
    armed: bool,
}

impl Reservation {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory and hand back `(slug, path)`.
    pub fn commit(mut self) -> (String, PathBuf) {
        self.armed = false;
        (std::mem::take(&mut self.slug), std::mem::take(&mut self.path))
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            remove_quietly(&self.path, "released reservation");
        }
    }
}

fn remove_quietly(path: &Path, what: &'static str) {
    match fs::remove_dir_all(path) {
        Ok(()) => debug!(path = %path.display(), "{what}"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "cleanup failed: {what}"),
    }
}

/// Recursively copy the contents of `source` into the existing directory `target`.
///
/// Symbolic links are skipped rather than followed.
pub fn copy_tree(source: &Path, target: &Path) -> Result<(), StorageError> {
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(source).to_path_buf();
            StorageError::io("walk", path, io::Error::other(err))
        })?;

        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| StorageError::PathTraversal {
                path: entry.path().display().to_string(),
            })?;
        let destination = target.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&destination)
                .map_err(|err| StorageError::io("create", &destination, err))?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &destination)
                .map_err(|err| StorageError::io("copy", &destination, err))?;
        } else {
            debug!(path = %entry.path().display(), "skipping non-regular entry");
        }
    }
    Ok(())
}

/// Move every entry of `from` into `to`, which must not already hold them.
fn promote_entries(from: &Path, to: &Path) -> Result<(), StorageError> {
    let entries = fs::read_dir(from)
        .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
        .map_err(|err| StorageError::io("list", from, err))?;

    for entry in entries {
        let destination = to.join(entry.file_name());
        fs::rename(entry.path(), &destination)
            .map_err(|err| StorageError::io("move", &destination, err))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn storage() -> (TempDir, ContentStorage) {
        let dir = TempDir::new().expect("tempdir");
        let storage = ContentStorage::new(dir.path()).expect("storage");
        (dir, storage)
    }

    #[test]
    fn reserve_appends_counter_on_collision() {
        let (_dir, storage) = storage();

        let (first, _) = storage.reserve("my-post").expect("first").commit();
        let (second, _) = storage.reserve("my-post").expect("second").commit();
        let (third, path) = storage.reserve("my-post").expect("third").commit();

        assert_eq!(first, "my-post");
        assert_eq!(second, "my-post-1");
        assert_eq!(third, "my-post-2");
        assert!(path.is_dir());
    }

    #[test]
    fn dropped_reservation_is_released() {
        let (_dir, storage) = storage();

        let path = {
            let reservation = storage.reserve("draft").expect("reserve");
            reservation.path().to_path_buf()
        };

        assert!(!path.exists());
        let (slug, _) = storage.reserve("draft").expect("reserve again").commit();
        assert_eq!(slug, "draft");
    }

    #[test]
    fn reserve_rejects_invalid_base() {
        let (_dir, storage) = storage();
        let error = storage.reserve("../escape").unwrap_err();
        assert!(matches!(error, StorageError::InvalidSlug { .. }));
    }

    #[test]
    fn place_copies_tree_into_reservation() {
        let (_dir, storage) = storage();
        let source = TempDir::new().expect("source");
        fs::create_dir_all(source.path().join("assets")).expect("assets");
        fs::write(source.path().join("index.md"), "# hi").expect("index");
        fs::write(source.path().join("assets/cover.png"), [0u8; 4]).expect("cover");

        let reservation = storage.reserve("copied").expect("reserve");
        storage.place(&reservation, source.path()).expect("place");
        let (_, path) = reservation.commit();

        assert_eq!(fs::read_to_string(path.join("index.md")).expect("read"), "# hi");
        assert!(path.join("assets/cover.png").is_file());
        let mut names: Vec<String> = fs::read_dir(&path)
            .expect("post dir")
            .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["assets", "index.md"]);
        assert!(!storage.root().join(".staging").exists());
    }

    #[test]
    fn failed_placement_releases_reservation() {
        let (_dir, storage) = storage();
        let missing = storage.root().join("no-such-source");

        let reservation = storage.reserve("broken").expect("reserve");
        let reserved = reservation.path().to_path_buf();
        let error = storage.place(&reservation, &missing).unwrap_err();
        assert!(matches!(error, StorageError::Io { action: "walk", .. }));
        drop(reservation);

        assert!(!reserved.exists());
        assert!(storage.list_slugs().expect("list").is_empty());
    }

    #[test]
    fn new_creates_and_canonicalizes_root() {
        let dir = TempDir::new().expect("tempdir");
        let requested = dir.path().join("nested/../content");

        let storage = ContentStorage::new(&requested).expect("storage");

        let expected = fs::canonicalize(dir.path()).expect("canonical").join("content");
        assert_eq!(storage.root(), expected);
        assert!(storage.posts_dir().is_dir());
    }

    #[test]
    fn delete_is_idempotent() {
        let (_dir, storage) = storage();
        storage.reserve("gone").expect("reserve").commit();

        assert!(storage.delete("gone").expect("delete"));
        assert!(!storage.delete("gone").expect("delete again"));
        assert!(matches!(
            storage.delete("../../etc"),
            Err(StorageError::InvalidSlug { .. })
        ));
    }

    #[test]
    fn list_slugs_is_sorted_and_skips_noise() {
        let (_dir, storage) = storage();
        storage.reserve("beta").expect("beta").commit();
        storage.reserve("alpha").expect("alpha").commit();
        fs::create_dir(storage.posts_dir().join(".hidden")).expect("hidden");
        fs::write(storage.posts_dir().join("stray.txt"), "x").expect("stray");

        assert_eq!(storage.list_slugs().expect("list"), vec!["alpha", "beta"]);
    }

    #[test]
    fn ensure_contains_guards_root() {
        let (_dir, storage) = storage();
        let inside = storage.posts_dir().join("a/index.md");
        assert!(storage.ensure_contains(&inside).is_ok());
        assert!(storage.ensure_contains(Path::new("/etc/passwd")).is_err());
        assert!(
            storage
                .ensure_contains(&storage.root().join("posts/../../x"))
                .is_err()
        );
    }
}
