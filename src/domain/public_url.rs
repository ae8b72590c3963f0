//! Mapping from absolute storage paths to externally served URLs.

use std::path::{Component, Path};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublicUrlError {
    #[error("path `{path}` is not located under storage root `{root}`")]
    OutsideRoot { path: String, root: String },
    #[error("path `{path}` contains a non UTF-8 component")]
    NonUtf8 { path: String },
}

/// Compute `{public_base_prefix}/{path relative to storage_root}`.
///
/// `public_base_prefix` is expected in normalized form: either empty or a
/// `/`-prefixed path without a trailing slash. The relative path is joined
/// with forward slashes regardless of the platform separator.
pub fn public_url(
    storage_root: &Path,
    public_base_prefix: &str,
    absolute: &Path,
) -> Result<String, PublicUrlError> {
    let outside = || PublicUrlError::OutsideRoot {
        path: absolute.display().to_string(),
        root: storage_root.display().to_string(),
    };

    let relative = absolute.strip_prefix(storage_root).map_err(|_| outside())?;

    let mut segments = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(segment) => {
                let segment = segment.to_str().ok_or_else(|| PublicUrlError::NonUtf8 {
                    path: absolute.display().to_string(),
                })?;
                segments.push(segment);
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(outside());
            }
        }
    }

    Ok(format!("{public_base_prefix}/{}", segments.join("/")))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn maps_nested_file_under_prefix() {
        let root = Path::new("/srv/content");
        let file = root.join("posts").join("my-post").join("assets").join("cover.jpg");

        let url = public_url(root, "/content", &file).expect("url");
        assert_eq!(url, "/content/posts/my-post/assets/cover.jpg");
    }

    #[test]
    fn empty_prefix_yields_root_relative_url() {
        let root = Path::new("/srv/content");
        let url = public_url(root, "", &root.join("posts/a/index.md")).expect("url");
        assert_eq!(url, "/posts/a/index.md");
    }

    #[test]
    fn rejects_paths_outside_root() {
        let root = Path::new("/srv/content");
        let error = public_url(root, "/content", Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(error, PublicUrlError::OutsideRoot { .. }));

        let sneaky = root.join("posts/../../etc/passwd");
        let error = public_url(root, "/content", &sneaky).unwrap_err();
        assert!(matches!(error, PublicUrlError::OutsideRoot { .. }));
    }

    #[test]
    fn url_rejoins_to_original_path() {
        let root = PathBuf::from("/srv/content");
        let prefix = "/media";
        let original = root.join("posts").join("hello-world").join("index.md");

        let url = public_url(&root, prefix, &original).expect("url");
        let relative = url
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .expect("prefix present");

        assert_eq!(root.join(relative), original);
    }
}
