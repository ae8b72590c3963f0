//! Domain entities handed to the metadata repository after ingestion.

use std::path::PathBuf;

use crate::domain::front_matter::FrontMatter;

/// Descriptor of a post directory placed under the storage root.
///
/// The files it points at are written once by a successful ingestion and
/// never mutated afterwards; removal goes through the delete primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostContentRecord {
    pub slug: String,
    pub root_path: PathBuf,
    pub index_document_path: PathBuf,
    /// Path of the hero image relative to `root_path`, `/`-separated.
    pub hero_relative_path: Option<String>,
    pub front_matter: FrontMatter,
    /// Hex-encoded SHA-256 of the uploaded archive.
    pub source_checksum: String,
}

impl PostContentRecord {
    /// Absolute path of the hero image, if one was resolved.
    pub fn hero_path(&self) -> Option<PathBuf> {
        self.hero_relative_path
            .as_deref()
            .map(|relative| self.root_path.join(relative))
    }

    /// Title from the front matter, falling back to one derived from the slug.
    pub fn display_title(&self) -> String {
        self.front_matter
            .title
            .clone()
            .unwrap_or_else(|| title_from_slug(&self.slug))
    }
}

/// Turn `my-first-post` into `My First Post`.
pub fn title_from_slug(slug: &str) -> String {
    slug.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
