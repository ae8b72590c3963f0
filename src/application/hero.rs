//! Resolution of the representative ("hero") image of a post.

use std::fs;
use std::path::{Component, Path};

use tracing::debug;

use crate::domain::front_matter::FrontMatter;

const ASSETS_DIR: &str = "assets";
const HERO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Determine the hero image of the post rooted at `content_root`.
///
/// Resolution order, first hit wins:
/// 1. the `hero` front matter reference, when it names an existing file;
/// 2. the lexicographically first `.jpg`/`.jpeg`/`.png` file directly inside
///    `assets/`;
/// 3. nothing.
///
/// The returned path is relative to `content_root` and `/`-separated. A hero
/// reference that is missing or points outside the post is dropped silently.
pub fn resolve_hero(content_root: &Path, front_matter: &FrontMatter) -> Option<String> {
    if let Some(reference) = front_matter.hero.as_deref() {
        match normalize_reference(reference) {
            Some(relative) if content_root.join(&relative).is_file() => return Some(relative),
            _ => debug!(hero = reference, "ignoring unresolvable hero reference"),
        }
    }

    first_asset_image(content_root)
}

/// Strip leading `./`, `/` and `\`, switch to forward slashes and refuse
/// anything that could climb out of the post directory.
fn normalize_reference(reference: &str) -> Option<String> {
    let mut trimmed = reference.trim();
    loop {
        let next = trimmed
            .strip_prefix("./")
            .or_else(|| trimmed.strip_prefix(".\\"))
            .or_else(|| trimmed.strip_prefix('/'))
            .or_else(|| trimmed.strip_prefix('\\'));
        match next {
            Some(rest) => trimmed = rest,
            None => break,
        }
    }

    let relative = trimmed.replace('\\', "/");
    if relative.is_empty() {
        return None;
    }

    let confined = Path::new(&relative)
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    confined.then_some(relative)
}

fn first_asset_image(content_root: &Path) -> Option<String> {
    let assets = content_root.join(ASSETS_DIR);
    let entries = fs::read_dir(&assets).ok()?;

    let mut candidates: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| has_hero_extension(name))
        .collect();

    // Directory iteration order is platform dependent; byte-wise name order is not.
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .map(|name| format!("{ASSETS_DIR}/{name}"))
}

fn has_hero_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| {
            HERO_EXTENSIONS
                .iter()
                .any(|candidate| extension.eq_ignore_ascii_case(candidate))
        })
}
