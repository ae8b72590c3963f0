//! Utilities for turning arbitrary text into URL-safe post slugs.
//!
//! Slugification bridges ASCII slugification (`slug` crate) with Chinese
//! transliteration (`pinyin` crate) so inputs like “基线对齐” become
//! `ji-xian-dui-qi`. Inputs that reduce to nothing fall back to an opaque
//! random identifier, so [`slugify_or_random`] never fails.

use pinyin::{Pinyin, ToPinyin};
use slug::slugify;
use uuid::Uuid;

/// Upper bound on the length of a derived slug, before any collision suffix.
pub const MAX_SLUG_LEN: usize = 96;

/// Derive a slug from human-readable text.
///
/// The output only contains `[a-z0-9-]`, never starts or ends with a hyphen
/// and never contains two consecutive hyphens. When nothing representable
/// remains, a random identifier drawn from the OS random source is returned.
pub fn slugify_or_random(input: &str) -> String {
    derive_slug(input).unwrap_or_else(random_slug)
}

/// Derive a slug from the provided text, returning `None` when the text has no
/// representable characters.
pub fn derive_slug(input: &str) -> Option<String> {
    if input.trim().is_empty() {
        return None;
    }

    let transliterated = transliterate_to_ascii(input);
    let candidate = truncate_slug(slugify(&transliterated));

    (!candidate.is_empty()).then_some(candidate)
}

/// Generate an opaque identifier that still satisfies the slug grammar.
pub fn random_slug() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Append a collision counter to a base slug (`my-post` → `my-post-2`).
pub fn with_suffix(base: &str, attempt: usize) -> String {
    format!("{base}-{attempt}")
}

/// Return whether `candidate` matches `^[a-z0-9]+(-[a-z0-9]+)*$`.
pub fn is_valid_slug(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.split('-').all(|segment| {
            !segment.is_empty()
                && segment
                    .bytes()
                    .all(|byte| byte.is_ascii_lowercase() || byte.is_ascii_digit())
        })
}

fn truncate_slug(mut slug: String) -> String {
    if slug.len() > MAX_SLUG_LEN {
        // slug output is pure ASCII, so any byte index is a char boundary.
        slug.truncate(MAX_SLUG_LEN);
        let trimmed = slug.trim_end_matches('-').len();
        slug.truncate(trimmed);
    }
    slug
}

fn transliterate_to_ascii(input: &str) -> String {
    let mut output = String::with_capacity(input.len());

    for ch in input.chars() {
        if ch.is_ascii() {
            output.push(ch);
            continue;
        }

        match ch.to_pinyin() {
            Some(py) => append_pinyin(&mut output, py),
            None if ch.is_whitespace() => output.push(' '),
            None => {
                // Preserve unhandled characters so slugify can decide how to filter them.
                output.push(ch);
            }
        }
    }

    output
}

fn append_pinyin(buffer: &mut String, pinyin: Pinyin) {
    if !buffer.is_empty() && !buffer.ends_with(' ') {
        buffer.push(' ');
    }
    buffer.push_str(pinyin.plain());
}
