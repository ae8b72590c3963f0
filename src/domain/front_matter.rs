//! Tolerant parser for the `---` delimited metadata block of an entry document.
//!
//! Parsing never fails. Anything the parser cannot make sense of degrades to
//! an absent field: a missing opening delimiter yields an empty
//! [`FrontMatter`], an unparseable `date` is dropped, and tag syntaxes other
//! than the inline `[a, b]` list are ignored.

use time::{
    OffsetDateTime, PrimitiveDateTime, format_description::FormatItem,
    format_description::well_known::Rfc3339, macros::format_description,
};

const DELIMITER: &str = "---";
const BYTE_ORDER_MARK: char = '\u{feff}';

const DATE_ONLY: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");
const DATE_TIME_FORMATS: &[&[FormatItem<'static>]] = &[
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    format_description!("[year]-[month]-[day] [hour]:[minute]"),
    format_description!("[year]-[month]-[day]T[hour]:[minute]"),
];

/// Metadata extracted from an entry document. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub date: Option<OffsetDateTime>,
    pub hero: Option<String>,
    pub tags: Option<Vec<String>>,
}

impl FrontMatter {
    /// Parse the metadata block at the start of `document`.
    pub fn parse(document: &str) -> Self {
        let document = document.strip_prefix(BYTE_ORDER_MARK).unwrap_or(document);
        let mut lines = document.lines();

        match lines.next() {
            Some(first) if first.trim() == DELIMITER => {}
            _ => return Self::default(),
        }

        let mut front_matter = Self::default();
        // An unterminated block still counts: everything read so far is metadata.
        for line in lines.take_while(|line| line.trim() != DELIMITER) {
            front_matter.apply_line(line);
        }
        front_matter
    }

    /// Return whether no field was populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn apply_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once(':') else {
            return;
        };

        let key = key.trim().to_ascii_lowercase();
        let raw_value = value.trim();

        match key.as_str() {
            "title" => self.title = text_value(raw_value),
            "summary" | "description" => self.summary = text_value(raw_value),
            "hero" => self.hero = text_value(raw_value),
            "date" => {
                if let Some(date) = text_value(raw_value).and_then(|value| parse_date(&value)) {
                    self.date = Some(date);
                }
            }
            "tags" => {
                if let Some(tags) = parse_inline_list(raw_value) {
                    self.tags = Some(tags);
                }
            }
            _ => {}
        }
    }
}

fn text_value(raw: &str) -> Option<String> {
    let value = unquote(raw).trim();
    (!value.is_empty()).then(|| value.to_string())
}

/// Strip one layer of matching single or double quotes.
fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_inline_list(raw: &str) -> Option<Vec<String>> {
    let inner = raw.strip_prefix('[')?.strip_suffix(']')?;
    let tags = inner
        .split(',')
        .map(|item| unquote(item.trim()).trim())
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    Some(tags)
}

fn parse_date(value: &str) -> Option<OffsetDateTime> {
    if let Ok(timestamp) = OffsetDateTime::parse(value, &Rfc3339) {
        return Some(timestamp);
    }

    for format in DATE_TIME_FORMATS {
        if let Ok(timestamp) = PrimitiveDateTime::parse(value, *format) {
            return Some(timestamp.assume_utc());
        }
    }

    time::Date::parse(value, DATE_ONLY)
        .ok()
        .map(|date| date.midnight().assume_utc())
}
