use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use common::SourceConfig;
use feed_rs::parser;
use scraper::Html;
use tracing::{debug, info, warn};

use crate::entry::Entry;

/// Decodes a syndication payload (RSS, Atom or JSON Feed) into entries for `source`.
///
/// A payload that cannot be parsed at all yields no entries. Entries without a link
/// are skipped individually. When neither the published nor the updated timestamp is
/// parseable, `now` is used and the entry is flagged with `published_fallback`.
pub fn decode(bytes: &[u8], source: &SourceConfig, now: DateTime<Utc>) -> Vec<Entry> {
    let feed_parser = parser::Builder::new().timestamp_parser(parse_timestamp).build();
    let feed = match feed_parser.parse(bytes) {
        Ok(feed) => feed,
        Err(e) => {
            warn!(source = %source.name, error = %e, "failed to parse feed payload");
            return Vec::new();
        }
    };

    let mut entries = Vec::with_capacity(feed.entries.len());
    for item in feed.entries {
        let Some(link) = item
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .filter(|l| !l.is_empty())
        else {
            debug!(source = %source.name, id = %item.id, "skipping entry without link");
            continue;
        };

        let title = item
            .title
            .map(|t| strip_markup(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "Untitled".to_string());

        let summary = item
            .summary
            .map(|s| s.content)
            .or_else(|| item.content.and_then(|c| c.body))
            .map(|s| strip_markup(&s))
            .unwrap_or_default();

        let (published_at, published_fallback) = match item.published.or(item.updated) {
            Some(ts) => (ts, false),
            None => {
                warn!(source = %source.name, title = %title, "no parseable publish date, using ingestion time");
                (now, true)
            }
        };

        entries.push(Entry {
            title,
            link,
            summary,
            source_name: source.name.clone(),
            language: source.language,
            published_at,
            published_fallback,
        });
    }

    info!(source = %source.name, count = entries.len(), "decoded feed");
    entries
}

/// Offset-free layouts, read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%d %b %Y %H:%M:%S",
    "%d %b %Y %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Lenient timestamp grammar: RFC 2822, RFC 3339, ISO 8601 with a compact offset,
/// then common offset-free layouts and bare dates. Returns `None` when nothing fits.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc2822(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(ts.with_timezone(&Utc));
    }

    // Drop a trailing zone name ("UTC", "GMT") the offset-free layouts cannot read
    let bare = text
        .strip_suffix(" UTC")
        .or_else(|| text.strip_suffix(" GMT"))
        .unwrap_or(text);
    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(bare, format) {
            return Some(Utc.from_utc_datetime(&ts));
        }
    }
    NaiveDate::parse_from_str(bare, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| Utc.from_utc_datetime(&ts))
}

/// Reduces HTML to its text content with whitespace collapsed.
pub fn strip_markup(text: &str) -> String {
    if !text.contains('<') && !text.contains('&') {
        return collapse_whitespace(text);
    }
    let fragment = Html::parse_fragment(text);
    let joined = fragment.root_element().text().collect::<Vec<_>>().join(" ");
    collapse_whitespace(&joined)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
