//! Regenerate an RSS 2.0 document from a notice envelope.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use askama::Template;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::{error, info};

use crate::config::FeedConfig;
use crate::dates::{parse_first, ENTRY_DATE_PATTERNS};
use crate::error::RegenerateError;
use crate::notice::{NoticeRecord, ResultEnvelope, LAST_UPDATED_FORMAT};

const FEED_LOGO: &str =
    "https://upload.wikimedia.org/wikipedia/commons/thumb/4/43/Feed-icon.svg/128px-Feed-icon.svg.png";
const UNTITLED: &str = "제목 없음";
const UNKNOWN: &str = "정보 없음";

#[derive(Template)]
#[template(path = "feed.xml")]
pub struct FeedTemplate<'a> {
    pub title: String,
    pub description: String,
    pub site_url: &'a str,
    pub self_link: &'a str,
    pub logo: &'a str,
    pub last_build_date: String,
    pub entries: Vec<FeedEntry>,
}

/// One `<item>`, fully formatted.
pub struct FeedEntry {
    pub id: String,
    pub title: String,
    pub link: String,
    pub summary: String,
    pub content: String,
    pub author: String,
    pub pub_date: String,
}

#[derive(Template)]
#[template(path = "feed_entry.html")]
struct EntryBodyTemplate<'a> {
    title: &'a str,
    author: &'a str,
    date: &'a str,
    views: &'a str,
    link: &'a str,
}

fn non_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W").expect("valid slug regex"))
}

/// Replace every non-word character with `-`.
pub fn slugify(title: &str) -> String {
    non_word_regex().replace_all(title, "-").into_owned()
}

/// The notice URL, or a stable synthetic id under the site URL.
pub fn entry_id(notice: &NoticeRecord, site_url: &str) -> String {
    if !notice.url.is_empty() {
        return notice.url.clone();
    }
    format!(
        "{}/notice/{}-{}",
        site_url,
        notice.number,
        slugify(&notice.title)
    )
}

/// Publication time of a notice, read as UTC; `now` when the date is unreadable.
pub fn entry_timestamp(date: &str, now: DateTime<Utc>) -> DateTime<Utc> {
    parse_first(date, ENTRY_DATE_PATTERNS)
        .map(|parsed| parsed.and_utc())
        .unwrap_or(now)
}

/// `"<source>_feed.xml"` with dots and spaces in the source replaced.
pub fn default_output_name(source: &str) -> String {
    format!("{}_feed.xml", source.replace(['.', ' '], "_"))
}

/// RFC 822 date as RSS readers expect it, always in UTC.
fn rfc822(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S +0000").to_string()
}

fn non_empty<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() {
        fallback
    } else {
        value
    }
}

fn build_entry(
    notice: &NoticeRecord,
    site_url: &str,
    now: DateTime<Utc>,
) -> Result<FeedEntry, askama::Error> {
    let title = non_empty(&notice.title, UNTITLED);
    let link = non_empty(&notice.url, site_url);

    let content = EntryBodyTemplate {
        title,
        author: non_empty(&notice.author, UNKNOWN),
        date: non_empty(&notice.date, UNKNOWN),
        views: non_empty(&notice.views, UNKNOWN),
        link,
    }
    .render()?;

    Ok(FeedEntry {
        id: entry_id(notice, site_url),
        title: title.to_string(),
        link: link.to_string(),
        summary: format!("{} - {}", title, notice.date),
        content,
        author: notice.author.clone(),
        pub_date: rfc822(entry_timestamp(&notice.date, now)),
    })
}

/// Render the RSS document for an envelope, one item per notice in order.
pub fn render_feed(
    envelope: &ResultEnvelope,
    self_link: &str,
    now: DateTime<Utc>,
) -> Result<String, RegenerateError> {
    let meta = &envelope.meta;
    let last_updated = NaiveDateTime::parse_from_str(&meta.last_updated, LAST_UPDATED_FORMAT)?;

    let entries = envelope
        .notices
        .iter()
        .map(|notice| build_entry(notice, &meta.url, now))
        .collect::<Result<Vec<_>, _>>()?;

    let feed = FeedTemplate {
        title: format!("{} 공지사항", meta.source),
        description: format!("{} 공지사항 자동 피드", meta.source),
        site_url: &meta.url,
        self_link,
        logo: FEED_LOGO,
        last_build_date: rfc822(last_updated.and_utc()),
        entries,
    };
    Ok(feed.render()?)
}

/// Read an envelope from `json_path` and write its RSS document.
///
/// Returns the written path, or `None` after logging when anything fails.
/// The document is rendered completely before the file is touched.
pub fn regenerate_feed(
    json_path: &Path,
    output: Option<&Path>,
    self_link: Option<&str>,
    settings: &FeedConfig,
) -> Option<PathBuf> {
    let span = tracing::info_span!("feed", input = %json_path.display());
    let _enter = span.enter();

    match write_feed(json_path, output, self_link, settings) {
        Ok(path) => {
            info!("RSS feed written to {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("RSS feed generation failed: {}", e);
            None
        }
    }
}

fn write_feed(
    json_path: &Path,
    output: Option<&Path>,
    self_link: Option<&str>,
    settings: &FeedConfig,
) -> Result<PathBuf, RegenerateError> {
    let json = std::fs::read_to_string(json_path).map_err(|source| RegenerateError::Read {
        path: json_path.display().to_string(),
        source,
    })?;
    let envelope = ResultEnvelope::from_json(&json)?;

    let output = match output {
        Some(path) => path.to_path_buf(),
        None => settings
            .output_dir
            .join(default_output_name(&envelope.meta.source)),
    };

    let self_link = match self_link {
        Some(link) => link.to_string(),
        None => {
            let file_name = output
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{}/{}", settings.base_url.trim_end_matches('/'), file_name)
        }
    };

    let xml = render_feed(&envelope, &self_link, Utc::now())?;
    std::fs::write(&output, xml).map_err(|source| RegenerateError::Write {
        path: output.display().to_string(),
        source,
    })?;

    Ok(output)
}
