//! School notice crawling: feed XML in, result envelope out.

use chrono::{Local, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn, Instrument};

use crate::dates::normalize_notice_date;
use crate::error::{FeedParseError, ItemError};
use crate::fetcher::Fetcher;

pub const RSS1_NAMESPACE: &str = "http://purl.org/rss/1.0/";
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";
pub const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";

/// Format of `meta.last_updated`
pub const LAST_UPDATED_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One announcement. Every field is a string on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeRecord {
    pub number: String,
    pub title: String,
    pub author: String,
    pub date: String,
    pub views: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub total_count: usize,
    pub last_updated: String,
    pub source: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The `{notices, meta}` document handed from the crawler to the feed regenerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub notices: Vec<NoticeRecord>,
    pub meta: Meta,
}

impl ResultEnvelope {
    pub fn success(
        notices: Vec<NoticeRecord>,
        source: &str,
        url: &str,
        last_updated: NaiveDateTime,
    ) -> Self {
        Self {
            meta: Meta {
                total_count: notices.len(),
                last_updated: last_updated.format(LAST_UPDATED_FORMAT).to_string(),
                source: source.to_string(),
                url: url.to_string(),
                error: None,
            },
            notices,
        }
    }

    pub fn failure(source: &str, url: &str, error: String, last_updated: NaiveDateTime) -> Self {
        Self {
            notices: Vec::new(),
            meta: Meta {
                total_count: 0,
                last_updated: last_updated.format(LAST_UPDATED_FORMAT).to_string(),
                source: source.to_string(),
                url: url.to_string(),
                error: Some(error),
            },
        }
    }

    pub fn is_error(&self) -> bool {
        self.meta.error.is_some()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Site name shown for a feed: the URL host without a leading `www.`.
pub fn site_name_from_url(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return "unknown_site".to_string();
    };
    let Some(host) = parsed.host_str() else {
        return "unknown_site".to_string();
    };

    let host = host.strip_prefix("www.").unwrap_or(host);
    match parsed.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// `"<source>_notices_api.json"`, with characters unfit for file names replaced.
pub fn envelope_file_name(source: &str) -> String {
    format!("{}_notices_api.json", source.replace(['.', ' ', ':', '/'], "_"))
}

/// Fetch a feed and turn it into an envelope. Never fails: request and
/// document errors end up in `meta.error`.
pub async fn crawl_notices(
    fetcher: &Fetcher,
    url: &str,
    site_name: Option<&str>,
) -> ResultEnvelope {
    let site = site_name
        .map(str::to_string)
        .unwrap_or_else(|| site_name_from_url(url));
    let span = tracing::info_span!("notices", site = %site);

    async {
        info!("Crawling notices from {}", url);

        let body = match fetcher.get_text(url).await {
            Ok(body) => body,
            Err(e) => {
                error!("Request failed: {}", e);
                return ResultEnvelope::failure(&site, url, e.to_string(), now());
            }
        };

        match parse_feed(&body, url) {
            Ok(notices) => {
                info!("Crawled {} notices", notices.len());
                ResultEnvelope::success(notices, &site, url, now())
            }
            Err(e) => {
                let message = format!("RSS XML parse error: {}", e);
                error!("{}", message);
                ResultEnvelope::failure(&site, url, message, now())
            }
        }
    }
    .instrument(span)
    .await
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Parse feed XML into notices, in feed order.
///
/// Items are `item` (RSS 2.0), else `entry` (Atom), else `item` in the RSS 1.0
/// namespace. Items that cannot become a notice are skipped.
pub fn parse_feed(xml: &str, feed_url: &str) -> Result<Vec<NoticeRecord>, FeedParseError> {
    let root = Element::parse(xml)?;

    let items = ITEM_SELECTORS
        .iter()
        .map(|selector| root.descendants(selector))
        .find(|items| !items.is_empty())
        .unwrap_or_default();

    let mut notices = Vec::with_capacity(items.len());
    for item in items {
        match parse_item(item, feed_url) {
            Ok(fields) => {
                let number = notices.len() + 1;
                notices.push(fields.into_record(number));
            }
            Err(e) => warn!("Skipping feed item: {}", e),
        }
    }

    Ok(notices)
}

struct ItemFields {
    title: String,
    link: String,
    date: String,
    author: String,
}

impl ItemFields {
    fn into_record(self, number: usize) -> NoticeRecord {
        NoticeRecord {
            number: number.to_string(),
            title: self.title,
            author: self.author,
            date: normalize_notice_date(&self.date),
            views: "0".to_string(),
            url: self.link,
        }
    }
}

/// Item fields are read from the item's own namespace; only `dc:date`,
/// `dc:creator` and Atom links are taken from elsewhere.
fn parse_item(item: &Element, feed_url: &str) -> Result<ItemFields, ItemError> {
    let title = item.child_text("title").unwrap_or_default();

    let link = item
        .child_text("link")
        .or_else(|| item.atom_link())
        .map(|link| resolve_link(&link, feed_url))
        .unwrap_or_default();

    if title.is_empty() && link.is_empty() {
        return Err(ItemError::Empty);
    }

    let date = ["pubDate", "published", "updated"]
        .iter()
        .find_map(|name| item.child_text(name))
        .or_else(|| item.child_text_in(Some(DC_NAMESPACE), "date"))
        .unwrap_or_default();

    let author = item
        .child_text("author")
        .or_else(|| item.child("author").and_then(|a| a.child_text("name")))
        .or_else(|| item.child_text_in(Some(DC_NAMESPACE), "creator"))
        .unwrap_or_default();

    Ok(ItemFields {
        title,
        link,
        date,
        author,
    })
}

/// Resolve a relative link against the feed URL's scheme and host.
pub fn resolve_link(link: &str, feed_url: &str) -> String {
    if link.is_empty() || Url::parse(link).is_ok() {
        return link.to_string();
    }

    Url::parse(feed_url)
        .ok()
        .and_then(|feed| Url::parse(&feed.origin().ascii_serialization()).ok())
        .and_then(|origin| origin.join(link).ok())
        .map(|resolved| resolved.to_string())
        .unwrap_or_else(|| link.to_string())
}

enum ItemSelector {
    /// Local name without a namespace
    Unqualified(&'static str),
    /// Local name in any namespace
    Local(&'static str),
    Qualified(&'static str, &'static str),
}

const ITEM_SELECTORS: &[ItemSelector] = &[
    ItemSelector::Unqualified("item"),
    ItemSelector::Local("entry"),
    ItemSelector::Qualified(RSS1_NAMESPACE, "item"),
];

impl ItemSelector {
    fn matches(&self, element: &Element) -> bool {
        match *self {
            ItemSelector::Unqualified(local) => element.is(None, local),
            ItemSelector::Local(local) => element.local == local,
            ItemSelector::Qualified(ns, local) => element.is(Some(ns), local),
        }
    }
}

/// Minimal element tree; only what notice extraction needs.
#[derive(Debug, Default)]
struct Element {
    namespace: Option<String>,
    local: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
}

impl Element {
    fn parse(xml: &str) -> Result<Element, FeedParseError> {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            let (ns, event) = reader.read_resolved_event()?;
            let namespace = match ns {
                ResolveResult::Bound(Namespace(uri)) => {
                    Some(String::from_utf8_lossy(uri).into_owned())
                }
                _ => None,
            };

            match event {
                Event::Start(start) => {
                    if stack.is_empty() && root.is_some() {
                        return Err(FeedParseError::OutsideRoot);
                    }
                    stack.push(Element::open(namespace, &start)?);
                }
                Event::Empty(start) => {
                    let element = Element::open(namespace, &start)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None if root.is_none() => root = Some(element),
                        None => return Err(FeedParseError::OutsideRoot),
                    }
                }
                Event::End(_) => {
                    // Mismatched names are rejected by the reader itself
                    if let Some(element) = stack.pop() {
                        match stack.last_mut() {
                            Some(parent) => parent.children.push(element),
                            None => root = Some(element),
                        }
                    }
                }
                Event::Text(text) => {
                    let text = text.unescape()?;
                    match stack.last_mut() {
                        Some(current) => current.text.push_str(&text),
                        None if text.trim().is_empty() => {}
                        None => return Err(FeedParseError::OutsideRoot),
                    }
                }
                Event::CData(cdata) => match stack.last_mut() {
                    Some(current) => current.text.push_str(&String::from_utf8_lossy(&cdata)),
                    None => return Err(FeedParseError::OutsideRoot),
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            return Err(FeedParseError::Unclosed(open.local.clone()));
        }
        root.ok_or(FeedParseError::NoRoot)
    }

    fn open(namespace: Option<String>, start: &BytesStart<'_>) -> Result<Element, FeedParseError> {
        let local = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();

        let mut attrs = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value()?.into_owned();
            attrs.push((key, value));
        }

        Ok(Element {
            namespace,
            local,
            attrs,
            ..Default::default()
        })
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn is(&self, namespace: Option<&str>, local: &str) -> bool {
        self.namespace.as_deref() == namespace && self.local == local
    }

    /// First child called `local` in this element's namespace.
    fn child(&self, local: &str) -> Option<&Element> {
        self.child_in(self.namespace.as_deref(), local)
    }

    fn child_in(&self, namespace: Option<&str>, local: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.is(namespace, local))
    }

    /// Trimmed text of the first child called `local`, if non-empty.
    fn child_text(&self, local: &str) -> Option<String> {
        self.child_text_in(self.namespace.as_deref(), local)
    }

    fn child_text_in(&self, namespace: Option<&str>, local: &str) -> Option<String> {
        let text = self.child_in(namespace, local)?.text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }

    /// Atom `<link href="..."/>`, preferring the alternate link.
    fn atom_link(&self) -> Option<String> {
        let own = self.namespace.as_deref();
        self.children
            .iter()
            .filter(|c| c.is(own, "link") || c.is(Some(ATOM_NAMESPACE), "link"))
            .find(|c| matches!(c.attr("rel"), None | Some("alternate")))
            .and_then(|c| c.attr("href"))
            .map(str::to_string)
    }

    fn descendants(&self, selector: &ItemSelector) -> Vec<&Element> {
        let mut found = Vec::new();
        self.collect(selector, &mut found);
        found
    }

    fn collect<'a>(&'a self, selector: &ItemSelector, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if selector.matches(child) {
                found.push(child);
            }
            child.collect(selector, found);
        }
    }
}
