//! Google News RSS adapter.
//!
//! Polls one feed per configured edition. Topic categories emit the raw
//! headline as a topic attribution for the extractor; `business` counts
//! headlines against the edition's country.
//!
//! Search feeds take a `when:` operator and are fetched per period. Top
//! stories and section feeds only ever list current headlines.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pulse_core::{Attribution, Catalog, RankingCategory, Signal, TimeWindow};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Url};

use crate::adapter::{settle, ProviderAdapter};
use crate::error::ProviderError;
use crate::http::{endpoint, get_text, parse_base_url};

pub const ID: &str = "google_news";

const DEFAULT_BASE_URL: &str = "https://news.google.com/";
const MAX_ITEMS_PER_FEED: usize = 100;

const CATEGORIES: &[RankingCategory] = &[
    RankingCategory::Trending,
    RankingCategory::Celebrity,
    RankingCategory::Gossip,
    RankingCategory::Funny,
    RankingCategory::Sports,
    RankingCategory::Business,
];

/// Which feed a category reads.
enum Feed {
    TopStories,
    Section(&'static str),
    Search(&'static str),
}

fn feed_for(category: RankingCategory) -> Option<Feed> {
    match category {
        RankingCategory::Trending => Some(Feed::TopStories),
        RankingCategory::Celebrity => Some(Feed::Section("ENTERTAINMENT")),
        RankingCategory::Sports => Some(Feed::Section("SPORTS")),
        RankingCategory::Business => Some(Feed::Section("BUSINESS")),
        RankingCategory::Gossip => Some(Feed::Search("celebrity gossip OR rumors OR feud")),
        RankingCategory::Funny => Some(Feed::Search("funny OR hilarious OR viral video")),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RssItem {
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
}

pub struct GoogleNewsAdapter {
    client: Client,
    base_url: Url,
    reliability: f64,
    catalog: Arc<Catalog>,
}

impl GoogleNewsAdapter {
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] only if the built-in URL is broken.
    pub fn new(client: Client, reliability: f64, catalog: Arc<Catalog>) -> Result<Self, ProviderError> {
        Self::with_base_url(client, reliability, catalog, DEFAULT_BASE_URL)
    }

    /// Creates an adapter against a custom base URL (for wiremock tests).
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        client: Client,
        reliability: f64,
        catalog: Arc<Catalog>,
        base_url: &str,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            client,
            base_url: parse_base_url(base_url)?,
            reliability,
            catalog,
        })
    }

    fn feed_url(&self, feed: &Feed, edition: &str, window: &TimeWindow) -> Result<Url, ProviderError> {
        let edition = edition.to_uppercase();
        let hl = format!("en-{edition}");
        let ceid = format!("{edition}:en");
        let locale = [("hl", hl.as_str()), ("gl", edition.as_str()), ("ceid", ceid.as_str())];
        match feed {
            Feed::TopStories => endpoint(&self.base_url, "rss", &locale),
            Feed::Section(topic) => endpoint(
                &self.base_url,
                &format!("rss/headlines/section/topic/{topic}"),
                &locale,
            ),
            Feed::Search(q) => {
                let days = (window.end - window.start).num_days().max(1);
                let q = format!("{q} when:{days}d");
                let mut query = vec![("q", q.as_str())];
                query.extend_from_slice(&locale);
                endpoint(&self.base_url, "rss/search", &query)
            }
        }
    }

    async fn fetch_edition(
        &self,
        feed: &Feed,
        edition: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RssItem>, ProviderError> {
        let url = self.feed_url(feed, edition, window)?;
        let body = get_text(&self.client, url).await?;
        parse_rss_items(&body, MAX_ITEMS_PER_FEED)
    }

    fn item_signals(&self, window: &TimeWindow, edition: &str, items: Vec<RssItem>) -> Vec<Signal> {
        items
            .into_iter()
            .filter_map(|item| {
                let observed_at = item.published_at?;
                if !window.contains(observed_at) {
                    return None;
                }
                let attribution = if window.category == RankingCategory::Business {
                    Attribution::country(&edition.to_uppercase())
                } else {
                    Attribution::Topic(item.title.clone())
                };
                Some(Signal {
                    provider: ID.to_string(),
                    category: window.category,
                    title: item.title,
                    magnitude: Some(1.0),
                    reliability: self.reliability,
                    observed_at,
                    attribution,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProviderAdapter for GoogleNewsAdapter {
    fn id(&self) -> &'static str {
        ID
    }

    fn categories(&self) -> &'static [RankingCategory] {
        CATEGORIES
    }

    fn windowed(&self, category: RankingCategory) -> bool {
        matches!(feed_for(category), Some(Feed::Search(_)))
    }

    async fn fetch(&self, window: &TimeWindow) -> Result<Vec<Signal>, ProviderError> {
        let Some(feed) = feed_for(window.category) else {
            return Ok(Vec::new());
        };

        let mut signals = Vec::new();
        let mut errors = Vec::new();
        for edition in &self.catalog.editions {
            match self.fetch_edition(&feed, edition, window).await {
                Ok(items) => signals.extend(self.item_signals(window, edition, items)),
                Err(e) => {
                    tracing::debug!(provider = ID, edition = %edition, error = %e, "edition fetch failed");
                    errors.push(e);
                }
            }
        }
        settle(ID, signals, errors)
    }
}

/// Parse RSS `<item>`s into titles and publication times.
///
/// Google News appends " - Publisher" to every headline; it is stripped so
/// outlet names never surface as topics.
///
/// # Errors
///
/// Returns [`ProviderError::Malformed`] if the XML is malformed.
pub(crate) fn parse_rss_items(xml: &str, max_items: usize) -> Result<Vec<RssItem>, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut items = Vec::new();
    let mut in_item = false;
    let mut current_tag = String::new();
    let mut title = String::new();
    let mut pub_date = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = std::str::from_utf8(e.name().as_ref())
                    .unwrap_or("")
                    .to_string();
                if name == "item" {
                    in_item = true;
                    title.clear();
                    pub_date.clear();
                }
                current_tag = name;
            }
            Ok(Event::End(e)) => {
                let raw = e.name();
                let name = std::str::from_utf8(raw.as_ref()).unwrap_or("");
                if name == "item" && in_item {
                    in_item = false;
                    let headline = strip_publisher(&title);
                    if !headline.is_empty() {
                        items.push(RssItem {
                            title: headline.to_string(),
                            published_at: DateTime::parse_from_rfc2822(pub_date.trim())
                                .ok()
                                .map(|d| d.with_timezone(&Utc)),
                        });
                        if items.len() >= max_items {
                            break;
                        }
                    }
                }
                current_tag.clear();
            }
            Ok(Event::Text(e)) => {
                if in_item {
                    let text = e.unescape().unwrap_or_default().into_owned();
                    match current_tag.as_str() {
                        "title" => title = text,
                        "pubDate" => pub_date = text,
                        _ => {}
                    }
                }
            }
            Ok(Event::CData(e)) => {
                if in_item && current_tag == "title" {
                    title = String::from_utf8_lossy(e.as_ref()).into_owned();
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ProviderError::malformed("google news rss", e)),
            _ => {}
        }
    }

    Ok(items)
}

fn strip_publisher(title: &str) -> &str {
    let title = title.trim();
    match title.rfind(" - ") {
        Some(idx) if idx > 0 => title[..idx].trim_end(),
        _ => title,
    }
}
