use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::config::FeedConfig;
use crate::error::{AssistError, Result};
use crate::models::Coordinates;

/// GDACS publishes a recurring informational item that carries no alert
/// content; it never reaches the renderer.
const INFO_ITEM_MARKER: &str = "GDACS RSS information";

const EARTH_RADIUS_KM: f64 = 6371.0;

/// One disaster alert from the GDACS feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    pub published: Option<DateTime<Utc>>,
    pub creator: String,
    pub point: Option<Coordinates>,
}

/// GDACS RSS client. The feed needs no credential; availability problems
/// surface as upstream errors for the caller to soften.
pub struct GdacsFeed {
    client: Client,
    url: String,
}

impl GdacsFeed {
    pub fn new(cfg: &FeedConfig) -> Self {
        Self {
            client: Client::new(),
            url: cfg.url.clone(),
        }
    }

    pub async fn fetch(&self) -> Result<Vec<FeedItem>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| AssistError::Upstream(format!("feed request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::Upstream(format!(
                "feed request failed with status {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AssistError::Upstream(format!("failed to read feed body: {e}")))?;
        parse_feed(&body)
    }
}

/// Parse an RSS document into alert items, dropping the informational item.
pub fn parse_feed(xml: &str) -> Result<Vec<FeedItem>> {
    let rss: RssDocument = quick_xml::de::from_str(xml)
        .map_err(|e| AssistError::Parse(format!("failed to parse feed XML: {e}")))?;

    let items = rss
        .channel
        .items
        .into_iter()
        .filter(|item| {
            !item
                .title
                .as_deref()
                .is_some_and(|t| t.contains(INFO_ITEM_MARKER))
        })
        .map(|item| FeedItem {
            title: item.title.unwrap_or_else(|| "Untitled Update".to_string()),
            link: item.link.unwrap_or_default(),
            published: item
                .pub_date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc2822(d).ok())
                .map(|d| d.with_timezone(&Utc)),
            creator: item.creator.unwrap_or_else(|| "GDACS".to_string()),
            point: item.point.as_deref().and_then(parse_point),
        })
        .collect();

    Ok(items)
}

/// `georss:point` is "lat lon" separated by whitespace.
fn parse_point(raw: &str) -> Option<Coordinates> {
    let mut parts = raw.split_whitespace();
    let lat = parts.next()?.parse().ok()?;
    let lon = parts.next()?.parse().ok()?;
    Some(Coordinates { lat, lon })
}

/// Great-circle distance between two positions, in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().asin()
}

/// Keep only geolocated alerts within `radius_km` of `origin`.
pub fn filter_within(items: Vec<FeedItem>, origin: Coordinates, radius_km: f64) -> Vec<FeedItem> {
    items
        .into_iter()
        .filter(|item| {
            item.point
                .is_some_and(|p| haversine_km(origin, p) <= radius_km)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RssDocument {
    channel: RssChannel,
}

#[derive(Debug, Deserialize)]
struct RssChannel {
    #[serde(rename = "item", default)]
    items: Vec<RssItem>,
}

#[derive(Debug, Deserialize)]
struct RssItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    #[serde(rename = "creator")]
    creator: Option<String>,
    #[serde(rename = "point")]
    point: Option<String>,
}
