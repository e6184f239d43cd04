pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod feed;
pub mod geo;
pub mod models;
pub mod news;
pub mod session;
pub mod transport;
pub mod weather;

pub(crate) mod reveal;

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;

use crate::config::Config;
use crate::error::Result;
use crate::feed::GdacsFeed;
use crate::geo::{Locator, StaticLocator};
use crate::models::ChatEvent;
use crate::news::{NewsApiClient, NewsProvider};
use crate::session::ChatSession;
use crate::transport::{Completion, GeminiTransport};
use crate::weather::{OpenWeatherClient, WeatherProvider};

/// Process-wide assistant: owns one instance of every adapter and mints
/// independent chat sessions. Construction validates provider credentials,
/// so a misconfigured deployment fails here rather than mid-conversation.
pub struct Assistant {
    config: Config,
    completion: Arc<dyn Completion>,
    weather: Arc<dyn WeatherProvider>,
    news: Arc<dyn NewsProvider>,
    locator: Arc<dyn Locator>,
    feed: Arc<GdacsFeed>,
}

impl Assistant {
    pub fn new(config: Config) -> Result<Self> {
        let completion = Arc::new(GeminiTransport::new(&config.gemini)?);
        let weather = Arc::new(OpenWeatherClient::new(&config.weather)?);
        let news = Arc::new(NewsApiClient::new(&config.news)?);
        let locator = Arc::new(StaticLocator::new(&config.location));
        let feed = Arc::new(GdacsFeed::new(&config.feed));

        Ok(Self {
            config,
            completion,
            weather,
            news,
            locator,
            feed,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Start a fresh conversation. Each session carries its own message
    /// list and response cache; nothing is shared between sessions.
    pub fn new_session(&self) -> (ChatSession, UnboundedReceiver<ChatEvent>) {
        ChatSession::new(
            &self.config,
            Arc::clone(&self.completion),
            Arc::clone(&self.weather),
            Arc::clone(&self.news),
            Arc::clone(&self.locator),
        )
    }

    /// Latest filtered news articles for the dedicated listing surface.
    pub async fn latest_news(&self) -> Result<Vec<crate::models::NewsArticle>> {
        self.news
            .fetch("disaster OR weather", self.config.news.listing_page_size)
            .await
    }

    /// Current GDACS alerts, proximity-filtered when a location is
    /// configured.
    pub async fn current_alerts(&self) -> Result<Vec<feed::FeedItem>> {
        let items = self.feed.fetch().await?;
        match self.locator.locate().await {
            Ok(origin) => Ok(feed::filter_within(
                items,
                origin,
                self.config.feed.radius_km,
            )),
            Err(_) => Ok(items),
        }
    }
}
