use std::time::Duration;
use tokio::time::Instant;

use crate::models::NewsArticle;

/// A fetched value plus the moment it was fetched.
#[derive(Debug, Clone)]
struct CachedValue<T> {
    data: T,
    fetched_at: Instant,
}

/// One cache slot. `get` yields the value only while it is fresh; `put`
/// unconditionally overwrites. Stale values are superseded, never deleted.
#[derive(Debug)]
pub struct CacheSlot<T> {
    value: Option<CachedValue<T>>,
    freshness_window: Duration,
}

impl<T> CacheSlot<T> {
    pub fn new(freshness_window: Duration) -> Self {
        Self {
            value: None,
            freshness_window,
        }
    }

    pub fn get(&self) -> Option<&T> {
        let cached = self.value.as_ref()?;
        if Instant::now().duration_since(cached.fetched_at) < self.freshness_window {
            Some(&cached.data)
        } else {
            None
        }
    }

    pub fn put(&mut self, data: T) {
        self.value = Some(CachedValue {
            data,
            fetched_at: Instant::now(),
        });
    }
}

/// Per-session cache of the last successful weather and news lookups,
/// each with its own freshness window. Lives and dies with the session.
#[derive(Debug)]
pub struct ResponseCache {
    pub weather: CacheSlot<String>,
    pub news: CacheSlot<Vec<NewsArticle>>,
}

impl ResponseCache {
    pub fn new(weather_window: Duration, news_window: Duration) -> Self {
        Self {
            weather: CacheSlot::new(weather_window),
            news: CacheSlot::new(news_window),
        }
    }
}
