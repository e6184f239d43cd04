use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const PLACEHOLDER_KEY: &str = "PLACEHOLDER_API_KEY";

/// Main configuration structure for rescue-assist
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub assistant: AssistantConfig,
    pub cache: CacheConfig,
    pub gemini: GeminiConfig,
    pub weather: WeatherConfig,
    pub news: NewsConfig,
    pub feed: FeedConfig,
    pub location: LocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    pub name: String,
    pub greeting: String,
    /// Delay between reveal ticks, one character each.
    pub typing_speed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub weather_ttl_seconds: u64,
    pub news_ttl_seconds: u64,
}

impl CacheConfig {
    pub fn weather_ttl(&self) -> Duration {
        Duration::from_secs(self.weather_ttl_seconds)
    }

    pub fn news_ttl(&self) -> Duration {
        Duration::from_secs(self.news_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsConfig {
    pub api_key: String,
    /// Articles returned to the chat path.
    pub page_size: usize,
    /// Articles returned to the dedicated news listing.
    pub listing_page_size: usize,
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    /// Proximity filter radius for geolocated alerts.
    pub radius_km: f64,
}

/// Fixed coordinates standing in for a granted geolocation permission.
/// Leaving both unset behaves like a denied permission prompt.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LocationConfig {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl Config {
    /// Load configuration from file with environment variable overrides.
    /// ALWAYS returns a valid config - never fails. Missing API keys are
    /// caught later, when the adapters are constructed.
    pub fn load() -> Self {
        if dotenvy::dotenv().is_ok() {
            tracing::info!("Loaded .env from current directory");
        }

        let config_path =
            env::var("RESCUE_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = if Path::new(&config_path).exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        tracing::info!("Loaded configuration from {}", config_path);
                        config
                    }
                    Err(e) => {
                        tracing::error!(
                            "Failed to parse config file {}: {} - using defaults",
                            config_path,
                            e
                        );
                        Self::default()
                    }
                },
                Err(e) => {
                    tracing::error!(
                        "Failed to read config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            }
        } else {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            Self::default()
        };

        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = env::var("GEMINI_API_KEY") {
            self.gemini.api_key = key;
        }
        if let Ok(model) = env::var("GEMINI_MODEL") {
            self.gemini.model = model;
        }
        if let Ok(key) = env::var("OPENWEATHER_API_KEY") {
            self.weather.api_key = key;
        }
        if let Ok(key) = env::var("NEWS_API_KEY") {
            self.news.api_key = key;
        }
        if let Ok(size) = env::var("RESCUE_NEWS_PAGE_SIZE") {
            if let Ok(n) = size.parse() {
                self.news.page_size = n;
            }
        }
        if let Ok(speed) = env::var("RESCUE_TYPING_SPEED_MS") {
            if let Ok(ms) = speed.parse() {
                self.assistant.typing_speed_ms = ms;
            }
        }
        if let Ok(ttl) = env::var("RESCUE_WEATHER_TTL_SECONDS") {
            if let Ok(secs) = ttl.parse() {
                self.cache.weather_ttl_seconds = secs;
            }
        }
        if let Ok(ttl) = env::var("RESCUE_NEWS_TTL_SECONDS") {
            if let Ok(secs) = ttl.parse() {
                self.cache.news_ttl_seconds = secs;
            }
        }
        if let Ok(url) = env::var("RESCUE_FEED_URL") {
            self.feed.url = url;
        }
        if let Ok(lat) = env::var("RESCUE_LAT") {
            if let Ok(v) = lat.parse() {
                self.location.lat = Some(v);
            }
        }
        if let Ok(lon) = env::var("RESCUE_LON") {
            if let Ok(v) = lon.parse() {
                self.location.lon = Some(v);
            }
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.assistant.typing_speed_ms == 0 {
            return Err("assistant.typing_speed_ms cannot be 0".into());
        }
        if self.cache.weather_ttl_seconds == 0 || self.cache.news_ttl_seconds == 0 {
            return Err("cache freshness windows cannot be 0".into());
        }
        if self.news.page_size == 0 {
            return Err("news.page_size cannot be 0".into());
        }
        if self.feed.radius_km <= 0.0 {
            return Err("feed.radius_km must be positive".into());
        }
        if self.location.lat.is_some() != self.location.lon.is_some() {
            return Err("location requires both lat and lon".into());
        }
        Ok(())
    }

    pub fn typing_speed(&self) -> Duration {
        Duration::from_millis(self.assistant.typing_speed_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assistant: AssistantConfig {
                name: "RescueBot".to_string(),
                greeting: "Hello! I'm RescueBot. How can I assist you with disaster \
                           information or current weather?"
                    .to_string(),
                typing_speed_ms: 40,
            },
            cache: CacheConfig {
                weather_ttl_seconds: 120,
                news_ttl_seconds: 300,
            },
            gemini: GeminiConfig {
                api_key: env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
                    tracing::warn!("GEMINI_API_KEY not set, using placeholder");
                    PLACEHOLDER_KEY.to_string()
                }),
                model: "gemini-pro".to_string(),
            },
            weather: WeatherConfig {
                api_key: env::var("OPENWEATHER_API_KEY").unwrap_or_else(|_| {
                    tracing::warn!("OPENWEATHER_API_KEY not set, using placeholder");
                    PLACEHOLDER_KEY.to_string()
                }),
            },
            news: NewsConfig {
                api_key: env::var("NEWS_API_KEY").unwrap_or_else(|_| {
                    tracing::warn!("NEWS_API_KEY not set, using placeholder");
                    PLACEHOLDER_KEY.to_string()
                }),
                page_size: 3,
                listing_page_size: 6,
                language: "en".to_string(),
            },
            feed: FeedConfig {
                url: "https://www.gdacs.org/rss.aspx".to_string(),
                radius_km: 500.0,
            },
            location: LocationConfig::default(),
        }
    }
}

/// Reject empty or placeholder keys at adapter construction time, so a
/// misconfigured process fails before the first conversation instead of
/// mid-chat.
pub fn require_api_key(key: &str, what: &str) -> crate::error::Result<String> {
    if key.is_empty() || key == PLACEHOLDER_KEY {
        return Err(crate::error::AssistError::Config(format!(
            "{what} API key is not configured"
        )));
    }
    Ok(key.to_string())
}
