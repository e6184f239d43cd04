use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::{WeatherConfig, require_api_key};
use crate::error::{AssistError, Result};
use crate::models::{Coordinates, WeatherReport};

const OPENWEATHER_API_BASE: &str = "https://api.openweathermap.org/data/2.5";

/// Current-conditions provider, keyed by coordinates.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, position: Coordinates) -> Result<WeatherReport>;
}

/// OpenWeatherMap client, metric units.
pub struct OpenWeatherClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenWeatherClient {
    pub fn new(cfg: &WeatherConfig) -> Result<Self> {
        let api_key = require_api_key(&cfg.api_key, "OpenWeather")?;
        Ok(Self {
            client: Client::new(),
            api_key,
            base_url: OPENWEATHER_API_BASE.to_string(),
        })
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current(&self, position: Coordinates) -> Result<WeatherReport> {
        let url = format!("{}/weather", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .get(url)
            .query(&[
                ("lat", position.lat.to_string()),
                ("lon", position.lon.to_string()),
                ("appid", self.api_key.clone()),
                ("units", "metric".to_string()),
            ])
            .send()
            .await
            .map_err(|e| AssistError::Upstream(format!("weather request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssistError::Upstream(format!(
                "weather API request failed with status {status}"
            )));
        }

        let data: CurrentWeatherResponse = response
            .json()
            .await
            .map_err(|e| AssistError::Parse(format!("failed to parse weather response: {e}")))?;

        let conditions = data.weather.first().ok_or_else(|| {
            AssistError::Parse("weather response carried no conditions entry".to_string())
        })?;

        tracing::debug!(city = %data.name, "fetched current weather");
        Ok(WeatherReport {
            city: data.name,
            description: conditions.description.clone(),
            icon: conditions.icon.clone(),
            temp_c: data.main.temp,
            humidity: data.main.humidity,
            wind_speed: data.wind.speed,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    name: String,
    weather: Vec<ConditionEntry>,
    main: MainReadings,
    wind: WindReadings,
}

#[derive(Debug, Deserialize)]
struct ConditionEntry {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct WindReadings {
    speed: f64,
}
