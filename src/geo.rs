use async_trait::async_trait;

use crate::config::LocationConfig;
use crate::error::{AssistError, Result};
use crate::models::Coordinates;

/// Single-shot position query. The production implementation answers from
/// configuration; an unset location is the moral equivalent of a denied
/// permission prompt and must stay recoverable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Locator: Send + Sync {
    async fn locate(&self) -> Result<Coordinates>;
}

/// Locator backed by configured coordinates.
pub struct StaticLocator {
    position: Option<Coordinates>,
}

impl StaticLocator {
    pub fn new(cfg: &LocationConfig) -> Self {
        let position = match (cfg.lat, cfg.lon) {
            (Some(lat), Some(lon)) => Some(Coordinates { lat, lon }),
            _ => None,
        };
        Self { position }
    }
}

#[async_trait]
impl Locator for StaticLocator {
    async fn locate(&self) -> Result<Coordinates> {
        self.position.ok_or_else(|| {
            AssistError::Geolocation("no location configured for this assistant".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configured_position_is_returned() {
        let locator = StaticLocator::new(&LocationConfig {
            lat: Some(40.7),
            lon: Some(-74.0),
        });
        let position = locator.locate().await.expect("position configured");
        assert_eq!(position, Coordinates { lat: 40.7, lon: -74.0 });
    }

    #[tokio::test]
    async fn missing_position_is_a_geolocation_error() {
        let locator = StaticLocator::new(&LocationConfig::default());
        assert!(matches!(
            locator.locate().await.err(),
            Some(AssistError::Geolocation(_))
        ));
    }
}
