use crate::{Config, WeatherRecord, model::Coordinates, provider::openweather::OpenWeatherSource};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod openweather;

/// Something that turns coordinates into a [`WeatherRecord`].
#[async_trait]
pub trait WeatherSource: Send + Sync + Debug {
    async fn fetch(&self, coordinates: Coordinates) -> anyhow::Result<WeatherRecord>;
}

/// Construct the OpenWeather source from config.
pub fn source_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherSource>> {
    let api = config.api_settings()?;
    Ok(Box::new(OpenWeatherSource::new(api.base_url, api.api_key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn source_from_config_errors_when_missing_api_key() {
        let cfg = Config::default();
        let err = source_from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("No API key configured"));
    }

    #[test]
    fn source_from_config_works_when_key_set() {
        let mut cfg = Config::default();
        cfg.api.api_key = Some("KEY".to_string());

        assert!(source_from_config(&cfg).is_ok());
    }
}
