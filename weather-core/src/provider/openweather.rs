use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::model::{Coordinates, WeatherRecord};

use super::WeatherSource;

/// OpenWeather "current weather" endpoint, queried by coordinates.
#[derive(Debug, Clone)]
pub struct OpenWeatherSource {
    base_url: String,
    api_key: String,
    http: Client,
}

impl OpenWeatherSource {
    /// `base_url` is the API root the `weather` path is appended to, e.g.
    /// `https://api.openweathermap.org/data/2.5/`.
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url,
            api_key,
            http: Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}weather", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    main: String,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    country: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    weather: Vec<OwWeather>,
    sys: OwSys,
}

impl TryFrom<OwCurrentResponse> for WeatherRecord {
    type Error = anyhow::Error;

    fn try_from(parsed: OwCurrentResponse) -> Result<Self> {
        let condition = parsed
            .weather
            .into_iter()
            .next()
            .map(|w| w.main)
            .ok_or_else(|| anyhow!("OpenWeather response contained no weather conditions"))?;

        Ok(WeatherRecord::from_celsius(
            parsed.name,
            parsed.main.temp,
            parsed.main.humidity,
            condition,
            parsed.sys.country,
        ))
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherSource {
    async fn fetch(&self, coordinates: Coordinates) -> Result<WeatherRecord> {
        let url = self.endpoint();
        tracing::debug!("GET {url} at {coordinates}");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", coordinates.latitude.to_string()),
                ("lon", coordinates.longitude.to_string()),
                ("units", "metric".to_string()),
                ("APPID", self.api_key.clone()),
            ])
            .send()
            .await
            .context("Failed to send request to OpenWeather (current weather)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read OpenWeather current response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather current request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let parsed: OwCurrentResponse =
            serde_json::from_str(&body).context("Failed to parse OpenWeather current JSON")?;

        parsed.try_into()
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
