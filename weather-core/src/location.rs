//! Where the widget gets its coordinates from.
//!
//! [`LocationSource`] abstracts the host's "get current position" capability so
//! the acquisition policy in [`acquire_location`] can be driven by a real
//! lookup, a fixed pair, or a source that always fails.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    model::Coordinates,
    notify::{Notice, Notifier},
};

pub const DEFAULT_IP_LOOKUP_URL: &str = "http://ip-api.com/json/";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable: {0}")]
    PositionUnavailable(String),
    #[error("timed out")]
    Timeout,
    #[error("geolocation is not supported on this host")]
    Unsupported,
}

#[async_trait]
pub trait LocationSource: Send + Sync + std::fmt::Debug {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Always reports the same position.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocation(pub Coordinates);

#[async_trait]
impl LocationSource for FixedLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Ok(self.0)
    }
}

/// Always fails with the same error.
#[derive(Debug, Clone)]
pub struct FailingLocation(pub LocationError);

#[async_trait]
impl LocationSource for FailingLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Err(self.0.clone())
    }
}

/// Approximate position from the public IP address.
#[derive(Debug, Clone)]
pub struct IpLocation {
    url: String,
    http: Client,
}

impl IpLocation {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            http: Client::new(),
        }
    }
}

impl Default for IpLocation {
    fn default() -> Self {
        Self::new(DEFAULT_IP_LOOKUP_URL)
    }
}

#[derive(Debug, Deserialize)]
struct IpLookupResponse {
    status: String,
    lat: Option<f64>,
    lon: Option<f64>,
    message: Option<String>,
}

#[async_trait]
impl LocationSource for IpLocation {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        let res = self.http.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                LocationError::Timeout
            } else {
                LocationError::PositionUnavailable(e.to_string())
            }
        })?;

        match res.status().as_u16() {
            401 | 403 => return Err(LocationError::PermissionDenied),
            s if !(200..300).contains(&s) => {
                return Err(LocationError::PositionUnavailable(format!(
                    "lookup returned status {s}"
                )));
            }
            _ => {}
        }

        let body: IpLookupResponse = res
            .json()
            .await
            .map_err(|e| LocationError::PositionUnavailable(e.to_string()))?;

        match (body.status.as_str(), body.lat, body.lon) {
            ("success", Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
            _ => Err(LocationError::PositionUnavailable(
                body.message.unwrap_or_else(|| format!("lookup status '{}'", body.status)),
            )),
        }
    }
}

/// Ask `source` for a position, applying the fallback policy.
///
/// Any failure other than [`LocationError::Unsupported`] yields `fallback`
/// and one [`Notice::LocationFallback`]. An unsupported capability yields
/// `None` and one [`Notice::GeolocationUnavailable`].
pub async fn acquire_location(
    source: &dyn LocationSource,
    fallback: Coordinates,
    notifier: &dyn Notifier,
) -> Option<Coordinates> {
    match source.current_position().await {
        Ok(coords) => {
            tracing::info!("Got location: {coords}");
            Some(coords)
        }
        Err(LocationError::Unsupported) => {
            tracing::warn!("Geolocation unavailable, not fetching weather");
            notifier.notify(Notice::GeolocationUnavailable);
            None
        }
        Err(e) => {
            tracing::warn!("Location lookup failed ({e}), using fallback {fallback}");
            notifier.notify(Notice::LocationFallback {
                reason: e.to_string(),
                fallback,
            });
            Some(fallback)
        }
    }
}
