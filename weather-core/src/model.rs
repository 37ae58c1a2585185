use serde::{Deserialize, Serialize};

/// A latitude/longitude pair used to query the weather API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Used when the location source refuses or fails.
    pub const FALLBACK: Coordinates = Coordinates {
        latitude: 28.67,
        longitude: 77.22,
    };

    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}, {}", self.latitude, self.longitude)
    }
}

/// Display-ready snapshot of one weather API response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    pub temperature_c: i64,
    pub temperature_f: i64,
    pub humidity: u8,
    pub condition_main: String,
    pub country_code: String,
}

impl WeatherRecord {
    /// Build a record from a raw Celsius reading, rounding both scales.
    pub fn from_celsius(
        city: String,
        raw_celsius: f64,
        humidity: u8,
        condition_main: String,
        country_code: String,
    ) -> Self {
        Self {
            city,
            temperature_c: raw_celsius.round() as i64,
            temperature_f: celsius_to_fahrenheit(raw_celsius).round() as i64,
            humidity,
            condition_main,
            country_code,
        }
    }
}

pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    celsius * 1.8 + 32.0
}

/// What the widget currently shows.
///
/// `loading` starts out true and flips to false on the first successful
/// fetch; it never goes back.
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetState {
    pub loading: bool,
    pub current: Option<WeatherRecord>,
    /// Coordinates of the most recently issued fetch.
    pub coordinates: Option<Coordinates>,
}

impl Default for WidgetState {
    fn default() -> Self {
        Self {
            loading: true,
            current: None,
            coordinates: None,
        }
    }
}

impl WidgetState {
    pub(crate) fn apply(&mut self, record: WeatherRecord) {
        self.current = Some(record);
        self.loading = false;
    }
}
