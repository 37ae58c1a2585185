//! Core library for the weather widget.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Location acquisition behind an injectable source
//! - The weather API client
//! - The mounted widget with its periodic refresh
//! - Plain-text rendering of the widget state
//!
//! It is used by `weather-widget`, but can also be embedded by other hosts.

pub mod config;
pub mod location;
pub mod model;
pub mod notify;
pub mod provider;
pub mod render;
pub mod widget;

pub use config::{Config, RefreshStrategy};
pub use location::{FailingLocation, FixedLocation, IpLocation, LocationError, LocationSource};
pub use model::{Coordinates, WeatherRecord, WidgetState};
pub use notify::{ChannelNotifier, LogNotifier, Notice, Notifier};
pub use provider::WeatherSource;
pub use widget::{MountedWidget, WeatherWidget, WidgetOptions};
