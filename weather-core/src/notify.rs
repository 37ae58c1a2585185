use tokio::sync::mpsc::UnboundedSender;

use crate::model::Coordinates;

/// User-facing notification raised by the widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// The location source failed; weather is shown for `fallback` instead.
    LocationFallback {
        reason: String,
        fallback: Coordinates,
    },
    /// There is no location capability at all; nothing will be fetched.
    GeolocationUnavailable,
}

impl Notice {
    pub fn message(&self) -> String {
        match self {
            Notice::LocationFallback { reason, fallback } => format!(
                "Location service unavailable ({reason}). Allow this app to access your \
                 location to see local weather; showing weather for {fallback} meanwhile."
            ),
            Notice::GeolocationUnavailable => "Geolocation not available".to_string(),
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

/// Non-blocking sink for [`Notice`]s.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        tracing::warn!("{notice}");
    }
}

/// Forwards notices over a channel to whoever draws the UI.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new(tx: UnboundedSender<Notice>) -> Self {
        Self { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if self.tx.send(notice).is_err() {
            tracing::debug!("Notice receiver dropped");
        }
    }
}
