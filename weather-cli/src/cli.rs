use std::{io::Write, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Text};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use weather_core::{
    ChannelNotifier, Config, Coordinates, FixedLocation, IpLocation, LocationSource,
    MountedWidget, Notice, WeatherWidget, WidgetOptions, provider, render,
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-widget", version, about = "Weather widget for the terminal")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the weather API base URL and key.
    Configure,

    /// Wait for the first weather report, print it once and exit.
    Show {
        #[command(flatten)]
        location: LocationArgs,

        /// Give up after this many seconds without a report.
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Keep the widget on screen, refreshing until Ctrl-C.
    Watch {
        #[command(flatten)]
        location: LocationArgs,
    },
}

/// Skip location lookup and use these coordinates.
#[derive(Debug, Args)]
pub struct LocationArgs {
    #[arg(long, requires = "lon", allow_hyphen_values = true)]
    lat: Option<f64>,

    #[arg(long, requires = "lat", allow_hyphen_values = true)]
    lon: Option<f64>,
}

impl LocationArgs {
    fn coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates::new(self.lat?, self.lon?))
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure => configure(),
            Command::Show { location, timeout } => {
                let config = Config::load()?;
                show(&config, &location, Duration::from_secs(timeout)).await
            }
            Command::Watch { location } => {
                let config = Config::load()?;
                watch(&config, &location).await
            }
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let path = Config::config_file_path()?;
    let mut config = Config::load_from(&path)?;

    let base_url = Text::new("Weather API base URL:")
        .with_default(&config.api.base_url)
        .prompt()
        .context("Failed to read base URL")?;

    let api_key = Password::new("API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    config.api.base_url = base_url;
    config.api.api_key = Some(api_key);
    config.api_settings()?;

    config.save_to(&path)?;
    println!("Saved configuration to {}", path.display());

    Ok(())
}

fn mount_widget(
    config: &Config,
    location: &LocationArgs,
) -> anyhow::Result<(MountedWidget, UnboundedReceiver<Notice>)> {
    let source = provider::source_from_config(config)?;

    let location: Arc<dyn LocationSource> = match location.coordinates() {
        Some(coords) => Arc::new(FixedLocation(coords)),
        None => Arc::new(IpLocation::new(config.location.ip_lookup_url.clone())),
    };

    let (tx, rx) = unbounded_channel();
    let widget = WeatherWidget::new(
        location,
        Arc::from(source),
        Arc::new(ChannelNotifier::new(tx)),
        WidgetOptions::from(config),
    )
    .mount();

    Ok((widget, rx))
}

fn drain_notices(notices: &mut UnboundedReceiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        tracing::debug!("Notice: {notice:?}");
        eprintln!("{notice}");
    }
}

async fn show(config: &Config, location: &LocationArgs, timeout: Duration) -> anyhow::Result<()> {
    let (widget, mut notices) = mount_widget(config, location)?;
    let mut rx = widget.subscribe();

    let loaded = tokio::time::timeout(timeout, rx.wait_for(|s| !s.loading))
        .await
        .map(|r| r.is_ok());
    drain_notices(&mut notices);

    let state = widget.state();
    widget.unmount().await;

    match loaded {
        Ok(true) => {
            print!("{}", render::render(&state, Local::now().naive_local()));
            Ok(())
        }
        Ok(false) => Err(anyhow!("Widget stopped before any weather arrived")),
        Err(_) => Err(anyhow!(
            "No weather data after {}s (see log output, RUST_LOG=debug for details)",
            timeout.as_secs()
        )),
    }
}

async fn watch(config: &Config, location: &LocationArgs) -> anyhow::Result<()> {
    let (widget, notices) = mount_widget(config, location)?;
    let mut out = std::io::stdout().lock();
    redraw_until(widget, notices, tokio::signal::ctrl_c(), &mut out).await
}

/// Redraw on every state change and once a second until `shutdown` resolves,
/// then unmount.
async fn redraw_until<F, W>(
    widget: MountedWidget,
    mut notices: UnboundedReceiver<Notice>,
    shutdown: F,
    out: &mut W,
) -> anyhow::Result<()>
where
    F: Future,
    W: Write,
{
    tokio::pin!(shutdown);
    let mut rx = widget.subscribe();
    let mut clock = tokio::time::interval(Duration::from_secs(1));

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => break Ok(()),
            Some(notice) = notices.recv() => {
                tracing::debug!("Notice: {notice:?}");
                eprintln!("{notice}");
                continue;
            }
            changed = rx.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
            }
            _ = clock.tick() => {}
        }

        let state = rx.borrow_and_update().clone();
        if let Err(e) = draw(out, &render::render(&state, Local::now().naive_local())) {
            break Err(e);
        }
    };

    tracing::debug!("Stopping watch, unmounting widget");
    widget.unmount().await;
    result
}

fn draw(out: &mut impl Write, panel: &str) -> anyhow::Result<()> {
    // Clear screen, cursor home.
    write!(out, "\x1b[2J\x1b[H{panel}").context("Failed to write to terminal")?;
    out.flush().context("Failed to flush terminal")?;
    Ok(())
}
