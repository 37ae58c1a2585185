//! The running widget: location acquisition, the mount-time fetch and the
//! periodic refresh, publishing [`WidgetState`] over a `watch` channel.
//!
//! Every fetch runs under its own cancellation token, a child of the widget's
//! root token. Issuing a fetch cancels the one before it, and a result is only
//! applied while its sequence number is still the latest, so the last issued
//! request wins regardless of arrival order. Unmounting cancels the root token
//! and waits for every task to finish.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    config::{Config, RefreshStrategy},
    location::{LocationSource, acquire_location},
    model::{Coordinates, WidgetState},
    notify::Notifier,
    provider::WeatherSource,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetOptions {
    pub refresh_interval: Duration,
    pub refresh_strategy: RefreshStrategy,
    pub fallback: Coordinates,
}

impl Default for WidgetOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for WidgetOptions {
    fn from(config: &Config) -> Self {
        Self {
            refresh_interval: config.refresh_interval(),
            refresh_strategy: config.refresh_strategy,
            fallback: config.fallback_coordinates(),
        }
    }
}

/// An unmounted widget: its collaborators and options.
pub struct WeatherWidget {
    location: Arc<dyn LocationSource>,
    source: Arc<dyn WeatherSource>,
    notifier: Arc<dyn Notifier>,
    options: WidgetOptions,
}

impl WeatherWidget {
    pub fn new(
        location: Arc<dyn LocationSource>,
        source: Arc<dyn WeatherSource>,
        notifier: Arc<dyn Notifier>,
        options: WidgetOptions,
    ) -> Self {
        Self {
            location,
            source,
            notifier,
            options,
        }
    }

    /// Start the widget on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn mount(self) -> MountedWidget {
        let (tx, rx) = watch::channel(WidgetState::default());
        let shared = Arc::new(Shared {
            state: tx,
            latest: AtomicU64::new(0),
            root: CancellationToken::new(),
            tasks: TaskTracker::new(),
        });

        tracing::info!(
            "Weather widget mounted (refresh every {:?}, {:?})",
            self.options.refresh_interval,
            self.options.refresh_strategy
        );

        shared.tasks.spawn(self.drive(Arc::clone(&shared)));

        MountedWidget { state: rx, shared }
    }

    async fn drive(self, shared: Arc<Shared>) {
        let mut in_flight: Option<CancellationToken> = None;

        let initial = tokio::select! {
            biased;
            _ = shared.root.cancelled() => return,
            coords = self.acquire() => coords,
        };
        if let Some(coords) = initial {
            self.issue(&shared, coords, &mut in_flight);
        }

        let period = self.options.refresh_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shared.root.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let coords = match self.options.refresh_strategy {
                RefreshStrategy::ReuseCoordinates => shared.cached_coordinates(),
                RefreshStrategy::Reacquire => tokio::select! {
                    biased;
                    _ = shared.root.cancelled() => break,
                    coords = self.acquire() => coords,
                },
            };

            match coords {
                Some(coords) => self.issue(&shared, coords, &mut in_flight),
                None => tracing::debug!("No coordinates, skipping refresh"),
            }
        }

        tracing::debug!("Refresh loop stopped");
    }

    async fn acquire(&self) -> Option<Coordinates> {
        acquire_location(self.location.as_ref(), self.options.fallback, self.notifier.as_ref())
            .await
    }

    fn issue(
        &self,
        shared: &Arc<Shared>,
        coords: Coordinates,
        in_flight: &mut Option<CancellationToken>,
    ) {
        if shared.root.is_cancelled() {
            return;
        }
        if let Some(previous) = in_flight.take() {
            previous.cancel();
        }

        let token = shared.root.child_token();
        let seq = shared.latest.fetch_add(1, Ordering::SeqCst) + 1;

        // Observers only care about displayed data, so don't wake them.
        shared.state.send_if_modified(|state| {
            state.coordinates = Some(coords);
            false
        });

        let source = Arc::clone(&self.source);
        let task_shared = Arc::clone(shared);
        let task_token = token.clone();

        shared.tasks.spawn(async move {
            // Cancellation is checked first so an unmounted widget never
            // starts a request.
            let result = tokio::select! {
                biased;
                _ = task_token.cancelled() => {
                    tracing::debug!("Fetch #{seq} superseded or unmounted");
                    return;
                }
                result = source.fetch(coords) => result,
            };

            match result {
                Ok(record) => {
                    let applied = task_shared.state.send_if_modified(|state| {
                        if task_token.is_cancelled()
                            || task_shared.latest.load(Ordering::SeqCst) != seq
                        {
                            return false;
                        }
                        state.apply(record);
                        true
                    });
                    if applied {
                        tracing::debug!("Fetch #{seq} applied");
                    }
                }
                Err(e) => tracing::error!("Error fetching weather data: {e:#}"),
            }
        });

        *in_flight = Some(token);
    }
}

struct Shared {
    state: watch::Sender<WidgetState>,
    latest: AtomicU64,
    root: CancellationToken,
    tasks: TaskTracker,
}

impl Shared {
    fn cached_coordinates(&self) -> Option<Coordinates> {
        self.state.borrow().coordinates
    }
}

/// Handle to a running widget. Dropping it cancels the widget without
/// waiting; [`MountedWidget::unmount`] also waits for its tasks to finish.
pub struct MountedWidget {
    state: watch::Receiver<WidgetState>,
    shared: Arc<Shared>,
}

impl MountedWidget {
    /// Snapshot of the current state.
    pub fn state(&self) -> WidgetState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every displayed-state change.
    pub fn subscribe(&self) -> watch::Receiver<WidgetState> {
        self.state.clone()
    }

    pub async fn unmount(self) {
        self.shared.root.cancel();
        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        tracing::info!("Weather widget unmounted");
    }
}

impl Drop for MountedWidget {
    fn drop(&mut self) {
        self.shared.root.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        location::{FailingLocation, FixedLocation, LocationError, tests::RecordingNotifier},
        model::WeatherRecord,
        notify::Notice,
    };
    use async_trait::async_trait;
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicBool, AtomicUsize},
        },
    };

    const TEN_MINUTES: Duration = Duration::from_millis(600_000);

    fn record(city: &str, raw: f64) -> WeatherRecord {
        WeatherRecord::from_celsius(city.into(), raw, 50, "Clear".into(), "XX".into())
    }

    /// Replays scripted outcomes, each after its own delay.
    #[derive(Debug, Default)]
    struct ScriptedSource {
        calls: Mutex<Vec<Coordinates>>,
        script: Mutex<VecDeque<(Duration, Result<WeatherRecord, String>)>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<(Duration, Result<WeatherRecord, String>)>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::default(),
                script: Mutex::new(script.into()),
            })
        }

        fn calls(&self) -> Vec<Coordinates> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WeatherSource for ScriptedSource {
        async fn fetch(&self, coordinates: Coordinates) -> anyhow::Result<WeatherRecord> {
            self.calls.lock().unwrap().push(coordinates);
            let next = self.script.lock().unwrap().pop_front();
            let (delay, outcome) =
                next.unwrap_or((Duration::ZERO, Err("script exhausted".to_string())));
            tokio::time::sleep(delay).await;
            outcome.map_err(anyhow::Error::msg)
        }
    }

    /// Hands out positions in order, then repeats the last one.
    #[derive(Debug)]
    struct SequenceLocation(Mutex<Vec<Coordinates>>);

    #[async_trait]
    impl LocationSource for SequenceLocation {
        async fn current_position(&self) -> Result<Coordinates, LocationError> {
            let mut positions = self.0.lock().unwrap();
            if positions.len() > 1 {
                Ok(positions.remove(0))
            } else {
                Ok(positions[0])
            }
        }
    }

    fn mount(
        location: Arc<dyn LocationSource>,
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
        strategy: RefreshStrategy,
    ) -> MountedWidget {
        let options = WidgetOptions {
            refresh_strategy: strategy,
            ..WidgetOptions::default()
        };
        WeatherWidget::new(location, source, notifier, options).mount()
    }

    async fn loaded(widget: &MountedWidget) -> WidgetState {
        let mut rx = widget.subscribe();
        let state = rx.wait_for(|s| !s.loading).await.unwrap().clone();
        state
    }

    #[tokio::test(start_paused = true)]
    async fn mount_fetches_at_acquired_position() {
        let here = Coordinates::new(52.37, 4.89);
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(record("Amsterdam", 12.4)))]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(FixedLocation(here)),
            source.clone(),
            notifier.clone(),
            RefreshStrategy::ReuseCoordinates,
        );
        assert!(widget.state().loading);

        let state = loaded(&widget).await;
        assert_eq!(state.current, Some(record("Amsterdam", 12.4)));
        assert_eq!(state.coordinates, Some(here));
        assert_eq!(source.calls(), vec![here]);
        assert!(notifier.notices().is_empty());

        widget.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn permission_denied_fetches_fallback_and_notifies_once() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(record("Delhi", 30.0)))]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(FailingLocation(LocationError::PermissionDenied)),
            source.clone(),
            notifier.clone(),
            RefreshStrategy::ReuseCoordinates,
        );
        loaded(&widget).await;

        assert_eq!(source.calls(), vec![Coordinates::new(28.67, 77.22)]);
        let notices = notifier.notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], Notice::LocationFallback { .. }));

        widget.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_location_never_fetches() {
        let source = ScriptedSource::new(vec![]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(FailingLocation(LocationError::Unsupported)),
            source.clone(),
            notifier.clone(),
            RefreshStrategy::ReuseCoordinates,
        );
        tokio::time::sleep(TEN_MINUTES * 3).await;

        assert!(source.calls().is_empty());
        assert_eq!(notifier.notices(), vec![Notice::GeolocationUnavailable]);
        assert!(widget.state().loading);

        widget.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_first_fetch_keeps_loading_until_a_refresh_succeeds() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Err("connection refused".into())),
            (Duration::ZERO, Ok(record("Delhi", 25.0))),
        ]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(FixedLocation(Coordinates::FALLBACK)),
            source.clone(),
            notifier,
            RefreshStrategy::ReuseCoordinates,
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(source.calls().len(), 1);
        assert!(widget.state().loading);
        assert_eq!(widget.state().current, None);

        let state = loaded(&widget).await;
        assert_eq!(source.calls().len(), 2);
        assert_eq!(state.current, Some(record("Delhi", 25.0)));

        widget.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_refresh_leaves_state_untouched() {
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(record("Delhi", 25.0))),
            (Duration::ZERO, Err("bad gateway".into())),
        ]);
        let notifier = Arc::new(RecordingNotifier::default());
        let here = Coordinates::new(10.0, 20.0);

        let widget = mount(
            Arc::new(FixedLocation(here)),
            source.clone(),
            notifier,
            RefreshStrategy::ReuseCoordinates,
        );
        let before = loaded(&widget).await;

        tokio::time::sleep(TEN_MINUTES + Duration::from_secs(1)).await;

        assert_eq!(source.calls(), vec![here, here]);
        assert_eq!(widget.state(), before);
        assert!(!widget.state().loading);

        widget.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reacquire_strategy_asks_for_location_every_tick() {
        let first = Coordinates::new(1.0, 1.0);
        let second = Coordinates::new(2.0, 2.0);
        let source = ScriptedSource::new(vec![
            (Duration::ZERO, Ok(record("A", 1.0))),
            (Duration::ZERO, Ok(record("B", 2.0))),
        ]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(SequenceLocation(Mutex::new(vec![first, second]))),
            source.clone(),
            notifier,
            RefreshStrategy::Reacquire,
        );

        tokio::time::sleep(TEN_MINUTES + Duration::from_secs(1)).await;

        assert_eq!(source.calls(), vec![first, second]);
        let state = widget.state();
        assert_eq!(state.current.map(|r| r.city), Some("B".to_string()));
        assert_eq!(state.coordinates, Some(second));

        widget.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn newer_fetch_wins_over_slower_older_one() {
        let source = ScriptedSource::new(vec![
            (Duration::from_secs(900), Ok(record("Old", 1.0))),
            (Duration::ZERO, Ok(record("New", 2.0))),
        ]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(FixedLocation(Coordinates::FALLBACK)),
            source.clone(),
            notifier,
            RefreshStrategy::ReuseCoordinates,
        );

        tokio::time::sleep(Duration::from_secs(1000)).await;

        assert_eq!(source.calls().len(), 2);
        assert_eq!(widget.state().current.map(|r| r.city), Some("New".to_string()));

        widget.unmount().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_stops_the_timer() {
        let source = ScriptedSource::new(vec![(Duration::ZERO, Ok(record("Delhi", 25.0)))]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(FixedLocation(Coordinates::FALLBACK)),
            source.clone(),
            notifier,
            RefreshStrategy::ReuseCoordinates,
        );
        loaded(&widget).await;

        widget.unmount().await;
        tokio::time::sleep(TEN_MINUTES * 3).await;

        assert_eq!(source.calls().len(), 1);
    }

    /// Counts fetches that start once `unmounting` is set.
    #[derive(Debug, Default)]
    struct LateFetchCounter {
        unmounting: AtomicBool,
        late: AtomicUsize,
    }

    #[async_trait]
    impl WeatherSource for LateFetchCounter {
        async fn fetch(&self, _coordinates: Coordinates) -> anyhow::Result<WeatherRecord> {
            if self.unmounting.load(Ordering::SeqCst) {
                self.late.fetch_add(1, Ordering::SeqCst);
            }
            Ok(record("Delhi", 25.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_on_a_tick_boundary_starts_no_fetch() {
        for _ in 0..200 {
            let source = Arc::new(LateFetchCounter::default());
            let widget = WeatherWidget::new(
                Arc::new(FixedLocation(Coordinates::FALLBACK)),
                source.clone(),
                Arc::new(RecordingNotifier::default()),
                WidgetOptions::default(),
            )
            .mount();

            // Lands on the same instant as the first refresh tick.
            tokio::time::sleep(TEN_MINUTES).await;
            source.unmounting.store(true, Ordering::SeqCst);
            widget.unmount().await;

            assert_eq!(source.late.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_cancels_in_flight_fetch() {
        let source =
            ScriptedSource::new(vec![(Duration::from_secs(30), Ok(record("Late", 5.0)))]);
        let notifier = Arc::new(RecordingNotifier::default());

        let widget = mount(
            Arc::new(FixedLocation(Coordinates::FALLBACK)),
            source.clone(),
            notifier,
            RefreshStrategy::ReuseCoordinates,
        );
        tokio::time::sleep(Duration::from_secs(1)).await;
        let rx = widget.subscribe();

        widget.unmount().await;

        assert_eq!(source.calls().len(), 1);
        assert!(rx.borrow().loading);
        assert_eq!(rx.borrow().current, None);
    }
}
