//! Per-location polling state
//!
//! A `LocationTracker` owns the sensors of one configured location. It
//! resolves the location to coordinates once, then fetches on its heartrate
//! phase and projects every observation into its sensors. Fetches are spawned
//! tasks; whichever completes last determines the published state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{info, warn};
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{PlatformConfig, DEFAULT_HEARTRATE_SECS, HEARTRATE_SECS_RANGE};
use crate::data::classify::condition_text;
use crate::data::{
    normalize_onecall, LocationSpec, NormalizeError, Observation, ResolvedLocation, WeatherError,
};
use crate::history::{HistoryEntry, HistorySample, HISTORY_INTERVAL_BEATS, HISTORY_PHASE};
use crate::host::{DeviceInfo, ServiceDescriptor};
use crate::platform::PlatformContext;
use crate::sensors::{SensorKind, SensorProjection, Value, HEARTRATE_MINUTES_RANGE};

/// Beats between resolution attempts of a pending tracker
pub const RESOLVE_RETRY_BEATS: u64 = 60;

/// Spacing of tracker phases, so trackers don't all fetch on the same beat
pub const PHASE_STEP: u64 = 7;

/// Lifecycle of a tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerStatus {
    /// Coordinates not known yet
    PendingResolution,
    /// Polling on its heartrate
    Active,
    /// Location left the configuration
    Removed,
}

/// Errors of a single fetch, logged and skipped by the tick that spawned it
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Weather(#[from] WeatherError),

    #[error(transparent)]
    Malformed(#[from] NormalizeError),

    #[error("no weather client configured")]
    NoClient,

    #[error("location is not active")]
    NotActive,
}

/// Per-tracker settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerOptions {
    pub heartrate_secs: u64,
    /// Beat offset within the heartrate at which this tracker fetches
    pub phase: u64,
    pub hourly_forecasts: usize,
    pub daily_forecasts: usize,
    pub leak_sensor: bool,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            heartrate_secs: DEFAULT_HEARTRATE_SECS,
            phase: 1,
            hourly_forecasts: 0,
            daily_forecasts: 0,
            leak_sensor: false,
        }
    }
}

impl TrackerOptions {
    /// Options for the `index`th configured location
    pub fn from_config(config: &PlatformConfig, index: usize) -> Self {
        Self {
            heartrate_secs: config.heartrate,
            phase: 1 + index as u64 * PHASE_STEP,
            hourly_forecasts: config.hourly_forecasts,
            daily_forecasts: config.daily_forecasts,
            leak_sensor: config.leak_sensor,
        }
    }

    /// Sensors a tracker with these options exposes
    pub fn sensor_kinds(&self) -> Vec<SensorKind> {
        let mut kinds = vec![
            SensorKind::Temperature,
            SensorKind::Humidity,
            SensorKind::AirPressure,
            SensorKind::Rain,
        ];
        if self.leak_sensor {
            kinds.push(SensorKind::Leak);
        }
        kinds.push(SensorKind::Weather);
        kinds.extend((1..=self.hourly_forecasts).map(SensorKind::HourlyForecast));
        kinds.extend((1..=self.daily_forecasts).map(SensorKind::DailyForecast));
        kinds
    }
}

struct TrackerState {
    status: TrackerStatus,
    resolved: Option<ResolvedLocation>,
    resolve_attempted: bool,
    heartrate_secs: u64,
    last_fetch_beat: Option<u64>,
    /// Observation time of the latest applied observation
    observed_at: Option<DateTime<Utc>>,
    device: DeviceInfo,
    sensors: Vec<SensorProjection>,
}

impl TrackerState {
    fn sensor(&self, kind: SensorKind) -> Option<&SensorProjection> {
        self.sensors.iter().find(|sensor| sensor.kind() == kind)
    }

    fn number(&self, kind: SensorKind, key: &str) -> Option<f64> {
        self.sensor(kind).and_then(|sensor| sensor.bag().number(key))
    }
}

struct Shared {
    key: String,
    phase: u64,
    context: Arc<PlatformContext>,
    state: Mutex<TrackerState>,
    resolving: AtomicBool,
}

/// Handle to the polling state of one location
#[derive(Clone)]
pub struct LocationTracker {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for LocationTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationTracker")
            .field("key", &self.shared.key)
            .field("status", &self.status())
            .finish()
    }
}

fn clamp_heartrate(secs: u64) -> u64 {
    secs.clamp(HEARTRATE_SECS_RANGE.0, HEARTRATE_SECS_RANGE.1)
}

/// Heartrate as shown on the characteristic
fn heartrate_minutes(secs: u64) -> f64 {
    secs as f64 / 60.0
}

impl LocationTracker {
    /// Create a tracker that still has to resolve its location
    pub fn new(key: &str, context: Arc<PlatformContext>, options: TrackerOptions) -> Self {
        Self::build(key, context, options, None)
    }

    /// Create an active tracker from previously resolved coordinates
    pub fn restore(
        key: &str,
        context: Arc<PlatformContext>,
        options: TrackerOptions,
        resolved: ResolvedLocation,
    ) -> Self {
        Self::build(key, context, options, Some(resolved))
    }

    fn build(
        key: &str,
        context: Arc<PlatformContext>,
        options: TrackerOptions,
        resolved: Option<ResolvedLocation>,
    ) -> Self {
        let device = DeviceInfo::for_location(key);
        let sensors: Vec<SensorProjection> = options
            .sensor_kinds()
            .into_iter()
            .map(|kind| SensorProjection::new(kind, &device.name))
            .collect();
        let services: Vec<ServiceDescriptor> = sensors.iter().map(ServiceDescriptor::from).collect();
        context.host.register(&device, &services);

        let status = if resolved.is_some() {
            TrackerStatus::Active
        } else {
            TrackerStatus::PendingResolution
        };
        let tracker = Self {
            shared: Arc::new(Shared {
                key: key.to_string(),
                phase: options.phase,
                context,
                state: Mutex::new(TrackerState {
                    status,
                    resolved,
                    resolve_attempted: false,
                    heartrate_secs: clamp_heartrate(options.heartrate_secs),
                    last_fetch_beat: None,
                    observed_at: None,
                    device,
                    sensors,
                }),
                resolving: AtomicBool::new(false),
            }),
        };
        tracker.publish_heartrate();
        tracker
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn key(&self) -> &str {
        &self.shared.key
    }

    pub fn phase(&self) -> u64 {
        self.shared.phase
    }

    pub fn status(&self) -> TrackerStatus {
        self.state().status
    }

    pub fn heartrate_secs(&self) -> u64 {
        self.state().heartrate_secs
    }

    pub fn resolved(&self) -> Option<ResolvedLocation> {
        self.state().resolved.clone()
    }

    pub fn last_fetch_beat(&self) -> Option<u64> {
        self.state().last_fetch_beat
    }

    pub fn device(&self) -> DeviceInfo {
        self.state().device.clone()
    }

    /// Current value of a sensor characteristic
    pub fn value(&self, kind: SensorKind, key: &str) -> Option<Value> {
        self.state()
            .sensor(kind)
            .and_then(|sensor| sensor.bag().get(key).cloned())
    }

    /// Whether a fetch is due on `beat`
    pub fn should_fetch(&self, beat: u64) -> bool {
        let heartrate = self.heartrate_secs();
        beat % heartrate == self.shared.phase % heartrate
    }

    /// Advance the tracker by one beat
    ///
    /// Returns the handle of a spawned resolution or fetch task, if one was
    /// started. The caller is not expected to await it.
    pub fn tick(&self, beat: u64) -> Option<JoinHandle<()>> {
        match self.status() {
            TrackerStatus::Removed => None,
            TrackerStatus::PendingResolution => {
                let retry_due = {
                    let state = self.state();
                    !state.resolve_attempted || beat % RESOLVE_RETRY_BEATS == 0
                };
                if !retry_due
                    || self.shared.context.client.is_none()
                    || self.shared.resolving.swap(true, Ordering::SeqCst)
                {
                    return None;
                }
                let tracker = self.clone();
                Some(tokio::spawn(async move {
                    if let Err(error) = tracker.resolve().await {
                        warn!("{}: cannot resolve location: {}", tracker.key(), error);
                    }
                    tracker.shared.resolving.store(false, Ordering::SeqCst);
                }))
            }
            TrackerStatus::Active => {
                if beat % HISTORY_INTERVAL_BEATS == HISTORY_PHASE {
                    self.record_history();
                }
                if !self.should_fetch(beat) {
                    return None;
                }
                self.state().last_fetch_beat = Some(beat);
                let tracker = self.clone();
                Some(tokio::spawn(async move {
                    if let Err(error) = tracker.fetch().await {
                        warn!("{}: {}", tracker.key(), error);
                    }
                }))
            }
        }
    }

    /// Resolve the location to coordinates, activating the tracker
    pub async fn resolve(&self) -> Result<ResolvedLocation, FetchError> {
        self.state().resolve_attempted = true;
        let client = self
            .shared
            .context
            .client
            .clone()
            .ok_or(FetchError::NoClient)?;

        let resolved = client.resolve(&LocationSpec::parse(self.key())).await?;
        {
            let mut state = self.state();
            if state.status == TrackerStatus::Removed {
                return Err(FetchError::NotActive);
            }
            state.resolved = Some(resolved.clone());
            state.status = TrackerStatus::Active;
        }
        info!(
            "{}: location {} ({}, {})",
            self.key(),
            resolved.name,
            resolved.latitude,
            resolved.longitude
        );
        if let Some(store) = &self.shared.context.store {
            if let Err(error) = store.save(self.key(), &resolved) {
                warn!("{}: cannot save context: {}", self.key(), error);
            }
        }
        Ok(resolved)
    }

    /// Fetch, normalize and apply one observation
    pub async fn fetch(&self) -> Result<(), FetchError> {
        let client = self
            .shared
            .context
            .client
            .clone()
            .ok_or(FetchError::NoClient)?;
        let resolved = {
            let state = self.state();
            match (&state.status, &state.resolved) {
                (TrackerStatus::Active, Some(resolved)) => resolved.clone(),
                _ => return Err(FetchError::NotActive),
            }
        };

        let body = client
            .fetch_onecall(resolved.latitude, resolved.longitude)
            .await?;
        let observation = normalize_onecall(&body)?;
        self.apply_observation(&observation);
        Ok(())
    }

    /// Project an observation into every sensor and publish what changed
    pub fn apply_observation(&self, observation: &Observation) {
        let mut state = self.state();
        if state.status == TrackerStatus::Removed {
            return;
        }
        state.observed_at = Some(observation.current.observed_at);
        for sensor in state.sensors.iter_mut() {
            sensor.project(observation);
        }
        self.publish_changes(&mut state);
        drop(state);

        let current = &observation.current;
        info!(
            "{}: {}°C, {}%, {} hPa, {}",
            self.key(),
            current.temperature,
            current.humidity,
            current.pressure,
            condition_text(&current.weather)
        );
    }

    fn publish_changes(&self, state: &mut TrackerState) {
        let TrackerState {
            device, sensors, ..
        } = state;
        for sensor in sensors.iter_mut() {
            for (key, value) in sensor.take_changes() {
                self.shared
                    .context
                    .host
                    .publish(&device.id, sensor.name(), key, &value);
            }
        }
    }

    fn publish_heartrate(&self) {
        let mut state = self.state();
        let minutes = heartrate_minutes(state.heartrate_secs);
        if let Some(weather) = state
            .sensors
            .iter_mut()
            .find(|sensor| sensor.kind() == SensorKind::Weather)
        {
            weather.bag_mut().set("heartrate", minutes);
        }
        self.publish_changes(&mut state);
    }

    /// Change the polling interval, in seconds
    pub fn set_heartrate_secs(&self, secs: u64) {
        let secs = clamp_heartrate(secs);
        let previous = {
            let mut state = self.state();
            std::mem::replace(&mut state.heartrate_secs, secs)
        };
        if previous != secs {
            info!(
                "{}: heartrate changed from {} s to {} s",
                self.key(),
                previous,
                secs
            );
        }
        self.publish_heartrate();
    }

    /// Change the polling interval from the host's heartrate characteristic
    ///
    /// Minutes are rounded to whole seconds.
    pub fn set_heartrate_minutes(&self, minutes: f64) {
        let minutes = minutes.clamp(HEARTRATE_MINUTES_RANGE.0, HEARTRATE_MINUTES_RANGE.1);
        self.set_heartrate_secs((minutes * 60.0).round() as u64);
    }

    /// Append history entries from the current sensor values
    pub fn record_history(&self) {
        let entries = {
            let state = self.state();
            if state.status != TrackerStatus::Active || state.observed_at.is_none() {
                return;
            }
            let mut entries = Vec::new();
            if let (Some(temperature), Some(humidity), Some(pressure)) = (
                state.number(SensorKind::Temperature, "temperature"),
                state.number(SensorKind::Humidity, "humidity"),
                state.number(SensorKind::AirPressure, "pressure"),
            ) {
                entries.push(HistorySample::Weather {
                    temperature,
                    humidity,
                    pressure,
                });
            }
            if let Some(motion) = state
                .sensor(SensorKind::Rain)
                .and_then(|sensor| sensor.bag().boolean("motion"))
            {
                entries.push(HistorySample::Motion { motion });
            }
            entries
        };

        let time = Utc::now();
        for sample in entries {
            let entry = HistoryEntry { time, sample };
            if let Err(error) = self.shared.context.history.record(self.key(), &entry) {
                warn!("{}: cannot record history: {}", self.key(), error);
            }
        }
    }

    /// Tear the tracker down: unregister its device, drop its history and
    /// forget its persisted context
    pub fn remove(&self) {
        let device_id = {
            let mut state = self.state();
            if state.status == TrackerStatus::Removed {
                return;
            }
            state.status = TrackerStatus::Removed;
            state.device.id.clone()
        };

        self.shared.context.forget_location(self.key(), &device_id);
        info!("{}: removed", self.key());
    }
}
