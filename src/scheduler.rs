//! Heartbeat scheduler
//!
//! Increments a beat counter once per `BEAT_INTERVAL` and hands each beat to
//! every attached tracker. Trackers decide for themselves whether a beat is
//! due; work they start runs in spawned tasks the scheduler never awaits.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

use crate::tracker::LocationTracker;

/// Time between beats
pub const BEAT_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Beat counter and the trackers it drives
#[derive(Debug)]
pub struct Scheduler {
    beat: u64,
    state: SchedulerState,
    interval: Duration,
    trackers: Vec<LocationTracker>,
    /// Tasks started by trackers that may still be running
    in_flight: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_interval(BEAT_INTERVAL)
    }

    /// Scheduler with a custom beat interval
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            beat: 0,
            state: SchedulerState::Stopped,
            interval,
            trackers: Vec::new(),
            in_flight: Vec::new(),
        }
    }

    /// Next beat to be handed out
    pub fn beat(&self) -> u64 {
        self.beat
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn trackers(&self) -> &[LocationTracker] {
        &self.trackers
    }

    pub fn attach(&mut self, tracker: LocationTracker) {
        self.trackers.push(tracker);
    }

    /// Stop driving the tracker for `key`
    pub fn detach(&mut self, key: &str) -> Option<LocationTracker> {
        let index = self.trackers.iter().position(|t| t.key() == key)?;
        Some(self.trackers.remove(index))
    }

    /// Hand the current beat to every tracker and advance the counter
    ///
    /// Returns the handles of tasks the trackers spawned.
    pub fn tick(&mut self) -> Vec<JoinHandle<()>> {
        let beat = self.beat;
        let handles: Vec<JoinHandle<()>> = self
            .trackers
            .iter()
            .filter_map(|tracker| tracker.tick(beat))
            .collect();
        if !handles.is_empty() {
            debug!("beat {}: {} tasks started", beat, handles.len());
        }
        self.beat += 1;
        handles
    }

    /// Wait for tasks started during the run loop to finish
    async fn drain(&mut self) {
        let pending: Vec<JoinHandle<()>> = self
            .in_flight
            .drain(..)
            .filter(|handle| !handle.is_finished())
            .collect();
        if pending.is_empty() {
            return;
        }
        debug!("waiting for {} tasks", pending.len());
        for result in futures::future::join_all(pending).await {
            if let Err(e) = result {
                warn!("tracker task failed: {}", e);
            }
        }
    }

    /// Run the beat loop in a background task
    ///
    /// With a `limit`, the loop stops by itself after that many beats. Tasks
    /// still in flight when the loop stops are awaited before the task ends.
    pub fn spawn(mut self, limit: Option<u64>) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let task = tokio::spawn(async move {
            self.state = SchedulerState::Running;
            info!("heartbeat started for {} locations", self.trackers.len());

            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if limit.is_some_and(|limit| self.beat >= limit) {
                    break;
                }
                tokio::select! {
                    _ = interval.tick() => {
                        let started = self.tick();
                        self.in_flight.retain(|handle| !handle.is_finished());
                        self.in_flight.extend(started);
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }

            self.state = SchedulerState::Stopped;
            self.drain().await;
            info!("heartbeat stopped at beat {}", self.beat);
            self
        });

        SchedulerHandle { shutdown_tx, task }
    }
}

/// Handle for controlling a running scheduler
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<Scheduler>,
}

impl SchedulerHandle {
    /// Sender that stops the loop, for use from another task
    pub fn stopper(&self) -> mpsc::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Wait for the loop to stop by itself
    pub async fn wait(self) -> Result<Scheduler, JoinError> {
        self.task.await
    }

    /// Stop the loop and return the stopped scheduler
    pub async fn shutdown(self) -> Result<Scheduler, JoinError> {
        let _ = self.shutdown_tx.send(()).await;
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClientConfig, ResolvedLocation, WeatherClient};
    use crate::history::MemoryHistory;
    use crate::platform::PlatformContext;
    use crate::sensors::{SensorKind, Value};
    use crate::testing::{RecordingHost, ScriptedTransport, ONECALL_FIXTURE};
    use crate::tracker::{TrackerOptions, TrackerStatus};
    use std::sync::Arc;

    fn context() -> Arc<PlatformContext> {
        Arc::new(PlatformContext {
            name: "WS".to_string(),
            client: None,
            host: Arc::new(RecordingHost::new()),
            history: Arc::new(MemoryHistory::new()),
            store: None,
        })
    }

    fn tracker(key: &str, heartrate_secs: u64) -> LocationTracker {
        let options = TrackerOptions {
            heartrate_secs,
            ..Default::default()
        };
        LocationTracker::restore(
            key,
            context(),
            options,
            ResolvedLocation {
                latitude: 52.11,
                longitude: 5.18,
                city_id: None,
                name: key.to_string(),
            },
        )
    }

    #[test]
    fn test_scheduler_defaults() {
        let scheduler = Scheduler::default();
        assert_eq!(scheduler.beat(), 0);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.interval, BEAT_INTERVAL);
        assert!(scheduler.trackers().is_empty());
    }

    #[tokio::test]
    async fn test_tick_fans_out_to_trackers() {
        let mut scheduler = Scheduler::new();
        scheduler.attach(tracker("Utrecht", 10));
        scheduler.attach(tracker("Bilt", 20));

        assert!(scheduler.tick().is_empty());
        assert_eq!(scheduler.beat(), 1);

        // Both trackers are due on beat 1
        assert_eq!(scheduler.tick().len(), 2);
        assert_eq!(scheduler.trackers()[0].last_fetch_beat(), Some(1));

        for _ in 2..11 {
            scheduler.tick();
        }
        // Beat 11: only the 10 s tracker
        assert_eq!(scheduler.tick().len(), 1);
    }

    #[tokio::test]
    async fn test_detach() {
        let mut scheduler = Scheduler::new();
        scheduler.attach(tracker("Utrecht", 10));

        let detached = scheduler.detach("Utrecht").expect("Should detach");
        assert_eq!(detached.key(), "Utrecht");
        assert_eq!(detached.status(), TrackerStatus::Active);
        assert!(scheduler.detach("Utrecht").is_none());
        assert!(scheduler.tick().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_stops_at_limit() {
        let mut scheduler = Scheduler::with_interval(Duration::from_millis(1));
        scheduler.attach(tracker("Utrecht", 10));

        let handle = scheduler.spawn(Some(5));
        let scheduler = handle.wait().await.expect("Scheduler task should finish");

        assert_eq!(scheduler.beat(), 5);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.trackers()[0].last_fetch_beat(), Some(1));
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_fetches() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_ok(200, ONECALL_FIXTURE);
        let context = Arc::new(PlatformContext {
            name: "WS".to_string(),
            client: Some(Arc::new(WeatherClient::with_transport(
                ClientConfig::new("key"),
                transport,
            ))),
            host: Arc::new(RecordingHost::new()),
            history: Arc::new(MemoryHistory::new()),
            store: None,
        });
        let tracker = LocationTracker::restore(
            "Utrecht",
            context,
            TrackerOptions::default(),
            ResolvedLocation {
                latitude: 52.09,
                longitude: 5.12,
                city_id: None,
                name: "Utrecht".to_string(),
            },
        );
        let mut scheduler = Scheduler::with_interval(Duration::from_millis(1));
        scheduler.attach(tracker.clone());

        // Beat 1 starts the fetch, the loop stops right after it
        let scheduler = scheduler
            .spawn(Some(2))
            .wait()
            .await
            .expect("Scheduler task should finish");

        assert_eq!(scheduler.beat(), 2);
        assert_eq!(
            tracker.value(SensorKind::Temperature, "temperature"),
            Some(Value::Number(21.3))
        );
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let scheduler = Scheduler::with_interval(Duration::from_secs(3600));
        let handle = scheduler.spawn(None);

        let scheduler = handle.shutdown().await.expect("Scheduler task should finish");
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.beat() <= 1);
    }

    #[tokio::test]
    async fn test_stopper_stops_loop() {
        let handle = Scheduler::with_interval(Duration::from_millis(5)).spawn(None);
        handle.stopper().send(()).await.expect("Loop should be listening");

        let scheduler = handle.wait().await.expect("Scheduler task should finish");
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }
}
