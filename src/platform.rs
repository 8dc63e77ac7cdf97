//! Platform wiring
//!
//! `PlatformContext` bundles the collaborators every tracker shares. A
//! `Platform` reconciles persisted contexts with the configured locations,
//! creates the trackers and runs them on the scheduler.

use std::fmt;
use std::sync::Arc;

use log::{error, info, warn};

use crate::config::PlatformConfig;
use crate::data::WeatherClient;
use crate::history::HistoryRecorder;
use crate::host::{AccessoryHost, DeviceInfo};
use crate::scheduler::{Scheduler, SchedulerHandle};
use crate::store::ContextStore;
use crate::tracker::{LocationTracker, TrackerOptions};

/// Collaborators shared by every tracker
pub struct PlatformContext {
    /// Platform name used in log lines
    pub name: String,
    /// `None` when the configuration doesn't allow talking to the provider
    pub client: Option<Arc<WeatherClient>>,
    pub host: Arc<dyn AccessoryHost>,
    pub history: Arc<dyn HistoryRecorder>,
    pub store: Option<ContextStore>,
}

impl fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformContext")
            .field("name", &self.name)
            .field("client", &self.client)
            .field("store", &self.store)
            .finish()
    }
}

impl PlatformContext {
    /// Build the context, with a reqwest-backed client when the
    /// configuration is usable
    pub fn from_config(
        config: &PlatformConfig,
        host: Arc<dyn AccessoryHost>,
        history: Arc<dyn HistoryRecorder>,
        store: Option<ContextStore>,
    ) -> Self {
        let client = match config.client_config() {
            Ok(client_config) => Some(Arc::new(WeatherClient::new(client_config))),
            Err(e) => {
                error!("{}: {}", config.name, e);
                None
            }
        };
        Self {
            name: config.name.clone(),
            client,
            host,
            history,
            store,
        }
    }

    /// Unregister a location's device and delete everything kept for it
    pub fn forget_location(&self, key: &str, device_id: &str) {
        self.host.unregister(device_id);
        if let Err(error) = self.history.remove(key) {
            warn!("{}: cannot remove history: {}", key, error);
        }
        if let Some(store) = &self.store {
            if let Err(error) = store.forget(key) {
                warn!("{}: cannot forget context: {}", key, error);
            }
        }
    }
}

/// Configured locations and the scheduler driving them
#[derive(Debug)]
pub struct Platform {
    config: PlatformConfig,
    context: Arc<PlatformContext>,
    scheduler: Scheduler,
}

impl Platform {
    pub fn new(config: PlatformConfig, context: Arc<PlatformContext>) -> Self {
        Self::with_scheduler(config, context, Scheduler::new())
    }

    /// Platform driven by a custom scheduler
    pub fn with_scheduler(
        config: PlatformConfig,
        context: Arc<PlatformContext>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            config,
            context,
            scheduler,
        }
    }

    pub fn context(&self) -> &Arc<PlatformContext> {
        &self.context
    }

    pub fn trackers(&self) -> &[LocationTracker] {
        self.scheduler.trackers()
    }

    pub fn tracker(&self, key: &str) -> Option<&LocationTracker> {
        self.trackers().iter().find(|tracker| tracker.key() == key)
    }

    /// Create the trackers
    ///
    /// Contexts restored from the store become active trackers without a new
    /// resolution. Restored locations that are no longer configured are
    /// removed, and configured locations without a context get a fresh
    /// tracker.
    pub fn init(&mut self) {
        let keys = self.config.location_keys();
        let restored = self
            .context
            .store
            .as_ref()
            .map(ContextStore::load_all)
            .unwrap_or_default();

        for stale in restored.iter().filter(|c| !keys.contains(&c.location)) {
            info!("{}: {} is no longer configured", self.context.name, stale.location);
            let device = DeviceInfo::for_location(&stale.location);
            self.context.forget_location(&stale.location, &device.id);
        }

        for (index, key) in keys.iter().enumerate() {
            if self.tracker(key).is_some() {
                continue;
            }
            let options = TrackerOptions::from_config(&self.config, index);
            let tracker = match restored.iter().find(|c| &c.location == key) {
                Some(context) => LocationTracker::restore(
                    key,
                    self.context.clone(),
                    options,
                    context.resolved.clone(),
                ),
                None => LocationTracker::new(key, self.context.clone(), options),
            };
            self.scheduler.attach(tracker);
        }

        info!(
            "{}: {} locations, {} restored",
            self.context.name,
            self.trackers().len(),
            restored.iter().filter(|c| keys.contains(&c.location)).count()
        );
    }

    /// Stop polling a location and tear down its device, history and context
    ///
    /// Returns `false` if no tracker has that key.
    pub fn remove_location(&mut self, key: &str) -> bool {
        match self.scheduler.detach(key) {
            Some(tracker) => {
                tracker.remove();
                true
            }
            None => false,
        }
    }

    /// Start the heartbeat
    pub fn start(self, limit: Option<u64>) -> SchedulerHandle {
        self.scheduler.spawn(limit)
    }
}
