//! Integration instance: composes a config entry, its coordinator and sensor.

use crate::coordinator::{Coordinator, RefreshOutcome};
use crate::fetcher::CheckSource;
use crate::sensor::{DeviceInfo, NoiseSensor};
use crate::setup::{ConfigEntry, DOMAIN};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A running integration instance.
pub struct IpCheckIntegration {
    entry: ConfigEntry,
    coordinator: Coordinator,
    sensor: NoiseSensor,
}

impl IpCheckIntegration {
    /// Set up an instance for a config entry.
    ///
    /// Performs the first refresh before starting the schedule. A failed first
    /// refresh is tolerated: the sensor stays unavailable until a later cycle
    /// succeeds.
    pub async fn setup(
        entry: ConfigEntry,
        source: Arc<dyn CheckSource>,
        interval: Duration,
    ) -> Self {
        let coordinator = Coordinator::new(source, interval);

        match coordinator.refresh().await {
            RefreshOutcome::Updated => {}
            RefreshOutcome::Failed(kind) => {
                warn!(entry_id = %entry.entry_id, kind = %kind, "First refresh failed");
            }
            RefreshOutcome::Skipped | RefreshOutcome::Abandoned => {}
        }

        coordinator.start();

        let device = DeviceInfo::for_entry(DOMAIN, &entry.entry_id);
        let sensor = NoiseSensor::new(coordinator.clone(), entry.entry_id.clone(), device);

        info!(
            entry_id = %entry.entry_id,
            title = %entry.title,
            "GreyNoise IP Check set up"
        );

        Self {
            entry,
            coordinator,
            sensor,
        }
    }

    pub fn entry(&self) -> &ConfigEntry {
        &self.entry
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn sensor(&self) -> &NoiseSensor {
        &self.sensor
    }

    /// Stop refreshing. Any fetch still in flight is discarded.
    pub async fn unload(self) {
        self.coordinator.stop().await;
        info!(entry_id = %self.entry.entry_id, "GreyNoise IP Check unloaded");
    }
}
