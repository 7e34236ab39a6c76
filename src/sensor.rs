//! Safety binary sensor backed by the coordinator.

use crate::coordinator::Coordinator;
use crate::fetcher::CheckResult;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub const ATTR_IP: &str = "ip_address";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_CLASSIFICATION: &str = "classification";
pub const ATTR_NOISE: &str = "noise";
pub const ATTR_COMMON_BUSINESS: &str = "common_business_services";
pub const ATTR_TRUST_LEVEL: &str = "trust_level";
pub const ATTR_ERROR: &str = "error";
pub const ATTR_LAST_CHECKED: &str = "last_checked";

pub const ICON_ALERT: &str = "mdi:shield-alert";
pub const ICON_CHECK: &str = "mdi:shield-check";

/// Device class reported to the host. For `safety`, on means unsafe.
pub const DEVICE_CLASS: &str = "safety";

/// Binary sensor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorState {
    On,
    Off,
    Unknown,
}

impl fmt::Display for SensorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SensorState::On => "on",
            SensorState::Off => "off",
            SensorState::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Device metadata the host registers alongside the sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub identifier: (String, String),
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub entry_type: &'static str,
    pub configuration_url: &'static str,
}

impl DeviceInfo {
    pub fn for_entry(domain: &str, entry_id: &str) -> Self {
        Self {
            identifier: (domain.to_string(), entry_id.to_string()),
            name: "GreyNoise IP Check",
            manufacturer: "GreyNoise Intelligence",
            entry_type: "service",
            configuration_url: "https://check.labs.greynoise.io/",
        }
    }
}

/// Point-in-time rendering of the sensor.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    pub unique_id: String,
    pub state: SensorState,
    pub available: bool,
    pub icon: &'static str,
    pub device_class: &'static str,
    pub attributes: BTreeMap<&'static str, Value>,
}

/// Sensor that is on when the public IP has been flagged as noise.
#[derive(Clone)]
pub struct NoiseSensor {
    coordinator: Coordinator,
    unique_id: String,
    device: DeviceInfo,
}

impl NoiseSensor {
    pub fn new(coordinator: Coordinator, unique_id: impl Into<String>, device: DeviceInfo) -> Self {
        Self {
            coordinator,
            unique_id: unique_id.into(),
            device,
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device
    }

    pub fn device_class(&self) -> &'static str {
        DEVICE_CLASS
    }

    /// True if flagged (unsafe), `None` when nothing has been fetched yet.
    pub fn is_on(&self) -> Option<bool> {
        is_on(self.coordinator.current().as_ref())
    }

    pub fn state(&self) -> SensorState {
        state(self.coordinator.current().as_ref())
    }

    pub fn icon(&self) -> &'static str {
        icon(self.coordinator.current().as_ref())
    }

    /// Available while the last refresh succeeded.
    pub fn available(&self) -> bool {
        self.coordinator.last_update_success()
    }

    pub fn extra_state_attributes(&self) -> BTreeMap<&'static str, Value> {
        attributes(self.coordinator.current().as_ref())
    }

    pub fn snapshot(&self) -> SensorSnapshot {
        // One read so every field reflects the same result
        let data = self.coordinator.current();
        SensorSnapshot {
            unique_id: self.unique_id.clone(),
            state: state(data.as_ref()),
            available: self.available(),
            icon: icon(data.as_ref()),
            device_class: DEVICE_CLASS,
            attributes: attributes(data.as_ref()),
        }
    }
}

pub fn is_on(data: Option<&CheckResult>) -> Option<bool> {
    data.map(CheckResult::is_noise)
}

pub fn state(data: Option<&CheckResult>) -> SensorState {
    match is_on(data) {
        Some(true) => SensorState::On,
        Some(false) => SensorState::Off,
        None => SensorState::Unknown,
    }
}

pub fn icon(data: Option<&CheckResult>) -> &'static str {
    if is_on(data) == Some(true) {
        ICON_ALERT
    } else {
        ICON_CHECK
    }
}

/// Attributes mirroring the result. Empty when there is no data.
pub fn attributes(data: Option<&CheckResult>) -> BTreeMap<&'static str, Value> {
    let mut attrs = BTreeMap::new();
    let Some(data) = data else {
        return attrs;
    };

    attrs.insert(ATTR_IP, opt(&data.ip));
    attrs.insert(ATTR_STATUS, opt(&data.status));
    attrs.insert(ATTR_CLASSIFICATION, opt(&data.classification));
    attrs.insert(ATTR_NOISE, data.noise.map_or(Value::Null, Value::Bool));
    attrs.insert(
        ATTR_COMMON_BUSINESS,
        data.common_business_services.map_or(Value::Null, Value::Bool),
    );
    attrs.insert(ATTR_TRUST_LEVEL, opt(&data.trust_level));
    attrs.insert(ATTR_ERROR, opt(&data.error));
    attrs.insert(ATTR_LAST_CHECKED, Value::String(data.last_checked.to_rfc3339()));
    attrs
}

fn opt(value: &Option<String>) -> Value {
    value.clone().map_or(Value::Null, Value::String)
}
