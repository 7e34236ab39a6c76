//! GreyNoise IP Check.
//!
//! Periodically asks the GreyNoise community check API about the caller's
//! public IP and exposes the answer as a safety binary sensor: on when the IP
//! has been seen scanning the internet, off when it is clean.
//!
//! # Features
//!
//! - **Scheduled refresh** - One fetch every 12 hours by default, never two at once
//! - **Last-known-good state** - Failed refreshes never clear the previous result
//! - **Notifications** - Subscribers hear about every completed cycle
//! - **Setup probe** - Connectivity check and single-instance rule before configuring
//!
//! # Example Configuration
//!
//! ```yaml
//! settings:
//!   scan_interval_hours: 12
//!
//! api:
//!   refresh_timeout_ms: 30000
//!   probe_timeout_ms: 15000
//! ```

pub mod config;
pub mod coordinator;
pub mod fetcher;
pub mod integration;
pub mod sensor;
pub mod setup;
pub mod state;

pub use config::Config;
pub use coordinator::{Coordinator, RefreshEvent, RefreshOutcome};
pub use fetcher::greynoise::GreyNoiseFetcher;
pub use fetcher::{CheckResult, CheckSource, FetchError, FetchErrorKind};
pub use integration::IpCheckIntegration;
pub use sensor::NoiseSensor;
pub use setup::{FlowResult, InMemoryEntryStore, SetupFlow};
