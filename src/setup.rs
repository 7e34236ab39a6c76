//! Setup flow: connectivity probe plus the single-instance entry rule.

use crate::fetcher::CheckSource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::{info, warn};

/// Integration domain. Doubles as the unique id enforcing a single entry.
pub const DOMAIN: &str = "greynoise_ip_check";

pub const ENTRY_TITLE: &str = "GreyNoise IP Check";

pub const STEP_USER: &str = "user";

pub const ERROR_CANNOT_CONNECT: &str = "cannot_connect";

pub const ABORT_ALREADY_CONFIGURED: &str = "already_configured";

/// A configured instance of the integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub entry_id: String,
    pub unique_id: String,
    pub domain: String,
    pub title: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
}

impl ConfigEntry {
    fn new() -> Self {
        Self {
            entry_id: uuid::Uuid::new_v4().simple().to_string(),
            unique_id: DOMAIN.to_string(),
            domain: DOMAIN.to_string(),
            title: ENTRY_TITLE.to_string(),
            version: 1,
            created_at: Utc::now(),
        }
    }
}

/// Host registry of config entries.
pub trait EntryStore: Send + Sync {
    /// Whether an entry with this unique id exists.
    fn contains_unique_id(&self, unique_id: &str) -> bool;

    /// Insert unless the unique id is taken. Returns false on conflict.
    fn try_insert(&self, entry: ConfigEntry) -> bool;

    fn remove(&self, entry_id: &str) -> Option<ConfigEntry>;

    fn entries(&self) -> Vec<ConfigEntry>;
}

/// In-memory entry store.
#[derive(Debug, Default)]
pub struct InMemoryEntryStore {
    entries: RwLock<HashMap<String, ConfigEntry>>,
}

impl InMemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for InMemoryEntryStore {
    fn contains_unique_id(&self, unique_id: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.values().any(|entry| entry.unique_id == unique_id))
            .unwrap_or(false)
    }

    fn try_insert(&self, entry: ConfigEntry) -> bool {
        let Ok(mut entries) = self.entries.write() else {
            return false;
        };
        if entries.values().any(|e| e.unique_id == entry.unique_id) {
            return false;
        }
        entries.insert(entry.entry_id.clone(), entry);
        true
    }

    fn remove(&self, entry_id: &str) -> Option<ConfigEntry> {
        self.entries.write().ok()?.remove(entry_id)
    }

    fn entries(&self) -> Vec<ConfigEntry> {
        self.entries
            .read()
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Result of a flow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowResult {
    /// Show (or re-show) the form, with per-field errors.
    Form {
        step_id: &'static str,
        errors: BTreeMap<String, String>,
    },
    CreateEntry(ConfigEntry),
    Abort { reason: &'static str },
}

impl FlowResult {
    /// Error code for `base`, if the form carries one.
    pub fn base_error(&self) -> Option<&str> {
        match self {
            FlowResult::Form { errors, .. } => errors.get("base").map(String::as_str),
            _ => None,
        }
    }
}

/// The single user-facing setup step.
pub struct SetupFlow<'a> {
    source: &'a dyn CheckSource,
    store: &'a dyn EntryStore,
}

impl<'a> SetupFlow<'a> {
    pub fn new(source: &'a dyn CheckSource, store: &'a dyn EntryStore) -> Self {
        Self { source, store }
    }

    /// Handle the user step. The form has no fields, so `submitted` only says
    /// whether the user pressed submit.
    pub async fn step_user(&self, submitted: bool) -> FlowResult {
        if !submitted {
            return form(BTreeMap::new());
        }

        if self.store.contains_unique_id(DOMAIN) {
            info!("Integration already configured");
            return FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED,
            };
        }

        if let Err(e) = self.source.probe().await {
            warn!(
                source = self.source.name(),
                kind = %e.kind(),
                error = %e,
                "Could not connect to GreyNoise check API"
            );
            let mut errors = BTreeMap::new();
            errors.insert("base".to_string(), ERROR_CANNOT_CONNECT.to_string());
            return form(errors);
        }

        let entry = ConfigEntry::new();
        if !self.store.try_insert(entry.clone()) {
            return FlowResult::Abort {
                reason: ABORT_ALREADY_CONFIGURED,
            };
        }

        info!(entry_id = %entry.entry_id, "Config entry created");
        FlowResult::CreateEntry(entry)
    }
}

fn form(errors: BTreeMap<String, String>) -> FlowResult {
    FlowResult::Form {
        step_id: STEP_USER,
        errors,
    }
}
