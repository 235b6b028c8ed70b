//! Workflows, staging areas and subscription filters produced by plugins

use crate::chain::ChainId;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

pub type ActionId = Uuid;

/// Work a plugin derived from one VAA
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow<D = Value> {
    pub id: ActionId,
    pub plugin_name: String,
    pub data: D,
}

impl<D> Workflow<D> {
    pub fn new(plugin_name: impl Into<String>, data: D) -> Self {
        Self {
            id: Uuid::new_v4(),
            plugin_name: plugin_name.into(),
            data,
        }
    }
}

/// Plugin-owned state carried from one VAA to the next
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StagingArea(Map<String, Value>);

impl StagingArea {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize a value, `None` when missing or of another shape
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.0
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for StagingArea {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Staging areas of every plugin.
///
/// Holding the guard from [`StagingStore::lock`] serializes consume steps
/// of one plugin, so each step sees the area its predecessor produced.
#[derive(Default)]
pub struct StagingStore {
    areas: DashMap<String, Arc<Mutex<StagingArea>>>,
}

impl StagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access to a plugin's staging area
    pub async fn lock(&self, plugin: &str) -> OwnedMutexGuard<StagingArea> {
        let area = self
            .areas
            .entry(plugin.to_string())
            .or_default()
            .value()
            .clone();
        area.lock_owned().await
    }

    /// Copy of a plugin's current staging area
    pub async fn snapshot(&self, plugin: &str) -> StagingArea {
        self.lock(plugin).await.clone()
    }
}

/// Emitter a plugin subscribes to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractFilter {
    pub emitter_address: String,
    pub chain_id: ChainId,
}

impl ContractFilter {
    pub fn new(chain_id: ChainId, emitter_address: impl Into<String>) -> Self {
        Self {
            emitter_address: emitter_address.into(),
            chain_id,
        }
    }

    /// Whether a VAA from this emitter is covered by the filter.
    ///
    /// Addresses compare as hex, ignoring case, `0x` and left padding.
    pub fn matches(&self, chain_id: ChainId, emitter_address: &str) -> bool {
        self.chain_id == chain_id
            && normalize_address(&self.emitter_address) == normalize_address(emitter_address)
    }
}

fn normalize_address(address: &str) -> String {
    let trimmed = address.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    hex.trim_start_matches('0').to_ascii_lowercase()
}
