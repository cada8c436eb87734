/// Feature flags and platform capabilities consumed by the core

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Known feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Placement of the companion permission prompt, `"off"` disables it
    CompanionPermissionPlacement,
}

impl Feature {
    /// Value used when the provider has nothing for this flag
    pub fn default_value(&self) -> &'static str {
        match self {
            Feature::CompanionPermissionPlacement => "off",
        }
    }
}

/// Read-only feature flag provider, evaluated on every read
pub trait FeatureFlags: Send + Sync {
    fn value(&self, feature: Feature) -> Option<String>;

    fn value_or_default(&self, feature: Feature) -> String {
        self.value(feature)
            .unwrap_or_else(|| feature.default_value().to_string())
    }

    fn is_enabled(&self, feature: Feature) -> bool {
        self.value_or_default(feature) != "off"
    }
}

/// Fixed set of flag values
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    values: HashMap<Feature, String>,
}

impl StaticFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, feature: Feature, value: impl Into<String>) -> Self {
        self.values.insert(feature, value.into());
        self
    }
}

impl FeatureFlags for StaticFlags {
    fn value(&self, feature: Feature) -> Option<String> {
        self.values.get(&feature).cloned()
    }
}

/// Where the client runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    #[default]
    Webapp,
    Extension,
}
