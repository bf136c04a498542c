// Copyright 2024 The Kubernetes Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Configuration schema: per-auditor enable toggles and settings.
//!
//! Reading the file is the front-end's job; the schema lives here so the
//! enumerated settings stay next to the auditors that consume them. Unknown
//! keys are rejected at every level.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Malformed(#[from] serde_yaml::Error),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct KubeauditConfig {
    /// Auditor name to enabled flag. An auditor absent from the map is
    /// enabled.
    pub enabled_auditors: BTreeMap<String, bool>,
    /// Per-auditor settings.
    pub auditors: AuditorConfigs,
}

impl KubeauditConfig {
    /// Parse a YAML configuration document.
    pub fn from_yaml(document: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(document)?)
    }

    /// Whether the named auditor is enabled (enabled unless disabled).
    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled_auditors.get(name).copied().unwrap_or(true)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct AuditorConfigs {
    pub capabilities: CapabilitiesConfig,
    pub image: ImageConfig,
    pub limits: LimitsConfig,
    pub mounts: MountsConfig,
    pub deprecated_apis: DeprecatedApisConfig,
}

/// Settings for the capabilities auditor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct CapabilitiesConfig {
    /// Capabilities containers may add. Anything else in an add list is
    /// flagged.
    pub add: Option<Vec<String>>,
    /// Capabilities every container must drop. Defaults to `["ALL"]` when
    /// absent.
    pub drop: Option<Vec<String>>,
}

/// Settings for the image auditor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct ImageConfig {
    /// The desired image reference, including its tag.
    pub image: Option<String>,
}

/// Settings for the limits auditor. Quantities use Kubernetes notation.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct LimitsConfig {
    pub cpu: Option<String>,
    pub memory: Option<String>,
}

/// Settings for the mounts auditor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct MountsConfig {
    /// Host path prefixes that must not be mounted. Defaults to the built-in
    /// sensitive path list when absent.
    pub deny_paths_list: Option<Vec<String>>,
}

/// Settings for the deprecated-APIs auditor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase", default)]
pub struct DeprecatedApisConfig {
    /// The cluster's current Kubernetes version, e.g. "1.22".
    pub current_version: Option<String>,
    /// The version the manifests should stay compatible with.
    pub targeted_version: Option<String>,
}
