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

//! Mounts auditor: containers must not mount sensitive host paths.

use std::collections::BTreeMap;

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::config::KubeauditConfig;
use crate::k8s::Resource;

pub const NAME: &str = "mounts";

pub const SENSITIVE_PATHS_MOUNTED: &str = "SensitivePathsMounted";

const RULES: &[&str] = &[SENSITIVE_PATHS_MOUNTED];

/// Host path prefixes denied when nothing is configured.
pub const DEFAULT_DENY_PATHS: &[&str] = &[
    "/proc",
    "/var/run/docker.sock",
    "/",
    "/etc",
    "/root",
    "/var/run/crio/crio.sock",
    "/home/admin",
    "/var/lib/kubelet",
    "/var/lib/kubelet/pki",
    "/etc/kubernetes",
    "/etc/kubernetes/manifests",
];

/// Prefix of the per-mount override label name.
pub const OVERRIDE_LABEL_PREFIX: &str = "allow-host-path-mount-";

/// Register the mounts auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |conf| Ok(Box::new(Mounts::new(conf)) as Box<dyn Auditable>));
}

/// Mounts implements Auditable.
#[derive(Debug)]
pub struct Mounts {
    deny_paths: Vec<String>,
}

impl Mounts {
    pub fn new(conf: &KubeauditConfig) -> Self {
        Self {
            deny_paths: conf
                .auditors
                .mounts
                .deny_paths_list
                .clone()
                .unwrap_or_else(|| DEFAULT_DENY_PATHS.iter().map(|p| p.to_string()).collect()),
        }
    }

    fn denied_prefix(&self, path: &str) -> Option<&str> {
        self.deny_paths
            .iter()
            .find(|prefix| path_has_prefix(path, prefix))
            .map(String::as_str)
    }
}

/// Path-segment-aware prefix match: "/etc" covers "/etc" and "/etc/passwd"
/// but not "/etcetera". The root prefix covers only the root itself.
fn path_has_prefix(path: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return path == "/";
    }
    path == prefix || path.starts_with(&format!("{}/", prefix))
}

impl Auditable for Mounts {
    fn name(&self) -> &'static str {
        NAME
    }

    fn rules(&self) -> &'static [&'static str] {
        RULES
    }

    fn audit(
        &self,
        resource: &Resource,
        _all_resources: &[Resource],
    ) -> Result<Vec<AuditResult>, AuditError> {
        let Some(spec) = resource.pod_spec() else {
            return Ok(Vec::new());
        };

        // Volume name to host path, for the volumes that are host paths.
        let host_paths: BTreeMap<&str, &str> = spec
            .volumes
            .iter()
            .flatten()
            .filter_map(|v| {
                v.host_path
                    .as_ref()
                    .map(|hp| (v.name.as_str(), hp.path.as_str()))
            })
            .collect();

        let mut results = Vec::new();
        for container in resource.containers() {
            for mount in container.volume_mounts.iter().flatten() {
                let Some(path) = host_paths.get(mount.name.as_str()) else {
                    continue;
                };
                let Some(prefix) = self.denied_prefix(path) else {
                    continue;
                };
                results.push(
                    AuditResult::new(
                        NAME,
                        SENSITIVE_PATHS_MOUNTED,
                        Severity::Error,
                        format!(
                            "Sensitive host path '{}' mounted as '{}' in container '{}'.",
                            path, mount.name, container.name
                        ),
                    )
                    .with_metadata(keys::CONTAINER, &container.name)
                    .with_metadata("MountName", &mount.name)
                    .with_metadata("MountPath", *path)
                    .with_metadata("DeniedPrefix", prefix),
                );
            }
        }
        Ok(results)
    }

    fn override_labels(&self, result: &AuditResult) -> Vec<String> {
        if result.rule != SENSITIVE_PATHS_MOUNTED {
            return Vec::new();
        }
        match result.metadata.get("MountName") {
            Some(mount) => vec![format!("{}{}", OVERRIDE_LABEL_PREFIX, mount)],
            None => Vec::new(),
        }
    }
}
