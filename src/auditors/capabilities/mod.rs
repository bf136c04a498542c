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

//! Capabilities auditor.
//!
//! Containers must drop every capability in the configured drop list
//! (default `ALL`) and must not add capabilities outside the configured
//! allow list.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::config::KubeauditConfig;
use crate::fix::PendingFix;
use crate::k8s::Resource;

pub const NAME: &str = "capabilities";

/// A capability outside the allow list is added.
pub const CAPABILITY_ADDED: &str = "CapabilityAdded";
/// A configured capability is not in the drop list.
pub const CAPABILITY_NOT_DROPPED: &str = "CapabilityNotDropped";
/// The drop list does not drop ALL capabilities.
pub const CAPABILITY_SHOULD_DROP_ALL: &str = "CapabilityShouldDropAll";

const RULES: &[&str] = &[
    CAPABILITY_ADDED,
    CAPABILITY_NOT_DROPPED,
    CAPABILITY_SHOULD_DROP_ALL,
];

const CAPABILITY_ALL: &str = "ALL";

/// Capabilities every container must drop when nothing is configured.
pub const DEFAULT_DROP_LIST: &[&str] = &[CAPABILITY_ALL];

/// Register the capabilities auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |conf| Ok(Box::new(Capabilities::new(conf)) as Box<dyn Auditable>));
}

/// Capabilities implements Auditable.
#[derive(Debug)]
pub struct Capabilities {
    add_list: Vec<String>,
    drop_list: Vec<String>,
}

impl Capabilities {
    pub fn new(conf: &KubeauditConfig) -> Self {
        let capabilities = &conf.auditors.capabilities;
        Self {
            add_list: capabilities.add.clone().unwrap_or_default(),
            drop_list: capabilities.drop.clone().unwrap_or_else(|| {
                DEFAULT_DROP_LIST.iter().map(|c| c.to_string()).collect()
            }),
        }
    }
}

impl Auditable for Capabilities {
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
        let mut results = Vec::new();

        for container in resource.containers() {
            let capabilities = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.capabilities.as_ref());
            let dropped: &[String] =
                capabilities.and_then(|c| c.drop.as_deref()).unwrap_or(&[]);
            let added: &[String] = capabilities.and_then(|c| c.add.as_deref()).unwrap_or(&[]);
            let drops_all = dropped.iter().any(|c| c == CAPABILITY_ALL);

            for required in &self.drop_list {
                if dropped.iter().any(|c| c == required) {
                    continue;
                }
                // Dropping ALL covers every individual capability.
                if required != CAPABILITY_ALL && drops_all {
                    continue;
                }
                let rule = if required == CAPABILITY_ALL {
                    CAPABILITY_SHOULD_DROP_ALL
                } else {
                    CAPABILITY_NOT_DROPPED
                };
                results.push(
                    AuditResult::new(
                        NAME,
                        rule,
                        Severity::Error,
                        format!(
                            "Capability '{}' should be dropped in container '{}'.",
                            required, container.name
                        ),
                    )
                    .with_metadata(keys::CONTAINER, &container.name)
                    .with_metadata("Capability", required)
                    .with_fix(PendingFix::AddDroppedCapability {
                        container: container.name.clone(),
                        capability: required.clone(),
                    }),
                );
            }

            for capability in added {
                if self.add_list.iter().any(|allowed| allowed == capability) {
                    continue;
                }
                results.push(
                    AuditResult::new(
                        NAME,
                        CAPABILITY_ADDED,
                        Severity::Error,
                        format!(
                            "Capability '{}' added in container '{}'. It should be removed from the capability add list.",
                            capability, container.name
                        ),
                    )
                    .with_metadata(keys::CONTAINER, &container.name)
                    .with_metadata("Capability", capability)
                    .with_fix(PendingFix::RemoveAddedCapability {
                        container: container.name.clone(),
                        capability: capability.clone(),
                    }),
                );
            }
        }

        Ok(results)
    }

    fn override_labels(&self, result: &AuditResult) -> Vec<String> {
        // Dropping ALL is the baseline and cannot be waived; individual
        // capabilities can, per capability.
        if result.rule != CAPABILITY_ADDED && result.rule != CAPABILITY_NOT_DROPPED {
            return Vec::new();
        }
        match result.metadata.get("Capability") {
            Some(capability) => vec![override_label_for_capability(capability)],
            None => Vec::new(),
        }
    }
}

/// The override label name for one capability, e.g. `SYS_ADMIN` maps to
/// `allow-capability-sys-admin`.
pub fn override_label_for_capability(capability: &str) -> String {
    format!(
        "allow-capability-{}",
        capability.to_lowercase().replace('_', "-")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Capabilities as K8sCapabilities, Container, Pod, PodSpec, SecurityContext};

    fn pod_with_capabilities(drop: Option<Vec<&str>>, add: Option<Vec<&str>>) -> Resource {
        Resource::from(Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "web".to_string(),
                    security_context: Some(SecurityContext {
                        capabilities: Some(K8sCapabilities {
                            drop: drop.map(|d| d.iter().map(|c| c.to_string()).collect()),
                            add: add.map(|a| a.iter().map(|c| c.to_string()).collect()),
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn audit(auditor: &Capabilities, resource: &Resource) -> Vec<AuditResult> {
        auditor.audit(resource, std::slice::from_ref(resource)).unwrap()
    }

    #[test]
    fn test_missing_drop_all() {
        let auditor = Capabilities::new(&KubeauditConfig::default());
        let resource = pod_with_capabilities(None, None);
        let results = audit(&auditor, &resource);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, CAPABILITY_SHOULD_DROP_ALL);
        assert_eq!(results[0].container(), Some("web"));
        assert_eq!(
            results[0].pending_fix,
            Some(PendingFix::AddDroppedCapability {
                container: "web".to_string(),
                capability: "ALL".to_string(),
            })
        );
    }

    #[test]
    fn test_drop_all_passes() {
        let auditor = Capabilities::new(&KubeauditConfig::default());
        let resource = pod_with_capabilities(Some(vec!["ALL"]), None);
        assert!(audit(&auditor, &resource).is_empty());
    }

    #[test]
    fn test_configured_drop_list() {
        let conf = KubeauditConfig::from_yaml(
            "auditors:\n  capabilities:\n    drop: [\"CHOWN\", \"NET_RAW\"]\n",
        )
        .unwrap();
        let auditor = Capabilities::new(&conf);

        let resource = pod_with_capabilities(Some(vec!["CHOWN"]), None);
        let results = audit(&auditor, &resource);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, CAPABILITY_NOT_DROPPED);
        assert_eq!(results[0].metadata.get("Capability").map(String::as_str), Some("NET_RAW"));

        // Dropping ALL satisfies any configured drop list.
        let resource = pod_with_capabilities(Some(vec!["ALL"]), None);
        assert!(audit(&auditor, &resource).is_empty());
    }

    #[test]
    fn test_added_capability_outside_allow_list() {
        let conf = KubeauditConfig::from_yaml(
            "auditors:\n  capabilities:\n    add: [\"NET_BIND_SERVICE\"]\n",
        )
        .unwrap();
        let auditor = Capabilities::new(&conf);
        let resource = pod_with_capabilities(
            Some(vec!["ALL"]),
            Some(vec!["NET_BIND_SERVICE", "SYS_ADMIN"]),
        );
        let results = audit(&auditor, &resource);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, CAPABILITY_ADDED);
        assert_eq!(results[0].metadata.get("Capability").map(String::as_str), Some("SYS_ADMIN"));
        assert_eq!(
            results[0].pending_fix,
            Some(PendingFix::RemoveAddedCapability {
                container: "web".to_string(),
                capability: "SYS_ADMIN".to_string(),
            })
        );
    }

    #[test]
    fn test_override_labels_are_per_capability() {
        let auditor = Capabilities::new(&KubeauditConfig::default());
        let added = AuditResult::new(NAME, CAPABILITY_ADDED, Severity::Error, "")
            .with_metadata("Capability", "SYS_ADMIN");
        assert_eq!(
            auditor.override_labels(&added),
            vec!["allow-capability-sys-admin".to_string()]
        );

        let drop_all = AuditResult::new(NAME, CAPABILITY_SHOULD_DROP_ALL, Severity::Error, "")
            .with_metadata("Capability", "ALL");
        assert!(auditor.override_labels(&drop_all).is_empty());
    }

    #[test]
    fn test_fix_then_reaudit_is_clean() {
        let auditor = Capabilities::new(&KubeauditConfig::default());
        let mut resource = pod_with_capabilities(None, Some(vec!["SYS_ADMIN"]));
        for result in audit(&auditor, &resource) {
            result.pending_fix.unwrap().apply(&mut resource).unwrap();
        }
        assert!(audit(&auditor, &resource).is_empty());
    }
}
