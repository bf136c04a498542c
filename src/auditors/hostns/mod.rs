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

//! Host namespaces auditor: pods must not share the host's network, PID,
//! or IPC namespace.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::{PendingFix, PodSecurityField};
use crate::k8s::Resource;

pub const NAME: &str = "hostns";

pub const NAMESPACE_HOST_NETWORK_TRUE: &str = "NamespaceHostNetworkTrue";
pub const NAMESPACE_HOST_IPC_TRUE: &str = "NamespaceHostIPCTrue";
pub const NAMESPACE_HOST_PID_TRUE: &str = "NamespaceHostPIDTrue";

const RULES: &[&str] = &[
    NAMESPACE_HOST_NETWORK_TRUE,
    NAMESPACE_HOST_IPC_TRUE,
    NAMESPACE_HOST_PID_TRUE,
];

pub const HOST_NETWORK_OVERRIDE_LABEL: &str = "allow-namespace-host-network";
pub const HOST_IPC_OVERRIDE_LABEL: &str = "allow-namespace-host-ipc";
pub const HOST_PID_OVERRIDE_LABEL: &str = "allow-namespace-host-pid";

/// Register the hostns auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(HostNamespaces::new()) as Box<dyn Auditable>));
}

/// HostNamespaces implements Auditable.
#[derive(Debug)]
pub struct HostNamespaces;

impl HostNamespaces {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HostNamespaces {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for HostNamespaces {
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

        let checks = [
            (
                spec.host_network,
                NAMESPACE_HOST_NETWORK_TRUE,
                PodSecurityField::HostNetwork,
                "hostNetwork is set to 'true' in the pod spec. It should be set to 'false'.",
            ),
            (
                spec.host_ipc,
                NAMESPACE_HOST_IPC_TRUE,
                PodSecurityField::HostIpc,
                "hostIPC is set to 'true' in the pod spec. It should be set to 'false'.",
            ),
            (
                spec.host_pid,
                NAMESPACE_HOST_PID_TRUE,
                PodSecurityField::HostPid,
                "hostPID is set to 'true' in the pod spec. It should be set to 'false'.",
            ),
        ];

        let mut results = Vec::new();
        for (value, rule, field, message) in checks {
            if value == Some(true) {
                results.push(
                    AuditResult::new(NAME, rule, Severity::Error, message)
                        .with_metadata(field.as_str(), "true")
                        .with_fix(PendingFix::SetPodSecurityField {
                            field,
                            value: false,
                        }),
                );
            }
        }
        Ok(results)
    }

    fn override_labels(&self, result: &AuditResult) -> Vec<String> {
        let label = match result.rule {
            NAMESPACE_HOST_NETWORK_TRUE => HOST_NETWORK_OVERRIDE_LABEL,
            NAMESPACE_HOST_IPC_TRUE => HOST_IPC_OVERRIDE_LABEL,
            NAMESPACE_HOST_PID_TRUE => HOST_PID_OVERRIDE_LABEL,
            _ => return Vec::new(),
        };
        vec![label.to_string()]
    }
}
