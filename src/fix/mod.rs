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

//! The closed vocabulary of pending fixes auditors may attach to findings.
//!
//! Every variant exposes a one-line [`plan`](PendingFix::plan) and an
//! in-place, idempotent [`apply`](PendingFix::apply). Fixes touching
//! distinct fields are order-independent; the driver resolves same-field
//! collisions by applying fixes in stable report order.

use std::fmt;

use k8s_openapi::api::core::v1::SeccompProfile;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use thiserror::Error;

use crate::k8s::{Object, Resource, ResourceRef};

/// A pending fix failed to apply; the resource set may be partially mutated.
#[derive(Debug, Error)]
#[error("cannot apply fix to {resource}: {message} (plan was: {plan})")]
pub struct FixError {
    pub resource: ResourceRef,
    pub plan: String,
    pub message: String,
}

/// Pod-spec boolean fields a fix may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodSecurityField {
    HostNetwork,
    HostIpc,
    HostPid,
    AutomountServiceAccountToken,
}

impl PodSecurityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            PodSecurityField::HostNetwork => "hostNetwork",
            PodSecurityField::HostIpc => "hostIPC",
            PodSecurityField::HostPid => "hostPID",
            PodSecurityField::AutomountServiceAccountToken => "automountServiceAccountToken",
        }
    }
}

/// Container security-context boolean fields a fix may set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerSecurityField {
    AllowPrivilegeEscalation,
    Privileged,
    ReadOnlyRootFilesystem,
    RunAsNonRoot,
}

impl ContainerSecurityField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerSecurityField::AllowPrivilegeEscalation => "allowPrivilegeEscalation",
            ContainerSecurityField::Privileged => "privileged",
            ContainerSecurityField::ReadOnlyRootFilesystem => "readOnlyRootFilesystem",
            ContainerSecurityField::RunAsNonRoot => "runAsNonRoot",
        }
    }
}

/// Network policy traffic directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyType {
    Ingress,
    Egress,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::Ingress => "Ingress",
            PolicyType::Egress => "Egress",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deferred mutation that resolves a finding.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingFix {
    /// Set a pod annotation, overwriting any existing value.
    SetPodAnnotation { key: String, value: String },
    /// Add a pod annotation only if the key is absent.
    AddPodAnnotation { key: String, value: String },
    /// Remove the named pod annotations.
    RemovePodAnnotations { keys: Vec<String> },
    /// Set a boolean field on the pod spec.
    SetPodSecurityField { field: PodSecurityField, value: bool },
    /// Set a boolean field on a container's security context.
    SetContainerSecurityField {
        container: String,
        field: ContainerSecurityField,
        value: bool,
    },
    /// Set the pod-level seccomp profile type.
    SetPodSeccompProfile { profile: String },
    /// Set a container's seccomp profile type.
    SetContainerSeccompProfile { container: String, profile: String },
    /// Append a capability to a container's drop list.
    AddDroppedCapability { container: String, capability: String },
    /// Remove a capability from a container's add list.
    RemoveAddedCapability { container: String, capability: String },
    /// Set a resource limit ("cpu", "memory") on a container.
    SetContainerResourceLimit {
        container: String,
        resource: String,
        quantity: String,
    },
    /// Turn a network policy into a default-deny policy for one traffic
    /// direction by dropping its allow-all rules and listing the type.
    SetNetworkPolicyDefaultDeny {
        namespace: String,
        policy_type: PolicyType,
    },
    /// Rewrite the declared apiVersion of the resource.
    UpgradeApiVersion { old: String, new: String },
}

impl PendingFix {
    /// One-line, imperative description of the change. Wording is stable so
    /// plans can be diffed across runs.
    pub fn plan(&self) -> String {
        match self {
            PendingFix::SetPodAnnotation { key, value } => {
                format!("Set pod annotation '{}' to '{}'", key, value)
            }
            PendingFix::AddPodAnnotation { key, value } => {
                format!("Add pod annotation '{}: {}'", key, value)
            }
            PendingFix::RemovePodAnnotations { keys } => {
                format!("Remove pod annotations '{}'", keys.join("', '"))
            }
            PendingFix::SetPodSecurityField { field, value } => {
                format!("Set {} to {} in the pod spec", field.as_str(), value)
            }
            PendingFix::SetContainerSecurityField {
                container,
                field,
                value,
            } => format!(
                "Set {} to {} in the security context of container '{}'",
                field.as_str(),
                value,
                container
            ),
            PendingFix::SetPodSeccompProfile { profile } => {
                format!("Set the pod seccomp profile to '{}'", profile)
            }
            PendingFix::SetContainerSeccompProfile { container, profile } => format!(
                "Set the seccomp profile of container '{}' to '{}'",
                container, profile
            ),
            PendingFix::AddDroppedCapability {
                container,
                capability,
            } => format!(
                "Add capability '{}' to the drop list of container '{}'",
                capability, container
            ),
            PendingFix::RemoveAddedCapability {
                container,
                capability,
            } => format!(
                "Remove capability '{}' from the add list of container '{}'",
                capability, container
            ),
            PendingFix::SetContainerResourceLimit {
                container,
                resource,
                quantity,
            } => format!(
                "Set the {} limit of container '{}' to '{}'",
                resource, container, quantity
            ),
            PendingFix::SetNetworkPolicyDefaultDeny {
                namespace,
                policy_type,
            } => format!(
                "Make the network policy deny all {} traffic by default in namespace '{}'",
                policy_type, namespace
            ),
            PendingFix::UpgradeApiVersion { old, new } => {
                format!("Change apiVersion from '{}' to '{}'", old, new)
            }
        }
    }

    /// Mutate the resource so it satisfies the rule that produced this fix.
    /// Applying to a resource that already satisfies it is a no-op.
    pub fn apply(&self, resource: &mut Resource) -> Result<(), FixError> {
        match self {
            PendingFix::SetPodAnnotation { key, value } => {
                let meta = self.pod_meta(resource)?;
                meta.annotations
                    .get_or_insert_with(Default::default)
                    .insert(key.clone(), value.clone());
                Ok(())
            }
            PendingFix::AddPodAnnotation { key, value } => {
                let meta = self.pod_meta(resource)?;
                meta.annotations
                    .get_or_insert_with(Default::default)
                    .entry(key.clone())
                    .or_insert_with(|| value.clone());
                Ok(())
            }
            PendingFix::RemovePodAnnotations { keys } => {
                let meta = self.pod_meta(resource)?;
                if let Some(annotations) = meta.annotations.as_mut() {
                    for key in keys {
                        annotations.remove(key);
                    }
                }
                Ok(())
            }
            PendingFix::SetPodSecurityField { field, value } => {
                let spec = self.pod_spec(resource)?;
                match field {
                    PodSecurityField::HostNetwork => spec.host_network = Some(*value),
                    PodSecurityField::HostIpc => spec.host_ipc = Some(*value),
                    PodSecurityField::HostPid => spec.host_pid = Some(*value),
                    PodSecurityField::AutomountServiceAccountToken => {
                        spec.automount_service_account_token = Some(*value)
                    }
                }
                Ok(())
            }
            PendingFix::SetContainerSecurityField {
                container,
                field,
                value,
            } => {
                let c = self.container(resource, container)?;
                let sc = c.security_context.get_or_insert_with(Default::default);
                match field {
                    ContainerSecurityField::AllowPrivilegeEscalation => {
                        sc.allow_privilege_escalation = Some(*value)
                    }
                    ContainerSecurityField::Privileged => sc.privileged = Some(*value),
                    ContainerSecurityField::ReadOnlyRootFilesystem => {
                        sc.read_only_root_filesystem = Some(*value)
                    }
                    ContainerSecurityField::RunAsNonRoot => sc.run_as_non_root = Some(*value),
                }
                Ok(())
            }
            PendingFix::SetPodSeccompProfile { profile } => {
                let spec = self.pod_spec(resource)?;
                spec.security_context
                    .get_or_insert_with(Default::default)
                    .seccomp_profile = Some(SeccompProfile {
                    type_: profile.clone(),
                    localhost_profile: None,
                });
                Ok(())
            }
            PendingFix::SetContainerSeccompProfile { container, profile } => {
                let c = self.container(resource, container)?;
                c.security_context
                    .get_or_insert_with(Default::default)
                    .seccomp_profile = Some(SeccompProfile {
                    type_: profile.clone(),
                    localhost_profile: None,
                });
                Ok(())
            }
            PendingFix::AddDroppedCapability {
                container,
                capability,
            } => {
                let c = self.container(resource, container)?;
                let caps = c
                    .security_context
                    .get_or_insert_with(Default::default)
                    .capabilities
                    .get_or_insert_with(Default::default);
                let drop = caps.drop.get_or_insert_with(Default::default);
                if !drop.iter().any(|d| d == capability) {
                    drop.push(capability.clone());
                }
                Ok(())
            }
            PendingFix::RemoveAddedCapability {
                container,
                capability,
            } => {
                let c = self.container(resource, container)?;
                if let Some(add) = c
                    .security_context
                    .as_mut()
                    .and_then(|sc| sc.capabilities.as_mut())
                    .and_then(|caps| caps.add.as_mut())
                {
                    add.retain(|a| a != capability);
                }
                Ok(())
            }
            PendingFix::SetContainerResourceLimit {
                container,
                resource: resource_name,
                quantity,
            } => {
                let c = self.container(resource, container)?;
                c.resources
                    .get_or_insert_with(Default::default)
                    .limits
                    .get_or_insert_with(Default::default)
                    .insert(resource_name.clone(), Quantity(quantity.clone()));
                Ok(())
            }
            PendingFix::SetNetworkPolicyDefaultDeny { policy_type, .. } => {
                let np = match resource.object_mut() {
                    Object::NetworkPolicy(np) => np,
                    _ => {
                        return Err(self.error(resource, "resource is not a NetworkPolicy"));
                    }
                };
                let spec = np.spec.get_or_insert_with(Default::default);
                let types = spec.policy_types.get_or_insert_with(Default::default);
                if !types.iter().any(|t| t == policy_type.as_str()) {
                    types.push(policy_type.as_str().to_string());
                }
                match policy_type {
                    PolicyType::Ingress => {
                        if let Some(rules) = spec.ingress.as_mut() {
                            rules.retain(|r| *r != Default::default());
                        }
                    }
                    PolicyType::Egress => {
                        if let Some(rules) = spec.egress.as_mut() {
                            rules.retain(|r| *r != Default::default());
                        }
                    }
                }
                Ok(())
            }
            PendingFix::UpgradeApiVersion { old, new } => {
                if resource.api_version() == old {
                    resource.set_api_version(new.clone());
                }
                Ok(())
            }
        }
    }

    fn pod_meta<'a>(
        &self,
        resource: &'a mut Resource,
    ) -> Result<&'a mut k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta, FixError> {
        let err = self.error(resource, "resource has no pod template");
        resource.pod_meta_mut().ok_or(err)
    }

    fn pod_spec<'a>(
        &self,
        resource: &'a mut Resource,
    ) -> Result<&'a mut k8s_openapi::api::core::v1::PodSpec, FixError> {
        let err = self.error(resource, "resource has no pod spec");
        resource.pod_spec_mut().ok_or(err)
    }

    fn container<'a>(
        &self,
        resource: &'a mut Resource,
        name: &str,
    ) -> Result<&'a mut k8s_openapi::api::core::v1::Container, FixError> {
        let err = self.error(resource, format!("no container named '{}'", name));
        resource.find_container_mut(name).ok_or(err)
    }

    fn error(&self, resource: &Resource, message: impl Into<String>) -> FixError {
        FixError {
            resource: resource.resource_ref(),
            plan: self.plan(),
            message: message.into(),
        }
    }
}
