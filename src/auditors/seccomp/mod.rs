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

//! Seccomp auditor.
//!
//! A seccomp profile must be set at the pod level or per container, and
//! must not be Unconfined. Container profiles win over the pod profile.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::PendingFix;
use crate::k8s::Resource;

pub const NAME: &str = "seccomp";

/// No profile at the pod level while some container lacks its own.
pub const SECCOMP_PROFILE_MISSING: &str = "SeccompProfileMissing";
/// The pod-level profile disables seccomp.
pub const SECCOMP_DISABLED_POD: &str = "SeccompDisabledPod";
/// A container-level profile disables seccomp.
pub const SECCOMP_DISABLED_CONTAINER: &str = "SeccompDisabledContainer";

const RULES: &[&str] = &[
    SECCOMP_PROFILE_MISSING,
    SECCOMP_DISABLED_POD,
    SECCOMP_DISABLED_CONTAINER,
];

/// The runtime's default profile.
pub const PROFILE_RUNTIME_DEFAULT: &str = "RuntimeDefault";
/// A profile loaded from the node.
pub const PROFILE_LOCALHOST: &str = "Localhost";
/// Seccomp disabled.
pub const PROFILE_UNCONFINED: &str = "Unconfined";

pub const OVERRIDE_LABEL: &str = "allow-disabled-seccomp";

/// Register the seccomp auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(Seccomp::new()) as Box<dyn Auditable>));
}

/// Seccomp implements Auditable.
#[derive(Debug)]
pub struct Seccomp;

impl Seccomp {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Seccomp {
    fn default() -> Self {
        Self::new()
    }
}

fn is_enabled_profile(profile: &str) -> bool {
    profile == PROFILE_RUNTIME_DEFAULT || profile == PROFILE_LOCALHOST
}

impl Auditable for Seccomp {
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
        let pod_profile = spec
            .security_context
            .as_ref()
            .and_then(|sc| sc.seccomp_profile.as_ref())
            .map(|p| p.type_.as_str());

        let mut results = Vec::new();

        if let Some(profile) = pod_profile {
            if !is_enabled_profile(profile) {
                results.push(
                    AuditResult::new(
                        NAME,
                        SECCOMP_DISABLED_POD,
                        Severity::Error,
                        format!(
                            "Seccomp is disabled at the pod level. The profile should be '{}' instead of '{}'.",
                            PROFILE_RUNTIME_DEFAULT, profile
                        ),
                    )
                    .with_metadata("SeccompProfile", profile)
                    .with_fix(PendingFix::SetPodSeccompProfile {
                        profile: PROFILE_RUNTIME_DEFAULT.to_string(),
                    }),
                );
            }
        }

        let mut container_without_profile = None;
        for container in resource.containers() {
            let profile = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.seccomp_profile.as_ref())
                .map(|p| p.type_.as_str());
            match profile {
                Some(profile) if !is_enabled_profile(profile) => {
                    results.push(
                        AuditResult::new(
                            NAME,
                            SECCOMP_DISABLED_CONTAINER,
                            Severity::Error,
                            format!(
                                "Seccomp is disabled in container '{}'. The profile should be '{}' instead of '{}'.",
                                container.name, PROFILE_RUNTIME_DEFAULT, profile
                            ),
                        )
                        .with_metadata(keys::CONTAINER, &container.name)
                        .with_metadata("SeccompProfile", profile)
                        .with_fix(PendingFix::SetContainerSeccompProfile {
                            container: container.name.clone(),
                            profile: PROFILE_RUNTIME_DEFAULT.to_string(),
                        }),
                    );
                }
                Some(_) => {}
                None => {
                    container_without_profile.get_or_insert(container.name.as_str());
                }
            }
        }

        if pod_profile.is_none() && container_without_profile.is_some() {
            results.push(
                AuditResult::new(
                    NAME,
                    SECCOMP_PROFILE_MISSING,
                    Severity::Error,
                    format!(
                        "Seccomp profile is missing. A profile should be set to '{}' in the pod security context.",
                        PROFILE_RUNTIME_DEFAULT
                    ),
                )
                .with_fix(PendingFix::SetPodSeccompProfile {
                    profile: PROFILE_RUNTIME_DEFAULT.to_string(),
                }),
            );
        }

        Ok(results)
    }

    fn override_labels(&self, _result: &AuditResult) -> Vec<String> {
        vec![OVERRIDE_LABEL.to_string()]
    }
}
