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

//! ASAT auditor (automountServiceAccountToken).
//!
//! Flags the deprecated `serviceAccount` pod field, and pods that mount a
//! token for the default service account. The token is mounted unless
//! `automountServiceAccountToken` is explicitly false.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::{PendingFix, PodSecurityField};
use crate::k8s::Resource;

pub const NAME: &str = "asat";

/// The deprecated `serviceAccount` field is in use.
pub const AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_DEPRECATED: &str =
    "AutomountServiceAccountTokenDeprecated";
/// A token for the default service account is mounted.
pub const AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_TRUE_AND_DEFAULT_SA: &str =
    "AutomountServiceAccountTokenTrueAndDefaultSA";

const RULES: &[&str] = &[
    AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_DEPRECATED,
    AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_TRUE_AND_DEFAULT_SA,
];

pub const OVERRIDE_LABEL: &str = "allow-automount-service-account-token";

const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Register the asat auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(AutomountServiceAccountToken::new()) as Box<dyn Auditable>));
}

/// AutomountServiceAccountToken implements Auditable.
#[derive(Debug)]
pub struct AutomountServiceAccountToken;

impl AutomountServiceAccountToken {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AutomountServiceAccountToken {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for AutomountServiceAccountToken {
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

        let mut results = Vec::new();

        if let Some(deprecated) = spec.service_account.as_deref() {
            if !deprecated.is_empty() {
                results.push(
                    AuditResult::new(
                        NAME,
                        AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_DEPRECATED,
                        Severity::Warn,
                        "serviceAccount is deprecated. serviceAccountName should be used instead.",
                    )
                    .with_metadata("DeprecatedServiceAccount", deprecated),
                );
            }
        }

        let uses_default_sa = spec
            .service_account_name
            .as_deref()
            .map(|name| name.is_empty() || name == DEFAULT_SERVICE_ACCOUNT)
            .unwrap_or(true);
        // The token is mounted unless explicitly disabled.
        let token_mounted = spec.automount_service_account_token != Some(false);

        if token_mounted && uses_default_sa {
            results.push(
                AuditResult::new(
                    NAME,
                    AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_TRUE_AND_DEFAULT_SA,
                    Severity::Error,
                    "A token for the default service account is automounted. automountServiceAccountToken should be set to false, or a dedicated service account used.",
                )
                .with_fix(PendingFix::SetPodSecurityField {
                    field: PodSecurityField::AutomountServiceAccountToken,
                    value: false,
                }),
            );
        }

        Ok(results)
    }

    fn override_labels(&self, _result: &AuditResult) -> Vec<String> {
        vec![OVERRIDE_LABEL.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Pod, PodSpec};

    fn pod(
        service_account: Option<&str>,
        service_account_name: Option<&str>,
        automount: Option<bool>,
    ) -> Resource {
        Resource::from(Pod {
            spec: Some(PodSpec {
                service_account: service_account.map(String::from),
                service_account_name: service_account_name.map(String::from),
                automount_service_account_token: automount,
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn audit(resource: &Resource) -> Vec<AuditResult> {
        AutomountServiceAccountToken::new()
            .audit(resource, std::slice::from_ref(resource))
            .unwrap()
    }

    #[test]
    fn test_deprecated_service_account_field() {
        let results = audit(&pod(Some("my-sa"), None, Some(false)));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_DEPRECATED);
        assert_eq!(results[0].severity, Severity::Warn);
    }

    #[test]
    fn test_default_sa_with_token_mounted() {
        // Neither field set: the default service account token is mounted.
        let results = audit(&pod(None, None, None));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_TRUE_AND_DEFAULT_SA);
        assert_eq!(results[0].severity, Severity::Error);

        let results = audit(&pod(None, Some("default"), Some(true)));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, AUTOMOUNT_SERVICE_ACCOUNT_TOKEN_TRUE_AND_DEFAULT_SA);
    }

    #[test]
    fn test_explicit_opt_out_passes() {
        assert!(audit(&pod(None, None, Some(false))).is_empty());
    }

    #[test]
    fn test_dedicated_service_account_passes() {
        assert!(audit(&pod(None, Some("build-bot"), None)).is_empty());
    }

    #[test]
    fn test_fix_then_reaudit_is_clean() {
        let mut resource = pod(None, None, None);
        for result in audit(&resource) {
            result.pending_fix.unwrap().apply(&mut resource).unwrap();
        }
        assert!(audit(&resource).is_empty());
    }
}
