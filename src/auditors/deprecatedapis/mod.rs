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

//! DeprecatedAPIs auditor.
//!
//! Every resource's declared apiVersion is checked against a static table
//! of Kubernetes API deprecations. Severity depends on the configured
//! versions: Error when the targeted version has removed the API, Warn when
//! the current version has deprecated it, Info otherwise. With no versions
//! configured the table is read as of the newest known release.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{AuditResult, Severity};
use crate::audit::Auditable;
use crate::config::KubeauditConfig;
use crate::fix::PendingFix;
use crate::k8s::Resource;

pub const NAME: &str = "deprecatedapis";

pub const DEPRECATED_API_USED: &str = "DeprecatedAPIUsed";

const RULES: &[&str] = &[DEPRECATED_API_USED];

/// A Kubernetes (major, minor) version.
type Version = (u16, u16);

#[derive(Debug)]
struct Deprecation {
    api_version: &'static str,
    kind: &'static str,
    deprecated_in: Version,
    removed_in: Option<Version>,
    replacement: Option<&'static str>,
}

macro_rules! deprecation {
    ($api:literal, $kind:literal, $dep:expr, $rem:expr, $repl:expr) => {
        Deprecation {
            api_version: $api,
            kind: $kind,
            deprecated_in: $dep,
            removed_in: $rem,
            replacement: $repl,
        }
    };
}

#[rustfmt::skip]
const DEPRECATIONS: &[Deprecation] = &[
    deprecation!("extensions/v1beta1", "Deployment", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("extensions/v1beta1", "DaemonSet", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("extensions/v1beta1", "ReplicaSet", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("extensions/v1beta1", "NetworkPolicy", (1, 9), Some((1, 16)), Some("networking.k8s.io/v1")),
    deprecation!("extensions/v1beta1", "PodSecurityPolicy", (1, 10), Some((1, 16)), Some("policy/v1beta1")),
    deprecation!("extensions/v1beta1", "Ingress", (1, 14), Some((1, 22)), Some("networking.k8s.io/v1")),
    deprecation!("apps/v1beta1", "Deployment", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("apps/v1beta1", "StatefulSet", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("apps/v1beta2", "Deployment", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("apps/v1beta2", "DaemonSet", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("apps/v1beta2", "ReplicaSet", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("apps/v1beta2", "StatefulSet", (1, 9), Some((1, 16)), Some("apps/v1")),
    deprecation!("networking.k8s.io/v1beta1", "Ingress", (1, 19), Some((1, 22)), Some("networking.k8s.io/v1")),
    deprecation!("networking.k8s.io/v1beta1", "IngressClass", (1, 19), Some((1, 22)), Some("networking.k8s.io/v1")),
    deprecation!("rbac.authorization.k8s.io/v1beta1", "Role", (1, 17), Some((1, 22)), Some("rbac.authorization.k8s.io/v1")),
    deprecation!("rbac.authorization.k8s.io/v1beta1", "ClusterRole", (1, 17), Some((1, 22)), Some("rbac.authorization.k8s.io/v1")),
    deprecation!("rbac.authorization.k8s.io/v1beta1", "RoleBinding", (1, 17), Some((1, 22)), Some("rbac.authorization.k8s.io/v1")),
    deprecation!("rbac.authorization.k8s.io/v1beta1", "ClusterRoleBinding", (1, 17), Some((1, 22)), Some("rbac.authorization.k8s.io/v1")),
    deprecation!("apiextensions.k8s.io/v1beta1", "CustomResourceDefinition", (1, 16), Some((1, 22)), Some("apiextensions.k8s.io/v1")),
    deprecation!("admissionregistration.k8s.io/v1beta1", "MutatingWebhookConfiguration", (1, 16), Some((1, 22)), Some("admissionregistration.k8s.io/v1")),
    deprecation!("admissionregistration.k8s.io/v1beta1", "ValidatingWebhookConfiguration", (1, 16), Some((1, 22)), Some("admissionregistration.k8s.io/v1")),
    deprecation!("certificates.k8s.io/v1beta1", "CertificateSigningRequest", (1, 19), Some((1, 22)), Some("certificates.k8s.io/v1")),
    deprecation!("coordination.k8s.io/v1beta1", "Lease", (1, 19), Some((1, 22)), Some("coordination.k8s.io/v1")),
    deprecation!("apiregistration.k8s.io/v1beta1", "APIService", (1, 19), Some((1, 22)), Some("apiregistration.k8s.io/v1")),
    deprecation!("scheduling.k8s.io/v1beta1", "PriorityClass", (1, 14), Some((1, 17)), Some("scheduling.k8s.io/v1")),
    deprecation!("storage.k8s.io/v1beta1", "CSIDriver", (1, 19), Some((1, 22)), Some("storage.k8s.io/v1")),
    deprecation!("storage.k8s.io/v1beta1", "CSINode", (1, 17), Some((1, 22)), Some("storage.k8s.io/v1")),
    deprecation!("storage.k8s.io/v1beta1", "StorageClass", (1, 19), Some((1, 22)), Some("storage.k8s.io/v1")),
    deprecation!("storage.k8s.io/v1beta1", "VolumeAttachment", (1, 19), Some((1, 22)), Some("storage.k8s.io/v1")),
    deprecation!("batch/v1beta1", "CronJob", (1, 21), Some((1, 25)), Some("batch/v1")),
    deprecation!("discovery.k8s.io/v1beta1", "EndpointSlice", (1, 21), Some((1, 25)), Some("discovery.k8s.io/v1")),
    deprecation!("events.k8s.io/v1beta1", "Event", (1, 19), Some((1, 25)), Some("events.k8s.io/v1")),
    deprecation!("autoscaling/v2beta1", "HorizontalPodAutoscaler", (1, 22), Some((1, 25)), Some("autoscaling/v2")),
    deprecation!("autoscaling/v2beta2", "HorizontalPodAutoscaler", (1, 23), Some((1, 26)), Some("autoscaling/v2")),
    deprecation!("policy/v1beta1", "PodDisruptionBudget", (1, 21), Some((1, 25)), Some("policy/v1")),
    deprecation!("policy/v1beta1", "PodSecurityPolicy", (1, 21), Some((1, 25)), None),
];

/// Register the deprecatedapis auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |conf| {
        Ok(Box::new(DeprecatedApis::new(conf)?) as Box<dyn Auditable>)
    });
}

/// DeprecatedApis implements Auditable.
#[derive(Debug)]
pub struct DeprecatedApis {
    current_version: Option<Version>,
    targeted_version: Option<Version>,
}

impl DeprecatedApis {
    pub fn new(conf: &KubeauditConfig) -> Result<Self, AuditError> {
        let settings = &conf.auditors.deprecated_apis;
        Ok(Self {
            current_version: parse_version(settings.current_version.as_deref())?,
            targeted_version: parse_version(settings.targeted_version.as_deref())?,
        })
    }

    fn severity_for(&self, deprecation: &Deprecation) -> Severity {
        // Unconfigured versions read the table as of the newest release.
        let latest = (u16::MAX, u16::MAX);
        let targeted = self.targeted_version.unwrap_or(latest);
        let current = self.current_version.unwrap_or(latest);

        match deprecation.removed_in {
            Some(removed_in) if targeted >= removed_in => Severity::Error,
            _ if current >= deprecation.deprecated_in => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

fn parse_version(raw: Option<&str>) -> Result<Option<Version>, AuditError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let invalid = || AuditError::DeprecationTableMissing(raw.to_string());
    let (major, minor) = raw.trim_start_matches('v').split_once('.').ok_or_else(invalid)?;
    Ok(Some((
        major.parse().map_err(|_| invalid())?,
        minor.parse().map_err(|_| invalid())?,
    )))
}

fn format_version(version: Version) -> String {
    format!("{}.{}", version.0, version.1)
}

impl Auditable for DeprecatedApis {
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
        let deprecation = DEPRECATIONS.iter().find(|d| {
            d.api_version == resource.api_version() && d.kind == resource.kind()
        });
        let Some(deprecation) = deprecation else {
            return Ok(Vec::new());
        };

        let mut message = format!(
            "apiVersion '{}' for kind '{}' is deprecated in Kubernetes {}",
            deprecation.api_version,
            deprecation.kind,
            format_version(deprecation.deprecated_in),
        );
        if let Some(removed_in) = deprecation.removed_in {
            message.push_str(&format!(" and removed in {}", format_version(removed_in)));
        }
        message.push('.');
        if let Some(replacement) = deprecation.replacement {
            message.push_str(&format!(" Use '{}' instead.", replacement));
        }

        let mut result = AuditResult::new(
            NAME,
            DEPRECATED_API_USED,
            self.severity_for(deprecation),
            message,
        )
        .with_metadata("APIVersion", deprecation.api_version)
        .with_metadata("Kind", deprecation.kind)
        .with_metadata("DeprecatedIn", format_version(deprecation.deprecated_in));
        if let Some(removed_in) = deprecation.removed_in {
            result = result.with_metadata("RemovedIn", format_version(removed_in));
        }
        if let Some(replacement) = deprecation.replacement {
            result = result
                .with_metadata("ReplacementAPI", replacement)
                .with_fix(PendingFix::UpgradeApiVersion {
                    old: deprecation.api_version.to_string(),
                    new: replacement.to_string(),
                });
        }

        Ok(vec![result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn auditor(current: Option<&str>, targeted: Option<&str>) -> DeprecatedApis {
        let mut yaml = String::from("auditors:\n  deprecatedApis:\n");
        if let Some(current) = current {
            yaml.push_str(&format!("    currentVersion: \"{}\"\n", current));
        }
        if let Some(targeted) = targeted {
            yaml.push_str(&format!("    targetedVersion: \"{}\"\n", targeted));
        }
        DeprecatedApis::new(&KubeauditConfig::from_yaml(&yaml).unwrap()).unwrap()
    }

    fn old_deployment() -> Resource {
        Resource::from(Deployment::default()).with_api_version("extensions/v1beta1")
    }

    fn audit(auditor: &DeprecatedApis, resource: &Resource) -> Vec<AuditResult> {
        auditor.audit(resource, std::slice::from_ref(resource)).unwrap()
    }

    #[test]
    fn test_removed_api_is_an_error() {
        let auditor = auditor(Some("1.20"), Some("1.22"));
        let results = audit(&auditor, &old_deployment());

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, DEPRECATED_API_USED);
        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(
            results[0].metadata.get("ReplacementAPI").map(String::as_str),
            Some("apps/v1")
        );
        assert_eq!(
            results[0].pending_fix,
            Some(PendingFix::UpgradeApiVersion {
                old: "extensions/v1beta1".to_string(),
                new: "apps/v1".to_string(),
            })
        );
    }

    #[test]
    fn test_deprecated_but_not_removed_is_a_warning() {
        let auditor = auditor(Some("1.10"), Some("1.12"));
        let results = audit(&auditor, &old_deployment());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Warn);
    }

    #[test]
    fn test_not_yet_deprecated_is_info() {
        let auditor = auditor(Some("1.8"), Some("1.8"));
        let results = audit(&auditor, &old_deployment());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Info);
    }

    #[test]
    fn test_unconfigured_versions_default_to_latest() {
        let auditor = auditor(None, None);
        let results = audit(&auditor, &old_deployment());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
    }

    #[test]
    fn test_current_api_version_is_clean() {
        let auditor = auditor(Some("1.20"), Some("1.22"));
        assert!(audit(&auditor, &Resource::from(Deployment::default())).is_empty());
    }

    #[test]
    fn test_unsupported_kind_is_still_checked() {
        let auditor = auditor(Some("1.20"), Some("1.22"));
        let resource = Resource::unsupported(
            "extensions/v1beta1",
            "Ingress",
            ObjectMeta {
                name: Some("web".to_string()),
                ..Default::default()
            },
        );
        let results = audit(&auditor, &resource);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(
            results[0].metadata.get("ReplacementAPI").map(String::as_str),
            Some("networking.k8s.io/v1")
        );
    }

    #[test]
    fn test_bad_version_string_is_rejected() {
        let conf = KubeauditConfig::from_yaml(
            "auditors:\n  deprecatedApis:\n    targetedVersion: \"twenty\"\n",
        )
        .unwrap();
        assert!(matches!(
            DeprecatedApis::new(&conf).unwrap_err(),
            AuditError::DeprecationTableMissing(_)
        ));
    }

    #[test]
    fn test_fix_then_reaudit_is_clean() {
        let auditor = auditor(Some("1.20"), Some("1.22"));
        let mut resource = old_deployment();
        for result in audit(&auditor, &resource) {
            result.pending_fix.unwrap().apply(&mut resource).unwrap();
        }
        assert_eq!(resource.api_version(), "apps/v1");
        assert!(audit(&auditor, &resource).is_empty());
    }
}
