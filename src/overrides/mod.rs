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

//! Override labels: manifest authors waive specific findings by labelling
//! the pod template (or the resource itself for kinds without one).
//!
//! Accepted label key forms, all under the `kubeaudit.io` domain:
//!
//! - `<auditor>.kubeaudit.io/<override>.<container>`: container-scoped.
//!   Container scoping uses a dot because a label key admits only one `/`.
//! - `<auditor>.kubeaudit.io/<override>`: pod-scoped.
//! - `container.<auditor>.kubeaudit.io/<override>`: legacy form, applies
//!   to every container.
//!
//! The label value is the justification; empty means no reason was given.

use std::collections::BTreeMap;

use crate::audit::result::{keys, AuditResult, Severity};
use crate::k8s::Resource;

/// Label domain all override keys end their prefix with.
pub const OVERRIDE_LABEL_DOMAIN: &str = "kubeaudit.io";

/// Legacy prefix marking a container-wide override.
const LEGACY_CONTAINER_PREFIX: &str = "container.";

/// A parsed override label key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOverride {
    pub auditor: String,
    pub override_name: String,
    /// `Some` when scoped to one container; `None` when pod-scoped or in
    /// the legacy container-wide form.
    pub container: Option<String>,
}

/// Parse a label key as an override. Returns `None` for keys outside the
/// override domain.
pub fn parse_label_key(key: &str) -> Option<ParsedOverride> {
    let (prefix, name) = key.split_once('/')?;
    let mut auditor = prefix.strip_suffix(&format!(".{}", OVERRIDE_LABEL_DOMAIN))?;
    if let Some(stripped) = auditor.strip_prefix(LEGACY_CONTAINER_PREFIX) {
        auditor = stripped;
    }
    if auditor.is_empty() || name.is_empty() {
        return None;
    }
    // Override names never contain dots, so anything after the first dot
    // is a container name.
    let (override_name, container) = match name.split_once('.') {
        Some((o, c)) => (o.to_string(), Some(c.to_string())),
        None => (name.to_string(), None),
    };
    Some(ParsedOverride {
        auditor: auditor.to_string(),
        override_name,
        container,
    })
}

/// The labels consulted for a resource: the pod template's when it has one,
/// the resource's own otherwise (Namespace findings are waived there).
fn override_labels(resource: &Resource) -> Option<&BTreeMap<String, String>> {
    resource.pod_labels().or_else(|| resource.labels())
}

/// Look up the justification for an override on this resource, preferring
/// the container-scoped form when a container is in play.
pub fn find_override_reason<'a>(
    resource: &'a Resource,
    auditor: &str,
    override_name: &str,
    container: Option<&str>,
) -> Option<(String, &'a str)> {
    let labels = override_labels(resource)?;
    let mut candidates = Vec::with_capacity(3);
    if let Some(container) = container {
        candidates.push(format!(
            "{}.{}/{}.{}",
            auditor, OVERRIDE_LABEL_DOMAIN, override_name, container
        ));
    }
    candidates.push(format!("{}.{}/{}", auditor, OVERRIDE_LABEL_DOMAIN, override_name));
    candidates.push(format!(
        "{}{}.{}/{}",
        LEGACY_CONTAINER_PREFIX, auditor, OVERRIDE_LABEL_DOMAIN, override_name
    ));

    for key in candidates {
        if let Some((key, reason)) = labels.get_key_value(key.as_str()) {
            return Some((reason.clone(), key.as_str()));
        }
    }
    None
}

/// Downgrade an overridden finding: Error becomes Warn, the pending fix is
/// dropped (the author has waived the finding), and the justification and
/// label are stamped into the metadata.
pub fn apply_override(result: AuditResult, reason: &str, label_key: &str) -> AuditResult {
    let severity = match result.severity {
        Severity::Error => Severity::Warn,
        other => other,
    };
    let mut overridden = result
        .with_metadata(keys::OVERRIDE_REASON, reason)
        .with_metadata(keys::OVERRIDE_LABEL, label_key);
    overridden.severity = severity;
    overridden.pending_fix = None;
    overridden
}

/// Mark a finding whose auditor was named by a label that cannot waive its
/// rule. The finding itself is unchanged apart from the warning entry.
pub fn mark_invalid_override(result: AuditResult, label_key: &str) -> AuditResult {
    result.with_metadata(keys::INVALID_OVERRIDE_LABEL, label_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Pod;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn labelled_pod(labels: &[(&str, &str)]) -> Resource {
        Resource::from(Pod {
            metadata: ObjectMeta {
                name: Some("pod".to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_parse_pod_scoped() {
        let parsed = parse_label_key("apparmor.kubeaudit.io/allow-disabled-apparmor").unwrap();
        assert_eq!(parsed.auditor, "apparmor");
        assert_eq!(parsed.override_name, "allow-disabled-apparmor");
        assert_eq!(parsed.container, None);
    }

    #[test]
    fn test_parse_container_scoped() {
        let parsed = parse_label_key("capabilities.kubeaudit.io/allow-capability-sys-admin.web")
            .unwrap();
        assert_eq!(parsed.auditor, "capabilities");
        assert_eq!(parsed.override_name, "allow-capability-sys-admin");
        assert_eq!(parsed.container.as_deref(), Some("web"));
    }

    #[test]
    fn test_parse_legacy_container_form() {
        let parsed =
            parse_label_key("container.apparmor.kubeaudit.io/allow-disabled-apparmor").unwrap();
        assert_eq!(parsed.auditor, "apparmor");
        assert_eq!(parsed.override_name, "allow-disabled-apparmor");
        assert_eq!(parsed.container, None);
    }

    #[test]
    fn test_parse_rejects_foreign_labels() {
        assert!(parse_label_key("app").is_none());
        assert!(parse_label_key("app.kubernetes.io/name").is_none());
        assert!(parse_label_key("kubeaudit.io/allow-privileged").is_none());
    }

    #[test]
    fn test_find_reason_prefers_container_scope() {
        let resource = labelled_pod(&[
            ("privileged.kubeaudit.io/allow-privileged", "pod reason"),
            ("privileged.kubeaudit.io/allow-privileged.web", "web reason"),
        ]);

        let (reason, key) =
            find_override_reason(&resource, "privileged", "allow-privileged", Some("web")).unwrap();
        assert_eq!(reason, "web reason");
        assert_eq!(key, "privileged.kubeaudit.io/allow-privileged.web");

        let (reason, _) =
            find_override_reason(&resource, "privileged", "allow-privileged", Some("other"))
                .unwrap();
        assert_eq!(reason, "pod reason");
    }

    #[test]
    fn test_find_reason_legacy_form() {
        let resource = labelled_pod(&[(
            "container.apparmor.kubeaudit.io/allow-disabled-apparmor",
            "needed for strace",
        )]);

        let (reason, _) =
            find_override_reason(&resource, "apparmor", "allow-disabled-apparmor", Some("web"))
                .unwrap();
        assert_eq!(reason, "needed for strace");
    }

    #[test]
    fn test_apply_override_downgrades_and_stamps() {
        let result = AuditResult::new("apparmor", "AppArmorDisabled", Severity::Error, "disabled")
            .with_metadata(keys::CONTAINER, "web");
        let overridden = apply_override(
            result,
            "needed for strace",
            "apparmor.kubeaudit.io/allow-disabled-apparmor",
        );

        assert_eq!(overridden.severity, Severity::Warn);
        assert_eq!(
            overridden.metadata.get(keys::OVERRIDE_REASON).map(String::as_str),
            Some("needed for strace")
        );
        assert_eq!(
            overridden.metadata.get(keys::OVERRIDE_LABEL).map(String::as_str),
            Some("apparmor.kubeaudit.io/allow-disabled-apparmor")
        );
        assert!(overridden.pending_fix.is_none());
    }
}
