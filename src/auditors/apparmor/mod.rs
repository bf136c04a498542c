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

//! AppArmor auditor.
//!
//! Every container must carry the per-container AppArmor annotation on its
//! pod template, set to the runtime default profile or a node-local one.
//! An annotation that names a container which does not exist would prevent
//! the manifest from being applied to a cluster with AppArmor enabled, so
//! it is flagged too.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::PendingFix;
use crate::k8s::Resource;

pub const NAME: &str = "apparmor";

/// The AppArmor annotation is missing for a container.
pub const APP_ARMOR_ANNOTATION_MISSING: &str = "AppArmorAnnotationMissing";
/// The AppArmor annotation is set to the unconfined profile.
pub const APP_ARMOR_DISABLED: &str = "AppArmorDisabled";
/// The AppArmor annotation is set to a value that is not a valid profile.
pub const APP_ARMOR_BAD_VALUE: &str = "AppArmorBadValue";
/// The AppArmor annotation key refers to a container which doesn't exist.
pub const APP_ARMOR_INVALID_ANNOTATION: &str = "AppArmorInvalidAnnotation";

const RULES: &[&str] = &[
    APP_ARMOR_ANNOTATION_MISSING,
    APP_ARMOR_DISABLED,
    APP_ARMOR_BAD_VALUE,
    APP_ARMOR_INVALID_ANNOTATION,
];

/// The prefix of an annotation key specifying a container profile.
pub const CONTAINER_ANNOTATION_KEY_PREFIX: &str =
    "container.apparmor.security.beta.kubernetes.io/";

/// The profile specifying the runtime default.
pub const PROFILE_RUNTIME_DEFAULT: &str = "runtime/default";
/// The profile specifying the unconfined profile.
pub const PROFILE_UNCONFINED: &str = "unconfined";
/// The prefix for profiles loaded on the node.
pub const PROFILE_NAME_PREFIX: &str = "localhost/";

/// Waives the unconfined profile. A bad value stays non-overridable.
pub const OVERRIDE_LABEL: &str = "allow-disabled-apparmor";

/// Register the apparmor auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(AppArmor::new()) as Box<dyn Auditable>));
}

/// AppArmor implements Auditable.
#[derive(Debug)]
pub struct AppArmor;

impl AppArmor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for AppArmor {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for AppArmor {
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
            if let Some(result) = audit_container(resource, &container.name) {
                results.push(result);
            }
        }

        // Init containers need a profile just the same.
        for container in resource.init_containers() {
            if let Some(result) = audit_container(resource, &container.name) {
                results.push(result);
            }
        }

        results.extend(audit_pod_annotations(resource));
        Ok(results)
    }

    fn override_labels(&self, result: &AuditResult) -> Vec<String> {
        if result.rule == APP_ARMOR_DISABLED {
            vec![OVERRIDE_LABEL.to_string()]
        } else {
            Vec::new()
        }
    }
}

fn container_annotation(container_name: &str) -> String {
    format!("{}{}", CONTAINER_ANNOTATION_KEY_PREFIX, container_name)
}

fn is_valid_profile(profile: &str) -> bool {
    profile == PROFILE_RUNTIME_DEFAULT || profile.starts_with(PROFILE_NAME_PREFIX)
}

fn audit_container(resource: &Resource, container_name: &str) -> Option<AuditResult> {
    let annotation = container_annotation(container_name);
    let profile = resource
        .pod_annotations()
        .and_then(|annotations| annotations.get(annotation.as_str()));

    let Some(profile) = profile else {
        return Some(
            AuditResult::new(
                NAME,
                APP_ARMOR_ANNOTATION_MISSING,
                Severity::Error,
                format!(
                    "AppArmor annotation missing. The annotation '{}' should be added.",
                    annotation
                ),
            )
            .with_metadata(keys::CONTAINER, container_name)
            .with_metadata("MissingAnnotation", &annotation)
            .with_fix(PendingFix::AddPodAnnotation {
                key: annotation,
                value: PROFILE_RUNTIME_DEFAULT.to_string(),
            }),
        );
    };

    if is_valid_profile(profile) {
        return None;
    }

    let rule = if profile == PROFILE_UNCONFINED {
        APP_ARMOR_DISABLED
    } else {
        APP_ARMOR_BAD_VALUE
    };

    Some(
        AuditResult::new(
            NAME,
            rule,
            Severity::Error,
            format!(
                "AppArmor is disabled. The apparmor annotation should be set to '{}' or start with '{}'.",
                PROFILE_RUNTIME_DEFAULT, PROFILE_NAME_PREFIX
            ),
        )
        .with_metadata(keys::CONTAINER, container_name)
        .with_metadata("Annotation", &annotation)
        .with_metadata("AnnotationValue", profile)
        .with_fix(PendingFix::SetPodAnnotation {
            key: annotation,
            value: PROFILE_RUNTIME_DEFAULT.to_string(),
        }),
    )
}

fn audit_pod_annotations(resource: &Resource) -> Vec<AuditResult> {
    let Some(annotations) = resource.pod_annotations() else {
        return Vec::new();
    };

    let container_exists = |name: &str| {
        resource
            .containers()
            .iter()
            .chain(resource.init_containers())
            .any(|c| c.name == name)
    };

    let mut results = Vec::new();
    for (key, value) in annotations {
        let Some(container_name) = key.strip_prefix(CONTAINER_ANNOTATION_KEY_PREFIX) else {
            continue;
        };
        if container_exists(container_name) {
            continue;
        }
        results.push(
            AuditResult::new(
                NAME,
                APP_ARMOR_INVALID_ANNOTATION,
                Severity::Error,
                format!(
                    "AppArmor annotation key refers to a container that doesn't exist. Remove the annotation '{}: {}'.",
                    key, value
                ),
            )
            .with_metadata(keys::CONTAINER, container_name)
            .with_metadata("Annotation", format!("{}: {}", key, value))
            .with_fix(PendingFix::RemovePodAnnotations {
                keys: vec![key.clone()],
            }),
        );
    }
    results
}
