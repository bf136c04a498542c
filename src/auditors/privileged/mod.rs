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

//! Privileged auditor: containers must not run privileged. The field
//! defaults to false, so an unset field is hygiene rather than exposure.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::{ContainerSecurityField, PendingFix};
use crate::k8s::Resource;

pub const NAME: &str = "privileged";

pub const PRIVILEGED_TRUE: &str = "PrivilegedTrue";
pub const PRIVILEGED_NIL: &str = "PrivilegedNil";

const RULES: &[&str] = &[PRIVILEGED_TRUE, PRIVILEGED_NIL];

pub const OVERRIDE_LABEL: &str = "allow-privileged";

/// Register the privileged auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(Privileged::new()) as Box<dyn Auditable>));
}

/// Privileged implements Auditable.
#[derive(Debug)]
pub struct Privileged;

impl Privileged {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Privileged {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for Privileged {
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
            let privileged = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.privileged);
            let (rule, severity, message) = match privileged {
                Some(false) => continue,
                Some(true) => (
                    PRIVILEGED_TRUE,
                    Severity::Error,
                    "privileged is set to true in the container security context. It should be set to false.",
                ),
                None => (
                    PRIVILEGED_NIL,
                    Severity::Warn,
                    "privileged is not set in the container security context. It should be set explicitly to false.",
                ),
            };
            results.push(
                AuditResult::new(NAME, rule, severity, message)
                    .with_metadata(keys::CONTAINER, &container.name)
                    .with_fix(PendingFix::SetContainerSecurityField {
                        container: container.name.clone(),
                        field: ContainerSecurityField::Privileged,
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
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, SecurityContext};

    fn pod(privileged: Option<bool>) -> Resource {
        Resource::from(Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "web".to_string(),
                    security_context: Some(SecurityContext {
                        privileged,
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn audit(resource: &Resource) -> Vec<AuditResult> {
        Privileged::new().audit(resource, std::slice::from_ref(resource)).unwrap()
    }

    #[test]
    fn test_false_passes() {
        assert!(audit(&pod(Some(false))).is_empty());
    }

    #[test]
    fn test_true_is_error() {
        let results = audit(&pod(Some(true)));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, PRIVILEGED_TRUE);
        assert_eq!(results[0].severity, Severity::Error);
    }

    #[test]
    fn test_nil_is_warning() {
        let results = audit(&pod(None));
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, PRIVILEGED_NIL);
        assert_eq!(results[0].severity, Severity::Warn);
    }

    #[test]
    fn test_fix_then_reaudit_is_clean() {
        let mut resource = pod(Some(true));
        for result in audit(&resource) {
            result.pending_fix.unwrap().apply(&mut resource).unwrap();
        }
        assert!(audit(&resource).is_empty());
        assert_eq!(
            resource.containers()[0]
                .security_context
                .as_ref()
                .unwrap()
                .privileged,
            Some(false)
        );
    }
}
