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

//! NonRoot auditor: containers must not be allowed to run as root.
//! Container-level security context settings win over pod-level ones.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::{ContainerSecurityField, PendingFix};
use crate::k8s::Resource;

pub const NAME: &str = "nonroot";

/// runAsUser is 0 in the container security context.
pub const RUN_AS_USER_CSC_ROOT: &str = "RunAsUserCSCRoot";
/// runAsUser is 0 in the pod security context and unset in the container's.
pub const RUN_AS_USER_PSC_ROOT: &str = "RunAsUserPSCRoot";
/// runAsNonRoot is false in the container security context.
pub const RUN_AS_NON_ROOT_CSC_FALSE: &str = "RunAsNonRootCSCFalse";
/// runAsNonRoot is false in the pod security context and unset in the
/// container's.
pub const RUN_AS_NON_ROOT_PSC_FALSE_CSC_NIL: &str = "RunAsNonRootPSCFalseCSCNil";
/// runAsNonRoot is unset at both levels.
pub const RUN_AS_NON_ROOT_PSC_NIL_CSC_NIL: &str = "RunAsNonRootPSCNilCSCNil";

const RULES: &[&str] = &[
    RUN_AS_USER_CSC_ROOT,
    RUN_AS_USER_PSC_ROOT,
    RUN_AS_NON_ROOT_CSC_FALSE,
    RUN_AS_NON_ROOT_PSC_FALSE_CSC_NIL,
    RUN_AS_NON_ROOT_PSC_NIL_CSC_NIL,
];

pub const OVERRIDE_LABEL: &str = "allow-run-as-root";

/// Register the nonroot auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(NonRoot::new()) as Box<dyn Auditable>));
}

/// NonRoot implements Auditable.
#[derive(Debug)]
pub struct NonRoot;

impl NonRoot {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NonRoot {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for NonRoot {
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
        let psc = spec.security_context.as_ref();
        let pod_run_as_user = psc.and_then(|sc| sc.run_as_user);
        let pod_run_as_non_root = psc.and_then(|sc| sc.run_as_non_root);

        let mut results = Vec::new();
        for container in resource.containers() {
            let csc = container.security_context.as_ref();
            let run_as_user = csc.and_then(|sc| sc.run_as_user);
            let run_as_non_root = csc.and_then(|sc| sc.run_as_non_root);

            match run_as_user {
                Some(0) => {
                    results.push(finding(
                        RUN_AS_USER_CSC_ROOT,
                        &container.name,
                        "runAsUser is set to 0 (root) in the container security context.",
                    ));
                    continue;
                }
                Some(_) => continue,
                None => {}
            }
            match pod_run_as_user {
                Some(0) => {
                    results.push(finding(
                        RUN_AS_USER_PSC_ROOT,
                        &container.name,
                        "runAsUser is set to 0 (root) in the pod security context.",
                    ));
                    continue;
                }
                Some(_) => continue,
                None => {}
            }

            match (run_as_non_root, pod_run_as_non_root) {
                (Some(true), _) | (None, Some(true)) => {}
                (Some(false), _) => results.push(
                    finding(
                        RUN_AS_NON_ROOT_CSC_FALSE,
                        &container.name,
                        "runAsNonRoot is set to false in the container security context. It should be set to true.",
                    )
                    .with_fix(run_as_non_root_fix(&container.name)),
                ),
                (None, Some(false)) => results.push(
                    finding(
                        RUN_AS_NON_ROOT_PSC_FALSE_CSC_NIL,
                        &container.name,
                        "runAsNonRoot is set to false in the pod security context and not set in the container security context.",
                    )
                    .with_fix(run_as_non_root_fix(&container.name)),
                ),
                (None, None) => results.push(
                    finding(
                        RUN_AS_NON_ROOT_PSC_NIL_CSC_NIL,
                        &container.name,
                        "runAsNonRoot is not set in the container security context or the pod security context. It should be set to true in at least one of them.",
                    )
                    .with_fix(run_as_non_root_fix(&container.name)),
                ),
            }
        }
        Ok(results)
    }

    fn override_labels(&self, _result: &AuditResult) -> Vec<String> {
        vec![OVERRIDE_LABEL.to_string()]
    }
}

fn finding(rule: &'static str, container: &str, message: &str) -> AuditResult {
    AuditResult::new(NAME, rule, Severity::Error, message).with_metadata(keys::CONTAINER, container)
}

fn run_as_non_root_fix(container: &str) -> PendingFix {
    PendingFix::SetContainerSecurityField {
        container: container.to_string(),
        field: ContainerSecurityField::RunAsNonRoot,
        value: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{
        Container, Pod, PodSecurityContext, PodSpec, SecurityContext,
    };

    fn pod(
        pod_run_as_user: Option<i64>,
        pod_run_as_non_root: Option<bool>,
        run_as_user: Option<i64>,
        run_as_non_root: Option<bool>,
    ) -> Resource {
        Resource::from(Pod {
            spec: Some(PodSpec {
                security_context: Some(PodSecurityContext {
                    run_as_user: pod_run_as_user,
                    run_as_non_root: pod_run_as_non_root,
                    ..Default::default()
                }),
                containers: vec![Container {
                    name: "web".to_string(),
                    security_context: Some(SecurityContext {
                        run_as_user,
                        run_as_non_root,
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
        NonRoot::new().audit(resource, std::slice::from_ref(resource)).unwrap()
    }

    struct TestCase {
        name: &'static str,
        resource: Resource,
        expected_rule: Option<&'static str>,
    }

    #[test]
    fn test_run_as_non_root_matrix() {
        let cases = vec![
            TestCase {
                name: "container runAsNonRoot true",
                resource: pod(None, None, None, Some(true)),
                expected_rule: None,
            },
            TestCase {
                name: "pod runAsNonRoot true",
                resource: pod(None, Some(true), None, None),
                expected_rule: None,
            },
            TestCase {
                name: "container false wins over pod true",
                resource: pod(None, Some(true), None, Some(false)),
                expected_rule: Some(RUN_AS_NON_ROOT_CSC_FALSE),
            },
            TestCase {
                name: "pod false, container nil",
                resource: pod(None, Some(false), None, None),
                expected_rule: Some(RUN_AS_NON_ROOT_PSC_FALSE_CSC_NIL),
            },
            TestCase {
                name: "nothing set",
                resource: pod(None, None, None, None),
                expected_rule: Some(RUN_AS_NON_ROOT_PSC_NIL_CSC_NIL),
            },
            TestCase {
                name: "container runAsUser 0",
                resource: pod(None, Some(true), Some(0), None),
                expected_rule: Some(RUN_AS_USER_CSC_ROOT),
            },
            TestCase {
                name: "pod runAsUser 0, container nil",
                resource: pod(Some(0), None, None, None),
                expected_rule: Some(RUN_AS_USER_PSC_ROOT),
            },
            TestCase {
                name: "non-zero container runAsUser passes",
                resource: pod(Some(0), None, Some(1000), None),
                expected_rule: None,
            },
        ];

        for tc in cases {
            let results = audit(&tc.resource);
            match tc.expected_rule {
                Some(rule) => {
                    assert_eq!(results.len(), 1, "{}", tc.name);
                    assert_eq!(results[0].rule, rule, "{}", tc.name);
                }
                None => assert!(results.is_empty(), "{}: {:?}", tc.name, results),
            }
        }
    }

    #[test]
    fn test_fix_then_reaudit_is_clean() {
        let mut resource = pod(None, None, None, None);
        for result in audit(&resource) {
            result.pending_fix.unwrap().apply(&mut resource).unwrap();
        }
        assert!(audit(&resource).is_empty());
    }
}
