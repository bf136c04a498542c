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

//! PrivEsc auditor: containers must set allowPrivilegeEscalation to false.
//! The field defaults to true, so leaving it unset is as bad as true.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::{ContainerSecurityField, PendingFix};
use crate::k8s::Resource;

pub const NAME: &str = "privesc";

pub const ALLOW_PRIVILEGE_ESCALATION_NIL: &str = "AllowPrivilegeEscalationNil";
pub const ALLOW_PRIVILEGE_ESCALATION_TRUE: &str = "AllowPrivilegeEscalationTrue";

const RULES: &[&str] = &[
    ALLOW_PRIVILEGE_ESCALATION_NIL,
    ALLOW_PRIVILEGE_ESCALATION_TRUE,
];

pub const OVERRIDE_LABEL: &str = "allow-privilege-escalation";

/// Register the privesc auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(PrivilegeEscalation::new()) as Box<dyn Auditable>));
}

/// PrivilegeEscalation implements Auditable.
#[derive(Debug)]
pub struct PrivilegeEscalation;

impl PrivilegeEscalation {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PrivilegeEscalation {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for PrivilegeEscalation {
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
            let allow = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.allow_privilege_escalation);
            let (rule, message) = match allow {
                Some(false) => continue,
                Some(true) => (
                    ALLOW_PRIVILEGE_ESCALATION_TRUE,
                    "allowPrivilegeEscalation is set to true in the container security context. It should be set to false.",
                ),
                None => (
                    ALLOW_PRIVILEGE_ESCALATION_NIL,
                    "allowPrivilegeEscalation is not set in the container security context. It should be set to false.",
                ),
            };
            results.push(
                AuditResult::new(NAME, rule, Severity::Error, message)
                    .with_metadata(keys::CONTAINER, &container.name)
                    .with_fix(PendingFix::SetContainerSecurityField {
                        container: container.name.clone(),
                        field: ContainerSecurityField::AllowPrivilegeEscalation,
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
