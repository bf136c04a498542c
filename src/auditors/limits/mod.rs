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

//! Limits auditor.
//!
//! Containers must declare CPU and memory limits, and stay within the
//! configured maxima when set. Requests must be declared as well, at a
//! softer severity.

use k8s_openapi::api::core::v1::Container;

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::config::KubeauditConfig;
use crate::fix::PendingFix;
use crate::k8s::quantity::{self, ParsedQuantity};
use crate::k8s::Resource;

pub const NAME: &str = "limits";

pub const LIMITS_NOT_SET: &str = "LimitsNotSet";
pub const LIMITS_CPU_NOT_SET: &str = "LimitsCPUNotSet";
pub const LIMITS_MEMORY_NOT_SET: &str = "LimitsMemoryNotSet";
pub const LIMITS_CPU_EXCEEDED: &str = "LimitsCPUExceeded";
pub const LIMITS_MEMORY_EXCEEDED: &str = "LimitsMemoryExceeded";
pub const REQUESTS_CPU_NOT_SET: &str = "RequestsCPUNotSet";
pub const REQUESTS_MEMORY_NOT_SET: &str = "RequestsMemoryNotSet";

const RULES: &[&str] = &[
    LIMITS_NOT_SET,
    LIMITS_CPU_NOT_SET,
    LIMITS_MEMORY_NOT_SET,
    LIMITS_CPU_EXCEEDED,
    LIMITS_MEMORY_EXCEEDED,
    REQUESTS_CPU_NOT_SET,
    REQUESTS_MEMORY_NOT_SET,
];

const CPU: &str = "cpu";
const MEMORY: &str = "memory";

/// Register the limits auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |conf| {
        Ok(Box::new(Limits::new(conf)?) as Box<dyn Auditable>)
    });
}

/// A configured maximum: the original quantity string plus its parsed value.
#[derive(Debug)]
struct Maximum {
    raw: String,
    value: ParsedQuantity,
}

/// Limits implements Auditable.
#[derive(Debug)]
pub struct Limits {
    max_cpu: Option<Maximum>,
    max_memory: Option<Maximum>,
}

impl Limits {
    pub fn new(conf: &KubeauditConfig) -> Result<Self, AuditError> {
        Ok(Self {
            max_cpu: parse_maximum(conf.auditors.limits.cpu.as_deref())?,
            max_memory: parse_maximum(conf.auditors.limits.memory.as_deref())?,
        })
    }

    fn audit_limit(
        &self,
        container: &Container,
        resource_name: &'static str,
        not_set_rule: &'static str,
        exceeded_rule: &'static str,
        maximum: &Option<Maximum>,
    ) -> Result<Option<AuditResult>, AuditError> {
        let limit = container
            .resources
            .as_ref()
            .and_then(|r| r.limits.as_ref())
            .and_then(|limits| limits.get(resource_name));

        let Some(limit) = limit else {
            let mut result = AuditResult::new(
                NAME,
                not_set_rule,
                Severity::Error,
                format!(
                    "{} limit not set in container '{}'.",
                    resource_name, container.name
                ),
            )
            .with_metadata(keys::CONTAINER, &container.name);
            if let Some(maximum) = maximum {
                result = result.with_fix(PendingFix::SetContainerResourceLimit {
                    container: container.name.clone(),
                    resource: resource_name.to_string(),
                    quantity: maximum.raw.clone(),
                });
            }
            return Ok(Some(result));
        };

        let Some(maximum) = maximum else {
            return Ok(None);
        };
        let parsed = quantity::parse(&limit.0).map_err(|e| {
            AuditError::internal(format!(
                "container '{}' declares an unparseable {} limit: {}",
                container.name, resource_name, e
            ))
        })?;
        if parsed > maximum.value {
            return Ok(Some(
                AuditResult::new(
                    NAME,
                    exceeded_rule,
                    Severity::Error,
                    format!(
                        "{} limit '{}' of container '{}' exceeds the maximum '{}'.",
                        resource_name, limit.0, container.name, maximum.raw
                    ),
                )
                .with_metadata(keys::CONTAINER, &container.name)
                .with_metadata("ContainerLimit", &limit.0)
                .with_metadata("MaxLimit", &maximum.raw)
                .with_fix(PendingFix::SetContainerResourceLimit {
                    container: container.name.clone(),
                    resource: resource_name.to_string(),
                    quantity: maximum.raw.clone(),
                }),
            ));
        }
        Ok(None)
    }
}

fn parse_maximum(raw: Option<&str>) -> Result<Option<Maximum>, AuditError> {
    match raw {
        Some(raw) => {
            let value = quantity::parse(raw).map_err(|e| {
                AuditError::invalid_configuration(NAME, e.to_string())
            })?;
            Ok(Some(Maximum {
                raw: raw.to_string(),
                value,
            }))
        }
        None => Ok(None),
    }
}

impl Auditable for Limits {
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
            let has_any_limit = container
                .resources
                .as_ref()
                .and_then(|r| r.limits.as_ref())
                .map(|l| !l.is_empty())
                .unwrap_or(false);
            if !has_any_limit {
                results.push(
                    AuditResult::new(
                        NAME,
                        LIMITS_NOT_SET,
                        Severity::Error,
                        format!("Resource limits not set in container '{}'.", container.name),
                    )
                    .with_metadata(keys::CONTAINER, &container.name),
                );
            }

            let per_resource = [
                (CPU, LIMITS_CPU_NOT_SET, LIMITS_CPU_EXCEEDED, &self.max_cpu),
                (MEMORY, LIMITS_MEMORY_NOT_SET, LIMITS_MEMORY_EXCEEDED, &self.max_memory),
            ];
            for (resource_name, not_set_rule, exceeded_rule, maximum) in per_resource {
                let Some(result) =
                    self.audit_limit(container, resource_name, not_set_rule, exceeded_rule, maximum)?
                else {
                    continue;
                };
                // The blanket rule covers containers with no limits at all;
                // a fixable not-set finding is still worth carrying there.
                if has_any_limit || result.pending_fix.is_some() {
                    results.push(result);
                }
            }

            let requests = container.resources.as_ref().and_then(|r| r.requests.as_ref());
            for (resource_name, rule) in
                [(CPU, REQUESTS_CPU_NOT_SET), (MEMORY, REQUESTS_MEMORY_NOT_SET)]
            {
                if requests.map(|r| !r.contains_key(resource_name)).unwrap_or(true) {
                    results.push(
                        AuditResult::new(
                            NAME,
                            rule,
                            Severity::Warn,
                            format!(
                                "{} request not set in container '{}'.",
                                resource_name, container.name
                            ),
                        )
                        .with_metadata(keys::CONTAINER, &container.name),
                    );
                }
            }
        }

        Ok(results)
    }
}
