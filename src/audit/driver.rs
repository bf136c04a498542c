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

//! The audit driver: wires the resource set, the auditor list, and the
//! override and fix passes together.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use super::auditable::Auditable;
use super::errors::AuditError;
use super::report::{AuditorError, Report, ResourceReport};
use super::result::{AuditResult, Severity};
use crate::k8s::Resource;
use crate::overrides;

/// Auditor name stamped on driver-level findings.
pub const NAME: &str = "kubeaudit";

/// Emitted as an Info finding when the parser handed over a kind no auditor
/// understands.
pub const UNSUPPORTED_RESOURCE_KIND: &str = "UnsupportedResourceKind";

/// Kubeaudit runs an ordered auditor list over a resource set.
#[derive(Debug)]
pub struct Kubeaudit {
    auditors: Vec<Box<dyn Auditable>>,
}

impl Kubeaudit {
    /// Create a driver over the given auditors. At least one is required.
    pub fn new(auditors: Vec<Box<dyn Auditable>>) -> Result<Self, AuditError> {
        if auditors.is_empty() {
            return Err(AuditError::NoAuditors);
        }
        Ok(Self { auditors })
    }

    /// Audit every resource with every auditor and return the report.
    ///
    /// Auditors run in input order over resources in input order, so two
    /// runs on the same inputs produce identical reports. An auditor error
    /// on one resource is recorded and auditing continues.
    pub fn audit(&self, resources: &[Resource]) -> Report {
        static NEVER: AtomicBool = AtomicBool::new(false);
        self.audit_with_cancel(resources, &NEVER)
    }

    /// Like [`audit`](Self::audit), but checks the cancellation flag between
    /// auditors and returns the partial report when it is raised.
    pub fn audit_with_cancel(&self, resources: &[Resource], cancel: &AtomicBool) -> Report {
        let mut items: Vec<ResourceReport> = resources
            .iter()
            .map(|r| ResourceReport {
                resource: r.resource_ref(),
                results: Vec::new(),
            })
            .collect();
        let mut errors: Vec<AuditorError> = Vec::new();

        for (index, resource) in resources.iter().enumerate() {
            if !resource.is_supported_kind() {
                items[index].results.push(
                    AuditResult::new(
                        NAME,
                        UNSUPPORTED_RESOURCE_KIND,
                        Severity::Info,
                        format!(
                            "Resource kind {} ({}) is not supported and was not audited",
                            resource.kind(),
                            resource.api_version()
                        ),
                    ),
                );
            }
        }

        for auditor in &self.auditors {
            if cancel.load(Ordering::Relaxed) {
                warn!(auditor = auditor.name(), "audit cancelled, returning partial report");
                break;
            }
            debug!(auditor = auditor.name(), "running auditor");
            for (index, resource) in resources.iter().enumerate() {
                match auditor.audit(resource, resources) {
                    Ok(results) => items[index].results.extend(results),
                    Err(error) => {
                        warn!(
                            auditor = auditor.name(),
                            resource = %resource.resource_ref(),
                            %error,
                            "auditor failed on resource"
                        );
                        errors.push(AuditorError {
                            auditor: auditor.name(),
                            resource: resource.resource_ref(),
                            error,
                        });
                    }
                }
            }
        }

        let mut report = Report::new(items, errors);
        self.apply_overrides(resources, &mut report);
        report
    }

    /// Audit, then apply every pending fix whose post-override severity is
    /// Error or Warn, in stable (resource, auditor, result) order. Returns
    /// the pre-fix report with any fix failures attached; the resource set
    /// is mutated in place.
    pub fn fix(&self, resources: &mut [Resource]) -> Report {
        let mut report = self.audit(resources);

        let mut fix_errors = Vec::new();
        for (index, item) in report.items().iter().enumerate() {
            for result in &item.results {
                if result.severity == Severity::Info {
                    continue;
                }
                let Some(fix) = &result.pending_fix else {
                    continue;
                };
                debug!(resource = %item.resource, plan = %fix.plan(), "applying fix");
                if let Err(error) = fix.apply(&mut resources[index]) {
                    warn!(%error, "fix failed to apply");
                    fix_errors.push(error);
                }
            }
        }

        report.set_fix_errors(fix_errors);
        report
    }

    fn auditor_by_name(&self, name: &str) -> Option<&dyn Auditable> {
        self.auditors
            .iter()
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    /// Downgrade findings waived by override labels, and mark labels that
    /// name an auditor but cannot waive the finding they sit next to.
    fn apply_overrides(&self, resources: &[Resource], report: &mut Report) {
        for (index, item) in report.items_mut().iter_mut().enumerate() {
            let resource = &resources[index];
            for result in item.results.iter_mut() {
                let valid_labels = match self.auditor_by_name(result.auditor) {
                    Some(auditor) => auditor.override_labels(result),
                    None => Vec::new(),
                };

                if !valid_labels.is_empty() {
                    let container = result.container().map(str::to_string);
                    let mut found = Vec::with_capacity(valid_labels.len());
                    for label in &valid_labels {
                        match overrides::find_override_reason(
                            resource,
                            result.auditor,
                            label,
                            container.as_deref(),
                        ) {
                            Some((reason, key)) => found.push((reason, key.to_string())),
                            None => {
                                found.clear();
                                break;
                            }
                        }
                    }
                    if let Some((reason, key)) = found.into_iter().next() {
                        debug!(
                            auditor = result.auditor,
                            rule = result.rule,
                            label = %key,
                            "finding waived by override label"
                        );
                        *result = overrides::apply_override(result.clone(), &reason, &key);
                        continue;
                    }
                }

                if let Some(key) = invalid_override_key(resource, result, &valid_labels) {
                    *result = overrides::mark_invalid_override(result.clone(), &key);
                }
            }
        }
    }
}

/// A label on this resource that names the finding's auditor but an override
/// its rule does not admit.
fn invalid_override_key(
    resource: &Resource,
    result: &AuditResult,
    valid_labels: &[String],
) -> Option<String> {
    let labels = resource.pod_labels().or_else(|| resource.labels())?;
    labels.keys().find_map(|key| {
        let parsed = overrides::parse_label_key(key)?;
        let invalid = parsed.auditor == result.auditor
            && !valid_labels.iter().any(|v| *v == parsed.override_name);
        invalid.then(|| key.clone())
    })
}
