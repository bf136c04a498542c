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

//! The contract every rule module satisfies.

use super::errors::AuditError;
use super::result::AuditResult;
use crate::k8s::Resource;

/// Auditable is the interface between the audit driver and rule modules.
///
/// An auditor must be deterministic and side-effect-free: two calls with the
/// same inputs return the same findings, and mutation intent is expressed
/// only through pending fixes. `all_resources` carries the full resource set
/// so cross-resource rules (network policies per namespace, deprecated API
/// references) can consult siblings.
pub trait Auditable: Send + Sync + std::fmt::Debug {
    /// Stable auditor name, used in configuration and override labels.
    fn name(&self) -> &'static str;

    /// The stable rule identifiers this auditor can emit. Rule sets are
    /// disjoint across auditors.
    fn rules(&self) -> &'static [&'static str];

    /// Inspect one resource and return its findings.
    fn audit(
        &self,
        resource: &Resource,
        all_resources: &[Resource],
    ) -> Result<Vec<AuditResult>, AuditError>;

    /// The override label names that waive the given finding. Empty means
    /// the finding is not overridable; more than one means every label must
    /// be present for the waiver to apply.
    fn override_labels(&self, _result: &AuditResult) -> Vec<String> {
        Vec::new()
    }
}
