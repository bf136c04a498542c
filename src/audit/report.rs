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

//! The report surface: the in-memory result tree external emitters project
//! into SARIF, JSON, or a human-readable table.

use super::errors::AuditError;
use super::result::{AuditResult, Severity};
use crate::fix::FixError;
use crate::k8s::ResourceRef;

/// Findings for one resource, in the order auditors produced them.
#[derive(Debug)]
pub struct ResourceReport {
    pub resource: ResourceRef,
    pub results: Vec<AuditResult>,
}

/// An auditor failure on a single resource. It does not abort auditing;
/// it is carried here so emitters can show it alongside findings.
#[derive(Debug)]
pub struct AuditorError {
    pub auditor: &'static str,
    pub resource: ResourceRef,
    pub error: AuditError,
}

/// The full outcome of one audit run: one entry per input resource, in
/// input order, plus any auditor and fix errors.
#[derive(Debug, Default)]
pub struct Report {
    items: Vec<ResourceReport>,
    errors: Vec<AuditorError>,
    fix_errors: Vec<FixError>,
}

impl Report {
    pub(crate) fn new(items: Vec<ResourceReport>, errors: Vec<AuditorError>) -> Self {
        Self {
            items,
            errors,
            fix_errors: Vec::new(),
        }
    }

    pub(crate) fn set_fix_errors(&mut self, fix_errors: Vec<FixError>) {
        self.fix_errors = fix_errors;
    }

    /// Per-resource findings, one entry per audited resource in input order.
    pub fn items(&self) -> &[ResourceReport] {
        &self.items
    }

    pub(crate) fn items_mut(&mut self) -> &mut [ResourceReport] {
        &mut self.items
    }

    /// Auditor failures recorded during the run.
    pub fn errors(&self) -> &[AuditorError] {
        &self.errors
    }

    /// Fix-apply failures recorded during a fix run.
    pub fn fix_errors(&self) -> &[FixError] {
        &self.fix_errors
    }

    /// All findings across resources, flattened in report order.
    pub fn results(&self) -> impl Iterator<Item = (&ResourceRef, &AuditResult)> {
        self.items
            .iter()
            .flat_map(|item| item.results.iter().map(move |r| (&item.resource, r)))
    }

    /// The highest severity present, or `None` for a clean report.
    pub fn max_severity(&self) -> Option<Severity> {
        self.results().map(|(_, r)| r.severity).max()
    }

    /// Whether any finding at or above the given severity remains. The
    /// front-end derives its exit code from this.
    pub fn has_findings_at(&self, severity: Severity) -> bool {
        self.results().any(|(_, r)| r.severity >= severity)
    }
}
