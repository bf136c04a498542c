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

//! Findings: severity, metadata, and the AuditResult record.

use std::collections::BTreeMap;
use std::fmt;

use crate::fix::PendingFix;

/// Severity of a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Open string map attached to findings. A sorted map keeps report output
/// byte-for-byte deterministic.
pub type Metadata = BTreeMap<String, String>;

/// Metadata keys shared across auditors.
pub mod keys {
    /// The container a finding pertains to.
    pub const CONTAINER: &str = "Container";
    /// The namespace a finding pertains to.
    pub const NAMESPACE: &str = "Namespace";
    /// Justification recorded by an applied override.
    pub const OVERRIDE_REASON: &str = "OverrideReason";
    /// The label key of an applied override.
    pub const OVERRIDE_LABEL: &str = "OverrideLabel";
    /// A label that names this auditor but cannot waive the finding's rule.
    pub const INVALID_OVERRIDE_LABEL: &str = "InvalidOverrideLabel";
}

/// A single finding produced by one auditor for one resource.
///
/// `(auditor, rule)` identifiers are stable; external consumers key on them.
/// Results are immutable once on the report; the override pass produces
/// replacement records rather than editing in place.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditResult {
    pub auditor: &'static str,
    pub rule: &'static str,
    pub severity: Severity,
    pub message: String,
    pub metadata: Metadata,
    pub pending_fix: Option<PendingFix>,
}

impl AuditResult {
    pub fn new(
        auditor: &'static str,
        rule: &'static str,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            auditor,
            rule,
            severity,
            message: message.into(),
            metadata: Metadata::new(),
            pending_fix: None,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_fix(mut self, fix: PendingFix) -> Self {
        self.pending_fix = Some(fix);
        self
    }

    /// The container this finding pertains to, when container-scoped.
    pub fn container(&self) -> Option<&str> {
        self.metadata.get(keys::CONTAINER).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Error);
    }

    #[test]
    fn test_severity_display() {
        assert_eq!(Severity::Info.to_string(), "info");
        assert_eq!(Severity::Warn.to_string(), "warning");
        assert_eq!(Severity::Error.to_string(), "error");
    }

    #[test]
    fn test_result_builder() {
        let result = AuditResult::new("privileged", "PrivilegedTrue", Severity::Error, "bad pod")
            .with_metadata(keys::CONTAINER, "web");

        assert_eq!(result.auditor, "privileged");
        assert_eq!(result.rule, "PrivilegedTrue");
        assert_eq!(result.container(), Some("web"));
        assert!(result.pending_fix.is_none());
    }
}
