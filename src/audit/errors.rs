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

//! Audit error types.

use thiserror::Error;

/// AuditError represents errors raised while configuring or running auditors.
///
/// Findings are never errors: an unsupported resource kind, for example,
/// surfaces as an Info-severity result on the report.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The configuration names an auditor that is not in the registry.
    #[error("unknown auditor: {0}")]
    UnknownAuditor(String),

    /// A per-auditor setting is type-mismatched or out of range.
    #[error("invalid configuration for auditor {auditor}: {message}")]
    InvalidConfiguration { auditor: String, message: String },

    /// The deprecated-API auditor was configured with a version for which
    /// no deprecation table can be resolved.
    #[error("no deprecation table resolvable for Kubernetes version {0:?}")]
    DeprecationTableMissing(String),

    /// The driver was constructed with no auditors.
    #[error("no auditors enabled")]
    NoAuditors,

    /// An auditor-internal failure while inspecting a single resource.
    #[error("{0}")]
    Internal(String),
}

impl AuditError {
    pub fn invalid_configuration(auditor: impl Into<String>, message: impl Into<String>) -> Self {
        AuditError::InvalidConfiguration {
            auditor: auditor.into(),
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AuditError::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuditError::UnknownAuditor("nonsense".to_string()).to_string(),
            "unknown auditor: nonsense"
        );
        assert_eq!(
            AuditError::invalid_configuration("limits", "bad quantity \"12xyz\"").to_string(),
            "invalid configuration for auditor limits: bad quantity \"12xyz\""
        );
        assert_eq!(AuditError::NoAuditors.to_string(), "no auditors enabled");
    }
}
