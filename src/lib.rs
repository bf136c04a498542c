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

//! Audits Kubernetes workload manifests against a catalog of security and
//! hygiene rules.
//!
//! The crate is the auditing core: a registry of independent rule modules
//! inspects a parsed resource set and produces a report of findings, some
//! of which carry a pending fix the driver can apply in place. Parsing,
//! serialization, cluster access, and report emission belong to the
//! caller.
//!
//! ```
//! use kubeaudit::auditors;
//! use kubeaudit::{Kubeaudit, KubeauditConfig, Resource, Severity};
//!
//! let registry = auditors::default_registry();
//! let conf = KubeauditConfig::default();
//! let driver = Kubeaudit::new(auditors::auditors(&registry, &conf)?)?;
//!
//! let resources: Vec<Resource> = vec![/* from the manifest parser */];
//! let report = driver.audit(&resources);
//! if report.has_findings_at(Severity::Error) {
//!     for (resource, result) in report.results() {
//!         eprintln!("{}: [{}] {}", resource, result.rule, result.message);
//!     }
//! }
//! # Ok::<(), kubeaudit::AuditError>(())
//! ```

pub mod audit;
pub mod auditors;
pub mod config;
pub mod fix;
pub mod k8s;
pub mod overrides;

pub use audit::{
    Auditable, AuditError, AuditResult, AuditorRegistry, Kubeaudit, Metadata, Report, Severity,
};
pub use config::KubeauditConfig;
pub use fix::{FixError, PendingFix};
pub use k8s::{Object, Resource, ResourceRef};
