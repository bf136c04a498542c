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

//! Audit infrastructure: the auditor contract, registry, driver, and the
//! report surface.

pub mod auditable;
pub mod driver;
pub mod errors;
pub mod registry;
pub mod report;
pub mod result;

pub use auditable::Auditable;
pub use driver::Kubeaudit;
pub use errors::AuditError;
pub use registry::{AuditorRegistry, Factory};
pub use report::{AuditorError, Report, ResourceReport};
pub use result::{AuditResult, Metadata, Severity};
