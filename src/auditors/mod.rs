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

//! The auditor catalog.

pub mod apparmor;
pub mod asat;
pub mod capabilities;
pub mod deprecatedapis;
pub mod hostns;
pub mod image;
pub mod limits;
pub mod mounts;
pub mod netpols;
pub mod nonroot;
pub mod privesc;
pub mod privileged;
pub mod rootfs;
pub mod seccomp;

use crate::audit::registry::AuditorRegistry;
use crate::audit::{Auditable, AuditError};
use crate::config::KubeauditConfig;

/// All auditor names, in catalog order. The driver runs auditors in this
/// order.
pub const AUDITOR_NAMES: &[&str] = &[
    apparmor::NAME,
    asat::NAME,
    capabilities::NAME,
    deprecatedapis::NAME,
    hostns::NAME,
    image::NAME,
    limits::NAME,
    mounts::NAME,
    netpols::NAME,
    nonroot::NAME,
    privesc::NAME,
    privileged::NAME,
    rootfs::NAME,
    seccomp::NAME,
];

/// Register every catalog auditor with the registry.
pub fn register_all(registry: &AuditorRegistry) {
    apparmor::register(registry);
    asat::register(registry);
    capabilities::register(registry);
    deprecatedapis::register(registry);
    hostns::register(registry);
    image::register(registry);
    limits::register(registry);
    mounts::register(registry);
    netpols::register(registry);
    nonroot::register(registry);
    privesc::register(registry);
    privileged::register(registry);
    rootfs::register(registry);
    seccomp::register(registry);
}

/// A registry preloaded with the whole catalog.
pub fn default_registry() -> AuditorRegistry {
    let registry = AuditorRegistry::new();
    register_all(&registry);
    registry
}

/// Instantiate the enabled auditors in catalog order. An unknown name in
/// `enabledAuditors` is rejected.
pub fn auditors(
    registry: &AuditorRegistry,
    conf: &KubeauditConfig,
) -> Result<Vec<Box<dyn Auditable>>, AuditError> {
    for name in conf.enabled_auditors.keys() {
        if !AUDITOR_NAMES.contains(&name.as_str()) {
            return Err(AuditError::UnknownAuditor(name.clone()));
        }
    }

    let mut auditors = Vec::new();
    for name in AUDITOR_NAMES {
        if conf.is_enabled(name) {
            auditors.push(registry.instantiate(name, conf)?);
        }
    }
    Ok(auditors)
}
