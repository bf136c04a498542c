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

//! RootFS auditor: containers must use a read-only root filesystem.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::{ContainerSecurityField, PendingFix};
use crate::k8s::Resource;

pub const NAME: &str = "rootfs";

pub const READ_ONLY_ROOT_FILESYSTEM_FALSE: &str = "ReadOnlyRootFilesystemFalse";
pub const READ_ONLY_ROOT_FILESYSTEM_NIL: &str = "ReadOnlyRootFilesystemNil";

const RULES: &[&str] = &[
    READ_ONLY_ROOT_FILESYSTEM_FALSE,
    READ_ONLY_ROOT_FILESYSTEM_NIL,
];

pub const OVERRIDE_LABEL: &str = "allow-read-only-root-filesystem-false";

/// Register the rootfs auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(ReadOnlyRootFilesystem::new()) as Box<dyn Auditable>));
}

/// ReadOnlyRootFilesystem implements Auditable.
#[derive(Debug)]
pub struct ReadOnlyRootFilesystem;

impl ReadOnlyRootFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ReadOnlyRootFilesystem {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for ReadOnlyRootFilesystem {
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
            let read_only = container
                .security_context
                .as_ref()
                .and_then(|sc| sc.read_only_root_filesystem);
            let (rule, message) = match read_only {
                Some(true) => continue,
                Some(false) => (
                    READ_ONLY_ROOT_FILESYSTEM_FALSE,
                    "readOnlyRootFilesystem is set to false in the container security context. It should be set to true.",
                ),
                None => (
                    READ_ONLY_ROOT_FILESYSTEM_NIL,
                    "readOnlyRootFilesystem is not set in the container security context. It should be set to true.",
                ),
            };
            results.push(
                AuditResult::new(NAME, rule, Severity::Error, message)
                    .with_metadata(keys::CONTAINER, &container.name)
                    .with_fix(PendingFix::SetContainerSecurityField {
                        container: container.name.clone(),
                        field: ContainerSecurityField::ReadOnlyRootFilesystem,
                        value: true,
                    }),
            );
        }
        Ok(results)
    }

    fn override_labels(&self, _result: &AuditResult) -> Vec<String> {
        vec![OVERRIDE_LABEL.to_string()]
    }
}
