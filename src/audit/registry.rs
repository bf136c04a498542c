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

//! Registry of auditors, keyed by name.

use std::collections::HashMap;
use std::sync::RwLock;

use super::auditable::Auditable;
use super::errors::AuditError;
use crate::config::KubeauditConfig;

/// Factory is a function that creates an auditor instance from the
/// configuration.
pub type Factory = fn(&KubeauditConfig) -> Result<Box<dyn Auditable>, AuditError>;

/// AuditorRegistry maps auditor names to factories. The driver consults it
/// when turning a configuration into a concrete auditor list, and tests can
/// register mock auditors.
#[derive(Default)]
pub struct AuditorRegistry {
    registry: RwLock<HashMap<String, Factory>>,
}

impl AuditorRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(HashMap::new()),
        }
    }

    /// Register an auditor factory under the given name.
    pub fn register(&self, name: &str, factory: Factory) {
        let mut registry = self.registry.write().unwrap();
        registry.insert(name.to_string(), factory);
    }

    /// Check if an auditor is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        let registry = self.registry.read().unwrap();
        registry.contains_key(name)
    }

    /// All registered auditor names, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let registry = self.registry.read().unwrap();
        let mut names: Vec<String> = registry.keys().cloned().collect();
        names.sort();
        names
    }

    /// Create a new instance of the named auditor.
    pub fn instantiate(
        &self,
        name: &str,
        conf: &KubeauditConfig,
    ) -> Result<Box<dyn Auditable>, AuditError> {
        let factory = {
            let registry = self.registry.read().unwrap();
            registry
                .get(name)
                .copied()
                .ok_or_else(|| AuditError::UnknownAuditor(name.to_string()))?
        };
        factory(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::result::AuditResult;
    use crate::k8s::Resource;

    #[derive(Debug)]
    struct TestAuditor;

    impl Auditable for TestAuditor {
        fn name(&self) -> &'static str {
            "test"
        }

        fn rules(&self) -> &'static [&'static str] {
            &["TestRule"]
        }

        fn audit(
            &self,
            _resource: &Resource,
            _all: &[Resource],
        ) -> Result<Vec<AuditResult>, AuditError> {
            Ok(Vec::new())
        }
    }

    fn test_factory(_conf: &KubeauditConfig) -> Result<Box<dyn Auditable>, AuditError> {
        Ok(Box::new(TestAuditor))
    }

    #[test]
    fn test_register_and_instantiate() {
        let registry = AuditorRegistry::new();
        registry.register("test", test_factory);

        assert!(registry.is_registered("test"));
        assert!(!registry.is_registered("unknown"));
        assert_eq!(registry.registered_names(), vec!["test".to_string()]);

        let auditor = registry.instantiate("test", &KubeauditConfig::default()).unwrap();
        assert_eq!(auditor.name(), "test");
    }

    #[test]
    fn test_instantiate_unknown() {
        let registry = AuditorRegistry::new();
        let err = registry
            .instantiate("unknown", &KubeauditConfig::default())
            .unwrap_err();
        assert!(matches!(err, AuditError::UnknownAuditor(name) if name == "unknown"));
    }
}
