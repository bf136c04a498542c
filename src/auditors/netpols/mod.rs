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

//! Network policies auditor.
//!
//! Every namespace in the resource set needs a network policy that selects
//! all pods and default-denies both ingress and egress traffic. The check
//! is cross-resource: namespaces are judged against the policies found in
//! the same resource set. `kube-system` is exempt.

use k8s_openapi::api::networking::v1::NetworkPolicy;

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::fix::{PendingFix, PolicyType};
use crate::k8s::Resource;

pub const NAME: &str = "netpols";

pub const MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS: &str =
    "MissingDefaultDenyIngressAndEgressNetworkPolicy";
pub const MISSING_DEFAULT_DENY_INGRESS: &str = "MissingDefaultDenyIngressNetworkPolicy";
pub const MISSING_DEFAULT_DENY_EGRESS: &str = "MissingDefaultDenyEgressNetworkPolicy";
pub const ALLOW_ALL_INGRESS_EXISTS: &str = "AllowAllIngressNetworkPolicyExists";
pub const ALLOW_ALL_EGRESS_EXISTS: &str = "AllowAllEgressNetworkPolicyExists";

const RULES: &[&str] = &[
    MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS,
    MISSING_DEFAULT_DENY_INGRESS,
    MISSING_DEFAULT_DENY_EGRESS,
    ALLOW_ALL_INGRESS_EXISTS,
    ALLOW_ALL_EGRESS_EXISTS,
];

pub const INGRESS_OVERRIDE_LABEL: &str = "allow-non-default-deny-ingress-network-policy";
pub const EGRESS_OVERRIDE_LABEL: &str = "allow-non-default-deny-egress-network-policy";

const EXEMPT_NAMESPACE: &str = "kube-system";

/// Register the netpols auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |_conf| Ok(Box::new(NetworkPolicies::new()) as Box<dyn Auditable>));
}

/// NetworkPolicies implements Auditable.
#[derive(Debug)]
pub struct NetworkPolicies;

impl NetworkPolicies {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NetworkPolicies {
    fn default() -> Self {
        Self::new()
    }
}

impl Auditable for NetworkPolicies {
    fn name(&self) -> &'static str {
        NAME
    }

    fn rules(&self) -> &'static [&'static str] {
        RULES
    }

    fn audit(
        &self,
        resource: &Resource,
        all_resources: &[Resource],
    ) -> Result<Vec<AuditResult>, AuditError> {
        if resource.as_namespace().is_some() {
            return Ok(audit_namespace(resource, all_resources));
        }
        if let Some(np) = resource.as_network_policy() {
            return Ok(audit_network_policy(resource, np));
        }
        Ok(Vec::new())
    }

    fn override_labels(&self, result: &AuditResult) -> Vec<String> {
        match result.rule {
            MISSING_DEFAULT_DENY_INGRESS => vec![INGRESS_OVERRIDE_LABEL.to_string()],
            MISSING_DEFAULT_DENY_EGRESS => vec![EGRESS_OVERRIDE_LABEL.to_string()],
            // Waiving both directions takes both labels.
            MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS => vec![
                INGRESS_OVERRIDE_LABEL.to_string(),
                EGRESS_OVERRIDE_LABEL.to_string(),
            ],
            _ => Vec::new(),
        }
    }
}

/// Whether the policy selects every pod in its namespace.
fn selects_all_pods(np: &NetworkPolicy) -> bool {
    let Some(spec) = np.spec.as_ref() else {
        return false;
    };
    let selector = &spec.pod_selector;
    selector
        .match_labels
        .as_ref()
        .map(|m| m.is_empty())
        .unwrap_or(true)
        && selector
            .match_expressions
            .as_ref()
            .map(|e| e.is_empty())
            .unwrap_or(true)
}

fn lists_policy_type(np: &NetworkPolicy, policy_type: PolicyType) -> bool {
    np.spec
        .as_ref()
        .and_then(|s| s.policy_types.as_ref())
        .map(|types| types.iter().any(|t| t == policy_type.as_str()))
        .unwrap_or(false)
}

/// An empty rule matches all traffic, turning the policy into allow-all for
/// that direction.
fn has_allow_all_rule(np: &NetworkPolicy, policy_type: PolicyType) -> bool {
    let Some(spec) = np.spec.as_ref() else {
        return false;
    };
    match policy_type {
        PolicyType::Ingress => spec
            .ingress
            .iter()
            .flatten()
            .any(|rule| *rule == Default::default()),
        PolicyType::Egress => spec
            .egress
            .iter()
            .flatten()
            .any(|rule| *rule == Default::default()),
    }
}

fn default_denies(np: &NetworkPolicy, policy_type: PolicyType) -> bool {
    selects_all_pods(np)
        && lists_policy_type(np, policy_type)
        && !has_allow_all_rule(np, policy_type)
}

fn audit_namespace(resource: &Resource, all_resources: &[Resource]) -> Vec<AuditResult> {
    let Some(namespace) = resource.name() else {
        return Vec::new();
    };
    if namespace == EXEMPT_NAMESPACE {
        return Vec::new();
    }

    let policies: Vec<&NetworkPolicy> = all_resources
        .iter()
        .filter(|r| r.namespace() == Some(namespace))
        .filter_map(|r| r.as_network_policy())
        .collect();

    let denies_ingress = policies.iter().any(|np| default_denies(np, PolicyType::Ingress));
    let denies_egress = policies.iter().any(|np| default_denies(np, PolicyType::Egress));

    let (rule, missing) = match (denies_ingress, denies_egress) {
        (true, true) => return Vec::new(),
        (false, false) => (MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS, "ingress and egress"),
        (false, true) => (MISSING_DEFAULT_DENY_INGRESS, "ingress"),
        (true, false) => (MISSING_DEFAULT_DENY_EGRESS, "egress"),
    };

    vec![AuditResult::new(
        NAME,
        rule,
        Severity::Error,
        format!(
            "Namespace '{}' is missing a default-deny {} network policy.",
            namespace, missing
        ),
    )
    .with_metadata(keys::NAMESPACE, namespace)]
}

fn audit_network_policy(resource: &Resource, np: &NetworkPolicy) -> Vec<AuditResult> {
    if !selects_all_pods(np) {
        return Vec::new();
    }
    let namespace = resource.namespace().unwrap_or_default();
    let policy_name = resource.name().unwrap_or_default();

    let mut results = Vec::new();
    let directions = [
        (PolicyType::Ingress, ALLOW_ALL_INGRESS_EXISTS),
        (PolicyType::Egress, ALLOW_ALL_EGRESS_EXISTS),
    ];
    for (policy_type, rule) in directions {
        if has_allow_all_rule(np, policy_type) {
            results.push(
                AuditResult::new(
                    NAME,
                    rule,
                    Severity::Warn,
                    format!(
                        "Network policy '{}' allows all {} traffic. The allow-all rule should be removed.",
                        policy_name, policy_type
                    ),
                )
                .with_metadata(keys::NAMESPACE, namespace)
                .with_metadata("PolicyName", policy_name)
                .with_fix(PendingFix::SetNetworkPolicyDefaultDeny {
                    namespace: namespace.to_string(),
                    policy_type,
                }),
            );
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Namespace;
    use k8s_openapi::api::networking::v1::{
        NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicySpec,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn namespace(name: &str) -> Resource {
        Resource::from(Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    fn default_deny_policy(namespace: &str, policy_types: &[&str]) -> Resource {
        Resource::from(NetworkPolicy {
            metadata: ObjectMeta {
                name: Some("default-deny".to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                policy_types: Some(policy_types.iter().map(|t| t.to_string()).collect()),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn audit_all(resources: &[Resource]) -> Vec<AuditResult> {
        let auditor = NetworkPolicies::new();
        resources
            .iter()
            .flat_map(|r| auditor.audit(r, resources).unwrap())
            .collect()
    }

    #[test]
    fn test_namespace_without_policy() {
        let resources = vec![namespace("team-a")];
        let results = audit_all(&resources);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS);
        assert_eq!(results[0].severity, Severity::Error);
        assert_eq!(
            results[0].metadata.get(keys::NAMESPACE).map(String::as_str),
            Some("team-a")
        );
    }

    #[test]
    fn test_namespace_with_both_directions_denied() {
        let resources = vec![
            namespace("team-a"),
            default_deny_policy("team-a", &["Ingress", "Egress"]),
        ];
        assert!(audit_all(&resources).is_empty());
    }

    #[test]
    fn test_namespace_with_only_ingress_denied() {
        let resources = vec![namespace("team-a"), default_deny_policy("team-a", &["Ingress"])];
        let results = audit_all(&resources);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, MISSING_DEFAULT_DENY_EGRESS);
    }

    #[test]
    fn test_policy_in_other_namespace_does_not_count() {
        let resources = vec![
            namespace("team-a"),
            default_deny_policy("team-b", &["Ingress", "Egress"]),
        ];
        let results = audit_all(&resources);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS);
    }

    #[test]
    fn test_kube_system_is_exempt() {
        let resources = vec![namespace("kube-system")];
        assert!(audit_all(&resources).is_empty());
    }

    #[test]
    fn test_allow_all_policy_is_flagged_and_does_not_deny() {
        let mut policy = NetworkPolicy {
            metadata: ObjectMeta {
                name: Some("open".to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
                ingress: Some(vec![NetworkPolicyIngressRule::default()]),
                egress: Some(vec![NetworkPolicyEgressRule::default()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        policy.spec.as_mut().unwrap().pod_selector = Default::default();

        let resources = vec![namespace("team-a"), Resource::from(policy)];
        let results = audit_all(&resources);

        let rules: Vec<&str> = results.iter().map(|r| r.rule).collect();
        assert_eq!(
            rules,
            vec![
                MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS,
                ALLOW_ALL_INGRESS_EXISTS,
                ALLOW_ALL_EGRESS_EXISTS
            ]
        );
    }

    #[test]
    fn test_allow_all_fix_restores_default_deny() {
        let policy = NetworkPolicy {
            metadata: ObjectMeta {
                name: Some("open".to_string()),
                namespace: Some("team-a".to_string()),
                ..Default::default()
            },
            spec: Some(NetworkPolicySpec {
                policy_types: Some(vec!["Ingress".to_string(), "Egress".to_string()]),
                ingress: Some(vec![NetworkPolicyIngressRule::default()]),
                egress: Some(vec![NetworkPolicyEgressRule::default()]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut resources = vec![namespace("team-a"), Resource::from(policy)];

        let fixes: Vec<PendingFix> = audit_all(&resources)
            .into_iter()
            .filter_map(|r| r.pending_fix)
            .collect();
        assert_eq!(fixes.len(), 2);
        for fix in fixes {
            fix.apply(&mut resources[1]).unwrap();
        }

        assert!(audit_all(&resources).is_empty());
    }

    #[test]
    fn test_combined_rule_requires_both_labels() {
        let auditor = NetworkPolicies::new();
        let combined = AuditResult::new(
            NAME,
            MISSING_DEFAULT_DENY_INGRESS_AND_EGRESS,
            Severity::Error,
            "",
        );
        assert_eq!(
            auditor.override_labels(&combined),
            vec![
                INGRESS_OVERRIDE_LABEL.to_string(),
                EGRESS_OVERRIDE_LABEL.to_string()
            ]
        );
    }
}
