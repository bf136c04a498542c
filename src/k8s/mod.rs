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

//! Resource model: a uniform handle over the Kubernetes workload kinds the
//! auditors know how to inspect.

pub mod quantity;

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    Container, Namespace, Pod, PodSpec, PodTemplate, ReplicationController, ServiceAccount,
};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

/// The deserialized object behind a [`Resource`], tagged by kind.
///
/// `Unsupported` keeps the object metadata of anything the parser found that
/// has no typed variant here, so kind-agnostic auditors (deprecated APIs)
/// can still inspect it.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Pod(Box<Pod>),
    Deployment(Box<Deployment>),
    StatefulSet(Box<StatefulSet>),
    DaemonSet(Box<DaemonSet>),
    ReplicaSet(Box<ReplicaSet>),
    ReplicationController(Box<ReplicationController>),
    Job(Box<Job>),
    CronJob(Box<CronJob>),
    PodTemplate(Box<PodTemplate>),
    NetworkPolicy(Box<NetworkPolicy>),
    Namespace(Box<Namespace>),
    ServiceAccount(Box<ServiceAccount>),
    CustomResourceDefinition(Box<CustomResourceDefinition>),
    Unsupported { metadata: ObjectMeta },
}

/// A parsed manifest object together with the apiVersion and kind it was
/// declared with. The declared strings are kept separately from the typed
/// object because a manifest may name a deprecated group/version that the
/// typed layer no longer models.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    api_version: String,
    kind: String,
    object: Object,
}

/// A lightweight reference to a resource, attached to findings so emitters
/// can locate them without holding the resource itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: Option<String>,
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or("<unnamed>");
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, name),
            None => write!(f, "{} {}", self.kind, name),
        }
    }
}

impl Resource {
    /// Wrap an object with the apiVersion and kind strings it was declared
    /// with in the manifest.
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>, object: Object) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            object,
        }
    }

    /// Wrap an object the parser could not map to a typed variant.
    pub fn unsupported(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        metadata: ObjectMeta,
    ) -> Self {
        Self::new(api_version, kind, Object::Unsupported { metadata })
    }

    /// Replace the declared apiVersion. Used by the fix pass when upgrading
    /// a deprecated API.
    pub fn set_api_version(&mut self, api_version: impl Into<String>) {
        self.api_version = api_version.into();
    }

    /// Override the declared apiVersion, e.g. to model a manifest that uses
    /// a deprecated group/version for an otherwise recognized kind.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn object(&self) -> &Object {
        &self.object
    }

    pub fn object_mut(&mut self) -> &mut Object {
        &mut self.object
    }

    /// Whether this resource maps to a typed variant the auditors understand.
    pub fn is_supported_kind(&self) -> bool {
        !matches!(self.object, Object::Unsupported { .. })
    }

    /// The object's own metadata.
    pub fn meta(&self) -> &ObjectMeta {
        match &self.object {
            Object::Pod(o) => &o.metadata,
            Object::Deployment(o) => &o.metadata,
            Object::StatefulSet(o) => &o.metadata,
            Object::DaemonSet(o) => &o.metadata,
            Object::ReplicaSet(o) => &o.metadata,
            Object::ReplicationController(o) => &o.metadata,
            Object::Job(o) => &o.metadata,
            Object::CronJob(o) => &o.metadata,
            Object::PodTemplate(o) => &o.metadata,
            Object::NetworkPolicy(o) => &o.metadata,
            Object::Namespace(o) => &o.metadata,
            Object::ServiceAccount(o) => &o.metadata,
            Object::CustomResourceDefinition(o) => &o.metadata,
            Object::Unsupported { metadata } => metadata,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.meta().name.as_deref()
    }

    pub fn namespace(&self) -> Option<&str> {
        self.meta().namespace.as_deref()
    }

    pub fn labels(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().labels.as_ref()
    }

    pub fn annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.meta().annotations.as_ref()
    }

    pub fn resource_ref(&self) -> ResourceRef {
        ResourceRef {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            namespace: self.namespace().map(String::from),
            name: self.name().map(String::from),
        }
    }

    /// The pod spec embedded in this resource, if its kind carries one.
    pub fn pod_spec(&self) -> Option<&PodSpec> {
        match &self.object {
            Object::Pod(o) => o.spec.as_ref(),
            Object::Deployment(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Object::StatefulSet(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Object::DaemonSet(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Object::ReplicaSet(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.template.as_ref())
                .and_then(|t| t.spec.as_ref()),
            Object::ReplicationController(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.template.as_ref())
                .and_then(|t| t.spec.as_ref()),
            Object::Job(o) => o.spec.as_ref().and_then(|s| s.template.spec.as_ref()),
            Object::CronJob(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .and_then(|j| j.template.spec.as_ref()),
            Object::PodTemplate(o) => o.template.as_ref().and_then(|t| t.spec.as_ref()),
            _ => None,
        }
    }

    pub fn pod_spec_mut(&mut self) -> Option<&mut PodSpec> {
        match &mut self.object {
            Object::Pod(o) => o.spec.as_mut(),
            Object::Deployment(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Object::StatefulSet(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Object::DaemonSet(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Object::ReplicaSet(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.template.as_mut())
                .and_then(|t| t.spec.as_mut()),
            Object::ReplicationController(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.template.as_mut())
                .and_then(|t| t.spec.as_mut()),
            Object::Job(o) => o.spec.as_mut().and_then(|s| s.template.spec.as_mut()),
            Object::CronJob(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.job_template.spec.as_mut())
                .and_then(|j| j.template.spec.as_mut()),
            Object::PodTemplate(o) => o.template.as_mut().and_then(|t| t.spec.as_mut()),
            _ => None,
        }
    }

    /// Metadata of the pod template. For a Pod this is the Pod's own
    /// metadata; for workloads it is `spec.template.metadata`.
    pub fn pod_meta(&self) -> Option<&ObjectMeta> {
        match &self.object {
            Object::Pod(o) => Some(&o.metadata),
            Object::Deployment(o) => o.spec.as_ref().and_then(|s| s.template.metadata.as_ref()),
            Object::StatefulSet(o) => o.spec.as_ref().and_then(|s| s.template.metadata.as_ref()),
            Object::DaemonSet(o) => o.spec.as_ref().and_then(|s| s.template.metadata.as_ref()),
            Object::ReplicaSet(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.template.as_ref())
                .and_then(|t| t.metadata.as_ref()),
            Object::ReplicationController(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.template.as_ref())
                .and_then(|t| t.metadata.as_ref()),
            Object::Job(o) => o.spec.as_ref().and_then(|s| s.template.metadata.as_ref()),
            Object::CronJob(o) => o
                .spec
                .as_ref()
                .and_then(|s| s.job_template.spec.as_ref())
                .and_then(|j| j.template.metadata.as_ref()),
            Object::PodTemplate(o) => o.template.as_ref().and_then(|t| t.metadata.as_ref()),
            _ => None,
        }
    }

    /// Mutable pod template metadata, created on demand so fixes can attach
    /// annotations to a template that declared none. Returns `None` only for
    /// kinds without a pod template.
    pub fn pod_meta_mut(&mut self) -> Option<&mut ObjectMeta> {
        match &mut self.object {
            Object::Pod(o) => Some(&mut o.metadata),
            Object::Deployment(o) => o
                .spec
                .as_mut()
                .map(|s| s.template.metadata.get_or_insert_with(Default::default)),
            Object::StatefulSet(o) => o
                .spec
                .as_mut()
                .map(|s| s.template.metadata.get_or_insert_with(Default::default)),
            Object::DaemonSet(o) => o
                .spec
                .as_mut()
                .map(|s| s.template.metadata.get_or_insert_with(Default::default)),
            Object::ReplicaSet(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.template.as_mut())
                .map(|t| t.metadata.get_or_insert_with(Default::default)),
            Object::ReplicationController(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.template.as_mut())
                .map(|t| t.metadata.get_or_insert_with(Default::default)),
            Object::Job(o) => o
                .spec
                .as_mut()
                .map(|s| s.template.metadata.get_or_insert_with(Default::default)),
            Object::CronJob(o) => o
                .spec
                .as_mut()
                .and_then(|s| s.job_template.spec.as_mut())
                .map(|j| j.template.metadata.get_or_insert_with(Default::default)),
            Object::PodTemplate(o) => o
                .template
                .as_mut()
                .map(|t| t.metadata.get_or_insert_with(Default::default)),
            _ => None,
        }
    }

    /// Annotations on the pod template. Auditors that check pod annotations
    /// (AppArmor) read these, not the outer resource annotations.
    pub fn pod_annotations(&self) -> Option<&BTreeMap<String, String>> {
        self.pod_meta().and_then(|m| m.annotations.as_ref())
    }

    /// Labels on the pod template. Override labels live here.
    pub fn pod_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.pod_meta().and_then(|m| m.labels.as_ref())
    }

    /// Regular containers, or an empty slice for kinds without a pod template.
    pub fn containers(&self) -> &[Container] {
        self.pod_spec().map(|s| s.containers.as_slice()).unwrap_or(&[])
    }

    /// Init containers, or an empty slice.
    pub fn init_containers(&self) -> &[Container] {
        self.pod_spec()
            .and_then(|s| s.init_containers.as_deref())
            .unwrap_or(&[])
    }

    /// Look up a container (regular or init) by name. Container names are
    /// unique within a pod template.
    pub fn find_container_mut(&mut self, name: &str) -> Option<&mut Container> {
        let spec = self.pod_spec_mut()?;
        if let Some(pos) = spec.containers.iter().position(|c| c.name == name) {
            return spec.containers.get_mut(pos);
        }
        spec.init_containers
            .as_mut()
            .and_then(|cs| cs.iter_mut().find(|c| c.name == name))
    }

    pub fn as_namespace(&self) -> Option<&Namespace> {
        match &self.object {
            Object::Namespace(ns) => Some(ns),
            _ => None,
        }
    }

    pub fn as_network_policy(&self) -> Option<&NetworkPolicy> {
        match &self.object {
            Object::NetworkPolicy(np) => Some(np),
            _ => None,
        }
    }
}

macro_rules! impl_from_object {
    ($type:ty, $variant:ident, $api_version:expr, $kind:expr) => {
        impl From<$type> for Resource {
            fn from(object: $type) -> Self {
                Resource::new($api_version, $kind, Object::$variant(Box::new(object)))
            }
        }
    };
}

impl_from_object!(Pod, Pod, "v1", "Pod");
impl_from_object!(Deployment, Deployment, "apps/v1", "Deployment");
impl_from_object!(StatefulSet, StatefulSet, "apps/v1", "StatefulSet");
impl_from_object!(DaemonSet, DaemonSet, "apps/v1", "DaemonSet");
impl_from_object!(ReplicaSet, ReplicaSet, "apps/v1", "ReplicaSet");
impl_from_object!(
    ReplicationController,
    ReplicationController,
    "v1",
    "ReplicationController"
);
impl_from_object!(Job, Job, "batch/v1", "Job");
impl_from_object!(CronJob, CronJob, "batch/v1", "CronJob");
impl_from_object!(PodTemplate, PodTemplate, "v1", "PodTemplate");
impl_from_object!(
    NetworkPolicy,
    NetworkPolicy,
    "networking.k8s.io/v1",
    "NetworkPolicy"
);
impl_from_object!(Namespace, Namespace, "v1", "Namespace");
impl_from_object!(ServiceAccount, ServiceAccount, "v1", "ServiceAccount");
impl_from_object!(
    CustomResourceDefinition,
    CustomResourceDefinition,
    "apiextensions.k8s.io/v1",
    "CustomResourceDefinition"
);

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::PodTemplateSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    fn simple_pod_spec() -> PodSpec {
        PodSpec {
            containers: vec![
                Container {
                    name: "web".to_string(),
                    ..Default::default()
                },
                Container {
                    name: "sidecar".to_string(),
                    ..Default::default()
                },
            ],
            init_containers: Some(vec![Container {
                name: "init".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }
    }

    #[test]
    fn test_pod_accessors() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("mypod".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(BTreeMap::from([("k".to_string(), "v".to_string())])),
                ..Default::default()
            },
            spec: Some(simple_pod_spec()),
            ..Default::default()
        };
        let resource = Resource::from(pod);

        assert_eq!(resource.kind(), "Pod");
        assert_eq!(resource.api_version(), "v1");
        assert_eq!(resource.name(), Some("mypod"));
        assert_eq!(resource.namespace(), Some("default"));
        assert!(resource.is_supported_kind());
        assert_eq!(resource.containers().len(), 2);
        assert_eq!(resource.init_containers().len(), 1);
        assert_eq!(
            resource.pod_annotations().and_then(|a| a.get("k")).map(String::as_str),
            Some("v")
        );
    }

    #[test]
    fn test_deployment_pod_template() {
        let deployment = Deployment {
            metadata: ObjectMeta {
                name: Some("myapp".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector::default(),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(BTreeMap::from([(
                            "app".to_string(),
                            "myapp".to_string(),
                        )])),
                        ..Default::default()
                    }),
                    spec: Some(simple_pod_spec()),
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        let resource = Resource::from(deployment);

        assert_eq!(resource.containers().len(), 2);
        assert_eq!(
            resource.pod_labels().and_then(|l| l.get("app")).map(String::as_str),
            Some("myapp")
        );
    }

    #[test]
    fn test_namespace_has_no_pod_template() {
        let resource = Resource::from(Namespace {
            metadata: ObjectMeta {
                name: Some("team-a".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });

        assert!(resource.pod_spec().is_none());
        assert!(resource.containers().is_empty());
        assert!(resource.init_containers().is_empty());
        assert!(resource.pod_annotations().is_none());
    }

    #[test]
    fn test_pod_meta_mut_creates_template_metadata() {
        let deployment = Deployment {
            spec: Some(DeploymentSpec {
                selector: LabelSelector::default(),
                template: PodTemplateSpec {
                    metadata: None,
                    spec: Some(simple_pod_spec()),
                },
                ..Default::default()
            }),
            ..Default::default()
        };
        let mut resource = Resource::from(deployment);

        let meta = resource.pod_meta_mut().unwrap();
        meta.annotations
            .get_or_insert_with(Default::default)
            .insert("added".to_string(), "yes".to_string());

        assert_eq!(
            resource.pod_annotations().and_then(|a| a.get("added")).map(String::as_str),
            Some("yes")
        );
    }

    #[test]
    fn test_find_container_mut_covers_init_containers() {
        let pod = Pod {
            spec: Some(simple_pod_spec()),
            ..Default::default()
        };
        let mut resource = Resource::from(pod);

        assert!(resource.find_container_mut("web").is_some());
        assert!(resource.find_container_mut("init").is_some());
        assert!(resource.find_container_mut("ghost").is_none());
    }

    #[test]
    fn test_unsupported_resource() {
        let resource = Resource::unsupported(
            "example.com/v1",
            "Widget",
            ObjectMeta {
                name: Some("w".to_string()),
                ..Default::default()
            },
        );

        assert!(!resource.is_supported_kind());
        assert_eq!(resource.kind(), "Widget");
        assert_eq!(resource.name(), Some("w"));
        assert!(resource.pod_spec().is_none());
    }

    #[test]
    fn test_declared_api_version_is_kept() {
        let resource = Resource::from(Deployment::default()).with_api_version("extensions/v1beta1");
        assert_eq!(resource.api_version(), "extensions/v1beta1");
        assert_eq!(resource.kind(), "Deployment");
    }

    #[test]
    fn test_resource_ref_display() {
        let r = ResourceRef {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            namespace: Some("prod".to_string()),
            name: Some("api".to_string()),
        };
        assert_eq!(r.to_string(), "Deployment prod/api");
    }
}
