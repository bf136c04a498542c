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

//! Image auditor: container images must be pinned to an explicit tag other
//! than `latest`, and must match the desired image when one is configured.

use crate::audit::errors::AuditError;
use crate::audit::registry::AuditorRegistry;
use crate::audit::result::{keys, AuditResult, Severity};
use crate::audit::Auditable;
use crate::config::KubeauditConfig;
use crate::k8s::Resource;

pub const NAME: &str = "image";

/// The image is missing a tag, or pinned to `latest`.
pub const IMAGE_TAG_MISSING: &str = "ImageTagMissing";
/// The image tag does not match the configured image's.
pub const IMAGE_TAG_INCORRECT: &str = "ImageTagIncorrect";
/// The image matches the configured image.
pub const IMAGE_CORRECT: &str = "ImageCorrect";

const RULES: &[&str] = &[IMAGE_TAG_MISSING, IMAGE_TAG_INCORRECT, IMAGE_CORRECT];

const LATEST_TAG: &str = "latest";

/// Register the image auditor.
pub fn register(registry: &AuditorRegistry) {
    registry.register(NAME, |conf| {
        Ok(Box::new(Image::new(conf)?) as Box<dyn Auditable>)
    });
}

/// Image implements Auditable.
#[derive(Debug)]
pub struct Image {
    /// Desired image split into (name, tag), when configured.
    desired: Option<(String, String)>,
}

impl Image {
    pub fn new(conf: &KubeauditConfig) -> Result<Self, AuditError> {
        let desired = match conf.auditors.image.image.as_deref() {
            Some(image) => match split_image(image) {
                (name, Some(tag)) => Some((name.to_string(), tag.to_string())),
                (_, None) => {
                    return Err(AuditError::invalid_configuration(
                        NAME,
                        format!("desired image {:?} has no tag", image),
                    ));
                }
            },
            None => None,
        };
        Ok(Self { desired })
    }
}

impl Auditable for Image {
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
            let Some(image) = container.image.as_deref() else {
                continue;
            };
            let (name, tag) = split_image(image);

            match tag {
                None => {
                    results.push(tag_missing(&container.name, image));
                    continue;
                }
                Some(LATEST_TAG) => {
                    results.push(tag_missing(&container.name, image));
                    continue;
                }
                Some(tag) => {
                    let Some((desired_name, desired_tag)) = &self.desired else {
                        continue;
                    };
                    if name != desired_name {
                        continue;
                    }
                    if tag == desired_tag {
                        results.push(
                            AuditResult::new(
                                NAME,
                                IMAGE_CORRECT,
                                Severity::Info,
                                format!("Image '{}' matches the desired image.", image),
                            )
                            .with_metadata(keys::CONTAINER, &container.name)
                            .with_metadata("Image", image),
                        );
                    } else {
                        results.push(
                            AuditResult::new(
                                NAME,
                                IMAGE_TAG_INCORRECT,
                                Severity::Error,
                                format!(
                                    "Container image tag is incorrect. The tag should be '{}' instead of '{}'.",
                                    desired_tag, tag
                                ),
                            )
                            .with_metadata(keys::CONTAINER, &container.name)
                            .with_metadata("Image", image)
                            .with_metadata("DesiredTag", desired_tag),
                        );
                    }
                }
            }
        }

        Ok(results)
    }
}

fn tag_missing(container_name: &str, image: &str) -> AuditResult {
    AuditResult::new(
        NAME,
        IMAGE_TAG_MISSING,
        Severity::Error,
        "Image tag is missing. The image should be pinned to an explicit tag other than 'latest'.",
    )
    .with_metadata(keys::CONTAINER, container_name)
    .with_metadata("Image", image)
}

/// Split an image reference into name and tag. A digest reference counts as
/// pinned. The port of a registry host is not mistaken for a tag.
fn split_image(image: &str) -> (&str, Option<&str>) {
    if let Some((name, digest)) = image.split_once('@') {
        return (name, Some(digest));
    }
    match image.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
        _ => (image, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};

    fn pod_with_image(image: &str) -> Resource {
        Resource::from(Pod {
            spec: Some(PodSpec {
                containers: vec![Container {
                    name: "web".to_string(),
                    image: Some(image.to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn audit(auditor: &Image, resource: &Resource) -> Vec<AuditResult> {
        auditor.audit(resource, std::slice::from_ref(resource)).unwrap()
    }

    fn configured(image: &str) -> Image {
        let conf = KubeauditConfig::from_yaml(&format!(
            "auditors:\n  image:\n    image: \"{}\"\n",
            image
        ))
        .unwrap();
        Image::new(&conf).unwrap()
    }

    #[test]
    fn test_split_image() {
        assert_eq!(split_image("nginx"), ("nginx", None));
        assert_eq!(split_image("nginx:1.25"), ("nginx", Some("1.25")));
        assert_eq!(split_image("registry:5000/nginx"), ("registry:5000/nginx", None));
        assert_eq!(
            split_image("registry:5000/nginx:1.25"),
            ("registry:5000/nginx", Some("1.25"))
        );
        assert_eq!(
            split_image("nginx@sha256:abc123"),
            ("nginx", Some("sha256:abc123"))
        );
    }

    #[test]
    fn test_tag_missing_and_latest() {
        let auditor = Image::new(&KubeauditConfig::default()).unwrap();

        for image in ["nginx", "nginx:latest"] {
            let results = audit(&auditor, &pod_with_image(image));
            assert_eq!(results.len(), 1, "image {:?}", image);
            assert_eq!(results[0].rule, IMAGE_TAG_MISSING);
            assert_eq!(results[0].severity, Severity::Error);
        }

        assert!(audit(&auditor, &pod_with_image("nginx:1.25")).is_empty());
    }

    #[test]
    fn test_incorrect_tag() {
        let auditor = configured("nginx:1.25");
        let results = audit(&auditor, &pod_with_image("nginx:1.24"));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, IMAGE_TAG_INCORRECT);
        assert_eq!(results[0].metadata.get("DesiredTag").map(String::as_str), Some("1.25"));
    }

    #[test]
    fn test_correct_image_is_info() {
        let auditor = configured("nginx:1.25");
        let results = audit(&auditor, &pod_with_image("nginx:1.25"));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].rule, IMAGE_CORRECT);
        assert_eq!(results[0].severity, Severity::Info);
    }

    #[test]
    fn test_other_image_names_are_ignored() {
        let auditor = configured("nginx:1.25");
        assert!(audit(&auditor, &pod_with_image("redis:7.2")).is_empty());
    }

    #[test]
    fn test_config_image_without_tag_is_rejected() {
        let conf =
            KubeauditConfig::from_yaml("auditors:\n  image:\n    image: \"nginx\"\n").unwrap();
        assert!(matches!(
            Image::new(&conf).unwrap_err(),
            AuditError::InvalidConfiguration { .. }
        ));
    }
}
