//! Fixtures and in-memory collaborators for unit tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{Service, ServiceSpec},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{Resource, ResourceExt};

use crate::{
    crd::{
        api_rule::APIRule,
        istio::{
            AuthorizationPolicy, AuthorizationPolicySpec, AuthorizationRule, Operation,
            RequestAuthentication, RequestAuthenticationSpec, RuleTo,
        },
    },
    labels::owner_labels,
    processing::ObjectRepository,
    service::ServiceLookup,
};

pub fn api_rule_from_yaml(yaml: &str) -> APIRule {
    serde_yaml::from_str(yaml).expect("APIRule fixture must deserialize")
}

/// APIRule `apps/httpbin` exposing service `httpbin` on host
/// `httpbin.example.com` with the given YAML list of rules.
pub fn api_rule_with_rules(rules: &str) -> APIRule {
    let rules: String = rules.lines().map(|line| format!("    {line}\n")).collect();
    api_rule_from_yaml(&indoc::formatdoc! {"
        apiVersion: gateway.kyma-project.io/v2alpha1
        kind: APIRule
        metadata:
          name: httpbin
          namespace: apps
        spec:
          hosts: [httpbin.example.com]
          service:
            name: httpbin
            port: 8000
          rules:
        {}
    ", rules})
}

fn string_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .collect()
}

/// Metadata in namespace `apps`. An empty name is replaced by the generate
/// name `httpbin-`.
fn object_meta(name: &str, labels: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: (!name.is_empty()).then(|| name.to_owned()),
        generate_name: name.is_empty().then(|| "httpbin-".to_owned()),
        namespace: Some("apps".to_owned()),
        labels: Some(string_map(labels)),
        ..ObjectMeta::default()
    }
}

/// An ALLOW policy with a single rule matching `path`.
pub fn authorization_policy(
    name: &str,
    labels: &[(&str, &str)],
    path: &str,
) -> AuthorizationPolicy {
    let mut policy = AuthorizationPolicy::new(
        name,
        AuthorizationPolicySpec {
            rules: vec![AuthorizationRule {
                to: vec![RuleTo {
                    operation: Operation {
                        paths: vec![path.to_owned()],
                        ..Operation::default()
                    },
                }],
                ..AuthorizationRule::default()
            }],
            ..AuthorizationPolicySpec::default()
        },
    );
    policy.metadata = object_meta(name, labels);
    policy
}

pub fn request_authentication(
    name: &str,
    labels: &[(&str, &str)],
    spec: RequestAuthenticationSpec,
) -> RequestAuthentication {
    let mut request_authentication = RequestAuthentication::new(name, spec);
    request_authentication.metadata = object_meta(name, labels);
    request_authentication
}

/// Services keyed by namespace and name.
#[derive(Debug, Default)]
pub struct FakeServiceLookup {
    services: BTreeMap<(String, String), Service>,
}

impl FakeServiceLookup {
    pub fn with_service(
        mut self,
        namespace: &str,
        name: &str,
        selector: &[(&str, &str)],
    ) -> Self {
        let service = Service {
            metadata: ObjectMeta {
                name: Some(name.to_owned()),
                namespace: Some(namespace.to_owned()),
                ..ObjectMeta::default()
            },
            spec: Some(ServiceSpec {
                selector: Some(string_map(selector)),
                ..ServiceSpec::default()
            }),
            ..Service::default()
        };
        self.services
            .insert((namespace.to_owned(), name.to_owned()), service);
        self
    }
}

#[async_trait]
impl ServiceLookup for FakeServiceLookup {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Service>, kube::Error> {
        Ok(self
            .services
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned())
    }
}

/// Cluster objects in any namespace, filtered by owner label like the kube
/// backed repository.
#[derive(Debug)]
pub struct FakeRepository<K> {
    objects: Vec<K>,
}

impl<K> Default for FakeRepository<K> {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
        }
    }
}

impl<K> FakeRepository<K> {
    pub fn with_objects(mut self, objects: impl IntoIterator<Item = K>) -> Self {
        self.objects.extend(objects);
        self
    }
}

#[async_trait]
impl<K> ObjectRepository<K> for FakeRepository<K>
where
    K: Resource + Clone + Send + Sync + 'static,
{
    async fn get_all(&self, api_rule: &APIRule) -> Result<Vec<K>, kube::Error> {
        let owner_labels = owner_labels(api_rule);
        Ok(self
            .objects
            .iter()
            .filter(|object| {
                owner_labels
                    .iter()
                    .all(|(key, value)| object.labels().get(key) == Some(value))
            })
            .cloned()
            .collect())
    }
}
