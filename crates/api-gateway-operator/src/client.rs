use std::{collections::BTreeMap, fmt::Debug};

use async_trait::async_trait;
use k8s_openapi::{NamespaceResourceScope, api::core::v1::Service};
use kube::{Api, Resource, api::ListParams};
use serde::de::DeserializeOwned;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    crd::{api_rule::APIRule, istio::Gateway},
    labels::{MatchLabelsExt, owner_labels},
    namespace::WatchNamespace,
    processing::ObjectRepository,
    service::ServiceLookup,
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create kubernetes client"))]
    CreateClient { source: kube::Error },

    #[snafu(display("invalid gateway reference {reference:?}, expected <namespace>/<name>"))]
    InvalidGatewayReference { reference: String },

    #[snafu(display("failed to get gateway {namespace}/{name}"))]
    GetGateway {
        source: kube::Error,
        namespace: String,
        name: String,
    },
}

/// This `Client` can be used to access Kubernetes.
/// It wraps an underlying [kube::client::Client] and provides some common functionality.
/// Listing APIRules is scoped to the namespaces the operator watches.
#[derive(Clone)]
pub struct Client {
    client: kube::Client,
    watch_namespace: WatchNamespace,
}

impl Client {
    pub fn new(client: kube::Client, watch_namespace: WatchNamespace) -> Self {
        Self {
            client,
            watch_namespace,
        }
    }

    /// Creates a client from the local kubeconfig or the in-cluster
    /// environment.
    pub async fn try_default(watch_namespace: WatchNamespace) -> Result<Self> {
        let client = kube::Client::try_default()
            .await
            .context(CreateClientSnafu)?;
        Ok(Self::new(client, watch_namespace))
    }

    /// Returns a [kube::client::Client]] that can be freely used.
    /// It does not need to be cloned before first use.
    pub fn as_kube_client(&self) -> kube::Client {
        self.client.clone()
    }

    /// Retrieves a single instance of the requested resource type with the
    /// given name, or [`None`] if it does not exist.
    pub async fn get_opt<T>(
        &self,
        resource_name: &str,
        namespace: &str,
    ) -> std::result::Result<Option<T>, kube::Error>
    where
        T: Clone
            + Debug
            + DeserializeOwned
            + Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        self.get_namespaced_api(namespace).get_opt(resource_name).await
    }

    /// Lists all instances of the requested resource type in all namespaces
    /// that carry every label of `labels`.
    ///
    /// Generated objects live in the namespace of their workload, which can
    /// be outside of the watched namespace. Listing them is therefore never
    /// scoped by [`WatchNamespace`].
    pub async fn list_with_label_selector<T>(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> std::result::Result<Vec<T>, kube::Error>
    where
        T: Clone
            + Debug
            + DeserializeOwned
            + Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        let list_params = ListParams::default().labels(&labels.to_query_string());
        Ok(self.get_all_api::<T>().list(&list_params).await?.items)
    }

    /// Lists the APIRules in the watched namespaces.
    pub async fn list_api_rules(&self) -> std::result::Result<Vec<APIRule>, kube::Error> {
        Ok(self
            .watch_namespace
            .get_api::<APIRule>(self)
            .list(&ListParams::default())
            .await?
            .items)
    }

    /// Returns the gateway referenced by the APIRule, [`None`] if the APIRule
    /// references no gateway or it does not exist.
    pub async fn get_api_rule_gateway(&self, api_rule: &APIRule) -> Result<Option<Gateway>> {
        let Some(reference) = api_rule.spec.gateway.as_deref() else {
            return Ok(None);
        };
        let (namespace, name) = parse_gateway_reference(reference)
            .context(InvalidGatewayReferenceSnafu { reference })?;

        self.get_opt(name, namespace)
            .await
            .context(GetGatewaySnafu { namespace, name })
    }

    pub fn get_all_api<T>(&self) -> Api<T>
    where
        T: Resource<DynamicType = ()>,
    {
        Api::all(self.client.clone())
    }

    pub fn get_namespaced_api<T>(&self, namespace: &str) -> Api<T>
    where
        T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Splits `<namespace>/<name>`.
fn parse_gateway_reference(reference: &str) -> Option<(&str, &str)> {
    reference
        .split_once('/')
        .filter(|(namespace, name)| {
            !namespace.is_empty() && !name.is_empty() && !name.contains('/')
        })
}

#[async_trait]
impl ServiceLookup for Client {
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<Service>, kube::Error> {
        self.get_opt(name, namespace).await
    }
}

#[async_trait]
impl<K> ObjectRepository<K> for Client
where
    K: Clone
        + Debug
        + DeserializeOwned
        + Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Send
        + Sync
        + 'static,
{
    async fn get_all(&self, api_rule: &APIRule) -> std::result::Result<Vec<K>, kube::Error> {
        let objects: Vec<K> = self
            .list_with_label_selector(&owner_labels(api_rule))
            .await?;
        tracing::debug!(
            kind = %K::kind(&()),
            count = objects.len(),
            "listed objects owned by APIRule"
        );
        Ok(objects)
    }
}
