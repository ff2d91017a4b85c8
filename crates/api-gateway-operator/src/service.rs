//! Resolves the workloads a [`Rule`] applies to.
//!
//! The generated Istio resources select workloads with the label selector of
//! the exposed Kubernetes Service. The service is taken from the rule, falling
//! back to the service of the APIRule spec. Its namespace falls back through
//! rule service, spec service and the namespace of the APIRule.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use snafu::{OptionExt, ResultExt, Snafu};

use crate::crd::{
    api_rule::{APIRule, Rule},
    istio::WorkloadSelector,
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Namespace used when neither the service nor the APIRule define one.
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("service name is required but missing"))]
    MissingServiceName,

    #[snafu(display("service {namespace}/{name} not found"))]
    ServiceNotFound { namespace: String, name: String },

    #[snafu(display("failed to get service {namespace}/{name}"))]
    GetService {
        source: kube::Error,
        namespace: String,
        name: String,
    },
}

/// Looks up Kubernetes Services. Implemented by [`crate::client::Client`] and
/// by in-memory fakes in tests.
//
// The async-trait crate is still needed, as the trait is used as a trait object.
#[async_trait]
pub trait ServiceLookup: Send + Sync {
    /// Returns the service or [`None`] if it does not exist.
    async fn get_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<Service>, kube::Error>;
}

/// The workload selector of a service together with the namespace the
/// service lives in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodSelector {
    /// [`None`] if the service has no selector.
    pub selector: Option<WorkloadSelector>,
    pub namespace: String,
}

/// Returns the namespace of the service of the given rule.
///
/// Fallback direction: rule service, spec service, APIRule namespace.
pub fn find_service_namespace(api_rule: &APIRule, rule: &Rule) -> String {
    rule.service
        .as_ref()
        .and_then(|service| service.namespace.clone())
        .or_else(|| {
            api_rule
                .spec
                .service
                .as_ref()
                .and_then(|service| service.namespace.clone())
        })
        .or_else(|| api_rule.namespace())
        .unwrap_or_default()
}

/// Resolves the pod selector of the service exposed by `rule`.
pub async fn get_selector_from_service(
    lookup: &dyn ServiceLookup,
    api_rule: &APIRule,
    rule: &Rule,
) -> Result<PodSelector> {
    let service = rule.service.as_ref().or(api_rule.spec.service.as_ref());
    let name = service
        .and_then(|service| service.name.as_deref())
        .context(MissingServiceNameSnafu)?;

    let mut namespace = service
        .and_then(|service| service.namespace.clone())
        .unwrap_or_else(|| find_service_namespace(api_rule, rule));
    if namespace.is_empty() {
        namespace = DEFAULT_NAMESPACE.to_owned();
    }

    let service = lookup
        .get_service(&namespace, name)
        .await
        .context(GetServiceSnafu {
            namespace: &namespace,
            name,
        })?
        .context(ServiceNotFoundSnafu {
            namespace: &namespace,
            name,
        })?;

    let selector = service
        .spec
        .and_then(|spec| spec.selector)
        .filter(|selector| !selector.is_empty())
        .map(|match_labels: BTreeMap<String, String>| WorkloadSelector { match_labels });

    Ok(PodSelector {
        selector,
        namespace,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::{
        crd::api_rule::Service as ServiceRef,
        test_utils::{FakeServiceLookup, api_rule_from_yaml},
    };

    fn api_rule(spec_service_namespace: Option<&str>) -> APIRule {
        let mut api_rule = api_rule_from_yaml(indoc::indoc! {"
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
              rules: []
        "});
        if let Some(service) = api_rule.spec.service.as_mut() {
            service.namespace = spec_service_namespace.map(str::to_owned);
        }
        api_rule
    }

    fn rule(service: Option<ServiceRef>) -> Rule {
        Rule {
            path: "/".to_owned(),
            service,
            no_auth: Some(true),
            ..Rule::default()
        }
    }

    #[rstest]
    #[case(Some("rule-ns"), Some("spec-ns"), "rule-ns")]
    #[case(None, Some("spec-ns"), "spec-ns")]
    #[case(None, None, "apps")]
    fn service_namespace_fallback(
        #[case] rule_namespace: Option<&str>,
        #[case] spec_namespace: Option<&str>,
        #[case] expected: &str,
    ) {
        let rule = rule(Some(ServiceRef {
            name: Some("other".to_owned()),
            namespace: rule_namespace.map(str::to_owned),
            port: Some(80),
        }));

        assert_eq!(
            find_service_namespace(&api_rule(spec_namespace), &rule),
            expected
        );
    }

    #[tokio::test]
    async fn selector_of_spec_service() {
        let lookup =
            FakeServiceLookup::default().with_service("apps", "httpbin", &[("app", "httpbin")]);

        let selector = get_selector_from_service(&lookup, &api_rule(None), &rule(None))
            .await
            .expect("selector must resolve");

        assert_eq!(selector.namespace, "apps");
        assert_eq!(
            selector.selector,
            Some(WorkloadSelector {
                match_labels: BTreeMap::from([("app".to_owned(), "httpbin".to_owned())]),
            })
        );
    }

    #[tokio::test]
    async fn rule_service_overrides_spec_service() {
        let lookup = FakeServiceLookup::default()
            .with_service("apps", "httpbin", &[("app", "httpbin")])
            .with_service("other-ns", "other", &[("app", "other")]);
        let rule = rule(Some(ServiceRef {
            name: Some("other".to_owned()),
            namespace: Some("other-ns".to_owned()),
            port: Some(80),
        }));

        let selector = get_selector_from_service(&lookup, &api_rule(None), &rule)
            .await
            .expect("selector must resolve");

        assert_eq!(selector.namespace, "other-ns");
        assert_eq!(
            selector.selector.map(|s| s.match_labels),
            Some(BTreeMap::from([("app".to_owned(), "other".to_owned())]))
        );
    }

    #[tokio::test]
    async fn service_without_selector() {
        let lookup = FakeServiceLookup::default().with_service("apps", "httpbin", &[]);

        let selector = get_selector_from_service(&lookup, &api_rule(None), &rule(None))
            .await
            .expect("selector must resolve");

        assert_eq!(selector.selector, None);
    }

    #[tokio::test]
    async fn missing_service_name() {
        let mut api_rule = api_rule(None);
        api_rule.spec.service = None;

        let err =
            get_selector_from_service(&FakeServiceLookup::default(), &api_rule, &rule(None))
                .await
                .expect_err("missing service must fail");

        assert_eq!(err.to_string(), "service name is required but missing");
    }

    #[tokio::test]
    async fn service_not_found() {
        let lookup = FakeServiceLookup::default();

        let err = get_selector_from_service(&lookup, &api_rule(None), &rule(None))
            .await
            .expect_err("unknown service must fail");

        assert!(matches!(
            err,
            Error::ServiceNotFound { namespace, name } if namespace == "apps" && name == "httpbin"
        ));
    }
}
