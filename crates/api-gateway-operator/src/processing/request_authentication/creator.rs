use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use snafu::{ResultExt, Snafu};

use crate::{
    crd::{
        api_rule::{self, APIRule, JwtAuthentication},
        istio::{JwtHeader, JwtRule, RequestAuthentication, RequestAuthenticationSpec},
    },
    hashbasedstate::{self, ContentHash, Desired, HashableRequestAuthentication},
    labels::generated_object_labels,
    service::{self, ServiceLookup, get_selector_from_service},
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid rule"))]
    InvalidRule { source: api_rule::Error },

    #[snafu(display("failed to resolve the workload selector for path {path:?}"))]
    ResolveSelector {
        source: service::Error,
        path: String,
    },

    #[snafu(display("failed to assign the identity labels"))]
    AssignIdentity { source: hashbasedstate::Error },

    #[snafu(display("failed to add RequestAuthentication to the desired state"))]
    AddToDesiredState { source: hashbasedstate::Error },
}

/// Returns one RequestAuthentication per rule that validates JWTs, either in
/// `jwt` mode or as `extAuth` restrictions. Rules resolving to the same
/// workloads and issuers share one object.
pub async fn create(
    service_lookup: &dyn ServiceLookup,
    api_rule: &APIRule,
) -> Result<Desired<HashableRequestAuthentication>> {
    let mut desired = Desired::new();

    for rule in &api_rule.spec.rules {
        rule.auth_mode().context(InvalidRuleSnafu)?;
        let authentications = rule
            .jwt_restrictions()
            .map_or(&[][..], |restrictions| restrictions.authentications.as_slice());
        if authentications.is_empty() {
            continue;
        }

        let pod_selector = get_selector_from_service(service_lookup, api_rule, rule)
            .await
            .context(ResolveSelectorSnafu { path: &rule.path })?;

        let mut request_authentication = RequestAuthentication::new(
            "",
            RequestAuthenticationSpec {
                selector: pod_selector.selector,
                jwt_rules: authentications.iter().map(jwt_rule).collect(),
            },
        );
        request_authentication.metadata = ObjectMeta {
            generate_name: Some(format!("{}-", api_rule.name_any())),
            namespace: Some(pod_selector.namespace),
            labels: Some(generated_object_labels(api_rule)),
            ..ObjectMeta::default()
        };
        request_authentication
            .add_hashing_labels(0)
            .context(AssignIdentitySnafu)?;

        tracing::debug!(
            api_rule = %api_rule.name_any(),
            path = %rule.path,
            issuers = authentications.len(),
            "generated RequestAuthentication"
        );
        desired
            .add(request_authentication.into())
            .context(AddToDesiredStateSnafu)?;
    }

    Ok(desired)
}

fn jwt_rule(authentication: &JwtAuthentication) -> JwtRule {
    JwtRule {
        issuer: authentication.issuer.clone(),
        jwks_uri: authentication.jwks_uri.clone(),
        from_headers: authentication
            .from_headers
            .iter()
            .map(|header| JwtHeader {
                name: header.name.clone(),
                prefix: header.prefix.clone(),
            })
            .collect(),
        from_params: authentication.from_params.clone(),
    }
}
