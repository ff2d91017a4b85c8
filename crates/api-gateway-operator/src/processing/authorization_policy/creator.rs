use std::sync::Arc;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use snafu::{ResultExt, Snafu, ensure};

use crate::{
    crd::{
        api_rule::{self, APIRule, AuthMode, JwtAuthentication, JwtAuthorization, Rule},
        istio::{
            AuthorizationPolicy, AuthorizationPolicyAction, AuthorizationPolicySpec,
            AuthorizationRule, Condition, ExtensionProvider, Operation, RuleFrom, RuleTo, Source,
            WorkloadSelector,
        },
    },
    hashbasedstate::{self, ContentHash, Desired, HashableAuthorizationPolicy},
    labels::generated_object_labels,
    processing::{ReconciliationConfig, hosts},
    service::{self, ServiceLookup, get_selector_from_service},
};

type Result<T, E = Error> = std::result::Result<T, E>;

/// Principal of the Istio ingress gateway. Rules without JWT only allow
/// traffic that passed the gateway.
pub const INGRESS_GATEWAY_PRINCIPAL: &str =
    "cluster.local/ns/istio-system/sa/istio-ingressgateway-service-account";

const AUDIENCE_KEY: &str = "request.auth.claims[aud]";

/// Issuers use different claims for scopes, all of them are accepted.
const SCOPE_KEYS: [&str; 3] = [
    "request.auth.claims[scp]",
    "request.auth.claims[scope]",
    "request.auth.claims[scopes]",
];

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("invalid rule"))]
    InvalidRule { source: api_rule::Error },

    #[snafu(display("rule for path {path:?} uses extAuth, which is not enabled"))]
    ExtAuthDisabled { path: String },

    #[snafu(display("failed to resolve the workload selector for path {path:?}"))]
    ResolveSelector {
        source: service::Error,
        path: String,
    },

    #[snafu(display("failed to resolve hosts"))]
    ResolveHosts { source: hosts::Error },

    #[snafu(display("failed to assign the identity labels"))]
    AssignIdentity { source: hashbasedstate::Error },

    #[snafu(display("failed to add AuthorizationPolicy to the desired state"))]
    AddToDesiredState { source: hashbasedstate::Error },
}

/// Compiles the rules of an APIRule into AuthorizationPolicies.
#[derive(Clone, Debug)]
pub struct Creator {
    config: Arc<ReconciliationConfig>,
}

impl Creator {
    pub fn new(config: Arc<ReconciliationConfig>) -> Self {
        Self { config }
    }

    /// Returns the desired AuthorizationPolicies for all rules of `api_rule`.
    /// Fails without a partial result if any rule cannot be compiled.
    pub async fn create(
        &self,
        service_lookup: &dyn ServiceLookup,
        api_rule: &APIRule,
    ) -> Result<Desired<HashableAuthorizationPolicy>> {
        let hosts = hosts::resolve_hosts(
            &api_rule.spec.hosts,
            self.config.gateway.as_ref(),
            self.config.default_domain_name.as_deref(),
        )
        .context(ResolveHostsSnafu)?;

        let mut desired = Desired::new();
        for rule in &api_rule.spec.rules {
            let policies = self
                .generate_authorization_policies(service_lookup, api_rule, rule, &hosts)
                .await?;

            for policy in policies {
                desired
                    .add(policy.into())
                    .context(AddToDesiredStateSnafu)?;
            }
        }

        Ok(desired)
    }

    async fn generate_authorization_policies(
        &self,
        service_lookup: &dyn ServiceLookup,
        api_rule: &APIRule,
        rule: &Rule,
        hosts: &[String],
    ) -> Result<Vec<AuthorizationPolicy>> {
        let auth_mode = rule.auth_mode().context(InvalidRuleSnafu)?;
        if let AuthMode::ExtAuth(_) = auth_mode {
            ensure!(
                self.config.ext_auth_enabled,
                ExtAuthDisabledSnafu { path: &rule.path }
            );
        }

        let pod_selector = get_selector_from_service(service_lookup, api_rule, rule)
            .await
            .context(ResolveSelectorSnafu { path: &rule.path })?;
        let builder = PolicyBuilder {
            api_rule,
            rule,
            namespace: &pod_selector.namespace,
            selector: pod_selector.selector.as_ref(),
        };

        tracing::debug!(
            api_rule = %api_rule.name_any(),
            path = %rule.path,
            ?auth_mode,
            "generating AuthorizationPolicies"
        );

        let mut policies = Vec::new();
        let (base_index, authorizations, source) = match auth_mode {
            AuthMode::NoAuth => (0, &[][..], ingress_gateway_source()),
            AuthMode::Jwt(jwt) => (
                0,
                jwt.authorizations.as_slice(),
                jwt_source(&jwt.authentications),
            ),
            AuthMode::ExtAuth(ext_auth) => {
                for (index, authorizer) in ext_auth.external_authorizers.iter().enumerate() {
                    policies.push(builder.build(custom_spec(&builder, authorizer), index)?);
                }

                let restrictions = ext_auth.restrictions.as_ref();
                (
                    ext_auth.external_authorizers.len(),
                    restrictions.map_or(&[][..], |r| r.authorizations.as_slice()),
                    restrictions.map_or_else(ingress_gateway_source, |r| {
                        jwt_source(&r.authentications)
                    }),
                )
            }
        };

        if authorizations.is_empty() {
            // Without authorizations a single policy allows everything that
            // matches the selector and the operation.
            let spec = allow_spec(&builder, hosts, &source, &JwtAuthorization::default());
            policies.push(builder.build(spec, base_index)?);
        } else {
            for (index, authorization) in authorizations.iter().enumerate() {
                let spec = allow_spec(&builder, hosts, &source, authorization);
                policies.push(builder.build(spec, base_index + index)?);
            }
        }

        Ok(policies)
    }
}

/// Shared parts of all policies generated for one rule.
struct PolicyBuilder<'a> {
    api_rule: &'a APIRule,
    rule: &'a Rule,
    namespace: &'a str,
    selector: Option<&'a WorkloadSelector>,
}

impl PolicyBuilder<'_> {
    fn build(&self, spec: AuthorizationPolicySpec, index: usize) -> Result<AuthorizationPolicy> {
        let mut policy = AuthorizationPolicy::new("", spec);
        policy.metadata = ObjectMeta {
            generate_name: Some(format!("{}-", self.api_rule.name_any())),
            namespace: Some(self.namespace.to_owned()),
            labels: Some(generated_object_labels(self.api_rule)),
            ..ObjectMeta::default()
        };
        policy
            .add_hashing_labels(index)
            .context(AssignIdentitySnafu)?;

        Ok(policy)
    }

    fn operation(&self, hosts: &[String]) -> RuleTo {
        RuleTo {
            operation: Operation {
                hosts: hosts.to_vec(),
                methods: self.rule.methods.iter().map(ToString::to_string).collect(),
                paths: vec![istio_path(&self.rule.path).to_owned()],
            },
        }
    }
}

/// Istio has no regex paths, the legacy match-all path is translated.
fn istio_path(path: &str) -> &str {
    if path == "/.*" { "/*" } else { path }
}

fn ingress_gateway_source() -> Source {
    Source {
        principals: vec![INGRESS_GATEWAY_PRINCIPAL.to_owned()],
        ..Source::default()
    }
}

/// Requires a JWT of one of the issuers. Falls back to the ingress gateway
/// when no authentication is configured.
fn jwt_source(authentications: &[JwtAuthentication]) -> Source {
    if authentications.is_empty() {
        return ingress_gateway_source();
    }

    Source {
        request_principals: authentications
            .iter()
            .map(|authentication| format!("{}/*", authentication.issuer))
            .collect(),
        ..Source::default()
    }
}

fn condition(key: &str, value: &str) -> Condition {
    Condition {
        key: key.to_owned(),
        values: vec![value.to_owned()],
    }
}

/// Delegates the decision to the extension provider `authorizer`.
fn custom_spec(builder: &PolicyBuilder<'_>, authorizer: &str) -> AuthorizationPolicySpec {
    AuthorizationPolicySpec {
        selector: builder.selector.cloned(),
        action: Some(AuthorizationPolicyAction::Custom),
        provider: Some(ExtensionProvider {
            name: authorizer.to_owned(),
        }),
        rules: vec![AuthorizationRule {
            to: vec![builder.operation(&[])],
            ..AuthorizationRule::default()
        }],
    }
}

fn allow_spec(
    builder: &PolicyBuilder<'_>,
    hosts: &[String],
    source: &Source,
    authorization: &JwtAuthorization,
) -> AuthorizationPolicySpec {
    let base_rule = AuthorizationRule {
        from: vec![RuleFrom {
            source: source.clone(),
        }],
        to: vec![builder.operation(hosts)],
        when: Vec::new(),
    };
    let audience_conditions = || {
        authorization
            .audiences
            .iter()
            .map(|audience| condition(AUDIENCE_KEY, audience))
    };

    let rules = if authorization.required_scopes.is_empty() {
        vec![AuthorizationRule {
            when: audience_conditions().collect(),
            ..base_rule
        }]
    } else {
        SCOPE_KEYS
            .iter()
            .map(|scope_key| AuthorizationRule {
                when: authorization
                    .required_scopes
                    .iter()
                    .map(|scope| condition(scope_key, scope))
                    .chain(audience_conditions())
                    .collect(),
                ..base_rule.clone()
            })
            .collect()
    };

    AuthorizationPolicySpec {
        selector: builder.selector.cloned(),
        rules,
        ..AuthorizationPolicySpec::default()
    }
}
