//! The APIRule resource in version `gateway.kyma-project.io/v2alpha1`.
//!
//! An APIRule exposes a service on one or more hosts. Each [`Rule`] of the
//! spec describes a path with its allowed methods and exactly one of three
//! mutually exclusive access modes: `noAuth`, `jwt` or `extAuth`.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use snafu::Snafu;
use strum::{Display, EnumString};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display(
        "rule for path {path:?} must configure exactly one of noAuth, jwt or extAuth, found {configured}"
    ))]
    InvalidAuthMode { path: String, configured: usize },
}

/// Exposes a service on the given hosts and secures its paths.
#[derive(
    CustomResource, Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize,
)]
#[kube(
    group = "gateway.kyma-project.io",
    version = "v2alpha1",
    kind = "APIRule",
    plural = "apirules",
    derive = "PartialEq",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct APIRuleSpec {
    /// Fully qualified domain names or short names that are completed with the
    /// domain of the referenced gateway.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Service exposed by all rules that do not define their own service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,

    /// Gateway in the format `<namespace>/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,

    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Reference to the exposed Kubernetes Service.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u32>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Path of the exposed service. Istio wildcard operators like `{**}` are
    /// allowed.
    pub path: String,

    /// Overrides the service of the spec for this rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Service>,

    #[serde(default)]
    pub methods: Vec<HttpMethod>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_auth: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt: Option<JwtConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_auth: Option<ExtAuth>,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    EnumString,
    Eq,
    Hash,
    JsonSchema,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Connect,
    Options,
    Trace,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtConfig {
    #[serde(default)]
    pub authentications: Vec<JwtAuthentication>,

    /// Ordered list of authorizations. The position of an authorization is
    /// part of the identity of the AuthorizationPolicy generated from it.
    #[serde(default)]
    pub authorizations: Vec<JwtAuthorization>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtAuthentication {
    pub issuer: String,

    pub jwks_uri: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_headers: Vec<JwtHeader>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub from_params: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtHeader {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtAuthorization {
    #[serde(default)]
    pub required_scopes: Vec<String>,

    #[serde(default)]
    pub audiences: Vec<String>,
}

/// Delegates the access decision to external authorizers configured in the
/// Istio mesh config, optionally restricted by JWT rules.
#[derive(Clone, Debug, Default, Deserialize, JsonSchema, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuth {
    /// Names of the extension providers.
    #[serde(rename = "authorizers")]
    pub external_authorizers: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<JwtConfig>,
}

/// The resolved access mode of a [`Rule`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthMode<'a> {
    NoAuth,
    Jwt(&'a JwtConfig),
    ExtAuth(&'a ExtAuth),
}

impl Rule {
    /// Resolves the access mode. A rule must configure exactly one mode,
    /// `noAuth: false` counts as not configured.
    pub fn auth_mode(&self) -> Result<AuthMode<'_>> {
        let modes: Vec<AuthMode<'_>> = [
            (self.no_auth == Some(true)).then_some(AuthMode::NoAuth),
            self.jwt.as_ref().map(AuthMode::Jwt),
            self.ext_auth.as_ref().map(AuthMode::ExtAuth),
        ]
        .into_iter()
        .flatten()
        .collect();

        match modes.as_slice() {
            [mode] => Ok(*mode),
            _ => InvalidAuthModeSnafu {
                path: self.path.clone(),
                configured: modes.len(),
            }
            .fail(),
        }
    }

    /// Returns the JWT restrictions that apply to this rule, if any.
    pub fn jwt_restrictions(&self) -> Option<&JwtConfig> {
        match self.auth_mode() {
            Ok(AuthMode::Jwt(jwt)) => Some(jwt),
            Ok(AuthMode::ExtAuth(ext_auth)) => ext_auth.restrictions.as_ref(),
            Ok(AuthMode::NoAuth) | Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::test_utils::api_rule_from_yaml;

    #[test]
    fn deserialize_api_rule() {
        let api_rule = api_rule_from_yaml(indoc::indoc! {"
            apiVersion: gateway.kyma-project.io/v2alpha1
            kind: APIRule
            metadata:
              name: httpbin
              namespace: apps
            spec:
              hosts: [httpbin]
              gateway: kyma-system/kyma-gateway
              service:
                name: httpbin
                port: 8000
              rules:
                - path: /headers
                  methods: [GET, POST]
                  jwt:
                    authentications:
                      - issuer: https://issuer.example.com
                        jwksUri: https://issuer.example.com/jwks
                        fromHeaders:
                          - name: X-JWT
                            prefix: Bearer
                    authorizations:
                      - requiredScopes: [read]
                        audiences: [app]
                - path: /ext
                  extAuth:
                    authorizers: [oauth2-proxy]
        "});

        let rules = &api_rule.spec.rules;
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].methods, vec![HttpMethod::Get, HttpMethod::Post]);

        let jwt = rules[0].jwt.as_ref().expect("jwt must be set");
        assert_eq!(jwt.authentications[0].from_headers[0].prefix.as_deref(), Some("Bearer"));
        assert_eq!(jwt.authorizations[0].required_scopes, vec!["read"]);

        let ext_auth = rules[1].ext_auth.as_ref().expect("extAuth must be set");
        assert_eq!(ext_auth.external_authorizers, vec!["oauth2-proxy"]);
        assert_eq!(api_rule.spec.service.and_then(|s| s.port), Some(8000));
    }

    #[test]
    fn http_method_display() {
        assert_eq!(HttpMethod::Options.to_string(), "OPTIONS");
        assert_eq!("PATCH".parse::<HttpMethod>(), Ok(HttpMethod::Patch));
    }

    #[rstest]
    #[case(Some(true), false, false, Ok(()))]
    #[case(None, true, false, Ok(()))]
    #[case(Some(false), false, true, Ok(()))]
    #[case(None, false, false, Err(0))]
    #[case(Some(false), false, false, Err(0))]
    #[case(Some(true), true, false, Err(2))]
    #[case(Some(true), true, true, Err(3))]
    fn auth_modes_are_mutually_exclusive(
        #[case] no_auth: Option<bool>,
        #[case] jwt: bool,
        #[case] ext_auth: bool,
        #[case] expected: std::result::Result<(), usize>,
    ) {
        let rule = Rule {
            path: "/".to_owned(),
            no_auth,
            jwt: jwt.then(JwtConfig::default),
            ext_auth: ext_auth.then(ExtAuth::default),
            ..Rule::default()
        };

        let result = rule
            .auth_mode()
            .map(|_| ())
            .map_err(|Error::InvalidAuthMode { configured, .. }| configured);

        assert_eq!(result, expected);
    }

    #[test]
    fn jwt_restrictions_of_ext_auth() {
        let restrictions = JwtConfig {
            authorizations: vec![JwtAuthorization {
                audiences: vec!["app".to_owned()],
                ..JwtAuthorization::default()
            }],
            ..JwtConfig::default()
        };
        let rule = Rule {
            path: "/".to_owned(),
            ext_auth: Some(ExtAuth {
                external_authorizers: vec!["authz".to_owned()],
                restrictions: Some(restrictions.clone()),
            }),
            ..Rule::default()
        };

        assert_eq!(rule.jwt_restrictions(), Some(&restrictions));
    }
}
