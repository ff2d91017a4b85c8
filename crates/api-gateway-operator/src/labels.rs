//! Label keys and helpers shared by all generated objects.
//!
//! The labels are the only persistent state of the reconciliation engine. The
//! hash and index labels identify a generated object, the owner label scopes
//! it to the APIRule it was generated from.
//!
//! See <https://kubernetes.io/docs/concepts/overview/working-with-objects/labels/>
//! for more information on Kubernetes labels.

use std::collections::BTreeMap;

use const_format::concatcp;
use kube::ResourceExt;

use crate::crd::api_rule::APIRule;

/// The Kyma API Gateway specific key prefix.
const GATEWAY_KEY_PREFIX: &str = "gateway.kyma-project.io/";

/// The well-known Kubernetes app key prefix.
const K8S_APP_KEY_PREFIX: &str = "app.kubernetes.io/";

/// The label key `gateway.kyma-project.io/hash` holding the content hash of a
/// generated object.
pub const HASH_LABEL_KEY: &str = concatcp!(GATEWAY_KEY_PREFIX, "hash");

/// The label key `gateway.kyma-project.io/index` holding the position of the
/// authorization the object was generated from, as a decimal string.
pub const INDEX_LABEL_KEY: &str = concatcp!(GATEWAY_KEY_PREFIX, "index");

/// The owner label key `apirule.gateway.kyma-project.io/v1beta1`. Its value is
/// `<apiRuleName>.<apiRuleNamespace>`.
pub const OWNER_LABEL_KEY: &str = "apirule.gateway.kyma-project.io/v1beta1";

/// The label key `kyma-project.io/module`.
pub const MODULE_LABEL_KEY: &str = "kyma-project.io/module";

/// The well-known Kubernetes app managed-by key `app.kubernetes.io/managed-by`.
pub const K8S_APP_MANAGED_BY_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "managed-by");

/// The well-known Kubernetes app component key `app.kubernetes.io/component`.
pub const K8S_APP_COMPONENT_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "component");

/// The well-known Kubernetes app part-of key `app.kubernetes.io/part-of`.
pub const K8S_APP_PART_OF_KEY: &str = concatcp!(K8S_APP_KEY_PREFIX, "part-of");

/// Value of all module labels.
pub const API_GATEWAY_LABEL_VALUE: &str = "api-gateway";

/// Returns the value of the owner label for the given APIRule.
pub fn owner_label_value(api_rule: &APIRule) -> String {
    format!(
        "{name}.{namespace}",
        name = api_rule.name_any(),
        namespace = api_rule.namespace().unwrap_or_default()
    )
}

/// Returns the set of labels used to select all objects generated for the
/// given APIRule.
pub fn owner_labels(api_rule: &APIRule) -> BTreeMap<String, String> {
    BTreeMap::from([(OWNER_LABEL_KEY.to_owned(), owner_label_value(api_rule))])
}

/// Returns the labels every generated object carries before its identity is
/// assigned: the owner label and the module labels.
pub fn generated_object_labels(api_rule: &APIRule) -> BTreeMap<String, String> {
    let mut labels = owner_labels(api_rule);
    labels.extend(
        [
            MODULE_LABEL_KEY,
            K8S_APP_MANAGED_BY_KEY,
            K8S_APP_COMPONENT_KEY,
            K8S_APP_PART_OF_KEY,
        ]
        .into_iter()
        .map(|key| (key.to_owned(), API_GATEWAY_LABEL_VALUE.to_owned())),
    );
    labels
}

/// This trait extends label maps with conversions used in Kubernetes API calls.
pub trait MatchLabelsExt {
    /// Converts the map into an equality-based label selector query string,
    /// e.g. `a=b,c=d`.
    fn to_query_string(&self) -> String;
}

impl MatchLabelsExt for BTreeMap<String, String> {
    fn to_query_string(&self) -> String {
        self.iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::api_rule_from_yaml;

    #[test]
    fn owner_label_is_name_dot_namespace() {
        let api_rule = api_rule_from_yaml(indoc::indoc! {"
            apiVersion: gateway.kyma-project.io/v2alpha1
            kind: APIRule
            metadata:
              name: httpbin
              namespace: apps
            spec:
              hosts: [httpbin.example.com]
              rules: []
        "});

        assert_eq!(owner_label_value(&api_rule), "httpbin.apps");
        assert_eq!(
            owner_labels(&api_rule).to_query_string(),
            "apirule.gateway.kyma-project.io/v1beta1=httpbin.apps"
        );
    }

    #[test]
    fn generated_labels_contain_module_labels() {
        let api_rule = api_rule_from_yaml(indoc::indoc! {"
            apiVersion: gateway.kyma-project.io/v2alpha1
            kind: APIRule
            metadata:
              name: httpbin
              namespace: apps
            spec:
              hosts: [httpbin.example.com]
              rules: []
        "});

        let labels = generated_object_labels(&api_rule);
        assert_eq!(labels.len(), 5);
        assert_eq!(
            labels.get(K8S_APP_MANAGED_BY_KEY).map(String::as_str),
            Some(API_GATEWAY_LABEL_VALUE)
        );
    }

    #[test]
    fn query_string_joins_pairs() {
        let labels = BTreeMap::from([
            ("b".to_owned(), "2".to_owned()),
            ("a".to_owned(), "1".to_owned()),
        ]);

        assert_eq!(labels.to_query_string(), "a=1,b=2");
    }
}
