use std::collections::BTreeSet;

use kube::ResourceExt;
use serde::Serialize;

use super::{ContentHash, Hashable, Result, compute_hash, label_value};
use crate::{
    crd::istio::{AuthorizationPolicy, Operation},
    labels::{HASH_LABEL_KEY, INDEX_LABEL_KEY},
};

/// An [`AuthorizationPolicy`] compared by its hash key.
#[derive(Clone, Debug, PartialEq)]
pub struct HashableAuthorizationPolicy(AuthorizationPolicy);

impl From<AuthorizationPolicy> for HashableAuthorizationPolicy {
    fn from(policy: AuthorizationPolicy) -> Self {
        Self(policy)
    }
}

impl AsRef<AuthorizationPolicy> for HashableAuthorizationPolicy {
    fn as_ref(&self) -> &AuthorizationPolicy {
        &self.0
    }
}

impl Hashable for HashableAuthorizationPolicy {
    type Object = AuthorizationPolicy;

    fn hash(&self) -> Option<&str> {
        label_value(&self.0, HASH_LABEL_KEY)
    }

    fn index(&self) -> Option<&str> {
        label_value(&self.0, INDEX_LABEL_KEY)
    }

    fn update_spec(&mut self, desired: &Self) {
        self.0.spec = desired.0.spec.clone();
    }

    fn into_object(self) -> AuthorizationPolicy {
        self.0
    }
}

/// An [`Operation`] with set semantics.
#[derive(PartialEq, Eq, PartialOrd, Ord, Serialize)]
struct CanonicalOperation<'a> {
    hosts: BTreeSet<&'a str>,
    methods: BTreeSet<&'a str>,
    paths: BTreeSet<&'a str>,
}

impl<'a> From<&'a Operation> for CanonicalOperation<'a> {
    fn from(operation: &'a Operation) -> Self {
        let set = |values: &'a [String]| -> BTreeSet<&'a str> {
            values.iter().map(String::as_str).collect()
        };
        Self {
            hosts: set(&operation.hosts),
            methods: set(&operation.methods),
            paths: set(&operation.paths),
        }
    }
}

/// Hashes the namespace, the workload selector and the set of `to`
/// operations of all rules. `from` and `when` are left out so that editing
/// principals, scopes or audiences keeps the identity.
impl ContentHash for AuthorizationPolicy {
    fn content_hash(&self) -> Result<String> {
        let selector = self
            .spec
            .selector
            .as_ref()
            .map(|selector| &selector.match_labels);
        let operations: BTreeSet<CanonicalOperation<'_>> = self
            .spec
            .rules
            .iter()
            .flat_map(|rule| &rule.to)
            .map(|to| CanonicalOperation::from(&to.operation))
            .collect();

        compute_hash(
            &self.namespace().unwrap_or_default(),
            &selector,
            &operations,
        )
    }
}
