use std::collections::BTreeSet;

use kube::ResourceExt;
use snafu::ResultExt;

use super::{
    ContentHash, Hashable, Result, SerializeHashInputSnafu, compute_hash, label_value,
};
use crate::{
    crd::istio::RequestAuthentication,
    labels::{HASH_LABEL_KEY, INDEX_LABEL_KEY},
};

/// A [`RequestAuthentication`] compared by its hash key.
#[derive(Clone, Debug, PartialEq)]
pub struct HashableRequestAuthentication(RequestAuthentication);

impl From<RequestAuthentication> for HashableRequestAuthentication {
    fn from(request_authentication: RequestAuthentication) -> Self {
        Self(request_authentication)
    }
}

impl AsRef<RequestAuthentication> for HashableRequestAuthentication {
    fn as_ref(&self) -> &RequestAuthentication {
        &self.0
    }
}

impl Hashable for HashableRequestAuthentication {
    type Object = RequestAuthentication;

    fn hash(&self) -> Option<&str> {
        label_value(&self.0, HASH_LABEL_KEY)
    }

    fn index(&self) -> Option<&str> {
        label_value(&self.0, INDEX_LABEL_KEY)
    }

    fn update_spec(&mut self, desired: &Self) {
        self.0.spec = desired.0.spec.clone();
    }

    fn into_object(self) -> RequestAuthentication {
        self.0
    }
}

/// Hashes the namespace, the workload selector and the set of JWT rules.
impl ContentHash for RequestAuthentication {
    fn content_hash(&self) -> Result<String> {
        let selector = self
            .spec
            .selector
            .as_ref()
            .map(|selector| &selector.match_labels);
        let jwt_rules = self
            .spec
            .jwt_rules
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<BTreeSet<_>, _>>()
            .context(SerializeHashInputSnafu)?;

        compute_hash(&self.namespace().unwrap_or_default(), &selector, &jwt_rules)
    }
}
