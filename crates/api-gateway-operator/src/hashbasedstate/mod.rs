//! Content addressed comparison of generated objects.
//!
//! Every object generated from an APIRule carries two labels that together form
//! its identity, the hash key `<hash>:<index>`:
//!
//! - [`HASH_LABEL_KEY`][crate::labels::HASH_LABEL_KEY] holds a hash of the
//!   parts of the object that define *what* it applies to (namespace, workload
//!   selector and matched operations). Values that can be edited without
//!   changing the target, like required scopes or audiences, are not part of
//!   the hash.
//! - [`INDEX_LABEL_KEY`][crate::labels::INDEX_LABEL_KEY] holds the position of
//!   the authorization the object was generated from.
//!
//! A reconciliation builds a [`Desired`] state from the APIRule and an
//! [`Actual`] state from the cluster, then [`get_changes`] compares both by
//! hash key. Objects present in both states are updated in place, objects
//! only present in the cluster are deleted and the remaining desired objects
//! are created. Cluster objects without identity labels cannot be compared
//! and are always deleted.

use snafu::{OptionExt, Snafu};

mod authorization_policy;
mod changes;
mod hash;
mod request_authentication;
mod state;

pub use authorization_policy::HashableAuthorizationPolicy;
pub use changes::{Changes, get_changes};
pub use hash::{ContentHash, compute_hash};
pub use request_authentication::HashableRequestAuthentication;
pub use state::{Actual, Desired};

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("object has no hash label"))]
    MissingHashLabel,

    #[snafu(display("object has no index label"))]
    MissingIndexLabel,

    #[snafu(display("failed to serialize hash input"))]
    SerializeHashInput { source: serde_json::Error },
}

/// A generated object that can be compared by its hash key.
pub trait Hashable {
    /// The Kubernetes object handed to the apply layer.
    type Object;

    /// Value of the hash label, if present.
    fn hash(&self) -> Option<&str>;

    /// Value of the index label, if present.
    fn index(&self) -> Option<&str>;

    /// Replaces the spec with the one of `desired`, keeping the metadata.
    fn update_spec(&mut self, desired: &Self);

    fn into_object(self) -> Self::Object;
}

/// Returns the `<hash>:<index>` key of the given hashable.
pub(crate) fn hash_key<H: Hashable>(hashable: &H) -> Result<String> {
    let hash = hashable.hash().context(MissingHashLabelSnafu)?;
    let index = hashable.index().context(MissingIndexLabelSnafu)?;

    Ok(format!("{hash}:{index}"))
}

fn label_value<'a>(object: &'a impl kube::Resource, key: &str) -> Option<&'a str> {
    object.meta().labels.as_ref()?.get(key).map(String::as_str)
}
