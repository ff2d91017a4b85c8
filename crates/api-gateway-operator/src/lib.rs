//! Reconciliation engine of the API Gateway operator.
//!
//! An [`APIRule`][crate::crd::api_rule::APIRule] describes an exposed service and the access
//! rules for its paths. This crate compiles such a rule into Istio security resources
//! (AuthorizationPolicies and RequestAuthentications) and computes the minimal set of
//! create/update/delete actions needed to bring the cluster in line with it.
//!
//! The entry point is [`processing::Reconciliation`]. The persisted identity of every generated
//! object is described in [`hashbasedstate`].

pub mod cli;
pub mod client;
pub mod crd;
pub mod hashbasedstate;
pub mod labels;
pub mod logging;
pub mod namespace;
pub mod processing;
pub mod service;

#[cfg(test)]
pub(crate) mod test_utils;

// External re-exports
pub use k8s_openapi;
pub use kube;
pub use schemars;
