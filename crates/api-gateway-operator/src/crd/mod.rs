//! Resource types read and written by the reconciliation engine.
//!
//! - [`api_rule`] contains the APIRule input resource.
//! - [`istio`] contains the generated Istio security resources and the Istio
//!   Gateway, which is consulted to resolve short host names.
//!
//! Only the fields the engine reads or writes are modelled.

pub mod api_rule;
pub mod istio;
