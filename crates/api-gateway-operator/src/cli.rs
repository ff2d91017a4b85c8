//! This module provides the command line arguments of the operator.
//!
//! Every argument can also be provided as environment variable, e.g.
//! `--watch-namespace` as `WATCH_NAMESPACE`.

use clap::Parser;

use crate::{crd::istio::Gateway, namespace::WatchNamespace, processing::ReconciliationConfig};

pub const AUTHOR: &str = "Kyma API Gateway Maintainers";

#[derive(Debug, PartialEq, Eq, Parser)]
#[command(author = AUTHOR, version, about, long_about = "")]
pub struct RunArguments {
    /// Provides a specific namespace to watch (instead of watching all namespaces)
    #[arg(long, env, default_value = "")]
    pub watch_namespace: WatchNamespace,

    /// Allows APIRules to delegate authorization to external authorizers
    /// with `extAuth`.
    #[arg(long, env)]
    pub ext_auth_enabled: bool,

    /// Domain of short host names when the gateway of an APIRule has no host
    /// definition.
    #[arg(long, env)]
    pub default_domain_name: Option<String>,
}

impl RunArguments {
    /// The settings of a single reconciliation, with the gateway referenced
    /// by the reconciled APIRule.
    pub fn reconciliation_config(&self, gateway: Option<Gateway>) -> ReconciliationConfig {
        ReconciliationConfig {
            ext_auth_enabled: self.ext_auth_enabled,
            gateway,
            default_domain_name: self.default_domain_name.clone(),
        }
    }
}
