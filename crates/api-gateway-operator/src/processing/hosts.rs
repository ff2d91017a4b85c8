//! Completion of short host names.

use snafu::{OptionExt, Snafu};

use crate::crd::istio::Gateway;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display(
        "short host {host:?} requires a gateway with a host definition or a default domain"
    ))]
    MissingGatewayDomain { host: String },
}

/// A short host name is a single DNS label without a domain.
pub fn is_short_host_name(host: &str) -> bool {
    !host.contains('.')
}

/// Returns the hosts with short host names completed by the domain of the
/// gateway, falling back to `default_domain`.
pub fn resolve_hosts(
    hosts: &[String],
    gateway: Option<&Gateway>,
    default_domain: Option<&str>,
) -> Result<Vec<String>> {
    let domain = gateway
        .and_then(|gateway| gateway.spec.domain())
        .or(default_domain)
        .filter(|domain| !domain.is_empty());

    hosts
        .iter()
        .map(|host| {
            if is_short_host_name(host) {
                let domain = domain.context(MissingGatewayDomainSnafu { host })?;
                Ok(format!("{host}.{domain}"))
            } else {
                Ok(host.clone())
            }
        })
        .collect()
}
