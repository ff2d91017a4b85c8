//! This module provides helpers to deal with the namespaces the operator watches.
use std::{convert::Infallible, str::FromStr};

use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Resource};

use crate::client::Client;

#[derive(Clone, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum WatchNamespace {
    #[default]
    All,
    One(String),
}

impl From<&str> for WatchNamespace {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::All
        } else {
            Self::One(s.to_owned())
        }
    }
}

impl FromStr for WatchNamespace {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl WatchNamespace {
    /// Gets an API object for the namespace in question or for all namespaces,
    /// depending on which variant we are.
    pub fn get_api<T>(&self, client: &Client) -> Api<T>
    where
        T: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        match self {
            Self::All => client.get_all_api(),
            Self::One(namespace) => client.get_namespaced_api(namespace),
        }
    }
}
