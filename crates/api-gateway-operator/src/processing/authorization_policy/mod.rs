//! AuthorizationPolicies restricting access to the workloads of an APIRule.
//!
//! Every rule is compiled into one ALLOW policy per JWT authorization, or a
//! single one if there are none. Rules with `extAuth` additionally get one
//! CUSTOM policy per external authorizer, placed before the ALLOW policies
//! in the index order.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::ResultExt;

use crate::{
    crd::{api_rule::APIRule, istio::AuthorizationPolicy},
    processing::{
        CreateAuthorizationPoliciesSnafu, ObjectChange, ObjectRepository, ReconciliationConfig,
        ReconciliationProcessor, Result, evaluate_changes,
    },
    service::ServiceLookup,
};

mod creator;

pub use creator::{Creator, Error, INGRESS_GATEWAY_PRINCIPAL};

pub struct Processor {
    creator: Creator,
    service_lookup: Arc<dyn ServiceLookup>,
    repository: Arc<dyn ObjectRepository<AuthorizationPolicy>>,
}

impl Processor {
    pub fn new(
        config: ReconciliationConfig,
        service_lookup: Arc<dyn ServiceLookup>,
        repository: Arc<dyn ObjectRepository<AuthorizationPolicy>>,
    ) -> Self {
        Self {
            creator: Creator::new(Arc::new(config)),
            service_lookup,
            repository,
        }
    }
}

#[async_trait]
impl ReconciliationProcessor for Processor {
    async fn evaluate_reconciliation(&self, api_rule: &APIRule) -> Result<Vec<ObjectChange>> {
        let desired = self
            .creator
            .create(self.service_lookup.as_ref(), api_rule)
            .await
            .context(CreateAuthorizationPoliciesSnafu)?;

        evaluate_changes(desired, self.repository.as_ref(), api_rule).await
    }
}
