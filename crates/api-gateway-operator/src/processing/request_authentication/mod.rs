//! RequestAuthentications validating the JWTs accepted by an APIRule.

use std::sync::Arc;

use async_trait::async_trait;
use snafu::ResultExt;

use crate::{
    crd::{api_rule::APIRule, istio::RequestAuthentication},
    processing::{
        CreateRequestAuthenticationsSnafu, ObjectChange, ObjectRepository, ReconciliationProcessor,
        Result, evaluate_changes,
    },
    service::ServiceLookup,
};

mod creator;

pub use creator::{Error, create};

pub struct Processor {
    service_lookup: Arc<dyn ServiceLookup>,
    repository: Arc<dyn ObjectRepository<RequestAuthentication>>,
}

impl Processor {
    pub fn new(
        service_lookup: Arc<dyn ServiceLookup>,
        repository: Arc<dyn ObjectRepository<RequestAuthentication>>,
    ) -> Self {
        Self {
            service_lookup,
            repository,
        }
    }
}

#[async_trait]
impl ReconciliationProcessor for Processor {
    async fn evaluate_reconciliation(&self, api_rule: &APIRule) -> Result<Vec<ObjectChange>> {
        let desired = create(self.service_lookup.as_ref(), api_rule)
            .await
            .context(CreateRequestAuthenticationsSnafu)?;

        evaluate_changes(desired, self.repository.as_ref(), api_rule).await
    }
}
