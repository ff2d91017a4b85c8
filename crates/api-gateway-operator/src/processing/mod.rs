//! Evaluation of the changes needed to reconcile an APIRule.
//!
//! Each [`ReconciliationProcessor`] handles one kind of generated object. It
//! builds the desired state from the APIRule, reads the actual state through
//! an [`ObjectRepository`] and compares both with
//! [`get_changes`][crate::hashbasedstate::get_changes]. The resulting
//! [`ObjectChange`]s are executed by the caller.
//!
//! [`Reconciliation`] runs all processors for an APIRule. Nothing is written
//! to the cluster while evaluating, so a failing processor leaves no partial
//! state behind.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use kube::{Resource, ResourceExt};
use snafu::{ResultExt, Snafu};
use strum::Display;

use crate::{
    client::Client,
    crd::{
        api_rule::APIRule,
        istio::{AuthorizationPolicy, Gateway, RequestAuthentication},
    },
    hashbasedstate::{Actual, Changes, Desired, Hashable, get_changes},
    service::ServiceLookup,
};

pub mod authorization_policy;
pub mod hosts;
pub mod request_authentication;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to create AuthorizationPolicies"))]
    CreateAuthorizationPolicies {
        source: authorization_policy::Error,
    },

    #[snafu(display("failed to create RequestAuthentications"))]
    CreateRequestAuthentications {
        source: request_authentication::Error,
    },

    #[snafu(display("failed to list {kind} objects owned by APIRule {api_rule}"))]
    ListObjects {
        source: kube::Error,
        kind: String,
        api_rule: String,
    },
}

/// Runtime settings of a reconciliation.
#[derive(Clone, Debug, Default)]
pub struct ReconciliationConfig {
    /// Allows rules with `extAuth`.
    pub ext_auth_enabled: bool,

    /// The gateway referenced by the APIRule, used to complete short host
    /// names.
    pub gateway: Option<Gateway>,

    /// Domain used for short host names when the gateway has no hosts.
    pub default_domain_name: Option<String>,
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ChangeAction {
    Create,
    Update,
    Delete,
}

/// An object managed by the reconciliation.
#[derive(Clone, Debug, PartialEq)]
pub enum ManagedObject {
    AuthorizationPolicy(AuthorizationPolicy),
    RequestAuthentication(RequestAuthentication),
}

impl From<AuthorizationPolicy> for ManagedObject {
    fn from(policy: AuthorizationPolicy) -> Self {
        Self::AuthorizationPolicy(policy)
    }
}

impl From<RequestAuthentication> for ManagedObject {
    fn from(request_authentication: RequestAuthentication) -> Self {
        Self::RequestAuthentication(request_authentication)
    }
}

/// An action the apply layer must execute.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectChange {
    pub action: ChangeAction,
    pub object: ManagedObject,
}

impl ObjectChange {
    pub fn new(action: ChangeAction, object: impl Into<ManagedObject>) -> Self {
        Self {
            action,
            object: object.into(),
        }
    }

    /// Flattens the changes into a list of actions.
    pub fn from_changes<T: Into<ManagedObject>>(changes: Changes<T>) -> Vec<Self> {
        let Changes {
            create,
            update,
            delete,
        } = changes;

        create
            .into_iter()
            .map(|object| Self::new(ChangeAction::Create, object))
            .chain(
                update
                    .into_iter()
                    .map(|object| Self::new(ChangeAction::Update, object)),
            )
            .chain(
                delete
                    .into_iter()
                    .map(|object| Self::new(ChangeAction::Delete, object)),
            )
            .collect()
    }
}

/// Provides the cluster objects generated for an APIRule.
//
// The async-trait crate is still needed, as the trait is used as a trait object.
#[async_trait]
pub trait ObjectRepository<K>: Send + Sync {
    /// Returns all objects carrying the owner label of `api_rule`.
    async fn get_all(&self, api_rule: &APIRule) -> std::result::Result<Vec<K>, kube::Error>;
}

#[async_trait]
pub trait ReconciliationProcessor: Send + Sync {
    /// Returns the actions needed to reconcile the objects of this processor.
    async fn evaluate_reconciliation(&self, api_rule: &APIRule) -> Result<Vec<ObjectChange>>;
}

/// Compares `desired` with the objects the repository returns for
/// `api_rule`.
pub(crate) async fn evaluate_changes<H>(
    desired: Desired<H>,
    repository: &dyn ObjectRepository<H::Object>,
    api_rule: &APIRule,
) -> Result<Vec<ObjectChange>>
where
    H: Hashable + From<H::Object> + Send,
    H::Object: Resource<DynamicType = ()> + Into<ManagedObject> + Send,
{
    let kind = <H::Object as Resource>::kind(&()).to_string();
    let objects = repository
        .get_all(api_rule)
        .await
        .with_context(|_| ListObjectsSnafu {
            kind: kind.clone(),
            api_rule: api_rule.name_any(),
        })?;

    let mut actual = Actual::new();
    for object in objects {
        actual.add(H::from(object));
    }

    let changes = get_changes(desired, actual);
    tracing::info!(
        api_rule = %api_rule.name_any(),
        namespace = %api_rule.namespace().unwrap_or_default(),
        %kind,
        %changes,
        "evaluated changes"
    );

    Ok(ObjectChange::from_changes(changes))
}

/// Runs all processors for an APIRule.
pub struct Reconciliation {
    processors: Vec<Box<dyn ReconciliationProcessor>>,
}

impl Debug for Reconciliation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciliation")
            .field("processors", &self.processors.len())
            .finish()
    }
}

impl Reconciliation {
    /// Creates the AuthorizationPolicy and RequestAuthentication processors.
    pub fn new(
        config: ReconciliationConfig,
        service_lookup: Arc<dyn ServiceLookup>,
        authorization_policies: Arc<dyn ObjectRepository<AuthorizationPolicy>>,
        request_authentications: Arc<dyn ObjectRepository<RequestAuthentication>>,
    ) -> Self {
        let processors: Vec<Box<dyn ReconciliationProcessor>> = vec![
            Box::new(authorization_policy::Processor::new(
                config,
                service_lookup.clone(),
                authorization_policies,
            )),
            Box::new(request_authentication::Processor::new(
                service_lookup,
                request_authentications,
            )),
        ];
        Self::with_processors(processors)
    }

    /// Uses the kube backed client for all collaborators.
    pub fn from_client(client: Client, config: ReconciliationConfig) -> Self {
        let client = Arc::new(client);
        Self::new(config, client.clone(), client.clone(), client)
    }

    pub fn with_processors(processors: Vec<Box<dyn ReconciliationProcessor>>) -> Self {
        Self { processors }
    }

    /// Returns the actions of all processors. The first failing processor
    /// aborts the evaluation.
    pub async fn evaluate(&self, api_rule: &APIRule) -> Result<Vec<ObjectChange>> {
        let mut changes = Vec::new();
        for processor in &self.processors {
            changes.extend(processor.evaluate_reconciliation(api_rule).await?);
        }

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        labels::{HASH_LABEL_KEY, INDEX_LABEL_KEY, OWNER_LABEL_KEY},
        test_utils::{
            FakeRepository, FakeServiceLookup, api_rule_with_rules, authorization_policy,
        },
    };

    fn reconciliation(
        authorization_policies: FakeRepository<AuthorizationPolicy>,
    ) -> Reconciliation {
        Reconciliation::new(
            ReconciliationConfig::default(),
            Arc::new(FakeServiceLookup::default().with_service(
                "apps",
                "httpbin",
                &[("app", "httpbin")],
            )),
            Arc::new(authorization_policies),
            Arc::new(FakeRepository::default()),
        )
    }

    fn actions(changes: &[ObjectChange], action: ChangeAction) -> Vec<&ManagedObject> {
        changes
            .iter()
            .filter(|change| change.action == action)
            .map(|change| &change.object)
            .collect()
    }

    #[tokio::test]
    async fn replaces_policy_of_removed_path() {
        let old = authorization_policy(
            "httpbin-old",
            &[
                (OWNER_LABEL_KEY, "httpbin.apps"),
                (HASH_LABEL_KEY, "apps.0000.0000"),
                (INDEX_LABEL_KEY, "0"),
            ],
            "/old",
        );
        let foreign = authorization_policy(
            "other",
            &[(OWNER_LABEL_KEY, "other.apps")],
            "/other",
        );
        let reconciliation =
            reconciliation(FakeRepository::default().with_objects([old.clone(), foreign]));

        let changes = reconciliation
            .evaluate(&api_rule_with_rules(indoc::indoc! {"
                - path: /headers
                  methods: [GET]
                  noAuth: true
            "}))
            .await
            .expect("evaluation must succeed");

        let created = actions(&changes, ChangeAction::Create);
        assert_eq!(created.len(), 1);
        let ManagedObject::AuthorizationPolicy(created) = created[0] else {
            unreachable!("only AuthorizationPolicies are expected, got {created:?}");
        };
        assert_eq!(created.spec.rules[0].to[0].operation.paths, vec!["/headers"]);
        assert_eq!(
            actions(&changes, ChangeAction::Delete),
            vec![&ManagedObject::AuthorizationPolicy(old)]
        );
        assert!(actions(&changes, ChangeAction::Update).is_empty());
    }

    #[tokio::test]
    async fn jwt_rule_creates_both_kinds() {
        let changes = reconciliation(FakeRepository::default())
            .evaluate(&api_rule_with_rules(indoc::indoc! {"
                - path: /headers
                  methods: [GET]
                  jwt:
                    authentications:
                      - issuer: https://issuer.example.com
                        jwksUri: https://issuer.example.com/jwks
            "}))
            .await
            .expect("evaluation must succeed");

        assert_eq!(changes.len(), 2);
        assert!(changes.iter().all(|change| change.action == ChangeAction::Create));
        assert!(changes
            .iter()
            .any(|change| matches!(change.object, ManagedObject::RequestAuthentication(_))));
    }

    #[tokio::test]
    async fn first_error_aborts_evaluation() {
        let reconciliation = Reconciliation::new(
            ReconciliationConfig::default(),
            Arc::new(FakeServiceLookup::default()),
            Arc::new(FakeRepository::default()),
            Arc::new(FakeRepository::default()),
        );

        let result = reconciliation
            .evaluate(&api_rule_with_rules(indoc::indoc! {"
                - path: /headers
                  noAuth: true
            "}))
            .await;

        assert!(matches!(
            result,
            Err(Error::CreateAuthorizationPolicies { .. })
        ));
    }

    #[test]
    fn changes_are_flattened() {
        let changes = Changes {
            create: vec![authorization_policy("a", &[], "/")],
            update: vec![authorization_policy("b", &[], "/")],
            delete: vec![authorization_policy("c", &[], "/")],
        };

        let actions: Vec<ChangeAction> = ObjectChange::from_changes(changes)
            .into_iter()
            .map(|change| change.action)
            .collect();

        assert_eq!(
            actions,
            vec![ChangeAction::Create, ChangeAction::Update, ChangeAction::Delete]
        );
    }
}
