//! The contract every resource and data source adapter follows.
//!
//! Adapters are thin: they decode the persisted identity, call the
//! [`GitLabApi`], and map the response back into typed state. The shared
//! pieces of that pattern live here:
//!
//! - [`Operation`] bundles the client, the cancellation context and tunables
//! - [`parse_state`] / [`to_state`] convert between raw JSON and typed state
//! - [`changed`] picks the fields an update has to send
//! - [`wait_for_deletion`] polls until an eventually-consistent delete lands

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::client::GitLabApi;
use crate::config::OperationSettings;
use crate::context::Context;
use crate::error::{ProviderError, Result};
use crate::schema::{Diagnostic, Schema};
use crate::upgrade::StateUpgrader;
use crate::validation;

/// Everything an adapter needs for one operation.
#[derive(Clone, Copy)]
pub struct Operation<'a> {
    /// The GitLab client.
    pub api: &'a dyn GitLabApi,
    /// Cancellation and deadline of the operation.
    pub ctx: &'a Context,
    /// Provider tunables.
    pub settings: OperationSettings,
}

impl<'a> Operation<'a> {
    /// Bundle an operation.
    pub fn new(api: &'a dyn GitLabApi, ctx: &'a Context, settings: OperationSettings) -> Self {
        Self { api, ctx, settings }
    }
}

impl std::fmt::Debug for Operation<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("ctx", self.ctx)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// A managed GitLab resource type.
///
/// `read` and `import` return `Ok(None)` when the remote object is gone; the
/// provider turns that into an empty state so the host plans a re-create.
#[async_trait]
pub trait Resource: Send + Sync {
    /// The resource type name, e.g. `gitlab_project_hook`.
    fn type_name(&self) -> &'static str;

    /// The current schema. Its version is the current state version.
    fn schema(&self) -> Schema;

    /// Upgraders for every schema version older than the current one.
    fn state_upgraders(&self) -> &'static [StateUpgrader] {
        &[]
    }

    /// Validate user configuration.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Create the remote object and return the full state.
    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value>;

    /// Refresh state from GitLab.
    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>>;

    /// Apply changed attributes and return the refreshed state.
    async fn update(&self, op: &Operation<'_>, prior: Value, planned: Value) -> Result<Value>;

    /// Delete the remote object.
    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()>;

    /// Bring an existing object under management from its identity string.
    async fn import(&self, op: &Operation<'_>, id: &str) -> Result<Option<Value>> {
        self.read(op, serde_json::json!({ "id": id })).await
    }
}

/// A read-only GitLab data source.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// The data source type name, e.g. `gitlab_project_labels`.
    fn type_name(&self) -> &'static str;

    /// The schema of configuration and result.
    fn schema(&self) -> Schema;

    /// Validate user configuration.
    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        validation::validate(&self.schema(), config)
    }

    /// Read the data.
    async fn read(&self, op: &Operation<'_>, config: Value) -> Result<Value>;
}

/// Parse raw state or configuration into an adapter's typed state.
pub fn parse_state<T: DeserializeOwned>(resource_type: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::Validation(format!("invalid {} state: {}", resource_type, e)))
}

/// Serialize typed state back into raw state.
pub fn to_state<T: Serialize>(state: &T) -> Result<Value> {
    Ok(serde_json::to_value(state)?)
}

/// The identity of a state, failing if the resource was never created.
pub fn require_id<'a>(resource_type: &str, id: &'a Option<String>) -> Result<&'a str> {
    match id.as_deref() {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(ProviderError::Validation(format!(
            "{} state has no id",
            resource_type
        ))),
    }
}

/// `Some(planned)` if the value differs from `prior`.
///
/// Updates send only these values, so attributes GitLab manages are never
/// reset by an unrelated change.
pub fn changed<T: PartialEq + Clone>(prior: &T, planned: &T) -> Option<T> {
    (prior != planned).then(|| planned.clone())
}

/// Like [`changed`] for optional attributes; clearing one sends an empty
/// value, which GitLab treats as "unset".
pub fn changed_opt<T>(prior: &Option<T>, planned: &Option<T>) -> Option<T>
where
    T: PartialEq + Clone + Default,
{
    changed(prior, planned).map(Option::unwrap_or_default)
}

/// Turn a remote NotFound into `Ok(None)`.
pub fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Treat deleting an already absent object as success.
pub fn ignore_not_found(result: Result<()>) -> Result<()> {
    found(result).map(|_| ())
}

/// The error for an object that vanished between create and read-back.
pub fn vanished_after_write(resource_type: &str, id: &str) -> ProviderError {
    ProviderError::NotFound(format!(
        "{} '{}' was not found right after it was written",
        resource_type, id
    ))
}

/// Poll `still_present` until it reports the object gone.
///
/// Returns [`ProviderError::DeletionPending`] naming `what` when the
/// configured deletion timeout elapses first. Cancellation of the operation
/// context aborts the wait.
pub async fn wait_for_deletion<F, Fut>(op: &Operation<'_>, what: &str, mut still_present: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + op.settings.deletion_timeout;
    let mut attempt = 1u32;
    loop {
        if !still_present().await? {
            debug!(what, attempt, "deletion observed");
            return Ok(());
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(ProviderError::DeletionPending(format!(
                "{} was still present after {:?}",
                what, op.settings.deletion_timeout
            )));
        }
        debug!(what, attempt, "waiting for deletion");
        let pause = op.settings.deletion_poll_interval.min(deadline - now);
        op.ctx.sleep(pause).await?;
        attempt += 1;
    }
}
