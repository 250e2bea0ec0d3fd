//! The GitLab provider.
//!
//! [`GitLabProvider`] implements [`ProviderService`] on top of the resource
//! table in [`Registry`]. It is configured once; the client built during
//! configuration is shared read-only by every operation afterwards. Stopping
//! the provider cancels the context every operation runs in, so in-flight and
//! later remote calls fail with [`ProviderError::Cancelled`].

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::client::{GitLabApi, GitLabClient};
use crate::config::{OperationSettings, ProviderConfig};
use crate::context::{CancelHandle, Context};
use crate::error::{ProviderError, Result};
use crate::registry::Registry;
use crate::resource::Operation;
use crate::schema::{Diagnostic, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
use crate::upgrade::upgrade_state;
use crate::{plan, validation};

struct Configured {
    api: Arc<dyn GitLabApi>,
    settings: OperationSettings,
}

/// Serves GitLab resources and data sources.
pub struct GitLabProvider {
    registry: Registry,
    configured: OnceLock<Configured>,
    client: Option<Arc<dyn GitLabApi>>,
    cancel: CancelHandle,
}

impl GitLabProvider {
    /// A provider serving every GitLab resource.
    pub fn new() -> Result<Self> {
        Ok(Self::from_registry(Registry::gitlab()?))
    }

    /// A provider serving the given table.
    pub fn from_registry(registry: Registry) -> Self {
        Self {
            registry,
            configured: OnceLock::new(),
            client: None,
            cancel: CancelHandle::new(),
        }
    }

    /// Use `client` instead of building an HTTP client during configuration.
    pub fn with_client(mut self, client: Arc<dyn GitLabApi>) -> Self {
        self.client = Some(client);
        self
    }

    /// The resource table.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Whether [`configure`](ProviderService::configure) has succeeded.
    pub fn is_configured(&self) -> bool {
        self.configured.get().is_some()
    }

    /// The configured client and a context observing [`stop`](ProviderService::stop),
    /// bounded by the configured operation timeout.
    fn session(&self) -> Result<(&Configured, Context)> {
        let configured = self.configured.get().ok_or_else(|| {
            ProviderError::Configuration("the provider has not been configured".to_string())
        })?;
        let ctx = self
            .cancel
            .context()
            .with_timeout(configured.settings.operation_timeout);
        Ok((configured, ctx))
    }
}

impl std::fmt::Debug for GitLabProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabProvider")
            .field("registry", &self.registry)
            .field("configured", &self.is_configured())
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

fn logged<T>(operation: &str, resource_type: &str, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => info!(operation, resource_type, "operation succeeded"),
        Err(e) => error!(operation, resource_type, error = %e, "operation failed"),
    }
    result
}

#[async_trait]
impl ProviderService for GitLabProvider {
    fn schema(&self) -> ProviderSchema {
        self.registry.schema(ProviderConfig::schema())
    }

    fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.registry.resource_names(),
            data_sources: self.registry.data_source_names(),
            capabilities: ServerCapabilities { plan_destroy: true },
        }
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>> {
        Ok(validation::validate(&ProviderConfig::schema(), &config))
    }

    #[instrument(skip_all)]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>> {
        if self.is_configured() {
            return Err(ProviderError::Configuration(
                "the provider is already configured".to_string(),
            ));
        }
        let config = ProviderConfig::from_value(config)?;
        debug!(?config, "resolved provider configuration");

        let api: Arc<dyn GitLabApi> = match &self.client {
            Some(client) => client.clone(),
            None => Arc::new(GitLabClient::new(&config)?),
        };
        if config.early_auth_check {
            let ctx = self.cancel.context();
            let user = api.current_user(&ctx).await.map_err(|e| {
                error!(error = %e, "token check failed");
                e
            })?;
            info!(username = %user.username, "authenticated against GitLab");
        }

        let mut diagnostics = Vec::new();
        if config.insecure {
            warn!("TLS certificate verification is disabled");
            diagnostics.push(
                Diagnostic::warning("TLS certificate verification is disabled")
                    .with_attribute("insecure"),
            );
        }

        let configured = Configured {
            api,
            settings: config.operation_settings(),
        };
        self.configured.set(configured).map_err(|_| {
            ProviderError::Configuration("the provider is already configured".to_string())
        })?;
        info!(base_url = %config.base_url, "provider configured");
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<()> {
        info!("stopping provider, cancelling in-flight operations");
        self.cancel.cancel();
        Ok(())
    }

    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>> {
        Ok(self.registry.resource(resource_type)?.validate(&config))
    }

    #[instrument(skip(self, state))]
    async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value> {
        let resource = self.registry.resource(resource_type)?;
        let from = u64::try_from(version).map_err(|_| {
            ProviderError::Validation(format!(
                "{} state has invalid schema version {}",
                resource_type, version
            ))
        })?;
        let to = resource.schema().version;
        let result = upgrade_state(resource_type, resource.state_upgraders(), from, to, state);
        logged("upgrade", resource_type, result)
    }

    #[instrument(skip(self, prior_state, proposed_state, _config))]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult> {
        let resource = self.registry.resource(resource_type)?;
        let result = plan::plan(&resource.schema(), prior_state.as_ref(), &proposed_state);
        if let Ok(plan) = &result {
            debug!(
                changes = plan.changes.len(),
                requires_replace = plan.requires_replace,
                "planned"
            );
        }
        result
    }

    #[instrument(skip(self, planned_state))]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value> {
        let resource = self.registry.resource(resource_type)?;
        let (configured, ctx) = self.session()?;
        let op = Operation::new(configured.api.as_ref(), &ctx, configured.settings);
        logged("create", resource_type, resource.create(&op, planned_state).await)
    }

    #[instrument(skip(self, current_state))]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value> {
        let resource = self.registry.resource(resource_type)?;
        let (configured, ctx) = self.session()?;
        let op = Operation::new(configured.api.as_ref(), &ctx, configured.settings);
        let result = resource.read(&op, current_state).await.map(|state| {
            state.unwrap_or_else(|| {
                info!(resource_type, "resource no longer exists");
                Value::Null
            })
        });
        logged("read", resource_type, result)
    }

    #[instrument(skip(self, prior_state, planned_state))]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value> {
        let resource = self.registry.resource(resource_type)?;
        let (configured, ctx) = self.session()?;
        let op = Operation::new(configured.api.as_ref(), &ctx, configured.settings);
        logged(
            "update",
            resource_type,
            resource.update(&op, prior_state, planned_state).await,
        )
    }

    #[instrument(skip(self, current_state))]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<()> {
        let resource = self.registry.resource(resource_type)?;
        let (configured, ctx) = self.session()?;
        let op = Operation::new(configured.api.as_ref(), &ctx, configured.settings);
        logged("delete", resource_type, resource.delete(&op, current_state).await)
    }

    #[instrument(skip(self))]
    async fn import_resource(&self, resource_type: &str, id: &str) -> Result<Vec<ImportedResource>> {
        let resource = self.registry.resource(resource_type)?;
        let (configured, ctx) = self.session()?;
        let op = Operation::new(configured.api.as_ref(), &ctx, configured.settings);
        let result = resource.import(&op, id).await.and_then(|state| {
            state
                .map(|state| vec![ImportedResource::new(resource_type, state)])
                .ok_or_else(|| {
                    ProviderError::NotFound(format!("{} '{}' does not exist", resource_type, id))
                })
        });
        logged("import", resource_type, result)
    }

    async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>> {
        Ok(self.registry.data_source(data_source_type)?.validate(&config))
    }

    #[instrument(skip(self, config))]
    async fn read_data_source(&self, data_source_type: &str, config: Value) -> Result<Value> {
        let data_source = self.registry.data_source(data_source_type)?;
        let (configured, ctx) = self.session()?;
        let op = Operation::new(configured.api.as_ref(), &ctx, configured.settings);
        logged("read", data_source_type, data_source.read(&op, config).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGitLab;
    use serde_json::json;
    use std::time::Duration;

    fn provider(api: &Arc<MockGitLab>) -> GitLabProvider {
        GitLabProvider::new().unwrap().with_client(api.clone())
    }

    #[tokio::test]
    async fn test_configure_once() {
        let api = Arc::new(MockGitLab::new());
        let provider = provider(&api);
        assert!(provider.configure(json!({"token": "t"})).await.unwrap().is_empty());
        assert_eq!(api.call_count("current_user"), 1);

        let err = provider.configure(json!({"token": "t"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_configure_reports_bad_token() {
        let api = Arc::new(MockGitLab::new());
        api.fail_next("current_user", 401, "401 Unauthorized");
        let provider = provider(&api);

        let err = provider.configure(json!({"token": "t"})).await.unwrap_err();
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
        assert!(!provider.is_configured());
    }

    #[tokio::test]
    async fn test_skips_auth_check_and_warns_on_insecure() {
        let api = Arc::new(MockGitLab::new());
        let provider = provider(&api);
        let diagnostics = provider
            .configure(json!({"token": "t", "early_auth_check": false, "insecure": true}))
            .await
            .unwrap();
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
        assert_eq!(api.call_count("current_user"), 0);
    }

    #[tokio::test]
    async fn test_operations_require_configuration() {
        let api = Arc::new(MockGitLab::new());
        let provider = provider(&api);
        let err = provider
            .read("gitlab_project_hook", json!({"id": "99:1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_rejects_negative_version() {
        let api = Arc::new(MockGitLab::new());
        let err = provider(&api)
            .upgrade_resource_state("gitlab_project_hook", -1, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[tokio::test]
    async fn test_unknown_types() {
        let api = Arc::new(MockGitLab::new());
        let provider = provider(&api);
        provider.configure(json!({"token": "t"})).await.unwrap();

        assert!(matches!(
            provider.create("gitlab_pipeline", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
        assert!(matches!(
            provider.read_data_source("gitlab_pipelines", json!({})).await,
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_share_the_configured_deadline() {
        let api = Arc::new(MockGitLab::new().with_deletion_lag(1_000));
        let provider = provider(&api);
        provider
            .configure(json!({
                "token": "t",
                "operation_timeout_seconds": 2,
                "deletion_timeout_seconds": 300,
                "deletion_poll_interval_milliseconds": 500
            }))
            .await
            .unwrap();

        let (_, ctx) = provider.session().unwrap();
        let deadline = ctx.deadline().unwrap();
        assert!(deadline <= tokio::time::Instant::now() + Duration::from_secs(2));

        let state = provider
            .create(
                "gitlab_group_access_token",
                json!({"group": "infra", "name": "bot", "scopes": ["read_api"]}),
            )
            .await
            .unwrap();
        let err = provider
            .delete("gitlab_group_access_token", state)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::DeadlineExceeded(_)));
    }

    #[test]
    fn test_metadata_lists_every_type() {
        let api = Arc::new(MockGitLab::new());
        let metadata = provider(&api).metadata();
        assert!(metadata.resources.contains(&"gitlab_deploy_token".to_string()));
        assert!(metadata.data_sources.contains(&"gitlab_project_hooks".to_string()));
        assert!(metadata.capabilities.plan_destroy);
    }
}
