//! `gitlab_deploy_token`: a deploy token of a project or a group.
//!
//! Identity is `project:<project>:<id>` or `group:<group>:<id>`. Version 0
//! stored the bare token id and left the owner to the mutually exclusive
//! `project` and `group` fields; its upgrader infers the discriminator from
//! whichever of the two is set.
//!
//! Deploy tokens cannot be edited. Every configurable attribute forces a
//! replacement, and the secret is only known from the create response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::models::{DeployToken, DeployTokenOptions};
use crate::client::Owner;
use crate::error::{ProviderError, Result};
use crate::id::{ParentKind, ScopedId};
use crate::resource::{
    found, ignore_not_found, parse_state, require_id, to_state, vanished_after_write, Operation,
    Resource,
};
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::upgrade::{legacy_int, legacy_string, RawState, StateUpgrader};
use crate::validation;

const TYPE_NAME: &str = "gitlab_deploy_token";

static UPGRADERS: [StateUpgrader; 1] = [StateUpgrader::new(0, upgrade_v0)];

/// Adapter for deploy tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployTokenResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct DeployTokenState {
    id: Option<String>,
    project: Option<String>,
    group: Option<String>,
    name: String,
    username: Option<String>,
    expires_at: Option<String>,
    scopes: Vec<String>,
    deploy_token_id: Option<i64>,
    token: Option<String>,
}

impl DeployTokenState {
    fn owner(&self) -> Result<Owner> {
        let project = self.project.as_deref().filter(|p| !p.is_empty());
        let group = self.group.as_deref().filter(|g| !g.is_empty());
        match (project, group) {
            (Some(project), None) => Ok(Owner::project(project)),
            (None, Some(group)) => Ok(Owner::group(group)),
            _ => Err(ProviderError::Validation(format!(
                "{} requires exactly one of 'project' or 'group'",
                TYPE_NAME
            ))),
        }
    }

    fn from_remote(id: &ScopedId, remote: DeployToken, token: Option<String>) -> Self {
        let (project, group) = match id.kind {
            ParentKind::Project => (Some(id.parent.clone()), None),
            ParentKind::Group => (None, Some(id.parent.clone())),
        };
        Self {
            id: Some(id.encode()),
            project,
            group,
            name: remote.name,
            username: Some(remote.username),
            expires_at: remote.expires_at,
            scopes: remote.scopes,
            deploy_token_id: Some(remote.id),
            token: remote.token.or(token),
        }
    }
}

fn upgrade_v0(mut state: RawState) -> Result<RawState> {
    let token_id = legacy_int(&state, "id")?;
    let project = legacy_string(&state, "project")?;
    let group = legacy_string(&state, "group")?;
    let id = match (project, group) {
        (Some(project), None) => ScopedId::new(ParentKind::Project, project, token_id),
        (None, Some(group)) => ScopedId::new(ParentKind::Group, group, token_id),
        (Some(project), Some(group)) => {
            return Err(ProviderError::AmbiguousLegacyState(format!(
                "deploy token {} has both project '{}' and group '{}'",
                token_id, project, group
            )))
        }
        (None, None) => {
            return Err(ProviderError::AmbiguousLegacyState(format!(
                "deploy token {} has neither 'project' nor 'group'",
                token_id
            )))
        }
    };
    state.insert("id".to_string(), Value::String(id.encode()));
    state.insert("deploy_token_id".to_string(), json!(token_id));
    Ok(state)
}

async fn read_token(op: &Operation<'_>, id: &ScopedId, token: Option<String>) -> Result<Option<DeployTokenState>> {
    let owner = Owner::new(id.kind, id.parent.as_str());
    let remote = found(op.api.get_deploy_token(op.ctx, &owner, id.id).await)?;
    // A revoked or expired token no longer grants access; treat it as gone.
    Ok(remote
        .filter(|t| !t.revoked && !t.expired)
        .map(|t| DeployTokenState::from_remote(id, t, token)))
}

#[async_trait]
impl Resource for DeployTokenResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(1)
            .with_description("A deploy token of a GitLab project or group.")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("`project:<project>:<id>` or `group:<group>:<id>`"),
            )
            .with_attribute(
                "project",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("Project owning the token. Conflicts with `group`."),
            )
            .with_attribute(
                "group",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("Group owning the token. Conflicts with `project`."),
            )
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "username",
                Attribute::optional_computed_string().with_force_new(),
            )
            .with_attribute(
                "expires_at",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("Expiry date, `YYYY-MM-DD`."),
            )
            .with_attribute(
                "scopes",
                Attribute::required_string_set()
                    .with_force_new()
                    .with_description("e.g. `read_repository`, `read_registry`."),
            )
            .with_attribute("deploy_token_id", Attribute::computed_int64())
            .with_attribute(
                "token",
                Attribute::computed_string()
                    .sensitive()
                    .with_description("The secret. Only known to the run that created the token."),
            )
    }

    fn state_upgraders(&self) -> &'static [StateUpgrader] {
        &UPGRADERS
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = validation::validate(&self.schema(), config);
        let set = |field: &str| config.get(field).is_some_and(|v| !v.is_null());
        if set("project") == set("group") {
            diagnostics.push(
                Diagnostic::error("Exactly one of 'project' or 'group' must be set")
                    .with_attribute("project"),
            );
        }
        diagnostics
    }

    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value> {
        let planned: DeployTokenState = parse_state(TYPE_NAME, planned)?;
        let owner = planned.owner()?;
        let opts = DeployTokenOptions {
            name: planned.name.clone(),
            username: planned.username.clone(),
            expires_at: planned.expires_at.clone(),
            scopes: planned.scopes.clone(),
        };
        let created = op.api.create_deploy_token(op.ctx, &owner, &opts).await?;
        let id = ScopedId::new(owner.kind, owner.id, created.id);
        debug!(id = %id, "deploy token created");

        let state = read_token(op, &id, created.token)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, &id.encode()))?;
        to_state(&state)
    }

    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
        let state: DeployTokenState = parse_state(TYPE_NAME, state)?;
        let id = ScopedId::decode(require_id(TYPE_NAME, &state.id)?)?;
        match read_token(op, &id, state.token).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, _op: &Operation<'_>, _prior: Value, _planned: Value) -> Result<Value> {
        Err(ProviderError::Validation(format!(
            "{} cannot be updated in place; every attribute forces a replacement",
            TYPE_NAME
        )))
    }

    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()> {
        let state: DeployTokenState = parse_state(TYPE_NAME, state)?;
        let id = ScopedId::decode(require_id(TYPE_NAME, &state.id)?)?;
        let owner = Owner::new(id.kind, id.parent);
        ignore_not_found(op.api.delete_deploy_token(op.ctx, &owner, id.id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationSettings;
    use crate::context::Context;
    use crate::testing::MockGitLab;
    use crate::upgrade::upgrade_state;

    fn upgrade(state: Value) -> Result<Value> {
        upgrade_state(TYPE_NAME, &UPGRADERS, 0, 1, state)
    }

    #[test]
    fn test_upgrade_v0_picks_group_discriminator() {
        let upgraded = upgrade(json!({"id": "7", "project": "", "group": "foo/bar"})).unwrap();
        assert_eq!(upgraded["id"], "group:foo/bar:7");
        assert_eq!(upgraded["deploy_token_id"], 7);
    }

    #[test]
    fn test_upgrade_v0_picks_project_discriminator() {
        let upgraded = upgrade(json!({"id": 7.0, "project": "foo/bar", "group": null})).unwrap();
        assert_eq!(upgraded["id"], "project:foo/bar:7");

        let from_string = upgrade(json!({"id": "7", "project": "foo/bar"})).unwrap();
        assert_eq!(upgraded["id"], from_string["id"]);
    }

    #[test]
    fn test_upgrade_v0_rejects_ambiguous_owner() {
        let both = upgrade(json!({"id": "7", "project": "a", "group": "b"})).unwrap_err();
        assert!(matches!(both, ProviderError::AmbiguousLegacyState(_)));

        let neither = upgrade(json!({"id": "7", "project": "", "group": ""})).unwrap_err();
        assert!(matches!(neither, ProviderError::AmbiguousLegacyState(_)));
        assert!(neither.to_string().contains("neither"));
    }

    #[test]
    fn test_validate_requires_one_owner() {
        let resource = DeployTokenResource;
        let ok = json!({"project": "99", "name": "ci", "scopes": ["read_repository"]});
        assert!(resource.validate(&ok).is_empty());

        let both = json!({"project": "99", "group": "g", "name": "ci", "scopes": ["read_repository"]});
        assert_eq!(resource.validate(&both).len(), 1);
    }

    #[tokio::test]
    async fn test_create_keeps_secret_across_reads() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = DeployTokenResource;

        let state = resource
            .create(
                &op,
                json!({"group": "infra", "name": "registry", "scopes": ["read_registry"]}),
            )
            .await
            .unwrap();
        let id = state["deploy_token_id"].as_i64().unwrap();
        assert_eq!(state["id"], format!("group:infra:{}", id));
        let secret = state["token"].as_str().unwrap().to_string();
        assert!(!secret.is_empty());

        let refreshed = resource.read(&op, state.clone()).await.unwrap().unwrap();
        assert_eq!(refreshed["token"], secret);

        assert!(resource.update(&op, state.clone(), state.clone()).await.is_err());

        resource.delete(&op, state.clone()).await.unwrap();
        assert!(resource.read(&op, state).await.unwrap().is_none());
    }
}
