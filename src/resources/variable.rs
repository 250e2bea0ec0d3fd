//! `gitlab_project_variable` and `gitlab_group_variable`: CI/CD variables.
//!
//! A key may exist once per environment scope, so the scope is part of the
//! identity: `parent:key:environment_scope`. The parent and the key never
//! contain `:`, the scope absorbs any remaining delimiters. Version 0 used
//! `parent:key` and implied the scope from the `environment_scope` field.
//!
//! Changing the scope is an in-place update; the identity is recomputed from
//! what GitLab reports back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::models::{Variable, VariableOptions};
use crate::client::Owner;
use crate::error::{ProviderError, Result};
use crate::id::{build_three_part_id, parse_three_part_id, parse_two_part_id, ParentKind, SplitFrom};
use crate::resource::{
    changed, changed_opt, found, ignore_not_found, parse_state, require_id, to_state,
    vanished_after_write, Operation, Resource,
};
use crate::schema::{Attribute, Schema};
use crate::upgrade::{legacy_string, required_legacy_string, RawState, StateUpgrader};

const DEFAULT_SCOPE: &str = "*";

static UPGRADERS: [StateUpgrader; 1] = [StateUpgrader::new(0, upgrade_v0)];

/// Adapter for project or group CI/CD variables.
#[derive(Debug, Clone, Copy)]
pub struct VariableResource {
    kind: ParentKind,
}

impl VariableResource {
    /// The adapter for variables of `kind`.
    pub fn new(kind: ParentKind) -> Self {
        Self { kind }
    }

    fn owner_from_state(&self, state: &VariableState) -> Result<Owner> {
        let parent = match self.kind {
            ParentKind::Project => state.project.clone(),
            ParentKind::Group => state.group.clone(),
        };
        parent
            .filter(|p| !p.is_empty())
            .map(|p| Owner::new(self.kind, p))
            .ok_or_else(|| {
                ProviderError::Validation(format!(
                    "{} requires '{}'",
                    self.type_name(),
                    self.kind
                ))
            })
    }
}

/// Decoded `parent:key:environment_scope`.
struct VariableId {
    owner: Owner,
    key: String,
    environment_scope: String,
}

impl VariableId {
    fn decode(kind: ParentKind, id: &str) -> Result<Self> {
        let (parent, key, environment_scope) = parse_three_part_id(id, SplitFrom::Start)?;
        Ok(Self {
            owner: Owner::new(kind, parent),
            key,
            environment_scope,
        })
    }

    fn encode(owner: &Owner, key: &str, environment_scope: &str) -> String {
        build_three_part_id(&owner.id, key, environment_scope)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct VariableState {
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    key: String,
    value: String,
    variable_type: Option<String>,
    protected: bool,
    masked: bool,
    raw: bool,
    environment_scope: Option<String>,
    description: Option<String>,
}

impl VariableState {
    fn from_remote(owner: &Owner, variable: Variable) -> Self {
        let (project, group) = match owner.kind {
            ParentKind::Project => (Some(owner.id.clone()), None),
            ParentKind::Group => (None, Some(owner.id.clone())),
        };
        Self {
            id: Some(VariableId::encode(
                owner,
                &variable.key,
                &variable.environment_scope,
            )),
            project,
            group,
            key: variable.key,
            value: variable.value,
            variable_type: Some(variable.variable_type),
            protected: variable.protected,
            masked: variable.masked,
            raw: variable.raw,
            environment_scope: Some(variable.environment_scope),
            description: variable.description.filter(|d| !d.is_empty()),
        }
    }

    fn scope(&self) -> &str {
        self.environment_scope.as_deref().unwrap_or(DEFAULT_SCOPE)
    }

    fn create_options(&self) -> VariableOptions {
        VariableOptions {
            key: Some(self.key.clone()),
            value: Some(self.value.clone()),
            variable_type: self.variable_type.clone(),
            protected: Some(self.protected),
            masked: Some(self.masked),
            raw: Some(self.raw),
            environment_scope: Some(self.scope().to_string()),
            description: self.description.clone(),
        }
    }

    fn update_options(&self, prior: &VariableState) -> VariableOptions {
        VariableOptions {
            key: None,
            value: changed(&prior.value, &self.value),
            variable_type: changed_opt(&prior.variable_type, &self.variable_type),
            protected: changed(&prior.protected, &self.protected),
            masked: changed(&prior.masked, &self.masked),
            raw: changed(&prior.raw, &self.raw),
            environment_scope: changed(&prior.scope(), &self.scope()).map(str::to_string),
            description: changed_opt(&prior.description, &self.description),
        }
    }
}

fn upgrade_v0(mut state: RawState) -> Result<RawState> {
    let id = required_legacy_string(&state, "id")?;
    let (parent, key) = parse_two_part_id(&id)?;
    let scope = legacy_string(&state, "environment_scope")?.unwrap_or_else(|| DEFAULT_SCOPE.to_string());
    state.insert(
        "id".to_string(),
        Value::String(build_three_part_id(&parent, &key, &scope)),
    );
    state.insert("environment_scope".to_string(), Value::String(scope));
    Ok(state)
}

async fn read_variable(op: &Operation<'_>, id: &VariableId) -> Result<Option<VariableState>> {
    let variable = found(
        op.api
            .get_variable(op.ctx, &id.owner, &id.key, &id.environment_scope)
            .await,
    )?;
    Ok(variable.map(|v| VariableState::from_remote(&id.owner, v)))
}

#[async_trait]
impl Resource for VariableResource {
    fn type_name(&self) -> &'static str {
        match self.kind {
            ParentKind::Project => "gitlab_project_variable",
            ParentKind::Group => "gitlab_group_variable",
        }
    }

    fn schema(&self) -> Schema {
        Schema::new(1)
            .with_description(format!("A CI/CD variable of a GitLab {}.", self.kind))
            .with_attribute(
                "id",
                Attribute::computed_string()
                    .with_description(format!("`{}:key:environment_scope`", self.kind)),
            )
            .with_attribute(
                self.kind.as_str(),
                Attribute::required_string()
                    .with_force_new()
                    .with_description(format!("Id or full path of the {}.", self.kind)),
            )
            .with_attribute("key", Attribute::required_string().with_force_new())
            .with_attribute("value", Attribute::required_string().sensitive())
            .with_attribute(
                "variable_type",
                Attribute::optional_string()
                    .with_default(json!("env_var"))
                    .with_description("`env_var` or `file`."),
            )
            .with_attribute("protected", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute("masked", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute("raw", Attribute::optional_bool().with_default(json!(false)))
            .with_attribute(
                "environment_scope",
                Attribute::optional_string().with_default(json!(DEFAULT_SCOPE)),
            )
            .with_attribute("description", Attribute::optional_string())
    }

    fn state_upgraders(&self) -> &'static [StateUpgrader] {
        &UPGRADERS
    }

    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value> {
        let planned: VariableState = parse_state(self.type_name(), planned)?;
        let owner = self.owner_from_state(&planned)?;
        let variable = op
            .api
            .create_variable(op.ctx, &owner, &planned.create_options())
            .await?;
        let id = VariableId::encode(&owner, &variable.key, &variable.environment_scope);
        debug!(%id, kind = %self.kind, "variable created");

        let state = read_variable(op, &VariableId::decode(self.kind, &id)?)
            .await?
            .ok_or_else(|| vanished_after_write(self.type_name(), &id))?;
        to_state(&state)
    }

    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
        let state: VariableState = parse_state(self.type_name(), state)?;
        let id = VariableId::decode(self.kind, require_id(self.type_name(), &state.id)?)?;
        match read_variable(op, &id).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, op: &Operation<'_>, prior: Value, planned: Value) -> Result<Value> {
        let prior: VariableState = parse_state(self.type_name(), prior)?;
        let planned: VariableState = parse_state(self.type_name(), planned)?;
        let id = VariableId::decode(self.kind, require_id(self.type_name(), &prior.id)?)?;

        let variable = op
            .api
            .update_variable(
                op.ctx,
                &id.owner,
                &id.key,
                &id.environment_scope,
                &planned.update_options(&prior),
            )
            .await?;

        // The scope may have moved, so the identity is rebuilt from the response.
        let new_id = VariableId {
            owner: id.owner,
            key: variable.key,
            environment_scope: variable.environment_scope,
        };
        let state = read_variable(op, &new_id).await?.ok_or_else(|| {
            vanished_after_write(
                self.type_name(),
                &VariableId::encode(&new_id.owner, &new_id.key, &new_id.environment_scope),
            )
        })?;
        to_state(&state)
    }

    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()> {
        let state: VariableState = parse_state(self.type_name(), state)?;
        let id = VariableId::decode(self.kind, require_id(self.type_name(), &state.id)?)?;
        ignore_not_found(
            op.api
                .delete_variable(op.ctx, &id.owner, &id.key, &id.environment_scope)
                .await,
        )
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
        upgrade_state("gitlab_project_variable", &UPGRADERS, 0, 1, state)
    }

    #[test]
    fn test_upgrade_v0_appends_scope() {
        let upgraded = upgrade(json!({
            "id": "foo/bar:DEPLOY_KEY",
            "project": "foo/bar",
            "environment_scope": "review/*"
        }))
        .unwrap();
        assert_eq!(upgraded["id"], "foo/bar:DEPLOY_KEY:review/*");

        let upgraded = upgrade(json!({"id": "99:TOKEN", "project": "99"})).unwrap();
        assert_eq!(upgraded["id"], "99:TOKEN:*");
        assert_eq!(upgraded["environment_scope"], "*");
    }

    #[test]
    fn test_upgrade_v0_rejects_bare_key() {
        let err = upgrade(json!({"id": "TOKEN"})).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedIdentifier { .. }));
    }

    #[test]
    fn test_identity_scope_absorbs_delimiters() {
        let id = VariableId::decode(ParentKind::Group, "foo:KEY:env:prod").unwrap();
        assert_eq!(id.owner, Owner::group("foo"));
        assert_eq!(id.key, "KEY");
        assert_eq!(id.environment_scope, "env:prod");
    }

    #[test]
    fn test_schema_uses_parent_field() {
        let schema = VariableResource::new(ParentKind::Group).schema();
        assert!(schema.attribute("group").is_some());
        assert!(schema.attribute("project").is_none());
        assert!(schema.attribute("value").unwrap().flags.sensitive);
    }

    #[tokio::test]
    async fn test_scope_change_recomputes_identity() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = VariableResource::new(ParentKind::Project);

        let state = resource
            .create(&op, json!({"project": "99", "key": "TOKEN", "value": "abc"}))
            .await
            .unwrap();
        assert_eq!(state["id"], "99:TOKEN:*");
        assert_eq!(state["variable_type"], "env_var");
        assert!(state.get("group").is_none());

        let mut planned = state.clone();
        planned["environment_scope"] = json!("production");
        let updated = resource.update(&op, state.clone(), planned).await.unwrap();
        assert_eq!(updated["id"], "99:TOKEN:production");
        assert_eq!(
            api.last_body("update_variable").unwrap(),
            json!({"environment_scope": "production"})
        );

        // The old identity is gone.
        assert!(resource.read(&op, state).await.unwrap().is_none());
        assert!(resource.read(&op, updated).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_same_key_in_two_scopes() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = VariableResource::new(ParentKind::Group);

        let staging = resource
            .create(
                &op,
                json!({"group": "infra", "key": "URL", "value": "s", "environment_scope": "staging"}),
            )
            .await
            .unwrap();
        let production = resource
            .create(
                &op,
                json!({"group": "infra", "key": "URL", "value": "p", "environment_scope": "production"}),
            )
            .await
            .unwrap();
        assert_ne!(staging["id"], production["id"]);

        resource.delete(&op, staging.clone()).await.unwrap();
        assert!(resource.read(&op, staging).await.unwrap().is_none());
        let production = resource.read(&op, production).await.unwrap().unwrap();
        assert_eq!(production["value"], "p");
    }
}
