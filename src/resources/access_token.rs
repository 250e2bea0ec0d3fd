//! `gitlab_project_access_token` and `gitlab_group_access_token`.
//!
//! Identity is `parent:token_id`. Revocation is asynchronous on GitLab's
//! side: the token stays visible as active for a while after the revoke
//! call returns, so delete polls until the token is gone or reported
//! revoked.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::models::{AccessToken, AccessTokenOptions};
use crate::client::Owner;
use crate::error::{ProviderError, Result};
use crate::id::{build_two_part_id, parse_two_part_int_id, ParentKind};
use crate::resource::{
    found, ignore_not_found, parse_state, require_id, to_state, vanished_after_write,
    wait_for_deletion, Operation, Resource,
};
use crate::schema::{Attribute, Schema};

/// Adapter for project or group access tokens.
#[derive(Debug, Clone, Copy)]
pub struct AccessTokenResource {
    kind: ParentKind,
}

impl AccessTokenResource {
    /// The adapter for access tokens of `kind`.
    pub fn new(kind: ParentKind) -> Self {
        Self { kind }
    }

    fn decode(&self, id: &str) -> Result<(Owner, i64)> {
        let (parent, token_id) = parse_two_part_int_id(id)?;
        Ok((Owner::new(self.kind, parent), token_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct AccessTokenState {
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    group: Option<String>,
    name: String,
    scopes: Vec<String>,
    expires_at: Option<String>,
    access_level: Option<i64>,
    token_id: Option<i64>,
    token: Option<String>,
    active: bool,
    revoked: bool,
    user_id: Option<i64>,
}

impl AccessTokenState {
    fn from_remote(owner: &Owner, remote: AccessToken, token: Option<String>) -> Self {
        let (project, group) = match owner.kind {
            ParentKind::Project => (Some(owner.id.clone()), None),
            ParentKind::Group => (None, Some(owner.id.clone())),
        };
        Self {
            id: Some(build_two_part_id(&owner.id, &remote.id.to_string())),
            project,
            group,
            name: remote.name,
            scopes: remote.scopes,
            expires_at: remote.expires_at,
            access_level: remote.access_level,
            token_id: Some(remote.id),
            token: remote.token.or(token),
            active: remote.active,
            revoked: remote.revoked,
            user_id: remote.user_id,
        }
    }
}

fn is_live(token: &AccessToken) -> bool {
    token.active && !token.revoked
}

async fn read_token(
    op: &Operation<'_>,
    owner: &Owner,
    token_id: i64,
    token: Option<String>,
) -> Result<Option<AccessTokenState>> {
    let remote = found(op.api.get_access_token(op.ctx, owner, token_id).await)?;
    Ok(remote
        .filter(is_live)
        .map(|t| AccessTokenState::from_remote(owner, t, token)))
}

#[async_trait]
impl Resource for AccessTokenResource {
    fn type_name(&self) -> &'static str {
        match self.kind {
            ParentKind::Project => "gitlab_project_access_token",
            ParentKind::Group => "gitlab_group_access_token",
        }
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description(format!("An access token of a GitLab {}.", self.kind))
            .with_attribute(
                "id",
                Attribute::computed_string().with_description(format!("`{}:token_id`", self.kind)),
            )
            .with_attribute(
                self.kind.as_str(),
                Attribute::required_string().with_force_new(),
            )
            .with_attribute("name", Attribute::required_string().with_force_new())
            .with_attribute(
                "scopes",
                Attribute::required_string_set()
                    .with_force_new()
                    .with_description("e.g. `api`, `read_repository`."),
            )
            .with_attribute(
                "expires_at",
                Attribute::optional_computed_string()
                    .with_force_new()
                    .with_description("Expiry date, `YYYY-MM-DD`."),
            )
            .with_attribute(
                "access_level",
                Attribute::optional_computed_int64()
                    .with_force_new()
                    .with_description("Role of the bot user: 10, 20, 30, 40 or 50."),
            )
            .with_attribute("token_id", Attribute::computed_int64())
            .with_attribute("token", Attribute::computed_string().sensitive())
            .with_attribute("active", Attribute::computed_bool())
            .with_attribute("revoked", Attribute::computed_bool())
            .with_attribute("user_id", Attribute::computed_int64())
    }

    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value> {
        let planned: AccessTokenState = parse_state(self.type_name(), planned)?;
        let parent = match self.kind {
            ParentKind::Project => planned.project.clone(),
            ParentKind::Group => planned.group.clone(),
        }
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ProviderError::Validation(format!("{} requires '{}'", self.type_name(), self.kind))
        })?;
        let owner = Owner::new(self.kind, parent);

        let opts = AccessTokenOptions {
            name: planned.name.clone(),
            scopes: planned.scopes.clone(),
            expires_at: planned.expires_at.clone(),
            access_level: planned.access_level,
        };
        let created = op.api.create_access_token(op.ctx, &owner, &opts).await?;
        let id = build_two_part_id(&owner.id, &created.id.to_string());
        debug!(%id, kind = %self.kind, "access token created");

        let state = read_token(op, &owner, created.id, created.token)
            .await?
            .ok_or_else(|| vanished_after_write(self.type_name(), &id))?;
        to_state(&state)
    }

    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
        let state: AccessTokenState = parse_state(self.type_name(), state)?;
        let (owner, token_id) = self.decode(require_id(self.type_name(), &state.id)?)?;
        match read_token(op, &owner, token_id, state.token).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, _op: &Operation<'_>, _prior: Value, _planned: Value) -> Result<Value> {
        Err(ProviderError::Validation(format!(
            "{} cannot be updated in place; every attribute forces a replacement",
            self.type_name()
        )))
    }

    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()> {
        let state: AccessTokenState = parse_state(self.type_name(), state)?;
        let id = require_id(self.type_name(), &state.id)?;
        let (owner, token_id) = self.decode(id)?;

        ignore_not_found(op.api.revoke_access_token(op.ctx, &owner, token_id).await)?;

        let api = op.api;
        let ctx = op.ctx;
        let owner = &owner;
        wait_for_deletion(op, &format!("{} {}", self.type_name(), id), move || async move {
            found(api.get_access_token(ctx, owner, token_id).await)
                .map(|remote| remote.as_ref().is_some_and(is_live))
        })
        .await
    }
}
