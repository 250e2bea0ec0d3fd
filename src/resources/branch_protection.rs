//! `gitlab_branch_protection`: a protected branch rule.
//!
//! Identity is `project:branch`. Branch names may contain `:`, so decoding
//! splits on the first delimiter only. Access levels can only be set when the
//! rule is created; the two boolean flags update in place.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::models::{ProtectBranchOptions, ProtectedBranch};
use crate::error::Result;
use crate::id::{build_two_part_id, parse_two_part_id};
use crate::resource::{
    changed, found, ignore_not_found, parse_state, require_id, to_state, vanished_after_write,
    Operation, Resource,
};
use crate::schema::{Attribute, Schema};

const TYPE_NAME: &str = "gitlab_branch_protection";

/// Maintainer access, GitLab's default for both lists.
const MAINTAINER: i64 = 40;

fn default_access_level() -> i64 {
    MAINTAINER
}

/// Adapter for protected branches.
#[derive(Debug, Clone, Copy, Default)]
pub struct BranchProtectionResource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct BranchProtectionState {
    id: Option<String>,
    project: String,
    branch: String,
    push_access_level: i64,
    merge_access_level: i64,
    allow_force_push: bool,
    code_owner_approval_required: bool,
    branch_protection_id: Option<i64>,
}

impl Default for BranchProtectionState {
    fn default() -> Self {
        Self {
            id: None,
            project: String::new(),
            branch: String::new(),
            push_access_level: default_access_level(),
            merge_access_level: default_access_level(),
            allow_force_push: false,
            code_owner_approval_required: false,
            branch_protection_id: None,
        }
    }
}

impl BranchProtectionState {
    fn from_remote(project: &str, remote: ProtectedBranch) -> Self {
        Self {
            id: Some(build_two_part_id(project, &remote.name)),
            project: project.to_string(),
            push_access_level: remote.push_access_level().unwrap_or(0),
            merge_access_level: remote.merge_access_level().unwrap_or(0),
            allow_force_push: remote.allow_force_push,
            code_owner_approval_required: remote.code_owner_approval_required,
            branch_protection_id: Some(remote.id),
            branch: remote.name,
        }
    }
}

async fn read_rule(op: &Operation<'_>, id: &str) -> Result<Option<BranchProtectionState>> {
    let (project, branch) = parse_two_part_id(id)?;
    let remote = found(op.api.get_protected_branch(op.ctx, &project, &branch).await)?;
    Ok(remote.map(|r| BranchProtectionState::from_remote(&project, r)))
}

#[async_trait]
impl Resource for BranchProtectionResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Protection rule of a branch or wildcard pattern.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("project", Attribute::required_string().with_force_new())
            .with_attribute(
                "branch",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Branch name or wildcard such as `release/*`."),
            )
            .with_attribute(
                "push_access_level",
                Attribute::optional_int64()
                    .with_force_new()
                    .with_default(MAINTAINER.into())
                    .with_description("0 (no one), 30 (developers), 40 (maintainers) or 60 (admins)."),
            )
            .with_attribute(
                "merge_access_level",
                Attribute::optional_int64()
                    .with_force_new()
                    .with_default(MAINTAINER.into()),
            )
            .with_attribute(
                "allow_force_push",
                Attribute::optional_bool().with_default(false.into()),
            )
            .with_attribute(
                "code_owner_approval_required",
                Attribute::optional_bool().with_default(false.into()),
            )
            .with_attribute("branch_protection_id", Attribute::computed_int64())
    }

    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value> {
        let planned: BranchProtectionState = parse_state(TYPE_NAME, planned)?;
        let opts = ProtectBranchOptions {
            name: Some(planned.branch.clone()),
            push_access_level: Some(planned.push_access_level),
            merge_access_level: Some(planned.merge_access_level),
            allow_force_push: Some(planned.allow_force_push),
            code_owner_approval_required: Some(planned.code_owner_approval_required),
        };
        let rule = op.api.protect_branch(op.ctx, &planned.project, &opts).await?;
        let id = build_two_part_id(&planned.project, &rule.name);
        debug!(%id, "branch protected");

        let state = read_rule(op, &id)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, &id))?;
        to_state(&state)
    }

    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
        let state: BranchProtectionState = parse_state(TYPE_NAME, state)?;
        match read_rule(op, require_id(TYPE_NAME, &state.id)?).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, op: &Operation<'_>, prior: Value, planned: Value) -> Result<Value> {
        let prior: BranchProtectionState = parse_state(TYPE_NAME, prior)?;
        let planned: BranchProtectionState = parse_state(TYPE_NAME, planned)?;
        let id = require_id(TYPE_NAME, &prior.id)?;
        let (project, branch) = parse_two_part_id(id)?;

        let opts = ProtectBranchOptions {
            allow_force_push: changed(&prior.allow_force_push, &planned.allow_force_push),
            code_owner_approval_required: changed(
                &prior.code_owner_approval_required,
                &planned.code_owner_approval_required,
            ),
            ..Default::default()
        };
        op.api
            .update_protected_branch(op.ctx, &project, &branch, &opts)
            .await?;

        let state = read_rule(op, id)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, id))?;
        to_state(&state)
    }

    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()> {
        let state: BranchProtectionState = parse_state(TYPE_NAME, state)?;
        let (project, branch) = parse_two_part_id(require_id(TYPE_NAME, &state.id)?)?;
        ignore_not_found(op.api.unprotect_branch(op.ctx, &project, &branch).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationSettings;
    use crate::context::Context;
    use crate::testing::MockGitLab;
    use serde_json::json;

    #[tokio::test]
    async fn test_defaults_to_maintainer_levels() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = BranchProtectionResource;

        let state = resource
            .create(&op, json!({"project": "99", "branch": "main"}))
            .await
            .unwrap();
        assert_eq!(state["id"], "99:main");
        assert_eq!(state["push_access_level"], 40);
        assert_eq!(state["merge_access_level"], 40);
        assert_eq!(state["allow_force_push"], false);
    }

    #[tokio::test]
    async fn test_update_sends_only_flags() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = BranchProtectionResource;

        let state = resource
            .create(
                &op,
                json!({"project": "foo/bar", "branch": "release:2024", "push_access_level": 30}),
            )
            .await
            .unwrap();
        assert_eq!(state["id"], "foo/bar:release:2024");

        let mut planned = state.clone();
        planned["allow_force_push"] = json!(true);
        let updated = resource.update(&op, state, planned).await.unwrap();
        assert_eq!(updated["allow_force_push"], true);
        assert_eq!(updated["push_access_level"], 30);
        assert_eq!(
            api.last_body("update_protected_branch").unwrap(),
            json!({"allow_force_push": true})
        );
    }

    #[tokio::test]
    async fn test_unprotected_branch_reads_as_gone() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = BranchProtectionResource;

        let state = json!({"id": "99:feature"});
        assert!(resource.read(&op, state.clone()).await.unwrap().is_none());
        resource.delete(&op, state).await.unwrap();
    }
}
