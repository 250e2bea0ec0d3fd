//! `gitlab_project_hook`: a webhook of a project.
//!
//! Version 0 stored the bare hook id as identity. Version 1 stores
//! `project:hook_id` and exposes the numeric id as `hook_id`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::models::{HookOptions, ProjectHook};
use crate::error::Result;
use crate::id::{build_two_part_id, parse_two_part_int_id};
use crate::resource::{
    changed, changed_opt, found, ignore_not_found, parse_state, require_id, to_state,
    vanished_after_write, Operation, Resource,
};
use crate::schema::{Attribute, Schema};
use crate::upgrade::{legacy_int, required_legacy_string, RawState, StateUpgrader};

const TYPE_NAME: &str = "gitlab_project_hook";

static UPGRADERS: [StateUpgrader; 1] = [StateUpgrader::new(0, upgrade_v0)];

/// Adapter for project webhooks.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectHookResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct HookState {
    id: Option<String>,
    project: String,
    hook_id: Option<i64>,
    url: String,
    token: Option<String>,
    #[serde(default = "super::default_true")]
    push_events: bool,
    push_events_branch_filter: Option<String>,
    issues_events: bool,
    merge_requests_events: bool,
    tag_push_events: bool,
    note_events: bool,
    pipeline_events: bool,
    releases_events: bool,
    #[serde(default = "super::default_true")]
    enable_ssl_verification: bool,
}

impl HookState {
    fn from_remote(project: &str, hook: ProjectHook, token: Option<String>) -> Self {
        Self {
            id: Some(build_two_part_id(project, &hook.id.to_string())),
            project: project.to_string(),
            hook_id: Some(hook.id),
            url: hook.url,
            token,
            push_events: hook.push_events,
            push_events_branch_filter: hook.push_events_branch_filter.filter(|f| !f.is_empty()),
            issues_events: hook.issues_events,
            merge_requests_events: hook.merge_requests_events,
            tag_push_events: hook.tag_push_events,
            note_events: hook.note_events,
            pipeline_events: hook.pipeline_events,
            releases_events: hook.releases_events,
            enable_ssl_verification: hook.enable_ssl_verification,
        }
    }

    fn create_options(&self) -> HookOptions {
        HookOptions {
            url: Some(self.url.clone()),
            token: self.token.clone(),
            push_events: Some(self.push_events),
            push_events_branch_filter: self.push_events_branch_filter.clone(),
            issues_events: Some(self.issues_events),
            merge_requests_events: Some(self.merge_requests_events),
            tag_push_events: Some(self.tag_push_events),
            note_events: Some(self.note_events),
            pipeline_events: Some(self.pipeline_events),
            releases_events: Some(self.releases_events),
            enable_ssl_verification: Some(self.enable_ssl_verification),
        }
    }

    fn update_options(&self, prior: &HookState) -> HookOptions {
        HookOptions {
            // The edit endpoint requires the url even when it is unchanged.
            url: Some(self.url.clone()),
            token: changed_opt(&prior.token, &self.token),
            push_events: changed(&prior.push_events, &self.push_events),
            push_events_branch_filter: changed_opt(
                &prior.push_events_branch_filter,
                &self.push_events_branch_filter,
            ),
            issues_events: changed(&prior.issues_events, &self.issues_events),
            merge_requests_events: changed(
                &prior.merge_requests_events,
                &self.merge_requests_events,
            ),
            tag_push_events: changed(&prior.tag_push_events, &self.tag_push_events),
            note_events: changed(&prior.note_events, &self.note_events),
            pipeline_events: changed(&prior.pipeline_events, &self.pipeline_events),
            releases_events: changed(&prior.releases_events, &self.releases_events),
            enable_ssl_verification: changed(
                &prior.enable_ssl_verification,
                &self.enable_ssl_verification,
            ),
        }
    }
}

fn upgrade_v0(mut state: RawState) -> Result<RawState> {
    let project = required_legacy_string(&state, "project")?;
    let hook_id = legacy_int(&state, "id")?;
    state.insert(
        "id".to_string(),
        Value::String(build_two_part_id(&project, &hook_id.to_string())),
    );
    state.insert("hook_id".to_string(), json!(hook_id));
    Ok(state)
}

async fn read_hook(op: &Operation<'_>, id: &str, token: Option<String>) -> Result<Option<HookState>> {
    let (project, hook_id) = parse_two_part_int_id(id)?;
    let hook = found(op.api.get_project_hook(op.ctx, &project, hook_id).await)?;
    Ok(hook.map(|hook| HookState::from_remote(&project, hook, token)))
}

#[async_trait]
impl Resource for ProjectHookResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let event = |description: &str| {
            Attribute::optional_bool()
                .with_default(json!(false))
                .with_description(description)
        };
        Schema::new(1)
            .with_description("A webhook of a GitLab project.")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("`project:hook_id`"),
            )
            .with_attribute(
                "project",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Id or full path of the project."),
            )
            .with_attribute("hook_id", Attribute::computed_int64())
            .with_attribute("url", Attribute::required_string())
            .with_attribute(
                "token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("Secret sent in X-Gitlab-Token. GitLab never returns it."),
            )
            .with_attribute(
                "push_events",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute("push_events_branch_filter", Attribute::optional_string())
            .with_attribute("issues_events", event("Trigger on issue events."))
            .with_attribute("merge_requests_events", event("Trigger on merge request events."))
            .with_attribute("tag_push_events", event("Trigger on tag pushes."))
            .with_attribute("note_events", event("Trigger on comments."))
            .with_attribute("pipeline_events", event("Trigger on pipeline status changes."))
            .with_attribute("releases_events", event("Trigger on releases."))
            .with_attribute(
                "enable_ssl_verification",
                Attribute::optional_bool().with_default(json!(true)),
            )
    }

    fn state_upgraders(&self) -> &'static [StateUpgrader] {
        &UPGRADERS
    }

    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value> {
        let planned: HookState = parse_state(TYPE_NAME, planned)?;
        let hook = op
            .api
            .create_project_hook(op.ctx, &planned.project, &planned.create_options())
            .await?;
        let id = build_two_part_id(&planned.project, &hook.id.to_string());
        debug!(%id, "project hook created");

        let state = read_hook(op, &id, planned.token)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, &id))?;
        to_state(&state)
    }

    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
        let state: HookState = parse_state(TYPE_NAME, state)?;
        let id = require_id(TYPE_NAME, &state.id)?;
        match read_hook(op, id, state.token.clone()).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, op: &Operation<'_>, prior: Value, planned: Value) -> Result<Value> {
        let prior: HookState = parse_state(TYPE_NAME, prior)?;
        let planned: HookState = parse_state(TYPE_NAME, planned)?;
        let id = require_id(TYPE_NAME, &prior.id)?;
        let (project, hook_id) = parse_two_part_int_id(id)?;

        op.api
            .update_project_hook(op.ctx, &project, hook_id, &planned.update_options(&prior))
            .await?;

        let state = read_hook(op, id, planned.token)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, id))?;
        to_state(&state)
    }

    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()> {
        let state: HookState = parse_state(TYPE_NAME, state)?;
        let (project, hook_id) = parse_two_part_int_id(require_id(TYPE_NAME, &state.id)?)?;
        ignore_not_found(op.api.delete_project_hook(op.ctx, &project, hook_id).await)
    }
}
