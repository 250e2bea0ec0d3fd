//! `gitlab_project_hooks`: every webhook of a project.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::collect_pages;
use crate::client::models::ProjectHook;
use crate::error::Result;
use crate::resource::{parse_state, DataSource, Operation};
use crate::schema::{Attribute, AttributeType, Schema};

const TYPE_NAME: &str = "gitlab_project_hooks";

/// Lists the hooks of a project.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectHooksDataSource;

#[derive(Debug, Deserialize)]
struct Config {
    project: String,
}

#[derive(Debug, Serialize)]
struct HookEntry {
    hook_id: i64,
    url: String,
    push_events: bool,
    push_events_branch_filter: Option<String>,
    issues_events: bool,
    merge_requests_events: bool,
    tag_push_events: bool,
    note_events: bool,
    pipeline_events: bool,
    releases_events: bool,
    enable_ssl_verification: bool,
}

impl From<ProjectHook> for HookEntry {
    fn from(hook: ProjectHook) -> Self {
        Self {
            hook_id: hook.id,
            url: hook.url,
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
}

#[async_trait]
impl DataSource for ProjectHooksDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let entry = AttributeType::object([
            ("hook_id", AttributeType::Int64),
            ("url", AttributeType::String),
            ("push_events", AttributeType::Bool),
            ("push_events_branch_filter", AttributeType::String),
            ("issues_events", AttributeType::Bool),
            ("merge_requests_events", AttributeType::Bool),
            ("tag_push_events", AttributeType::Bool),
            ("note_events", AttributeType::Bool),
            ("pipeline_events", AttributeType::Bool),
            ("releases_events", AttributeType::Bool),
            ("enable_ssl_verification", AttributeType::Bool),
        ]);
        Schema::v0()
            .with_description("All webhooks of a GitLab project.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "project",
                Attribute::required_string().with_description("Numeric id or full path."),
            )
            .with_attribute("hooks", Attribute::computed_object_list(entry))
    }

    async fn read(&self, op: &Operation<'_>, config: Value) -> Result<Value> {
        let config: Config = parse_state(TYPE_NAME, config)?;
        let project = config.project.as_str();
        let hooks = collect_pages(op.settings.per_page, |page| {
            op.api.list_project_hooks(op.ctx, project, page)
        })
        .await?;
        debug!(project, count = hooks.len(), "listed project hooks");

        let hooks: Vec<HookEntry> = hooks.into_iter().map(HookEntry::from).collect();
        Ok(json!({
            "id": project,
            "project": project,
            "hooks": hooks,
        }))
    }
}
