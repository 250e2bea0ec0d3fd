//! `gitlab_project_labels`: every label of a project.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::collect_pages;
use crate::client::models::Label;
use crate::error::Result;
use crate::resource::{parse_state, DataSource, Operation};
use crate::schema::{Attribute, AttributeType, Schema};

const TYPE_NAME: &str = "gitlab_project_labels";

/// Lists the labels of a project.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectLabelsDataSource;

#[derive(Debug, Deserialize)]
struct Config {
    project: String,
}

#[derive(Debug, Serialize)]
struct LabelEntry {
    label_id: i64,
    name: String,
    color: String,
    description: Option<String>,
    priority: Option<i64>,
}

impl From<Label> for LabelEntry {
    fn from(label: Label) -> Self {
        Self {
            label_id: label.id,
            name: label.name,
            color: label.color,
            description: label.description.filter(|d| !d.is_empty()),
            priority: label.priority,
        }
    }
}

#[async_trait]
impl DataSource for ProjectLabelsDataSource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let entry = AttributeType::object([
            ("label_id", AttributeType::Int64),
            ("name", AttributeType::String),
            ("color", AttributeType::String),
            ("description", AttributeType::String),
            ("priority", AttributeType::Int64),
        ]);
        Schema::v0()
            .with_description("All labels of a GitLab project.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("project", Attribute::required_string())
            .with_attribute("labels", Attribute::computed_object_list(entry))
    }

    async fn read(&self, op: &Operation<'_>, config: Value) -> Result<Value> {
        let config: Config = parse_state(TYPE_NAME, config)?;
        let project = config.project.as_str();
        let labels = collect_pages(op.settings.per_page, |page| {
            op.api.list_labels(op.ctx, project, page)
        })
        .await?;
        debug!(project, count = labels.len(), "listed project labels");

        let labels: Vec<LabelEntry> = labels.into_iter().map(LabelEntry::from).collect();
        Ok(json!({
            "id": project,
            "project": project,
            "labels": labels,
        }))
    }
}
