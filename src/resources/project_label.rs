//! `gitlab_project_label`: a label of a project.
//!
//! Identity is `project:name`. Scoped labels such as `priority::high` carry
//! the delimiter themselves, so the name absorbs everything after the first
//! `:`. Renaming is an in-place update and rewrites the identity. Version 0
//! stored the bare label name as identity.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::models::{Label, LabelOptions};
use crate::error::Result;
use crate::id::{build_two_part_id, parse_two_part_id};
use crate::resource::{
    changed, changed_opt, found, ignore_not_found, parse_state, require_id, to_state,
    vanished_after_write, Operation, Resource,
};
use crate::schema::{Attribute, Schema};
use crate::upgrade::{legacy_string, required_legacy_string, RawState, StateUpgrader};

const TYPE_NAME: &str = "gitlab_project_label";

static UPGRADERS: [StateUpgrader; 1] = [StateUpgrader::new(0, upgrade_v0)];

/// Adapter for project labels.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectLabelResource;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct LabelState {
    id: Option<String>,
    project: String,
    name: String,
    color: String,
    description: Option<String>,
    priority: Option<i64>,
    label_id: Option<i64>,
}

impl LabelState {
    fn from_remote(project: &str, label: Label) -> Self {
        Self {
            id: Some(build_two_part_id(project, &label.name)),
            project: project.to_string(),
            name: label.name,
            color: label.color,
            description: label.description.filter(|d| !d.is_empty()),
            priority: label.priority,
            label_id: Some(label.id),
        }
    }
}

fn upgrade_v0(mut state: RawState) -> Result<RawState> {
    let project = required_legacy_string(&state, "project")?;
    let name = match legacy_string(&state, "id")? {
        Some(name) => name,
        None => required_legacy_string(&state, "name")?,
    };
    state.insert(
        "id".to_string(),
        Value::String(build_two_part_id(&project, &name)),
    );
    Ok(state)
}

async fn read_label(op: &Operation<'_>, id: &str) -> Result<Option<LabelState>> {
    let (project, name) = parse_two_part_id(id)?;
    let label = found(op.api.get_label(op.ctx, &project, &name).await)?;
    Ok(label.map(|l| LabelState::from_remote(&project, l)))
}

#[async_trait]
impl Resource for ProjectLabelResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(1)
            .with_description("A label of a GitLab project.")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("`project:name`"),
            )
            .with_attribute("project", Attribute::required_string().with_force_new())
            .with_attribute(
                "name",
                Attribute::required_string().with_description("Renaming updates in place."),
            )
            .with_attribute(
                "color",
                Attribute::required_string().with_description("`#RRGGBB` or a CSS color name."),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_attribute("priority", Attribute::optional_int64())
            .with_attribute("label_id", Attribute::computed_int64())
    }

    fn state_upgraders(&self) -> &'static [StateUpgrader] {
        &UPGRADERS
    }

    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value> {
        let planned: LabelState = parse_state(TYPE_NAME, planned)?;
        let opts = LabelOptions {
            name: Some(planned.name.clone()),
            new_name: None,
            color: Some(planned.color.clone()),
            description: planned.description.clone(),
            priority: planned.priority.map(Some),
        };
        let label = op.api.create_label(op.ctx, &planned.project, &opts).await?;
        let id = build_two_part_id(&planned.project, &label.name);
        debug!(%id, "label created");

        let state = read_label(op, &id)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, &id))?;
        to_state(&state)
    }

    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
        let state: LabelState = parse_state(TYPE_NAME, state)?;
        match read_label(op, require_id(TYPE_NAME, &state.id)?).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, op: &Operation<'_>, prior: Value, planned: Value) -> Result<Value> {
        let prior: LabelState = parse_state(TYPE_NAME, prior)?;
        let planned: LabelState = parse_state(TYPE_NAME, planned)?;
        let (project, name) = parse_two_part_id(require_id(TYPE_NAME, &prior.id)?)?;

        let opts = LabelOptions {
            name: None,
            new_name: changed(&prior.name, &planned.name),
            color: changed(&prior.color, &planned.color),
            description: changed_opt(&prior.description, &planned.description),
            priority: changed(&prior.priority, &planned.priority),
        };
        let label = op.api.update_label(op.ctx, &project, &name, &opts).await?;

        let id = build_two_part_id(&project, &label.name);
        let state = read_label(op, &id)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, &id))?;
        to_state(&state)
    }

    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()> {
        let state: LabelState = parse_state(TYPE_NAME, state)?;
        let (project, name) = parse_two_part_id(require_id(TYPE_NAME, &state.id)?)?;
        ignore_not_found(op.api.delete_label(op.ctx, &project, &name).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationSettings;
    use crate::context::Context;
    use crate::testing::MockGitLab;
    use crate::upgrade::upgrade_state;
    use serde_json::json;

    #[test]
    fn test_upgrade_v0_prefixes_project() {
        let upgraded = upgrade_state(
            TYPE_NAME,
            &UPGRADERS,
            0,
            1,
            json!({"id": "bug", "project": "foo/bar", "name": "bug", "color": "#ff0000"}),
        )
        .unwrap();
        assert_eq!(upgraded["id"], "foo/bar:bug");
        assert_eq!(upgraded["color"], "#ff0000");
    }

    #[tokio::test]
    async fn test_scoped_label_round_trip() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = ProjectLabelResource;

        let state = resource
            .create(
                &op,
                json!({"project": "foo/bar", "name": "priority::high", "color": "#d9534f"}),
            )
            .await
            .unwrap();
        assert_eq!(state["id"], "foo/bar:priority::high");

        let refreshed = resource.read(&op, state).await.unwrap().unwrap();
        assert_eq!(refreshed["name"], "priority::high");
        assert_eq!(refreshed["project"], "foo/bar");
    }

    #[tokio::test]
    async fn test_rename_rewrites_identity() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = ProjectLabelResource;

        let state = resource
            .create(&op, json!({"project": "99", "name": "bug", "color": "#ff0000", "priority": 1}))
            .await
            .unwrap();
        let mut planned = state.clone();
        planned["name"] = json!("defect");

        let updated = resource.update(&op, state.clone(), planned).await.unwrap();
        assert_eq!(updated["id"], "99:defect");
        assert_eq!(updated["priority"], 1);
        assert_eq!(updated["label_id"], state["label_id"]);
        assert_eq!(
            api.last_body("update_label").unwrap(),
            json!({"new_name": "defect"})
        );
        assert!(resource.read(&op, state).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clearing_priority_sends_null() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = ProjectLabelResource;

        let state = resource
            .create(&op, json!({"project": "99", "name": "bug", "color": "#ff0000", "priority": 1}))
            .await
            .unwrap();
        assert_eq!(state["priority"], 1);
        let mut planned = state.clone();
        planned["priority"] = Value::Null;

        let updated = resource.update(&op, state, planned).await.unwrap();
        assert_eq!(
            api.last_body("update_label").unwrap(),
            json!({"priority": null})
        );
        assert!(updated["priority"].is_null());

        let refreshed = resource.read(&op, updated).await.unwrap().unwrap();
        assert!(refreshed["priority"].is_null());
    }
}
