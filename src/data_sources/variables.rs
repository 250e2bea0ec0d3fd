//! `gitlab_project_variables` and `gitlab_group_variables`.
//!
//! An optional `environment_scope` narrows the result to one scope; the
//! match is exact, `*` only selects variables whose scope is `*`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::models::Variable;
use crate::client::{collect_pages, Owner};
use crate::error::{ProviderError, Result};
use crate::id::ParentKind;
use crate::resource::{parse_state, DataSource, Operation};
use crate::schema::{Attribute, AttributeType, Schema};

/// Lists the CI/CD variables of a project or group.
#[derive(Debug, Clone, Copy)]
pub struct VariablesDataSource {
    kind: ParentKind,
}

impl VariablesDataSource {
    /// The data source for variables of `kind`.
    pub fn new(kind: ParentKind) -> Self {
        Self { kind }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    project: Option<String>,
    group: Option<String>,
    environment_scope: Option<String>,
}

#[derive(Debug, Serialize)]
struct VariableEntry {
    key: String,
    value: String,
    variable_type: String,
    protected: bool,
    masked: bool,
    raw: bool,
    environment_scope: String,
    description: Option<String>,
}

impl From<Variable> for VariableEntry {
    fn from(v: Variable) -> Self {
        Self {
            key: v.key,
            value: v.value,
            variable_type: v.variable_type,
            protected: v.protected,
            masked: v.masked,
            raw: v.raw,
            environment_scope: v.environment_scope,
            description: v.description.filter(|d| !d.is_empty()),
        }
    }
}

#[async_trait]
impl DataSource for VariablesDataSource {
    fn type_name(&self) -> &'static str {
        match self.kind {
            ParentKind::Project => "gitlab_project_variables",
            ParentKind::Group => "gitlab_group_variables",
        }
    }

    fn schema(&self) -> Schema {
        let entry = AttributeType::object([
            ("key", AttributeType::String),
            ("value", AttributeType::String),
            ("variable_type", AttributeType::String),
            ("protected", AttributeType::Bool),
            ("masked", AttributeType::Bool),
            ("raw", AttributeType::Bool),
            ("environment_scope", AttributeType::String),
            ("description", AttributeType::String),
        ]);
        Schema::v0()
            .with_description(format!("All CI/CD variables of a GitLab {}.", self.kind))
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(self.kind.as_str(), Attribute::required_string())
            .with_attribute(
                "environment_scope",
                Attribute::optional_string().with_description("Only return variables of this scope."),
            )
            .with_attribute(
                "variables",
                Attribute::computed_object_list(entry).sensitive(),
            )
    }

    async fn read(&self, op: &Operation<'_>, config: Value) -> Result<Value> {
        let config: Config = parse_state(self.type_name(), config)?;
        let parent = match self.kind {
            ParentKind::Project => config.project,
            ParentKind::Group => config.group,
        }
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ProviderError::Validation(format!("{} requires '{}'", self.type_name(), self.kind))
        })?;
        let owner = Owner::new(self.kind, parent);

        let variables = collect_pages(op.settings.per_page, |page| {
            op.api.list_variables(op.ctx, &owner, page)
        })
        .await?;
        let scope = config.environment_scope.as_deref();
        let variables: Vec<VariableEntry> = variables
            .into_iter()
            .filter(|v| scope.map_or(true, |s| v.environment_scope == s))
            .map(VariableEntry::from)
            .collect();
        debug!(owner = %owner.id, kind = %self.kind, count = variables.len(), "listed variables");

        let mut result = json!({
            "id": owner.id,
            "environment_scope": scope,
            "variables": variables,
        });
        result[self.kind.as_str()] = json!(owner.id);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationSettings;
    use crate::context::Context;
    use crate::testing::MockGitLab;

    #[tokio::test]
    async fn test_scope_filter() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let owner = Owner::group("infra");
        api.seed_variable(&owner, "URL", "s", "staging");
        api.seed_variable(&owner, "URL", "p", "production");
        api.seed_variable(&owner, "TOKEN", "t", "*");
        api.seed_variable(&Owner::project("infra"), "OTHER", "x", "*");

        let source = VariablesDataSource::new(ParentKind::Group);
        let all = source.read(&op, json!({"group": "infra"})).await.unwrap();
        assert_eq!(all["variables"].as_array().unwrap().len(), 3);
        assert_eq!(all["group"], "infra");

        let production = source
            .read(&op, json!({"group": "infra", "environment_scope": "production"}))
            .await
            .unwrap();
        let entries = production["variables"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["value"], "p");
    }

    #[tokio::test]
    async fn test_requires_parent() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());

        let err = VariablesDataSource::new(ParentKind::Project)
            .read(&op, json!({"group": "infra"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Validation(_)));
    }

    #[test]
    fn test_schema_marks_values_sensitive() {
        let schema = VariablesDataSource::new(ParentKind::Project).schema();
        assert!(schema.attribute("variables").unwrap().flags.sensitive);
        assert!(schema.attribute("project").is_some());
    }
}
