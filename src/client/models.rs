//! Wire models of the GitLab REST API.
//!
//! Response types deserialize leniently (`#[serde(default)]`) since GitLab
//! omits fields depending on version and tier. Option types used as request
//! bodies skip `None` fields so partial updates never reset server-side values.

use serde::{Deserialize, Serialize};

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
}

/// A project webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectHook {
    pub id: i64,
    #[serde(default)]
    pub project_id: i64,
    pub url: String,
    #[serde(default)]
    pub push_events: bool,
    #[serde(default)]
    pub push_events_branch_filter: Option<String>,
    #[serde(default)]
    pub issues_events: bool,
    #[serde(default)]
    pub merge_requests_events: bool,
    #[serde(default)]
    pub tag_push_events: bool,
    #[serde(default)]
    pub note_events: bool,
    #[serde(default)]
    pub pipeline_events: bool,
    #[serde(default)]
    pub releases_events: bool,
    #[serde(default)]
    pub enable_ssl_verification: bool,
}

/// Create/update payload for a project webhook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HookOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_events_branch_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issues_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_requests_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_push_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub releases_events: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_ssl_verification: Option<bool>,
}

fn default_variable_type() -> String {
    "env_var".to_string()
}

fn default_environment_scope() -> String {
    "*".to_string()
}

/// A CI/CD variable of a project or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_variable_type")]
    pub variable_type: String,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub masked: bool,
    #[serde(default)]
    pub raw: bool,
    #[serde(default = "default_environment_scope")]
    pub environment_scope: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Create/update payload for a CI/CD variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariableOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub masked: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment_scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A deploy token of a project or group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployToken {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub expired: bool,
    /// Only present in the create response.
    #[serde(default)]
    pub token: Option<String>,
}

/// Create payload for a deploy token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeployTokenOptions {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    pub scopes: Vec<String>,
}

/// A project or group access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expires_at: Option<String>,
    #[serde(default)]
    pub access_level: Option<i64>,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Only present in the create response.
    #[serde(default)]
    pub token: Option<String>,
}

/// Create payload for an access token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AccessTokenOptions {
    pub name: String,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_level: Option<i64>,
}

/// A project label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
}

/// Create/update payload for a label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LabelOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `Some(None)` sends `null`, which removes the priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Option<i64>>,
}

/// One entry of a protected branch access list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchAccessLevel {
    pub access_level: i64,
    #[serde(default)]
    pub access_level_description: Option<String>,
}

/// A protected branch rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranch {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub push_access_levels: Vec<BranchAccessLevel>,
    #[serde(default)]
    pub merge_access_levels: Vec<BranchAccessLevel>,
    #[serde(default)]
    pub allow_force_push: bool,
    #[serde(default)]
    pub code_owner_approval_required: bool,
}

impl ProtectedBranch {
    /// The highest-privilege push level of the rule, GitLab lists one per role.
    pub fn push_access_level(&self) -> Option<i64> {
        self.push_access_levels.iter().map(|l| l.access_level).max()
    }

    /// The merge level of the rule.
    pub fn merge_access_level(&self) -> Option<i64> {
        self.merge_access_levels.iter().map(|l| l.access_level).max()
    }
}

/// Create/update payload for a protected branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProtectBranchOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_access_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge_access_level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_force_push: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_owner_approval_required: Option<bool>,
}

/// An asset link of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseLink {
    pub id: i64,
    pub name: String,
    pub url: String,
    #[serde(default = "default_link_type")]
    pub link_type: String,
    #[serde(default)]
    pub direct_asset_url: Option<String>,
}

fn default_link_type() -> String {
    "other".to_string()
}

/// Create/update payload for a release link.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseLinkOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direct_asset_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_variable_defaults() {
        let var: Variable = serde_json::from_value(json!({"key": "TOKEN"})).unwrap();
        assert_eq!(var.variable_type, "env_var");
        assert_eq!(var.environment_scope, "*");
        assert!(!var.masked);
    }

    #[test]
    fn test_options_skip_unset_fields() {
        let opts = HookOptions {
            push_events: Some(false),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&opts).unwrap(), json!({"push_events": false}));

        let opts = VariableOptions::default();
        assert_eq!(serde_json::to_value(&opts).unwrap(), json!({}));
    }

    #[test]
    fn test_protected_branch_levels() {
        let branch: ProtectedBranch = serde_json::from_value(json!({
            "name": "main",
            "push_access_levels": [{"access_level": 30}, {"access_level": 40}],
            "merge_access_levels": [{"access_level": 40, "access_level_description": "Maintainers"}]
        }))
        .unwrap();
        assert_eq!(branch.push_access_level(), Some(40));
        assert_eq!(branch.merge_access_level(), Some(40));
        assert!(!branch.allow_force_push);
    }
}
