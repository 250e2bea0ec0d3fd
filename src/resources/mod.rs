//! Managed GitLab resources.
//!
//! Identity shapes (all joined with `:`):
//!
//! | Resource | Identity | Split |
//! | --- | --- | --- |
//! | `gitlab_project_hook` | `project:hook_id` | first delimiter |
//! | `gitlab_project_variable` | `project:key:environment_scope` | first two delimiters |
//! | `gitlab_group_variable` | `group:key:environment_scope` | first two delimiters |
//! | `gitlab_deploy_token` | `project:<project>:<id>` or `group:<group>:<id>` | discriminator, then first delimiter |
//! | `gitlab_project_access_token` | `project:token_id` | first delimiter |
//! | `gitlab_group_access_token` | `group:token_id` | first delimiter |
//! | `gitlab_project_label` | `project:name` | first delimiter |
//! | `gitlab_branch_protection` | `project:branch` | first delimiter |
//! | `gitlab_release_link` | `project:tag_name:link_id` | last two delimiters |

use crate::id::ParentKind;
use crate::resource::Resource;

pub mod access_token;
pub mod branch_protection;
pub mod deploy_token;
pub mod project_hook;
pub mod project_label;
pub mod release_link;
pub mod variable;

pub use access_token::AccessTokenResource;
pub use branch_protection::BranchProtectionResource;
pub use deploy_token::DeployTokenResource;
pub use project_hook::ProjectHookResource;
pub use project_label::ProjectLabelResource;
pub use release_link::ReleaseLinkResource;
pub use variable::VariableResource;

/// Every resource this provider serves.
pub fn all() -> Vec<Box<dyn Resource>> {
    vec![
        Box::new(ProjectHookResource),
        Box::new(VariableResource::new(ParentKind::Project)),
        Box::new(VariableResource::new(ParentKind::Group)),
        Box::new(DeployTokenResource),
        Box::new(AccessTokenResource::new(ParentKind::Project)),
        Box::new(AccessTokenResource::new(ParentKind::Group)),
        Box::new(ProjectLabelResource),
        Box::new(BranchProtectionResource),
        Box::new(ReleaseLinkResource),
    ]
}

pub(crate) fn default_true() -> bool {
    true
}
