//! Read-only GitLab data sources.
//!
//! Each data source lists one collection and returns every item, following
//! GitLab's `X-Next-Page` cursor until the last page.

use crate::id::ParentKind;
use crate::resource::DataSource;

pub mod project_hooks;
pub mod project_labels;
pub mod variables;

pub use project_hooks::ProjectHooksDataSource;
pub use project_labels::ProjectLabelsDataSource;
pub use variables::VariablesDataSource;

/// Every data source this provider serves.
pub fn all() -> Vec<Box<dyn DataSource>> {
    vec![
        Box::new(ProjectHooksDataSource),
        Box::new(VariablesDataSource::new(ParentKind::Project)),
        Box::new(VariablesDataSource::new(ParentKind::Group)),
        Box::new(ProjectLabelsDataSource),
    ]
}
