//! The table of resources and data sources the provider serves.
//!
//! The table is built once at startup and never mutated. [`RegistryBuilder::build`]
//! checks it for consistency, so a broken table fails the provider launch
//! rather than a later operation.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::resource::{DataSource, Resource};
use crate::schema::{ProviderSchema, Schema};
use crate::{data_sources, resources};

/// Every served type name starts with this.
pub const TYPE_PREFIX: &str = "gitlab_";

/// Validated name to adapter table.
pub struct Registry {
    resources: BTreeMap<&'static str, Box<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSource>>,
}

impl Registry {
    /// Start an empty table.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The table of every GitLab resource and data source.
    pub fn gitlab() -> Result<Self> {
        resources::all()
            .into_iter()
            .fold(Self::builder(), RegistryBuilder::resource)
            .data_sources(data_sources::all())
            .build()
    }

    /// Look up a resource adapter.
    pub fn resource(&self, name: &str) -> Result<&dyn Resource> {
        self.resources
            .get(name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(name.to_string()))
    }

    /// Look up a data source adapter.
    pub fn data_source(&self, name: &str) -> Result<&dyn DataSource> {
        self.data_sources
            .get(name)
            .map(|d| d.as_ref())
            .ok_or_else(|| ProviderError::UnknownResource(format!("data source {}", name)))
    }

    /// Resource type names, sorted.
    pub fn resource_names(&self) -> Vec<String> {
        self.resources.keys().map(|k| k.to_string()).collect()
    }

    /// Data source type names, sorted.
    pub fn data_source_names(&self) -> Vec<String> {
        self.data_sources.keys().map(|k| k.to_string()).collect()
    }

    /// The provider schema with `provider` as the provider block.
    pub fn schema(&self, provider: Schema) -> ProviderSchema {
        let schema = ProviderSchema::new().with_provider_config(provider);
        let schema = self
            .resources
            .iter()
            .fold(schema, |s, (name, r)| s.with_resource(*name, r.schema()));
        self.data_sources
            .iter()
            .fold(schema, |s, (name, d)| s.with_data_source(*name, d.schema()))
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Collects adapters for a [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    resources: Vec<Box<dyn Resource>>,
    data_sources: Vec<Box<dyn DataSource>>,
}

impl RegistryBuilder {
    /// Add a resource adapter.
    pub fn resource(mut self, resource: Box<dyn Resource>) -> Self {
        self.resources.push(resource);
        self
    }

    /// Add a data source adapter.
    pub fn data_source(mut self, data_source: Box<dyn DataSource>) -> Self {
        self.data_sources.push(data_source);
        self
    }

    /// Add several data source adapters.
    pub fn data_sources(mut self, data_sources: Vec<Box<dyn DataSource>>) -> Self {
        self.data_sources.extend(data_sources);
        self
    }

    /// Validate and freeze the table.
    ///
    /// Fails with [`ProviderError::Registration`] on a duplicate name, a name
    /// outside the `gitlab_` namespace, or a resource whose schema version has
    /// no upgrader for some older version.
    pub fn build(self) -> Result<Registry> {
        let mut resources = BTreeMap::new();
        for resource in self.resources {
            let name = resource.type_name();
            check_name("resource", name)?;
            check_upgraders(resource.as_ref())?;
            if resources.insert(name, resource).is_some() {
                return Err(ProviderError::Registration(format!(
                    "resource {} is registered twice",
                    name
                )));
            }
        }

        let mut data_sources = BTreeMap::new();
        for data_source in self.data_sources {
            let name = data_source.type_name();
            check_name("data source", name)?;
            if data_sources.insert(name, data_source).is_some() {
                return Err(ProviderError::Registration(format!(
                    "data source {} is registered twice",
                    name
                )));
            }
        }

        debug!(
            resources = resources.len(),
            data_sources = data_sources.len(),
            "registry built"
        );
        Ok(Registry {
            resources,
            data_sources,
        })
    }
}

fn check_name(what: &str, name: &str) -> Result<()> {
    let suffix = name.strip_prefix(TYPE_PREFIX).unwrap_or_default();
    let well_formed = !suffix.is_empty()
        && suffix
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if well_formed {
        Ok(())
    } else {
        Err(ProviderError::Registration(format!(
            "{} name '{}' must be '{}' followed by lowercase letters, digits or '_'",
            what, name, TYPE_PREFIX
        )))
    }
}

fn check_upgraders(resource: &dyn Resource) -> Result<()> {
    let version = resource.schema().version;
    let upgraders = resource.state_upgraders();
    for v in 0..version {
        let count = upgraders.iter().filter(|u| u.version == v).count();
        if count != 1 {
            return Err(ProviderError::Registration(format!(
                "{} is at schema version {} but has {} upgraders for version {}",
                resource.type_name(),
                version,
                count,
                v
            )));
        }
    }
    if let Some(stray) = upgraders.iter().find(|u| u.version >= version) {
        return Err(ProviderError::Registration(format!(
            "{} has an upgrader for version {} but is only at version {}",
            resource.type_name(),
            stray.version,
            version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Operation;
    use crate::upgrade::{RawState, StateUpgrader};
    use async_trait::async_trait;
    use serde_json::Value;

    struct Fake {
        name: &'static str,
        version: u64,
        upgraders: &'static [StateUpgrader],
    }

    fn identity(state: RawState) -> Result<RawState> {
        Ok(state)
    }

    static ONE: [StateUpgrader; 1] = [StateUpgrader::new(0, identity)];

    #[async_trait]
    impl Resource for Fake {
        fn type_name(&self) -> &'static str {
            self.name
        }

        fn schema(&self) -> Schema {
            Schema::new(self.version)
        }

        fn state_upgraders(&self) -> &'static [StateUpgrader] {
            self.upgraders
        }

        async fn create(&self, _op: &Operation<'_>, planned: Value) -> Result<Value> {
            Ok(planned)
        }

        async fn read(&self, _op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
            Ok(Some(state))
        }

        async fn update(&self, _op: &Operation<'_>, _prior: Value, planned: Value) -> Result<Value> {
            Ok(planned)
        }

        async fn delete(&self, _op: &Operation<'_>, _state: Value) -> Result<()> {
            Ok(())
        }
    }

    fn fake(name: &'static str, version: u64, upgraders: &'static [StateUpgrader]) -> Box<dyn Resource> {
        Box::new(Fake {
            name,
            version,
            upgraders,
        })
    }

    #[test]
    fn test_gitlab_table_is_consistent() {
        let registry = Registry::gitlab().unwrap();
        assert_eq!(registry.resource_names().len(), 9);
        assert!(registry.resource("gitlab_project_hook").is_ok());
        assert!(registry.data_source("gitlab_project_labels").is_ok());
        assert!(matches!(
            registry.resource("gitlab_pipeline"),
            Err(ProviderError::UnknownResource(_))
        ));
    }

    #[test]
    fn test_rejects_duplicates() {
        let err = Registry::builder()
            .resource(fake("gitlab_thing", 0, &[]))
            .resource(fake("gitlab_thing", 0, &[]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ProviderError::Registration(_)));
    }

    #[test]
    fn test_rejects_bad_names() {
        for name in ["thing", "gitlab_", "gitlab_Thing", "github_thing"] {
            let result = Registry::builder().resource(fake(name, 0, &[])).build();
            assert!(result.is_err(), "{}", name);
        }
    }

    #[test]
    fn test_requires_upgrader_chain() {
        assert!(Registry::builder()
            .resource(fake("gitlab_thing", 1, &ONE))
            .build()
            .is_ok());
        assert!(Registry::builder()
            .resource(fake("gitlab_thing", 1, &[]))
            .build()
            .is_err());
        assert!(Registry::builder()
            .resource(fake("gitlab_thing", 0, &ONE))
            .build()
            .is_err());
    }

    #[test]
    fn test_schema_lists_everything() {
        let registry = Registry::gitlab().unwrap();
        let schema = registry.schema(Schema::v0());
        assert_eq!(schema.resources["gitlab_project_variable"].version, 1);
        assert_eq!(schema.resources["gitlab_branch_protection"].version, 0);
        assert!(schema.data_sources.contains_key("gitlab_group_variables"));
    }
}
