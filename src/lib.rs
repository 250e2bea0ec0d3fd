//! Hemmer provider for GitLab.
//!
//! This crate exposes GitLab objects (webhooks, CI/CD variables, deploy and
//! access tokens, labels, protected branches and release links) as declarative
//! Hemmer resources, plus list data sources for the paginated collections.
//!
//! # Overview
//!
//! - **Identities**: every resource is persisted under one composite id such
//!   as `foo/bar:42`; [`id`] encodes and decodes them
//! - **State upgrades**: older persisted layouts are carried forward by the
//!   chain of upgraders in [`upgrade`]
//! - **Adapters**: [`resources`] and [`data_sources`] map schemas to remote
//!   calls through the [`client::GitLabApi`] seam
//! - **Provider**: [`GitLabProvider`] implements [`ProviderService`] on top of
//!   the validated [`registry::Registry`]
//!
//! # Quick Start
//!
//! ```no_run
//! use hemmer_provider_gitlab::{init_logging, GitLabProvider, ProviderService};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), hemmer_provider_gitlab::ProviderError> {
//! init_logging();
//! let provider = GitLabProvider::new()?;
//! provider
//!     .configure(json!({"base_url": "https://gitlab.example.com/api/v4"}))
//!     .await?;
//!
//! let state = provider
//!     .upgrade_resource_state("gitlab_project_hook", 0, json!({"project": "99", "id": "42"}))
//!     .await?;
//! assert_eq!(state["id"], "99:42");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod context;
pub mod data_sources;
pub mod error;
pub mod id;
pub mod logging;
pub mod plan;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod upgrade;
pub mod validation;

// Re-export main types at crate root
pub use client::{GitLabApi, GitLabClient};
pub use config::ProviderConfig;
pub use context::{CancelHandle, Context};
pub use error::{ProviderError, Result};
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::GitLabProvider;
pub use registry::Registry;
pub use resource::{DataSource, Resource};
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
