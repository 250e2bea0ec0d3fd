//! Testing utilities for the GitLab provider.
//!
//! Two pieces live here:
//!
//! - [`MockGitLab`], an in-memory [`GitLabApi`] that records every call and
//!   can inject failures, so adapters are tested without a GitLab instance
//! - [`ProviderTester`], a harness that drives any [`ProviderService`] through
//!   the same lifecycle a host would
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use hemmer_provider_gitlab::provider::GitLabProvider;
//! use hemmer_provider_gitlab::testing::{MockGitLab, ProviderTester};
//! use serde_json::json;
//!
//! # tokio_test::block_on(async {
//! let api = Arc::new(MockGitLab::new());
//! let tester = ProviderTester::new(GitLabProvider::new().unwrap().with_client(api.clone()));
//! tester.configure(json!({"token": "glpat-test"})).await.unwrap();
//!
//! let state = tester
//!     .lifecycle_create("gitlab_project_label", json!({
//!         "project": "foo/bar",
//!         "name": "bug",
//!         "color": "#ff0000"
//!     }))
//!     .await
//!     .unwrap();
//! assert_eq!(state["id"], "foo/bar:bug");
//! assert_eq!(api.call_count("create_label"), 1);
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::client::http::error_for_status;
use crate::client::models::*;
use crate::client::{GitLabApi, Owner, Page, PageRequest};
use crate::context::Context;
use crate::error::{ProviderError, Result};
use crate::schema::{Diagnostic, DiagnosticSeverity, ProviderSchema};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};

// =========================================================================
// In-memory GitLab
// =========================================================================

/// One recorded API call.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// The [`GitLabApi`] method name, e.g. `update_variable`.
    pub method: &'static str,
    /// The serialized request payload, if the method sends one.
    pub body: Option<Value>,
}

#[derive(Debug)]
struct StoredAccessToken {
    owner: Owner,
    token: AccessToken,
    stale_reads: u32,
}

#[derive(Debug, Default)]
struct Store {
    last_id: i64,
    calls: Vec<Call>,
    failures: HashMap<String, VecDeque<(StatusCode, String)>>,
    hooks: Vec<(String, ProjectHook)>,
    variables: Vec<(Owner, Variable)>,
    deploy_tokens: Vec<(Owner, DeployToken)>,
    access_tokens: Vec<StoredAccessToken>,
    labels: Vec<(String, Label)>,
    branches: Vec<(String, ProtectedBranch)>,
    release_links: Vec<(String, String, ReleaseLink)>,
}

impl Store {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }
}

/// An in-memory GitLab.
///
/// Objects live in per-type tables keyed the way GitLab addresses them.
/// Ids are allocated from one counter, so they are unique across types.
/// Revoked access tokens keep reporting as active for
/// [`with_deletion_lag`](Self::with_deletion_lag) reads, like GitLab does while
/// revocation is processed.
#[derive(Debug, Default)]
pub struct MockGitLab {
    store: Mutex<Store>,
    deletion_lag: u32,
}

fn not_found(what: impl std::fmt::Display) -> ProviderError {
    error_for_status(
        StatusCode::NOT_FOUND,
        format!("{{\"message\":\"404 {} Not Found\"}}", what),
    )
}

fn bad_request(message: impl std::fmt::Display) -> ProviderError {
    error_for_status(
        StatusCode::BAD_REQUEST,
        format!("{{\"message\":\"{}\"}}", message),
    )
}

fn conflict(message: impl std::fmt::Display) -> ProviderError {
    error_for_status(
        StatusCode::CONFLICT,
        format!("{{\"message\":\"{}\"}}", message),
    )
}

fn body<T: Serialize>(opts: &T) -> Option<Value> {
    serde_json::to_value(opts).ok()
}

fn page_of<T: Clone>(items: Vec<T>, page: PageRequest) -> Page<T> {
    let per_page = page.per_page.max(1) as usize;
    let start = (page.page.max(1) as usize - 1) * per_page;
    let end = (start + per_page).min(items.len());
    let next_page = (end < items.len()).then_some(page.page + 1);
    Page {
        items: items.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
        next_page,
    }
}

impl MockGitLab {
    /// An empty GitLab.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep revoked access tokens visible as active for `reads` reads.
    pub fn with_deletion_lag(mut self, reads: u32) -> Self {
        self.deletion_lag = reads;
        self
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a call and apply any injected failure for it.
    fn begin(
        &self,
        ctx: &Context,
        method: &'static str,
        body: Option<Value>,
    ) -> Result<MutexGuard<'_, Store>> {
        ctx.check()?;
        let mut store = self.store();
        store.calls.push(Call { method, body });
        let injected = store
            .failures
            .get_mut(method)
            .and_then(VecDeque::pop_front);
        match injected {
            Some((status, message)) => Err(error_for_status(status, message)),
            None => Ok(store),
        }
    }

    /// Make the next call of `method` fail with an HTTP `status`.
    pub fn fail_next(&self, method: &str, status: u16, message: impl Into<String>) {
        let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        self.store()
            .failures
            .entry(method.to_string())
            .or_default()
            .push_back((status, message.into()));
    }

    /// Every call so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.store().calls.clone()
    }

    /// How often `method` was called.
    pub fn call_count(&self, method: &str) -> usize {
        self.store().calls.iter().filter(|c| c.method == method).count()
    }

    /// The payload of the most recent call of `method`.
    pub fn last_body(&self, method: &str) -> Option<Value> {
        self.store()
            .calls
            .iter()
            .rev()
            .find(|c| c.method == method)
            .and_then(|c| c.body.clone())
    }

    /// Add a hook without recording a call.
    pub fn seed_project_hook(&self, project: &str, url: &str) -> ProjectHook {
        let mut store = self.store();
        let hook = ProjectHook {
            id: store.next_id(),
            project_id: 0,
            url: url.to_string(),
            push_events: true,
            push_events_branch_filter: None,
            issues_events: false,
            merge_requests_events: false,
            tag_push_events: false,
            note_events: false,
            pipeline_events: false,
            releases_events: false,
            enable_ssl_verification: true,
        };
        store.hooks.push((project.to_string(), hook.clone()));
        hook
    }

    /// Add a variable without recording a call.
    pub fn seed_variable(&self, owner: &Owner, key: &str, value: &str, environment_scope: &str) {
        let variable = Variable {
            key: key.to_string(),
            value: value.to_string(),
            variable_type: "env_var".to_string(),
            protected: false,
            masked: false,
            raw: false,
            environment_scope: environment_scope.to_string(),
            description: None,
        };
        self.store().variables.push((owner.clone(), variable));
    }

    /// Add a label without recording a call.
    pub fn seed_label(&self, project: &str, name: &str, color: &str) -> Label {
        let mut store = self.store();
        let label = Label {
            id: store.next_id(),
            name: name.to_string(),
            color: color.to_string(),
            description: None,
            priority: None,
        };
        store.labels.push((project.to_string(), label.clone()));
        label
    }
}

fn apply_hook(hook: &mut ProjectHook, opts: &HookOptions) {
    if let Some(url) = &opts.url {
        hook.url = url.clone();
    }
    if let Some(filter) = &opts.push_events_branch_filter {
        hook.push_events_branch_filter = Some(filter.clone()).filter(|f| !f.is_empty());
    }
    let flags = [
        (&mut hook.push_events, opts.push_events),
        (&mut hook.issues_events, opts.issues_events),
        (&mut hook.merge_requests_events, opts.merge_requests_events),
        (&mut hook.tag_push_events, opts.tag_push_events),
        (&mut hook.note_events, opts.note_events),
        (&mut hook.pipeline_events, opts.pipeline_events),
        (&mut hook.releases_events, opts.releases_events),
        (&mut hook.enable_ssl_verification, opts.enable_ssl_verification),
    ];
    for (flag, value) in flags {
        if let Some(value) = value {
            *flag = value;
        }
    }
}

fn apply_variable(variable: &mut Variable, opts: &VariableOptions) {
    if let Some(value) = &opts.value {
        variable.value = value.clone();
    }
    if let Some(variable_type) = &opts.variable_type {
        variable.variable_type = variable_type.clone();
    }
    if let Some(protected) = opts.protected {
        variable.protected = protected;
    }
    if let Some(masked) = opts.masked {
        variable.masked = masked;
    }
    if let Some(raw) = opts.raw {
        variable.raw = raw;
    }
    if let Some(scope) = &opts.environment_scope {
        variable.environment_scope = scope.clone();
    }
    if let Some(description) = &opts.description {
        variable.description = Some(description.clone()).filter(|d| !d.is_empty());
    }
}

fn apply_label(label: &mut Label, opts: &LabelOptions) {
    if let Some(name) = &opts.new_name {
        label.name = name.clone();
    }
    if let Some(color) = &opts.color {
        label.color = color.clone();
    }
    if let Some(description) = &opts.description {
        label.description = Some(description.clone()).filter(|d| !d.is_empty());
    }
    if let Some(priority) = opts.priority {
        label.priority = priority;
    }
}

fn access_levels(level: Option<i64>) -> Vec<BranchAccessLevel> {
    vec![BranchAccessLevel {
        access_level: level.unwrap_or(40),
        access_level_description: None,
    }]
}

fn direct_asset_url(project: &str, tag_name: &str, link: &ReleaseLink, path: Option<&str>) -> String {
    match path {
        Some(path) => format!(
            "https://gitlab.example.com/{}/-/releases/{}/downloads{}",
            project, tag_name, path
        ),
        None => link.url.clone(),
    }
}

#[async_trait]
impl GitLabApi for MockGitLab {
    async fn current_user(&self, ctx: &Context) -> Result<User> {
        self.begin(ctx, "current_user", None)?;
        Ok(User {
            id: 1,
            username: "root".to_string(),
        })
    }

    async fn get_project_hook(&self, ctx: &Context, project: &str, hook_id: i64) -> Result<ProjectHook> {
        let store = self.begin(ctx, "get_project_hook", None)?;
        store
            .hooks
            .iter()
            .find(|(p, h)| p == project && h.id == hook_id)
            .map(|(_, h)| h.clone())
            .ok_or_else(|| not_found("Hook"))
    }

    async fn list_project_hooks(
        &self,
        ctx: &Context,
        project: &str,
        page: PageRequest,
    ) -> Result<Page<ProjectHook>> {
        let store = self.begin(ctx, "list_project_hooks", None)?;
        let hooks = store
            .hooks
            .iter()
            .filter(|(p, _)| p == project)
            .map(|(_, h)| h.clone())
            .collect();
        Ok(page_of(hooks, page))
    }

    async fn create_project_hook(
        &self,
        ctx: &Context,
        project: &str,
        opts: &HookOptions,
    ) -> Result<ProjectHook> {
        let mut store = self.begin(ctx, "create_project_hook", body(opts))?;
        let url = opts.url.clone().ok_or_else(|| bad_request("url is missing"))?;
        let mut hook = ProjectHook {
            id: store.next_id(),
            project_id: 0,
            url,
            push_events: true,
            push_events_branch_filter: None,
            issues_events: false,
            merge_requests_events: false,
            tag_push_events: false,
            note_events: false,
            pipeline_events: false,
            releases_events: false,
            enable_ssl_verification: true,
        };
        apply_hook(&mut hook, opts);
        store.hooks.push((project.to_string(), hook.clone()));
        Ok(hook)
    }

    async fn update_project_hook(
        &self,
        ctx: &Context,
        project: &str,
        hook_id: i64,
        opts: &HookOptions,
    ) -> Result<ProjectHook> {
        let mut store = self.begin(ctx, "update_project_hook", body(opts))?;
        let (_, hook) = store
            .hooks
            .iter_mut()
            .find(|(p, h)| p == project && h.id == hook_id)
            .ok_or_else(|| not_found("Hook"))?;
        apply_hook(hook, opts);
        Ok(hook.clone())
    }

    async fn delete_project_hook(&self, ctx: &Context, project: &str, hook_id: i64) -> Result<()> {
        let mut store = self.begin(ctx, "delete_project_hook", None)?;
        let before = store.hooks.len();
        store.hooks.retain(|(p, h)| !(p == project && h.id == hook_id));
        if store.hooks.len() == before {
            return Err(not_found("Hook"));
        }
        Ok(())
    }

    async fn get_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
    ) -> Result<Variable> {
        let store = self.begin(ctx, "get_variable", None)?;
        store
            .variables
            .iter()
            .find(|(o, v)| o == owner && v.key == key && v.environment_scope == environment_scope)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| not_found("Variable"))
    }

    async fn list_variables(
        &self,
        ctx: &Context,
        owner: &Owner,
        page: PageRequest,
    ) -> Result<Page<Variable>> {
        let store = self.begin(ctx, "list_variables", None)?;
        let variables = store
            .variables
            .iter()
            .filter(|(o, _)| o == owner)
            .map(|(_, v)| v.clone())
            .collect();
        Ok(page_of(variables, page))
    }

    async fn create_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &VariableOptions,
    ) -> Result<Variable> {
        let mut store = self.begin(ctx, "create_variable", body(opts))?;
        let key = opts.key.clone().ok_or_else(|| bad_request("key is missing"))?;
        let scope = opts.environment_scope.clone().unwrap_or_else(|| "*".to_string());
        let taken = store
            .variables
            .iter()
            .any(|(o, v)| o == owner && v.key == key && v.environment_scope == scope);
        if taken {
            return Err(bad_request(format!(
                "{} has already been taken for environment scope {}",
                key, scope
            )));
        }
        let mut variable = Variable {
            key,
            value: String::new(),
            variable_type: "env_var".to_string(),
            protected: false,
            masked: false,
            raw: false,
            environment_scope: scope,
            description: None,
        };
        apply_variable(&mut variable, opts);
        store.variables.push((owner.clone(), variable.clone()));
        Ok(variable)
    }

    async fn update_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
        opts: &VariableOptions,
    ) -> Result<Variable> {
        let mut store = self.begin(ctx, "update_variable", body(opts))?;
        if let Some(scope) = opts.environment_scope.as_deref() {
            let taken = scope != environment_scope
                && store
                    .variables
                    .iter()
                    .any(|(o, v)| o == owner && v.key == key && v.environment_scope == scope);
            if taken {
                return Err(bad_request(format!(
                    "{} has already been taken for environment scope {}",
                    key, scope
                )));
            }
        }
        let (_, variable) = store
            .variables
            .iter_mut()
            .find(|(o, v)| o == owner && v.key == key && v.environment_scope == environment_scope)
            .ok_or_else(|| not_found("Variable"))?;
        apply_variable(variable, opts);
        Ok(variable.clone())
    }

    async fn delete_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
    ) -> Result<()> {
        let mut store = self.begin(ctx, "delete_variable", None)?;
        let before = store.variables.len();
        store.variables.retain(|(o, v)| {
            !(o == owner && v.key == key && v.environment_scope == environment_scope)
        });
        if store.variables.len() == before {
            return Err(not_found("Variable"));
        }
        Ok(())
    }

    async fn get_deploy_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<DeployToken> {
        let store = self.begin(ctx, "get_deploy_token", None)?;
        store
            .deploy_tokens
            .iter()
            .find(|(o, t)| o == owner && t.id == id)
            .map(|(_, t)| DeployToken {
                token: None,
                ..t.clone()
            })
            .ok_or_else(|| not_found("Deploy Token"))
    }

    async fn create_deploy_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &DeployTokenOptions,
    ) -> Result<DeployToken> {
        let mut store = self.begin(ctx, "create_deploy_token", body(opts))?;
        if opts.scopes.is_empty() {
            return Err(bad_request("scopes is missing"));
        }
        let id = store.next_id();
        let token = DeployToken {
            id,
            name: opts.name.clone(),
            username: opts
                .username
                .clone()
                .unwrap_or_else(|| format!("gitlab+deploy-token-{}", id)),
            expires_at: opts.expires_at.clone(),
            scopes: opts.scopes.clone(),
            revoked: false,
            expired: false,
            token: Some(format!("gldt-{:020}", id)),
        };
        store.deploy_tokens.push((owner.clone(), token.clone()));
        Ok(token)
    }

    async fn delete_deploy_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<()> {
        let mut store = self.begin(ctx, "delete_deploy_token", None)?;
        let before = store.deploy_tokens.len();
        store.deploy_tokens.retain(|(o, t)| !(o == owner && t.id == id));
        if store.deploy_tokens.len() == before {
            return Err(not_found("Deploy Token"));
        }
        Ok(())
    }

    async fn get_access_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<AccessToken> {
        let mut store = self.begin(ctx, "get_access_token", None)?;
        let stored = store
            .access_tokens
            .iter_mut()
            .find(|t| &t.owner == owner && t.token.id == id)
            .ok_or_else(|| not_found("Access Token"))?;
        let mut token = AccessToken {
            token: None,
            ..stored.token.clone()
        };
        if token.revoked && stored.stale_reads > 0 {
            stored.stale_reads -= 1;
            token.revoked = false;
            token.active = true;
        }
        Ok(token)
    }

    async fn create_access_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &AccessTokenOptions,
    ) -> Result<AccessToken> {
        let mut store = self.begin(ctx, "create_access_token", body(opts))?;
        if opts.scopes.is_empty() {
            return Err(bad_request("scopes is missing"));
        }
        let id = store.next_id();
        let token = AccessToken {
            id,
            name: opts.name.clone(),
            scopes: opts.scopes.clone(),
            expires_at: opts.expires_at.clone(),
            access_level: Some(opts.access_level.unwrap_or(40)),
            active: true,
            revoked: false,
            user_id: Some(1000 + id),
            token: Some(format!("glpat-{:020}", id)),
        };
        store.access_tokens.push(StoredAccessToken {
            owner: owner.clone(),
            token: token.clone(),
            stale_reads: 0,
        });
        Ok(token)
    }

    async fn revoke_access_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<()> {
        let mut store = self.begin(ctx, "revoke_access_token", None)?;
        let stored = store
            .access_tokens
            .iter_mut()
            .find(|t| &t.owner == owner && t.token.id == id && !t.token.revoked)
            .ok_or_else(|| not_found("Access Token"))?;
        stored.token.revoked = true;
        stored.token.active = false;
        stored.stale_reads = self.deletion_lag;
        Ok(())
    }

    async fn get_label(&self, ctx: &Context, project: &str, name: &str) -> Result<Label> {
        let store = self.begin(ctx, "get_label", None)?;
        store
            .labels
            .iter()
            .find(|(p, l)| p == project && l.name == name)
            .map(|(_, l)| l.clone())
            .ok_or_else(|| not_found("Label"))
    }

    async fn list_labels(&self, ctx: &Context, project: &str, page: PageRequest) -> Result<Page<Label>> {
        let store = self.begin(ctx, "list_labels", None)?;
        let labels = store
            .labels
            .iter()
            .filter(|(p, _)| p == project)
            .map(|(_, l)| l.clone())
            .collect();
        Ok(page_of(labels, page))
    }

    async fn create_label(&self, ctx: &Context, project: &str, opts: &LabelOptions) -> Result<Label> {
        let mut store = self.begin(ctx, "create_label", body(opts))?;
        let name = opts.name.clone().ok_or_else(|| bad_request("name is missing"))?;
        let color = opts.color.clone().ok_or_else(|| bad_request("color is missing"))?;
        if store.labels.iter().any(|(p, l)| p == project && l.name == name) {
            return Err(conflict("Label already exists"));
        }
        let mut label = Label {
            id: store.next_id(),
            name,
            color,
            description: None,
            priority: None,
        };
        apply_label(&mut label, opts);
        store.labels.push((project.to_string(), label.clone()));
        Ok(label)
    }

    async fn update_label(
        &self,
        ctx: &Context,
        project: &str,
        name: &str,
        opts: &LabelOptions,
    ) -> Result<Label> {
        let mut store = self.begin(ctx, "update_label", body(opts))?;
        if let Some(new_name) = opts.new_name.as_deref() {
            let taken = new_name != name
                && store.labels.iter().any(|(p, l)| p == project && l.name == new_name);
            if taken {
                return Err(conflict("Label already exists"));
            }
        }
        let (_, label) = store
            .labels
            .iter_mut()
            .find(|(p, l)| p == project && l.name == name)
            .ok_or_else(|| not_found("Label"))?;
        apply_label(label, opts);
        Ok(label.clone())
    }

    async fn delete_label(&self, ctx: &Context, project: &str, name: &str) -> Result<()> {
        let mut store = self.begin(ctx, "delete_label", None)?;
        let before = store.labels.len();
        store.labels.retain(|(p, l)| !(p == project && l.name == name));
        if store.labels.len() == before {
            return Err(not_found("Label"));
        }
        Ok(())
    }

    async fn get_protected_branch(
        &self,
        ctx: &Context,
        project: &str,
        branch: &str,
    ) -> Result<ProtectedBranch> {
        let store = self.begin(ctx, "get_protected_branch", None)?;
        store
            .branches
            .iter()
            .find(|(p, b)| p == project && b.name == branch)
            .map(|(_, b)| b.clone())
            .ok_or_else(|| not_found("Protected Branch"))
    }

    async fn protect_branch(
        &self,
        ctx: &Context,
        project: &str,
        opts: &ProtectBranchOptions,
    ) -> Result<ProtectedBranch> {
        let mut store = self.begin(ctx, "protect_branch", body(opts))?;
        let name = opts.name.clone().ok_or_else(|| bad_request("name is missing"))?;
        if store.branches.iter().any(|(p, b)| p == project && b.name == name) {
            return Err(conflict("Protected branch already exists"));
        }
        let branch = ProtectedBranch {
            id: store.next_id(),
            name,
            push_access_levels: access_levels(opts.push_access_level),
            merge_access_levels: access_levels(opts.merge_access_level),
            allow_force_push: opts.allow_force_push.unwrap_or(false),
            code_owner_approval_required: opts.code_owner_approval_required.unwrap_or(false),
        };
        store.branches.push((project.to_string(), branch.clone()));
        Ok(branch)
    }

    async fn update_protected_branch(
        &self,
        ctx: &Context,
        project: &str,
        branch: &str,
        opts: &ProtectBranchOptions,
    ) -> Result<ProtectedBranch> {
        let mut store = self.begin(ctx, "update_protected_branch", body(opts))?;
        let (_, rule) = store
            .branches
            .iter_mut()
            .find(|(p, b)| p == project && b.name == branch)
            .ok_or_else(|| not_found("Protected Branch"))?;
        if let Some(allow) = opts.allow_force_push {
            rule.allow_force_push = allow;
        }
        if let Some(required) = opts.code_owner_approval_required {
            rule.code_owner_approval_required = required;
        }
        Ok(rule.clone())
    }

    async fn unprotect_branch(&self, ctx: &Context, project: &str, branch: &str) -> Result<()> {
        let mut store = self.begin(ctx, "unprotect_branch", None)?;
        let before = store.branches.len();
        store.branches.retain(|(p, b)| !(p == project && b.name == branch));
        if store.branches.len() == before {
            return Err(not_found("Protected Branch"));
        }
        Ok(())
    }

    async fn get_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
    ) -> Result<ReleaseLink> {
        let store = self.begin(ctx, "get_release_link", None)?;
        store
            .release_links
            .iter()
            .find(|(p, t, l)| p == project && t == tag_name && l.id == link_id)
            .map(|(_, _, l)| l.clone())
            .ok_or_else(|| not_found("Link"))
    }

    async fn create_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        opts: &ReleaseLinkOptions,
    ) -> Result<ReleaseLink> {
        let mut store = self.begin(ctx, "create_release_link", body(opts))?;
        let name = opts.name.clone().ok_or_else(|| bad_request("name is missing"))?;
        let url = opts.url.clone().ok_or_else(|| bad_request("url is missing"))?;
        let mut link = ReleaseLink {
            id: store.next_id(),
            name,
            url,
            link_type: opts.link_type.clone().unwrap_or_else(|| "other".to_string()),
            direct_asset_url: None,
        };
        link.direct_asset_url = Some(direct_asset_url(
            project,
            tag_name,
            &link,
            opts.direct_asset_path.as_deref(),
        ));
        store
            .release_links
            .push((project.to_string(), tag_name.to_string(), link.clone()));
        Ok(link)
    }

    async fn update_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
        opts: &ReleaseLinkOptions,
    ) -> Result<ReleaseLink> {
        let mut store = self.begin(ctx, "update_release_link", body(opts))?;
        let (_, _, link) = store
            .release_links
            .iter_mut()
            .find(|(p, t, l)| p == project && t == tag_name && l.id == link_id)
            .ok_or_else(|| not_found("Link"))?;
        if let Some(name) = &opts.name {
            link.name = name.clone();
        }
        if let Some(url) = &opts.url {
            link.url = url.clone();
        }
        if let Some(link_type) = &opts.link_type {
            link.link_type = link_type.clone();
        }
        if let Some(path) = &opts.direct_asset_path {
            let path = Some(path.as_str()).filter(|p| !p.is_empty());
            link.direct_asset_url = Some(direct_asset_url(project, tag_name, link, path));
        }
        Ok(link.clone())
    }

    async fn delete_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
    ) -> Result<()> {
        let mut store = self.begin(ctx, "delete_release_link", None)?;
        let before = store.release_links.len();
        store
            .release_links
            .retain(|(p, t, l)| !(p == project && t == tag_name && l.id == link_id));
        if store.release_links.len() == before {
            return Err(not_found("Link"));
        }
        Ok(())
    }
}

// =========================================================================
// Provider harness
// =========================================================================

/// A test harness for [`ProviderService`] implementations.
///
/// Wraps a provider and offers the host's view of it: plan-then-apply
/// lifecycles and diagnostics turned into errors.
pub struct ProviderTester<P: ProviderService> {
    provider: P,
}

impl<P: ProviderService> ProviderTester<P> {
    /// Create a new tester for the given provider.
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Get the provider's schema.
    pub fn schema(&self) -> ProviderSchema {
        self.provider.schema()
    }

    /// Get the list of resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Get the list of data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Validate provider configuration; error diagnostics become [`TestError::Diagnostics`].
    pub async fn validate_provider_config(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.validate_provider_config(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Configure the provider.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Stop the provider.
    pub async fn stop(&self) -> Result<(), ProviderError> {
        self.provider.stop().await
    }

    /// Validate a resource configuration.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan a resource creation (no prior state).
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, None, proposed_state.clone(), proposed_state)
            .await
    }

    /// Plan a resource update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(
                resource_type,
                Some(prior_state),
                proposed_state.clone(),
                proposed_state,
            )
            .await
    }

    /// Plan a resource deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, ProviderError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null, Value::Null)
            .await
    }

    /// Create a new resource.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read the current state of a resource; `null` when it is gone.
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        self.provider.read(resource_type, current_state).await
    }

    /// Update an existing resource.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete a resource.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an existing resource.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Upgrade resource state from an older schema version.
    pub async fn upgrade_resource_state(
        &self,
        resource_type: &str,
        version: i64,
        state: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .upgrade_resource_state(resource_type, version, state)
            .await
    }

    /// Validate a data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_data_source_config(data_source_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Read data from a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, ProviderError> {
        self.provider
            .read_data_source(data_source_type, config)
            .await
    }

    /// Plan, create, then read back.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, ProviderError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// Plan, update, then read back.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, ProviderError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// Plan the delete, then delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    /// Create, update in place and delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, ProviderError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation failed with diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed with a provider error.
    Provider(ProviderError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            }
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<ProviderError> for TestError {
    fn from(e: ProviderError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion Helpers
// =========================================================================

/// Assert that a plan has changes and does not replace.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_creates(plan: &PlanResult) {
    assert!(
        plan.has_changes(),
        "Expected plan to have changes for create, but got no changes"
    );
    assert!(!plan.requires_replace, "Expected plan to create, not replace");
}

/// Assert that a plan result indicates no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        !plan.has_changes(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that a plan requires resource replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan updates in place.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(plan.has_changes(), "Expected plan to have changes");
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics if the plan does not have a change for the given path.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changes.iter().map(|c| &c.path).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that diagnostics contain an error whose summary contains `substring`.
///
/// # Panics
///
/// Panics if no error diagnostic matches.
pub fn assert_error_contains(diagnostics: &[Diagnostic], substring: &str) {
    let found = diagnostics
        .iter()
        .any(|d| matches!(d.severity, DiagnosticSeverity::Error) && d.summary.contains(substring));
    assert!(
        found,
        "Expected an error containing '{}'. Errors: {:?}",
        substring,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| &d.summary)
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::collect_pages;
    use crate::context::CancelHandle;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        api.fail_next("current_user", 401, "{\"message\":\"401 Unauthorized\"}");

        let err = assert_err!(api.current_user(&ctx).await);
        assert!(matches!(err, ProviderError::PermissionDenied(_)));
        let user = assert_ok!(api.current_user(&ctx).await);
        assert_eq!(user.username, "root");
        assert_eq!(api.call_count("current_user"), 2);
    }

    #[tokio::test]
    async fn test_calls_fail_after_cancel() {
        let api = MockGitLab::new();
        let handle = CancelHandle::new();
        let ctx = handle.context();
        handle.cancel();

        let err = assert_err!(api.current_user(&ctx).await);
        assert!(matches!(err, ProviderError::Cancelled(_)));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pages_end_without_empty_trailer() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        for i in 0..4 {
            api.seed_label("99", &format!("l{}", i), "#000000");
        }

        let labels = collect_pages(2, |page| api.list_labels(&ctx, "99", page))
            .await
            .unwrap();
        assert_eq!(labels.len(), 4);
        assert_eq!(api.call_count("list_labels"), 2);
    }

    #[tokio::test]
    async fn test_revoked_token_lags() {
        let api = MockGitLab::new().with_deletion_lag(1);
        let ctx = Context::background();
        let owner = Owner::project("99");
        let opts = AccessTokenOptions {
            name: "bot".to_string(),
            scopes: vec!["api".to_string()],
            ..Default::default()
        };
        let token = api.create_access_token(&ctx, &owner, &opts).await.unwrap();
        assert!(token.token.is_some());

        api.revoke_access_token(&ctx, &owner, token.id).await.unwrap();
        assert!(api.get_access_token(&ctx, &owner, token.id).await.unwrap().active);
        assert!(api.get_access_token(&ctx, &owner, token.id).await.unwrap().revoked);
        assert!(api.revoke_access_token(&ctx, &owner, token.id).await.is_err());
    }

    #[test]
    fn test_assert_no_errors() {
        assert_no_errors(&[Diagnostic::warning("Just a warning")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_assert_error_contains() {
        let diagnostics = vec![Diagnostic::error("Invalid configuration value")];
        assert_error_contains(&diagnostics, "configuration");
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("field1"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("field1"));
        assert!(display.contains("More info"));
    }
}
