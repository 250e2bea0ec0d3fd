//! GitLab API access.
//!
//! [`GitLabApi`] is the boundary between resource adapters and the remote
//! service. Adapters receive it as a trait object, so tests can substitute
//! the in-memory fake from [`crate::testing`] for the HTTP implementation in
//! [`http::GitLabClient`].
//!
//! All calls take a [`Context`]; a cancelled context aborts the call. List
//! endpoints are paginated, and [`collect_pages`] drives them until the last
//! page.

use std::future::Future;

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{ProviderError, Result};
use crate::id::ParentKind;

pub mod http;
#[allow(missing_docs)]
pub mod models;

pub use http::GitLabClient;
use models::*;

/// The project or group a resource belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Owner {
    /// Project or group.
    pub kind: ParentKind,
    /// Numeric id or full path.
    pub id: String,
}

impl Owner {
    /// Create a new owner.
    pub fn new(kind: ParentKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    /// A project owner.
    pub fn project(id: impl Into<String>) -> Self {
        Self::new(ParentKind::Project, id)
    }

    /// A group owner.
    pub fn group(id: impl Into<String>) -> Self {
        Self::new(ParentKind::Group, id)
    }
}

/// Which page of a list endpoint to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
}

impl PageRequest {
    /// The first page.
    pub fn first(per_page: u32) -> Self {
        Self { page: 1, per_page }
    }
}

/// One page of a list endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// The next page number, `None` on the last page.
    pub next_page: Option<u32>,
}

/// Fetch every page of a list endpoint and concatenate the items.
pub async fn collect_pages<T, F, Fut>(per_page: u32, mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(PageRequest) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    let mut items = Vec::new();
    let mut request = PageRequest::first(per_page);
    loop {
        let page = fetch(request).await?;
        items.extend(page.items);
        match page.next_page {
            None => return Ok(items),
            Some(next) if next > request.page => request.page = next,
            Some(next) => {
                return Err(ProviderError::Remote {
                    status: 200,
                    message: format!(
                        "pagination did not advance: page {} pointed to page {}",
                        request.page, next
                    ),
                })
            }
        }
    }
}

/// Typed GitLab operations used by the resource adapters.
#[async_trait]
pub trait GitLabApi: Send + Sync {
    /// The user the token belongs to.
    async fn current_user(&self, ctx: &Context) -> Result<User>;

    // =========================================================================
    // Project hooks
    // =========================================================================

    /// Get a project hook.
    async fn get_project_hook(&self, ctx: &Context, project: &str, hook_id: i64)
        -> Result<ProjectHook>;

    /// List one page of project hooks.
    async fn list_project_hooks(
        &self,
        ctx: &Context,
        project: &str,
        page: PageRequest,
    ) -> Result<Page<ProjectHook>>;

    /// Create a project hook.
    async fn create_project_hook(
        &self,
        ctx: &Context,
        project: &str,
        opts: &HookOptions,
    ) -> Result<ProjectHook>;

    /// Update a project hook.
    async fn update_project_hook(
        &self,
        ctx: &Context,
        project: &str,
        hook_id: i64,
        opts: &HookOptions,
    ) -> Result<ProjectHook>;

    /// Delete a project hook.
    async fn delete_project_hook(&self, ctx: &Context, project: &str, hook_id: i64) -> Result<()>;

    // =========================================================================
    // CI/CD variables
    // =========================================================================

    /// Get a variable by key and environment scope.
    async fn get_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
    ) -> Result<Variable>;

    /// List one page of variables.
    async fn list_variables(
        &self,
        ctx: &Context,
        owner: &Owner,
        page: PageRequest,
    ) -> Result<Page<Variable>>;

    /// Create a variable.
    async fn create_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &VariableOptions,
    ) -> Result<Variable>;

    /// Update the variable matching key and environment scope.
    async fn update_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
        opts: &VariableOptions,
    ) -> Result<Variable>;

    /// Delete the variable matching key and environment scope.
    async fn delete_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
    ) -> Result<()>;

    // =========================================================================
    // Deploy tokens
    // =========================================================================

    /// Get a deploy token.
    async fn get_deploy_token(&self, ctx: &Context, owner: &Owner, id: i64)
        -> Result<DeployToken>;

    /// Create a deploy token. The response carries the secret.
    async fn create_deploy_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &DeployTokenOptions,
    ) -> Result<DeployToken>;

    /// Delete a deploy token.
    async fn delete_deploy_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<()>;

    // =========================================================================
    // Access tokens
    // =========================================================================

    /// Get an access token.
    async fn get_access_token(&self, ctx: &Context, owner: &Owner, id: i64)
        -> Result<AccessToken>;

    /// Create an access token. The response carries the secret.
    async fn create_access_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &AccessTokenOptions,
    ) -> Result<AccessToken>;

    /// Revoke an access token. Revocation completes asynchronously.
    async fn revoke_access_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<()>;

    // =========================================================================
    // Labels
    // =========================================================================

    /// Get a project label by name.
    async fn get_label(&self, ctx: &Context, project: &str, name: &str) -> Result<Label>;

    /// List one page of project labels.
    async fn list_labels(&self, ctx: &Context, project: &str, page: PageRequest)
        -> Result<Page<Label>>;

    /// Create a project label.
    async fn create_label(&self, ctx: &Context, project: &str, opts: &LabelOptions)
        -> Result<Label>;

    /// Update a project label; `opts.new_name` renames it.
    async fn update_label(
        &self,
        ctx: &Context,
        project: &str,
        name: &str,
        opts: &LabelOptions,
    ) -> Result<Label>;

    /// Delete a project label.
    async fn delete_label(&self, ctx: &Context, project: &str, name: &str) -> Result<()>;

    // =========================================================================
    // Protected branches
    // =========================================================================

    /// Get a protected branch rule.
    async fn get_protected_branch(
        &self,
        ctx: &Context,
        project: &str,
        branch: &str,
    ) -> Result<ProtectedBranch>;

    /// Protect a branch.
    async fn protect_branch(
        &self,
        ctx: &Context,
        project: &str,
        opts: &ProtectBranchOptions,
    ) -> Result<ProtectedBranch>;

    /// Change flags of a protected branch rule.
    async fn update_protected_branch(
        &self,
        ctx: &Context,
        project: &str,
        branch: &str,
        opts: &ProtectBranchOptions,
    ) -> Result<ProtectedBranch>;

    /// Remove a protected branch rule.
    async fn unprotect_branch(&self, ctx: &Context, project: &str, branch: &str) -> Result<()>;

    // =========================================================================
    // Release links
    // =========================================================================

    /// Get a release link.
    async fn get_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
    ) -> Result<ReleaseLink>;

    /// Create a release link.
    async fn create_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        opts: &ReleaseLinkOptions,
    ) -> Result<ReleaseLink>;

    /// Update a release link.
    async fn update_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
        opts: &ReleaseLinkOptions,
    ) -> Result<ReleaseLink>;

    /// Delete a release link.
    async fn delete_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paged(total: u32, per_page: u32) -> impl FnMut(PageRequest) -> std::future::Ready<Result<Page<u32>>> {
        move |req: PageRequest| {
            let start = (req.page - 1) * req.per_page;
            let end = (start + req.per_page).min(total);
            let items: Vec<u32> = (start..end).collect();
            let next_page = if end < total { Some(req.page + 1) } else { None };
            assert_eq!(req.per_page, per_page);
            std::future::ready(Ok(Page { items, next_page }))
        }
    }

    #[tokio::test]
    async fn test_collect_pages_boundaries() {
        for total in [0, 1, 3, 4, 5, 9] {
            let items = collect_pages(4, paged(total, 4)).await.unwrap();
            assert_eq!(items, (0..total).collect::<Vec<_>>(), "total = {}", total);
        }
    }

    #[tokio::test]
    async fn test_collect_pages_propagates_errors() {
        let result: Result<Vec<u32>> = collect_pages(10, |req: PageRequest| {
            std::future::ready(if req.page == 1 {
                Ok(Page {
                    items: vec![1],
                    next_page: Some(2),
                })
            } else {
                Err(ProviderError::Unavailable("502 Bad Gateway".into()))
            })
        })
        .await;
        assert!(matches!(result, Err(ProviderError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_collect_pages_rejects_non_advancing_cursor() {
        let result: Result<Vec<u32>> = collect_pages(10, |req: PageRequest| {
            std::future::ready(Ok(Page {
                items: vec![req.page],
                next_page: Some(req.page),
            }))
        })
        .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_owner_constructors() {
        assert_eq!(Owner::project("99").kind, ParentKind::Project);
        assert_eq!(Owner::group("foo/bar").id, "foo/bar");
    }
}
