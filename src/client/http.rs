//! reqwest implementation of [`GitLabApi`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};
use url::Url;

use super::models::*;
use super::{GitLabApi, Owner, Page, PageRequest};
use crate::config::ProviderConfig;
use crate::context::Context;
use crate::error::{ProviderError, Result};

const USER_AGENT: &str = concat!("hemmer-provider-gitlab/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the GitLab REST API (v4).
///
/// Cheap to share: the underlying connection pool is reused by every call and
/// nothing is mutated per request.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl GitLabClient {
    /// Build a client from the provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ProviderError::Configuration(format!("invalid base_url '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::Configuration(format!(
                "base_url '{}' cannot be used as a base URL",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.client_timeout_seconds))
            .danger_accept_invalid_certs(config.insecure)
            .build()?;

        Ok(Self {
            http,
            base_url,
            token: config.token.clone(),
        })
    }

    /// The API root every request is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build an endpoint URL. Each segment is percent-encoded on its own, so a
    /// project path `foo/bar` becomes the single segment `foo%2Fbar`.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn owner_endpoint(&self, owner: &Owner, rest: &[&str]) -> Url {
        let mut segments = vec![owner.kind.collection(), owner.id.as_str()];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token)
    }

    async fn execute(&self, ctx: &Context, request: RequestBuilder) -> Result<reqwest::Response> {
        ctx.run(async move {
            let response = request.send().await?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            let body = response.text().await.unwrap_or_default();
            Err(error_for_status(status, body))
        })
        .await
    }

    async fn send<T: DeserializeOwned>(&self, ctx: &Context, request: RequestBuilder) -> Result<T> {
        let response = self.execute(ctx, request).await?;
        ctx.run(async move { Ok(response.json::<T>().await?) }).await
    }

    async fn send_page<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        request: RequestBuilder,
        page: PageRequest,
    ) -> Result<Page<T>> {
        let request = request.query(&[("page", page.page), ("per_page", page.per_page)]);
        let response = self.execute(ctx, request).await?;
        let next_page = next_page(response.headers());
        let items = ctx.run(async move { Ok(response.json::<Vec<T>>().await?) }).await?;
        debug!(page = page.page, items = items.len(), ?next_page, "fetched page");
        Ok(Page { items, next_page })
    }

    async fn send_empty(&self, ctx: &Context, request: RequestBuilder) -> Result<()> {
        self.execute(ctx, request).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, ctx: &Context, url: Url) -> Result<T> {
        self.send(ctx, self.request(Method::GET, url)).await
    }

    async fn write<B, T>(&self, ctx: &Context, method: Method, url: Url, body: &B) -> Result<T>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        self.send(ctx, self.request(method, url).json(body)).await
    }

    async fn delete(&self, ctx: &Context, url: Url) -> Result<()> {
        self.send_empty(ctx, self.request(Method::DELETE, url)).await
    }
}

/// Map a non-success response to an error, keeping GitLab's body verbatim.
pub fn error_for_status(status: StatusCode, body: String) -> ProviderError {
    let body = body.trim();
    let message = if body.is_empty() {
        status
            .canonical_reason()
            .unwrap_or("no response body")
            .to_string()
    } else {
        body.to_string()
    };
    match status.as_u16() {
        404 => ProviderError::NotFound(message),
        400 | 422 => ProviderError::RemoteValidation(message),
        401 | 403 => ProviderError::PermissionDenied(message),
        429 => ProviderError::ResourceExhausted(message),
        500..=599 => ProviderError::Unavailable(message),
        status => ProviderError::Remote { status, message },
    }
}

/// Read the `X-Next-Page` header; empty or absent means last page.
pub fn next_page(headers: &HeaderMap) -> Option<u32> {
    headers
        .get("x-next-page")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .and_then(|v| v.parse().ok())
}

fn scope_filter(environment_scope: &str) -> [(&'static str, &str); 1] {
    [("filter[environment_scope]", environment_scope)]
}

#[async_trait]
impl GitLabApi for GitLabClient {
    #[instrument(skip(self, ctx), name = "gitlab.current_user")]
    async fn current_user(&self, ctx: &Context) -> Result<User> {
        self.get(ctx, self.endpoint(&["user"])).await
    }

    async fn get_project_hook(
        &self,
        ctx: &Context,
        project: &str,
        hook_id: i64,
    ) -> Result<ProjectHook> {
        let id = hook_id.to_string();
        self.get(ctx, self.endpoint(&["projects", project, "hooks", &id]))
            .await
    }

    async fn list_project_hooks(
        &self,
        ctx: &Context,
        project: &str,
        page: PageRequest,
    ) -> Result<Page<ProjectHook>> {
        let url = self.endpoint(&["projects", project, "hooks"]);
        self.send_page(ctx, self.request(Method::GET, url), page)
            .await
    }

    async fn create_project_hook(
        &self,
        ctx: &Context,
        project: &str,
        opts: &HookOptions,
    ) -> Result<ProjectHook> {
        let url = self.endpoint(&["projects", project, "hooks"]);
        self.write(ctx, Method::POST, url, opts).await
    }

    async fn update_project_hook(
        &self,
        ctx: &Context,
        project: &str,
        hook_id: i64,
        opts: &HookOptions,
    ) -> Result<ProjectHook> {
        let id = hook_id.to_string();
        let url = self.endpoint(&["projects", project, "hooks", &id]);
        self.write(ctx, Method::PUT, url, opts).await
    }

    async fn delete_project_hook(&self, ctx: &Context, project: &str, hook_id: i64) -> Result<()> {
        let id = hook_id.to_string();
        self.delete(ctx, self.endpoint(&["projects", project, "hooks", &id]))
            .await
    }

    async fn get_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
    ) -> Result<Variable> {
        let url = self.owner_endpoint(owner, &["variables", key]);
        let request = self
            .request(Method::GET, url)
            .query(&scope_filter(environment_scope));
        self.send(ctx, request).await
    }

    async fn list_variables(
        &self,
        ctx: &Context,
        owner: &Owner,
        page: PageRequest,
    ) -> Result<Page<Variable>> {
        let url = self.owner_endpoint(owner, &["variables"]);
        self.send_page(ctx, self.request(Method::GET, url), page)
            .await
    }

    async fn create_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &VariableOptions,
    ) -> Result<Variable> {
        let url = self.owner_endpoint(owner, &["variables"]);
        self.write(ctx, Method::POST, url, opts).await
    }

    async fn update_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
        opts: &VariableOptions,
    ) -> Result<Variable> {
        let url = self.owner_endpoint(owner, &["variables", key]);
        let request = self
            .request(Method::PUT, url)
            .query(&scope_filter(environment_scope))
            .json(opts);
        self.send(ctx, request).await
    }

    async fn delete_variable(
        &self,
        ctx: &Context,
        owner: &Owner,
        key: &str,
        environment_scope: &str,
    ) -> Result<()> {
        let url = self.owner_endpoint(owner, &["variables", key]);
        let request = self
            .request(Method::DELETE, url)
            .query(&scope_filter(environment_scope));
        self.send_empty(ctx, request).await
    }

    async fn get_deploy_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        id: i64,
    ) -> Result<DeployToken> {
        let id = id.to_string();
        self.get(ctx, self.owner_endpoint(owner, &["deploy_tokens", &id]))
            .await
    }

    async fn create_deploy_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &DeployTokenOptions,
    ) -> Result<DeployToken> {
        let url = self.owner_endpoint(owner, &["deploy_tokens"]);
        self.write(ctx, Method::POST, url, opts).await
    }

    async fn delete_deploy_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<()> {
        let id = id.to_string();
        self.delete(ctx, self.owner_endpoint(owner, &["deploy_tokens", &id]))
            .await
    }

    async fn get_access_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        id: i64,
    ) -> Result<AccessToken> {
        let id = id.to_string();
        self.get(ctx, self.owner_endpoint(owner, &["access_tokens", &id]))
            .await
    }

    async fn create_access_token(
        &self,
        ctx: &Context,
        owner: &Owner,
        opts: &AccessTokenOptions,
    ) -> Result<AccessToken> {
        let url = self.owner_endpoint(owner, &["access_tokens"]);
        self.write(ctx, Method::POST, url, opts).await
    }

    async fn revoke_access_token(&self, ctx: &Context, owner: &Owner, id: i64) -> Result<()> {
        let id = id.to_string();
        self.delete(ctx, self.owner_endpoint(owner, &["access_tokens", &id]))
            .await
    }

    async fn get_label(&self, ctx: &Context, project: &str, name: &str) -> Result<Label> {
        self.get(ctx, self.endpoint(&["projects", project, "labels", name]))
            .await
    }

    async fn list_labels(
        &self,
        ctx: &Context,
        project: &str,
        page: PageRequest,
    ) -> Result<Page<Label>> {
        let url = self.endpoint(&["projects", project, "labels"]);
        self.send_page(ctx, self.request(Method::GET, url), page)
            .await
    }

    async fn create_label(
        &self,
        ctx: &Context,
        project: &str,
        opts: &LabelOptions,
    ) -> Result<Label> {
        let url = self.endpoint(&["projects", project, "labels"]);
        self.write(ctx, Method::POST, url, opts).await
    }

    async fn update_label(
        &self,
        ctx: &Context,
        project: &str,
        name: &str,
        opts: &LabelOptions,
    ) -> Result<Label> {
        let url = self.endpoint(&["projects", project, "labels", name]);
        self.write(ctx, Method::PUT, url, opts).await
    }

    async fn delete_label(&self, ctx: &Context, project: &str, name: &str) -> Result<()> {
        self.delete(ctx, self.endpoint(&["projects", project, "labels", name]))
            .await
    }

    async fn get_protected_branch(
        &self,
        ctx: &Context,
        project: &str,
        branch: &str,
    ) -> Result<ProtectedBranch> {
        let url = self.endpoint(&["projects", project, "protected_branches", branch]);
        self.get(ctx, url).await
    }

    async fn protect_branch(
        &self,
        ctx: &Context,
        project: &str,
        opts: &ProtectBranchOptions,
    ) -> Result<ProtectedBranch> {
        let url = self.endpoint(&["projects", project, "protected_branches"]);
        self.write(ctx, Method::POST, url, opts).await
    }

    async fn update_protected_branch(
        &self,
        ctx: &Context,
        project: &str,
        branch: &str,
        opts: &ProtectBranchOptions,
    ) -> Result<ProtectedBranch> {
        let url = self.endpoint(&["projects", project, "protected_branches", branch]);
        self.write(ctx, Method::PATCH, url, opts).await
    }

    async fn unprotect_branch(&self, ctx: &Context, project: &str, branch: &str) -> Result<()> {
        let url = self.endpoint(&["projects", project, "protected_branches", branch]);
        self.delete(ctx, url).await
    }

    async fn get_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
    ) -> Result<ReleaseLink> {
        let id = link_id.to_string();
        let url = self.endpoint(&[
            "projects", project, "releases", tag_name, "assets", "links", &id,
        ]);
        self.get(ctx, url).await
    }

    async fn create_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        opts: &ReleaseLinkOptions,
    ) -> Result<ReleaseLink> {
        let url = self.endpoint(&["projects", project, "releases", tag_name, "assets", "links"]);
        self.write(ctx, Method::POST, url, opts).await
    }

    async fn update_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
        opts: &ReleaseLinkOptions,
    ) -> Result<ReleaseLink> {
        let id = link_id.to_string();
        let url = self.endpoint(&[
            "projects", project, "releases", tag_name, "assets", "links", &id,
        ]);
        self.write(ctx, Method::PUT, url, opts).await
    }

    async fn delete_release_link(
        &self,
        ctx: &Context,
        project: &str,
        tag_name: &str,
        link_id: i64,
    ) -> Result<()> {
        let id = link_id.to_string();
        let url = self.endpoint(&[
            "projects", project, "releases", tag_name, "assets", "links", &id,
        ]);
        self.delete(ctx, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn client(base_url: &str) -> GitLabClient {
        let config = ProviderConfig {
            token: "glpat-test".to_string(),
            base_url: base_url.to_string(),
            ..ProviderConfig::default()
        };
        GitLabClient::new(&config).unwrap()
    }

    #[test]
    fn test_endpoint_encodes_project_paths() {
        let client = client("https://gitlab.example.com/api/v4/");
        let url = client.endpoint(&["projects", "foo/bar", "labels", "priority::high"]);
        assert_eq!(
            url.as_str(),
            "https://gitlab.example.com/api/v4/projects/foo%2Fbar/labels/priority::high"
        );

        let url = client.endpoint(&["projects", "99", "hooks", "42"]);
        assert_eq!(url.as_str(), "https://gitlab.example.com/api/v4/projects/99/hooks/42");
    }

    #[test]
    fn test_owner_endpoint_uses_collection() {
        let client = client("https://gitlab.example.com/api/v4/");
        let url = client.owner_endpoint(&Owner::group("acme/platform"), &["deploy_tokens", "7"]);
        assert_eq!(
            url.as_str(),
            "https://gitlab.example.com/api/v4/groups/acme%2Fplatform/deploy_tokens/7"
        );
    }

    #[test]
    fn test_invalid_base_url_is_configuration_error() {
        let config = ProviderConfig {
            token: "t".to_string(),
            base_url: "not a url".to_string(),
            ..ProviderConfig::default()
        };
        let err = GitLabClient::new(&config).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
    }

    #[test]
    fn test_error_for_status() {
        let err = error_for_status(StatusCode::NOT_FOUND, r#"{"message":"404 Not found"}"#.into());
        assert!(err.is_not_found());
        assert_eq!(err.message(), r#"{"message":"404 Not found"}"#);

        let err = error_for_status(
            StatusCode::BAD_REQUEST,
            r#"{"message":{"key":["is invalid"]}}"#.into(),
        );
        assert!(matches!(err, ProviderError::RemoteValidation(_)));

        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, String::new()),
            ProviderError::PermissionDenied(ref m) if m == "Forbidden"
        ));
        assert!(matches!(
            error_for_status(StatusCode::TOO_MANY_REQUESTS, "slow down".into()),
            ProviderError::ResourceExhausted(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::BAD_GATEWAY, String::new()),
            ProviderError::Unavailable(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::CONFLICT, "exists".into()),
            ProviderError::Remote { status: 409, .. }
        ));
    }

    #[test]
    fn test_next_page_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(next_page(&headers), None);

        headers.insert("x-next-page", HeaderValue::from_static(""));
        assert_eq!(next_page(&headers), None);

        headers.insert("x-next-page", HeaderValue::from_static("3"));
        assert_eq!(next_page(&headers), Some(3));
    }
}
