//! `gitlab_release_link`: an asset link attached to a release.
//!
//! Identity is `project:tag_name:link_id`. Tags may contain `:` while the
//! link id never does, so decoding splits from the end and the project plus
//! tag keep any extra delimiters. A project path never contains `:`, so the
//! first delimiter of the remainder separates project from tag.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::client::models::{ReleaseLink, ReleaseLinkOptions};
use crate::error::Result;
use crate::id::{parse_int_component, IdCodec, SplitFrom};
use crate::resource::{
    changed, changed_opt, found, ignore_not_found, parse_state, require_id, to_state,
    vanished_after_write, Operation, Resource,
};
use crate::schema::{Attribute, Schema};

const TYPE_NAME: &str = "gitlab_release_link";

/// Two parts split from the end: `project:tag` and the link id.
const TAIL: IdCodec = IdCodec::new(2, SplitFrom::End);
/// Two parts split from the start: project and tag.
const HEAD: IdCodec = IdCodec::new(2, SplitFrom::Start);

fn default_link_type() -> String {
    "other".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LinkId {
    project: String,
    tag_name: String,
    link_id: i64,
}

impl LinkId {
    fn decode(id: &str) -> Result<Self> {
        let outer = TAIL.decode(id)?;
        let link_id = parse_int_component(id, outer[1])?;
        let inner = HEAD.decode(outer[0])?;
        Ok(Self {
            project: inner[0].to_string(),
            tag_name: inner[1].to_string(),
            link_id,
        })
    }

    fn encode(&self) -> String {
        let prefix = HEAD.encode(&[&self.project, &self.tag_name]);
        TAIL.encode(&[prefix, self.link_id.to_string()])
    }
}

/// Adapter for release asset links.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseLinkResource;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
struct ReleaseLinkState {
    id: Option<String>,
    project: String,
    tag_name: String,
    name: String,
    url: String,
    link_type: String,
    direct_asset_path: Option<String>,
    link_id: Option<i64>,
    direct_asset_url: Option<String>,
}

impl Default for ReleaseLinkState {
    fn default() -> Self {
        Self {
            id: None,
            project: String::new(),
            tag_name: String::new(),
            name: String::new(),
            url: String::new(),
            link_type: default_link_type(),
            direct_asset_path: None,
            link_id: None,
            direct_asset_url: None,
        }
    }
}

impl ReleaseLinkState {
    fn from_remote(id: &LinkId, remote: ReleaseLink, direct_asset_path: Option<String>) -> Self {
        Self {
            id: Some(id.encode()),
            project: id.project.clone(),
            tag_name: id.tag_name.clone(),
            name: remote.name,
            url: remote.url,
            link_type: remote.link_type,
            direct_asset_path,
            link_id: Some(remote.id),
            direct_asset_url: remote.direct_asset_url,
        }
    }
}

async fn read_link(
    op: &Operation<'_>,
    id: &LinkId,
    direct_asset_path: Option<String>,
) -> Result<Option<ReleaseLinkState>> {
    let remote = found(
        op.api
            .get_release_link(op.ctx, &id.project, &id.tag_name, id.link_id)
            .await,
    )?;
    Ok(remote.map(|r| ReleaseLinkState::from_remote(id, r, direct_asset_path)))
}

#[async_trait]
impl Resource for ReleaseLinkResource {
    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("An asset link of a GitLab release.")
            .with_attribute(
                "id",
                Attribute::computed_string().with_description("`project:tag_name:link_id`"),
            )
            .with_attribute("project", Attribute::required_string().with_force_new())
            .with_attribute("tag_name", Attribute::required_string().with_force_new())
            .with_attribute("name", Attribute::required_string())
            .with_attribute("url", Attribute::required_string())
            .with_attribute(
                "link_type",
                Attribute::optional_string()
                    .with_default(default_link_type().into())
                    .with_description("`other`, `runbook`, `image` or `package`."),
            )
            .with_attribute(
                "direct_asset_path",
                Attribute::optional_string()
                    .with_description("Path for a permanent link, e.g. `/binaries/linux-amd64`."),
            )
            .with_attribute("link_id", Attribute::computed_int64())
            .with_attribute("direct_asset_url", Attribute::computed_string())
    }

    async fn create(&self, op: &Operation<'_>, planned: Value) -> Result<Value> {
        let planned: ReleaseLinkState = parse_state(TYPE_NAME, planned)?;
        let opts = ReleaseLinkOptions {
            name: Some(planned.name.clone()),
            url: Some(planned.url.clone()),
            link_type: Some(planned.link_type.clone()),
            direct_asset_path: planned.direct_asset_path.clone(),
        };
        let link = op
            .api
            .create_release_link(op.ctx, &planned.project, &planned.tag_name, &opts)
            .await?;
        let id = LinkId {
            project: planned.project,
            tag_name: planned.tag_name,
            link_id: link.id,
        };
        debug!(id = %id.encode(), "release link created");

        let state = read_link(op, &id, planned.direct_asset_path)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, &id.encode()))?;
        to_state(&state)
    }

    async fn read(&self, op: &Operation<'_>, state: Value) -> Result<Option<Value>> {
        let state: ReleaseLinkState = parse_state(TYPE_NAME, state)?;
        let id = LinkId::decode(require_id(TYPE_NAME, &state.id)?)?;
        match read_link(op, &id, state.direct_asset_path).await? {
            Some(state) => Ok(Some(to_state(&state)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, op: &Operation<'_>, prior: Value, planned: Value) -> Result<Value> {
        let prior: ReleaseLinkState = parse_state(TYPE_NAME, prior)?;
        let planned: ReleaseLinkState = parse_state(TYPE_NAME, planned)?;
        let id = LinkId::decode(require_id(TYPE_NAME, &prior.id)?)?;

        let opts = ReleaseLinkOptions {
            name: changed(&prior.name, &planned.name),
            url: changed(&prior.url, &planned.url),
            link_type: changed(&prior.link_type, &planned.link_type),
            direct_asset_path: changed_opt(&prior.direct_asset_path, &planned.direct_asset_path),
        };
        op.api
            .update_release_link(op.ctx, &id.project, &id.tag_name, id.link_id, &opts)
            .await?;

        let state = read_link(op, &id, planned.direct_asset_path)
            .await?
            .ok_or_else(|| vanished_after_write(TYPE_NAME, &id.encode()))?;
        to_state(&state)
    }

    async fn delete(&self, op: &Operation<'_>, state: Value) -> Result<()> {
        let state: ReleaseLinkState = parse_state(TYPE_NAME, state)?;
        let id = LinkId::decode(require_id(TYPE_NAME, &state.id)?)?;
        ignore_not_found(
            op.api
                .delete_release_link(op.ctx, &id.project, &id.tag_name, id.link_id)
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OperationSettings;
    use crate::context::Context;
    use crate::error::ProviderError;
    use crate::testing::MockGitLab;
    use serde_json::json;

    #[test]
    fn test_tag_keeps_inner_delimiters() {
        let id = LinkId::decode("foo/bar:v1.0:rc:17").unwrap();
        assert_eq!(id.project, "foo/bar");
        assert_eq!(id.tag_name, "v1.0:rc");
        assert_eq!(id.link_id, 17);
        assert_eq!(id.encode(), "foo/bar:v1.0:rc:17");
    }

    #[test]
    fn test_malformed_link_ids() {
        for id in ["foo/bar:17", "foo/bar:v1:abc", ":v1:17", "foo/bar:v1:"] {
            let err = LinkId::decode(id).unwrap_err();
            assert!(
                matches!(err, ProviderError::MalformedIdentifier { .. }),
                "{} -> {:?}",
                id,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let api = MockGitLab::new();
        let ctx = Context::background();
        let op = Operation::new(&api, &ctx, OperationSettings::default());
        let resource = ReleaseLinkResource;

        let state = resource
            .create(
                &op,
                json!({
                    "project": "99",
                    "tag_name": "v1.0",
                    "name": "linux",
                    "url": "https://example.com/linux.tar.gz",
                    "direct_asset_path": "/bin/linux"
                }),
            )
            .await
            .unwrap();
        let link_id = state["link_id"].as_i64().unwrap();
        assert_eq!(state["id"], format!("99:v1.0:{}", link_id));
        assert_eq!(state["link_type"], "other");
        assert_eq!(state["direct_asset_path"], "/bin/linux");

        let mut planned = state.clone();
        planned["link_type"] = json!("package");
        let updated = resource.update(&op, state.clone(), planned).await.unwrap();
        assert_eq!(updated["link_type"], "package");
        assert_eq!(
            api.last_body("update_release_link").unwrap(),
            json!({"link_type": "package"})
        );

        resource.delete(&op, updated.clone()).await.unwrap();
        assert!(resource.read(&op, updated).await.unwrap().is_none());
    }
}
