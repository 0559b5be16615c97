use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;
use url::Url;

use crate::error::ResolveError;
use crate::metadata::models::{GqlRequest, GqlResponse, VideoMetadata, VideoVariables};
use crate::source::ManifestSource;

const VIDEO_QUERY: &str = "query VideoMetadata($id: ID!) { video(id: $id) { title broadcastType createdAt seekPreviewsURL owner { login } } }";

/// Path segment that marks the storyboard directory of a VOD on the CDN.
const STORYBOARDS_MARKER: &str = "storyboards";

#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub gql_url: String,
    pub client_id: String,
}

impl MetadataConfig {
    pub const DEFAULT_GQL_URL: &str = "https://gql.twitch.tv/gql";
    pub const DEFAULT_CLIENT_ID: &str = "kimne78kx3ncx6brgo4mv6wki5h1ko";
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            gql_url: Self::DEFAULT_GQL_URL.to_string(),
            client_id: Self::DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// Resolves manifests for VODs whose metadata is still served by the GraphQL API.
pub struct MetadataResolver {
    client: Client,
    config: MetadataConfig,
}

impl MetadataResolver {
    /// `client` is expected to carry the request timeout (see [`crate::client`]).
    pub fn new(client: Client, config: MetadataConfig) -> Self {
        Self { client, config }
    }

    pub async fn fetch_video(&self, video_id: &str) -> Result<VideoMetadata, ResolveError> {
        let request = GqlRequest {
            operation_name: "VideoMetadata",
            query: VIDEO_QUERY,
            variables: VideoVariables { id: video_id },
        };

        let response = self
            .client
            .post(&self.config.gql_url)
            .header("Client-Id", &self.config.client_id)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        debug!(video_id, body = %body, "GraphQL video response");

        let parsed: GqlResponse = serde_json::from_str(&body)?;
        if let Some(video) = parsed.data.and_then(|d| d.video) {
            return Ok(video);
        }

        match parsed.errors {
            Some(errors) if !errors.is_empty() => {
                let messages = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                Err(ResolveError::NotFound(format!("video {video_id}: {messages}")))
            }
            _ => Err(ResolveError::NotFound(format!("video {video_id}"))),
        }
    }
}

#[async_trait]
impl ManifestSource for MetadataResolver {
    fn name(&self) -> &'static str {
        "metadata"
    }

    async fn resolve(&self, video_id: &str) -> Result<String, ResolveError> {
        let video = self.fetch_video(video_id).await?;
        let preview = video.seek_previews_url.as_deref().ok_or_else(|| {
            ResolveError::ParseError(format!("video {video_id} has no seekPreviewsURL"))
        })?;

        let manifest = manifest_url_from_preview(preview)?;
        debug!(
            video_id,
            owner = video.owner.as_ref().map(|o| o.login.as_str()),
            broadcast_type = video.broadcast_type.as_deref(),
            manifest = %manifest,
            "Derived manifest from preview url"
        );
        Ok(manifest)
    }
}

/// Derive the chunked manifest URL from a seek-preview (storyboard) URL.
///
/// `https://{host}/.../{special_id}/storyboards/...` becomes
/// `https://{host}/{special_id}/chunked/index-dvr.m3u8`.
pub fn manifest_url_from_preview(preview_url: &str) -> Result<String, ResolveError> {
    let parsed = Url::parse(preview_url)
        .map_err(|e| ResolveError::ParseError(format!("invalid preview url {preview_url}: {e}")))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| ResolveError::ParseError(format!("preview url has no host: {preview_url}")))?;
    let authority = match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let segments: Vec<&str> = parsed.path_segments().map(Iterator::collect).unwrap_or_default();
    let marker = segments
        .iter()
        .position(|s| s.contains(STORYBOARDS_MARKER))
        .ok_or_else(|| {
            ResolveError::ParseError(format!("no storyboards segment in {preview_url}"))
        })?;

    let special_id = marker
        .checked_sub(1)
        .map(|i| segments[i])
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ResolveError::ParseError(format!("no segment precedes storyboards in {preview_url}"))
        })?;

    Ok(format!("https://{authority}/{special_id}/chunked/index-dvr.m3u8"))
}
