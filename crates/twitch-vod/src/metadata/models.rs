use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct GqlRequest<'a> {
    #[serde(rename = "operationName")]
    pub operation_name: &'a str,
    pub query: &'a str,
    pub variables: VideoVariables<'a>,
}

#[derive(Debug, Serialize)]
pub(crate) struct VideoVariables<'a> {
    pub id: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GqlResponse {
    #[serde(default)]
    pub data: Option<GqlData>,
    #[serde(default)]
    pub errors: Option<Vec<GqlError>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GqlData {
    #[serde(default)]
    pub video: Option<VideoMetadata>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GqlError {
    pub message: String,
}

/// The subset of a Twitch `Video` node needed to locate its manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub broadcast_type: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(rename = "seekPreviewsURL", default)]
    pub seek_previews_url: Option<String>,
    #[serde(default)]
    pub owner: Option<VideoOwner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoOwner {
    pub login: String,
}
