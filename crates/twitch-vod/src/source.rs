use async_trait::async_trait;

use crate::error::ResolveError;

/// Something that can turn a video id into a playable manifest URL.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Short name used in logs and responses.
    fn name(&self) -> &'static str;

    async fn resolve(&self, video_id: &str) -> Result<String, ResolveError>;
}
