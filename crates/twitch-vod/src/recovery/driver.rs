use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ContainerError, ResolveError};
use crate::recovery::container::{
    AttachedStream, ContainerId, ContainerRuntime, ContainerSpec, OutputChunk,
};
use crate::recovery::job::{JobStep, RecoveryJob, URL_PLACEHOLDER};
use crate::source::ManifestSource;

/// Placeholder substituted with the video id in the target URL template.
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Image containing the recovery tool.
    pub image: String,
    /// Command run in the container; `{url}` is replaced with the target URL.
    pub command: Vec<String>,
    /// Lines written to stdin, one per stdout chunk; `{url}` is replaced with the target URL.
    pub script: Vec<String>,
    /// Hard bound on a whole job, container provisioning included.
    pub timeout: Duration,
    /// Page URL handed to the tool; `{id}` is replaced with the video id.
    pub target_url_template: String,
    pub name_prefix: String,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            image: "twitch-vod-recovery".to_string(),
            command: vec!["python".to_string(), "vod_recovery.py".to_string()],
            script: vec!["3".to_string(), "3".to_string(), URL_PLACEHOLDER.to_string()],
            timeout: Duration::from_secs(120),
            target_url_template: format!("https://twitch.tv/videos/{ID_PLACEHOLDER}"),
            name_prefix: "vodrec".to_string(),
        }
    }
}

/// Runs the recovery tool in a throwaway container and scrapes the manifest URL.
pub struct RecoveryDriver {
    runtime: Arc<dyn ContainerRuntime>,
    config: RecoveryConfig,
}

impl RecoveryDriver {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: RecoveryConfig) -> Self {
        Self { runtime, config }
    }

    pub fn target_url(&self, video_id: &str) -> String {
        self.config
            .target_url_template
            .replace(ID_PLACEHOLDER, video_id)
    }

    fn container_spec(&self, target_url: &str) -> ContainerSpec {
        ContainerSpec {
            name: format!("{}-{}", self.config.name_prefix, Uuid::new_v4().simple()),
            image: self.config.image.clone(),
            command: self
                .config
                .command
                .iter()
                .map(|arg| arg.replace(URL_PLACEHOLDER, target_url))
                .collect(),
        }
    }

    /// Recover the manifest URL for a fully-qualified video page URL.
    ///
    /// The container is stopped and removed whatever the outcome.
    pub async fn recover(&self, target_url: &str) -> Result<String, ResolveError> {
        let deadline = Instant::now() + self.config.timeout;
        let spec = self.container_spec(target_url);

        let id = match tokio::time::timeout_at(deadline, self.runtime.create(&spec)).await {
            Ok(id) => id?,
            Err(_) => {
                // The engine may have created the container before the deadline hit.
                warn!(name = %spec.name, timeout = ?self.config.timeout, "Recovery container creation timed out");
                self.teardown(&ContainerId(spec.name.clone())).await;
                return Err(ResolveError::RecoveryTimeout(self.config.timeout));
            }
        };
        info!(container = %id, name = %spec.name, image = %spec.image, target_url, "Recovery container created");

        let result = match tokio::time::timeout_at(deadline, self.run_job(&id, target_url)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(container = %id, timeout = ?self.config.timeout, "Recovery job timed out");
                Err(ResolveError::RecoveryTimeout(self.config.timeout))
            }
        };

        self.teardown(&id).await;
        result
    }

    async fn run_job(&self, id: &ContainerId, target_url: &str) -> Result<String, ResolveError> {
        self.runtime.start(id).await?;
        debug!(container = %id, "Recovery container started");

        let mut stream = self.runtime.attach(id).await?;
        let mut job = RecoveryJob::new(target_url, &self.config.script);
        let url = drive(&mut job, &mut stream).await?;

        info!(container = %id, url = %url, "Recovered manifest url");
        Ok(url)
    }

    async fn teardown(&self, id: &ContainerId) {
        if let Err(e) = self.runtime.stop(id).await {
            warn!(container = %id, error = %e, "Failed to stop recovery container");
        }
        match self.runtime.remove(id).await {
            Ok(()) => debug!(container = %id, "Recovery container stopped and removed"),
            Err(e) => warn!(container = %id, error = %e, "Failed to remove recovery container"),
        }
    }
}

#[async_trait]
impl ManifestSource for RecoveryDriver {
    fn name(&self) -> &'static str {
        "recovery"
    }

    async fn resolve(&self, video_id: &str) -> Result<String, ResolveError> {
        let target_url = self.target_url(video_id);
        self.recover(&target_url).await
    }
}

/// Feed stdout chunks to `job` and answer on stdin until it yields a URL.
pub(crate) async fn drive(
    job: &mut RecoveryJob,
    stream: &mut AttachedStream,
) -> Result<String, ResolveError> {
    while let Some(chunk) = stream.output.next().await {
        match chunk? {
            OutputChunk::Stderr(data) => {
                warn!(
                    target_url = job.target_url(),
                    stderr = %String::from_utf8_lossy(&data).trim_end(),
                    "Recovery tool wrote to stderr"
                );
            }
            OutputChunk::Stdout(data) => {
                let text = String::from_utf8_lossy(&data);
                debug!(output = %text, "Recovery tool output");

                match job.on_stdout(&text)? {
                    JobStep::Send(line) => {
                        stream
                            .input
                            .write_all(format!("{line}\n").as_bytes())
                            .await
                            .map_err(ContainerError::from)?;
                        stream.input.flush().await.map_err(ContainerError::from)?;
                    }
                    JobStep::Resolved(url) => return Ok(url),
                    JobStep::Idle => {}
                }
            }
        }
    }

    job.fail();
    Err(ContainerError::StreamClosed.into())
}
