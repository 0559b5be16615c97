use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tokio::io::AsyncWrite;

use crate::error::ContainerError;

/// What to run in an isolated unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
}

/// Engine-assigned container id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single read from the attached output of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputChunk {
    Stdout(Bytes),
    Stderr(Bytes),
}

/// Bidirectional stream to a running container's stdio.
pub struct AttachedStream {
    pub input: Box<dyn AsyncWrite + Send + Unpin>,
    pub output: BoxStream<'static, Result<OutputChunk, ContainerError>>,
    /// Resources that must live as long as the stream, e.g. the attach process.
    pub guard: Option<Box<dyn Any + Send>>,
}

impl AttachedStream {
    pub fn new(
        input: impl AsyncWrite + Send + Unpin + 'static,
        output: BoxStream<'static, Result<OutputChunk, ContainerError>>,
    ) -> Self {
        Self {
            input: Box::new(input),
            output,
            guard: None,
        }
    }

    pub fn with_guard(mut self, guard: impl Any + Send) -> Self {
        self.guard = Some(Box::new(guard));
        self
    }
}

impl fmt::Debug for AttachedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttachedStream")
            .field("guard", &self.guard.is_some())
            .finish_non_exhaustive()
    }
}

/// The five container-engine operations the recovery driver depends on.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Create a container with stdin open and stdout/stderr attached, without a TTY.
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError>;

    async fn start(&self, id: &ContainerId) -> Result<(), ContainerError>;

    async fn attach(&self, id: &ContainerId) -> Result<AttachedStream, ContainerError>;

    async fn stop(&self, id: &ContainerId) -> Result<(), ContainerError>;

    async fn remove(&self, id: &ContainerId) -> Result<(), ContainerError>;
}
