use std::process::Stdio;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::process::Command;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::error::ContainerError;
use crate::recovery::container::{
    AttachedStream, ContainerId, ContainerRuntime, ContainerSpec, OutputChunk,
};

static DEFAULT_DOCKER_PATH: &str = "docker";

/// [`ContainerRuntime`] backed by the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    stop_timeout_secs: u32,
}

impl DockerCli {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            stop_timeout_secs: 5,
        }
    }

    pub fn with_stop_timeout(mut self, secs: u32) -> Self {
        self.stop_timeout_secs = secs;
        self
    }

    fn stop_args(&self, id: &ContainerId) -> Vec<String> {
        vec![
            "stop".to_owned(),
            "--time".to_owned(),
            self.stop_timeout_secs.to_string(),
            id.0.clone(),
        ]
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.kill_on_drop(true);
        cmd
    }

    async fn run(&self, op: &'static str, args: &[String]) -> Result<String, ContainerError> {
        debug!(binary = %self.binary, ?args, "Running container engine command");
        let out = self
            .command()
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(ContainerError::Spawn)?;

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr).trim().to_string();
            return Err(ContainerError::command(op, stderr));
        }

        Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_DOCKER_PATH)
    }
}

fn create_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = vec![
        "create".to_owned(),
        "--interactive".to_owned(),
        "--name".to_owned(),
        spec.name.clone(),
        spec.image.clone(),
    ];
    args.extend(spec.command.iter().cloned());
    args
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerId, ContainerError> {
        let stdout = self.run("docker create", &create_args(spec)).await?;
        // `docker create` may print pull progress before the id.
        let id = stdout
            .lines()
            .last()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ContainerError::command("docker create", "no container id returned"))?;
        Ok(ContainerId(id.to_string()))
    }

    async fn start(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.run("docker start", &["start".to_owned(), id.0.clone()])
            .await
            .map(|_| ())
    }

    async fn attach(&self, id: &ContainerId) -> Result<AttachedStream, ContainerError> {
        let mut child = self
            .command()
            .args(["attach", "--sig-proxy=false", id.0.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(ContainerError::Spawn)?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(ContainerError::command("docker attach", "stdio was not captured"));
        };

        let stdout = ReaderStream::new(stdout)
            .map(|chunk| chunk.map(OutputChunk::Stdout).map_err(ContainerError::from));
        let stderr = ReaderStream::new(stderr)
            .map(|chunk| chunk.map(OutputChunk::Stderr).map_err(ContainerError::from));
        let output = futures::stream::select(stdout, stderr).boxed();

        Ok(AttachedStream::new(stdin, output).with_guard(child))
    }

    async fn stop(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.run("docker stop", &self.stop_args(id)).await.map(|_| ())
    }

    async fn remove(&self, id: &ContainerId) -> Result<(), ContainerError> {
        self.run("docker rm", &["rm".to_owned(), "--force".to_owned(), id.0.clone()])
            .await
            .map(|_| ())
    }
}
