//! Containerized recovery of manifests for VODs the API no longer exposes.

mod container;
mod docker;
mod driver;
mod job;
mod url_match;

pub use container::{AttachedStream, ContainerId, ContainerRuntime, ContainerSpec, OutputChunk};
pub use docker::DockerCli;
pub use driver::{ID_PLACEHOLDER, RecoveryConfig, RecoveryDriver};
pub use job::{JobState, JobStep, RecoveryJob, URL_PLACEHOLDER};
pub use url_match::{URL_REGEX, first_url};
