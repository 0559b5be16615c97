//! Twitch VOD manifest resolution.
//!
//! Two ways of turning a video id into an HLS manifest URL live here:
//!
//! - [`metadata::MetadataResolver`] asks the Twitch GraphQL API for the video's
//!   seek-preview URL and derives the manifest from the CDN path convention.
//! - [`recovery::RecoveryDriver`] runs an external recovery tool inside a
//!   container and scrapes the manifest URL from its output. This also works for
//!   VODs whose metadata has already been deleted.
//!
//! Both implement [`ManifestSource`] so callers can chain them.

pub mod client;
pub mod error;
pub mod metadata;
pub mod recovery;
pub mod source;

pub use error::{ContainerError, ResolveError};
pub use metadata::{MetadataConfig, MetadataResolver};
pub use recovery::{
    AttachedStream, ContainerRuntime, ContainerSpec, DockerCli, OutputChunk, RecoveryConfig,
    RecoveryDriver,
};
pub use source::ManifestSource;
