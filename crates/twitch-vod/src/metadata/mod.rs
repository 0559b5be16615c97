//! Manifest derivation from Twitch GraphQL metadata.

mod models;
mod resolver;

pub use models::{VideoMetadata, VideoOwner};
pub use resolver::{MetadataConfig, MetadataResolver, manifest_url_from_preview};
