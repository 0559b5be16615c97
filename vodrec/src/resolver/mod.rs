//! Video id resolution: cache lookup, single-flight and the source chain.

mod service;
mod strategy;

pub use service::{CACHE_SOURCE, ResolvedVideo, VodService};
pub use strategy::ResolveStrategy;
