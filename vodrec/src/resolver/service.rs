//! Cache-first resolution of video ids into manifest URLs.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};
use twitch_vod::{ManifestSource, ResolveError};

use super::ResolveStrategy;
use crate::cache::{VodCache, is_video_id};
use crate::{Error, Result};

/// Source name reported for cache hits.
pub const CACHE_SOURCE: &str = "cache";

/// A manifest URL and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVideo {
    pub id: String,
    pub url: String,
    pub source: &'static str,
}

/// Resolves video ids through the cache and an ordered chain of sources.
///
/// Concurrent misses for one id share a single resolution. The resolution runs
/// in its own task, so it finishes (and tears down any container) even if the
/// request that started it goes away.
pub struct VodService {
    cache: Arc<VodCache>,
    sources: Arc<[Arc<dyn ManifestSource>]>,
    strategy: ResolveStrategy,
}

impl VodService {
    pub fn new(
        cache: Arc<VodCache>,
        strategy: ResolveStrategy,
        sources: Vec<Arc<dyn ManifestSource>>,
    ) -> Result<Self> {
        if sources.is_empty() {
            return Err(Error::config(format!(
                "strategy {strategy} has no manifest sources"
            )));
        }
        Ok(Self {
            cache,
            sources: sources.into(),
            strategy,
        })
    }

    pub fn cache(&self) -> &Arc<VodCache> {
        &self.cache
    }

    pub fn strategy(&self) -> ResolveStrategy {
        self.strategy
    }

    pub fn source_names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn resolve(&self, id: &str) -> Result<ResolvedVideo> {
        if !is_video_id(id) {
            return Err(Error::invalid_video_id(id));
        }

        if let Some(url) = self.cache.get(id) {
            debug!(video_id = %id, "Cache hit");
            return Ok(ResolvedVideo {
                id: id.to_string(),
                url,
                source: CACHE_SOURCE,
            });
        }

        let (request, is_new) = self.cache.get_or_create_in_flight(id);
        if !is_new {
            debug!(video_id = %id, "Joining in-flight resolution");
            return match self.cache.wait_for_in_flight(&request).await {
                Ok((url, source)) => Ok(ResolvedVideo {
                    id: id.to_string(),
                    url,
                    source,
                }),
                Err(message) => Err(Error::SharedResolution {
                    id: id.to_string(),
                    message,
                }),
            };
        }

        // A resolution may have completed between the cache check and taking ownership.
        if let Some(url) = self.cache.get(id) {
            debug!(video_id = %id, "Cache filled while acquiring in-flight slot");
            self.cache
                .release_in_flight(id, &request, Ok((url.clone(), CACHE_SOURCE)));
            return Ok(ResolvedVideo {
                id: id.to_string(),
                url,
                source: CACHE_SOURCE,
            });
        }

        let task = {
            let cache = self.cache.clone();
            let sources = self.sources.clone();
            let request = request.clone();
            let id = id.to_string();
            tokio::spawn(async move {
                let result = resolve_with(&sources, &id).await;
                match &result {
                    Ok((url, source)) => cache.complete_in_flight(&id, &request, url.clone(), *source),
                    Err(e) => cache.fail_in_flight(&id, &request, e.to_string()),
                }
                result
            })
        };

        match task.await {
            Ok(Ok((url, source))) => Ok(ResolvedVideo {
                id: id.to_string(),
                url,
                source,
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => {
                let message = format!("resolution task failed: {e}");
                self.cache.fail_in_flight(id, &request, message.clone());
                Err(Error::Other(message))
            }
        }
    }
}

/// Try each source in order. The last source's error is returned if none
/// succeeds.
async fn resolve_with(
    sources: &[Arc<dyn ManifestSource>],
    id: &str,
) -> std::result::Result<(String, &'static str), ResolveError> {
    let mut last_error = None;

    for source in sources {
        let started = Instant::now();
        match source.resolve(id).await {
            Ok(url) => {
                info!(
                    video_id = %id,
                    source = source.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    url = %url,
                    "Resolved manifest URL"
                );
                return Ok((url, source.name()));
            }
            Err(e) => {
                warn!(
                    video_id = %id,
                    source = source.name(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %e,
                    "Manifest source failed"
                );
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ResolveError::NotFound(format!("no source resolved video {id}"))))
}
