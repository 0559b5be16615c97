//! Video routes.
//!
//! `GET /videos/{id}` resolves the manifest and answers in one of three ways:
//! a redirect to the manifest, a redirect into VLC (`?vlc=1`), or, in proxy
//! mode, an HTML player pointed at the proxied manifest.

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tracing::{error, info};

use crate::api::client_addr::ClientAddr;
use crate::api::error::{ApiError, ApiResult};
use crate::api::server::AppState;
use crate::config::ProxyConfig;
use crate::resolver::ResolvedVideo;

/// Player page served in proxy mode.
const PLAYER_TEMPLATE: &str = include_str!("../../../templates/player.html");

/// Placeholder in [`PLAYER_TEMPLATE`] replaced with the proxied manifest link.
const MANIFEST_PLACEHOLDER: &str = "{{MANIFEST_URL}}";

const VLC_CALLBACK_PREFIX: &str = "vlc-x-callback://x-callback-url/stream?url=";

pub fn router() -> Router<AppState> {
    Router::new().route("/{id}", get(get_video))
}

#[derive(Debug, Default, Deserialize)]
pub struct VideoQuery {
    pub vlc: Option<String>,
}

impl VideoQuery {
    fn wants_vlc(&self) -> bool {
        self.vlc
            .as_deref()
            .map(str::trim)
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }
}

async fn get_video(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<VideoQuery>,
    client: ClientAddr,
) -> ApiResult<Response> {
    info!(video_id = %id, client = %client, vlc = query.wants_vlc(), "Video requested");

    let resolved = state.service.resolve(&id).await.map_err(|e| {
        error!(video_id = %id, client = %client, error = %e, "Failed to resolve video");
        ApiError::from(e)
    })?;

    if query.wants_vlc() {
        return found(&vlc_link(&resolved.url));
    }

    if let Some(proxy) = &state.proxy {
        return proxy_player(&state, proxy, &resolved).await;
    }

    found(&resolved.url)
}

/// VLC x-callback link. The manifest URL is appended as is.
pub fn vlc_link(manifest_url: &str) -> String {
    format!("{VLC_CALLBACK_PREFIX}{manifest_url}")
}

fn found(location: &str) -> ApiResult<Response> {
    let location = HeaderValue::from_str(location)
        .map_err(|e| ApiError::internal(format!("Unusable redirect target: {e}")))?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

async fn proxy_player(
    state: &AppState,
    proxy: &ProxyConfig,
    resolved: &ResolvedVideo,
) -> ApiResult<Response> {
    let upstream = state
        .http_client
        .get(&resolved.url)
        .send()
        .await
        .map_err(|e| {
            error!(video_id = %resolved.id, url = %resolved.url, error = %e, "Manifest validation request failed");
            ApiError::bad_gateway(format!("Failed to fetch manifest: {e}"))
        })?;

    let status = upstream.status();
    if !status.is_success() {
        error!(video_id = %resolved.id, url = %resolved.url, status = %status, "Manifest validation failed");
        return Err(ApiError::bad_gateway(format!(
            "Manifest request returned HTTP {status}"
        )));
    }

    let page = render_player(&proxy.proxy_url(&resolved.url));
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
        page,
    )
        .into_response())
}

/// Fill the player template. The link lands in an HTML attribute.
pub fn render_player(manifest_link: &str) -> String {
    PLAYER_TEMPLATE.replace(MANIFEST_PLACEHOLDER, &escape_attr(manifest_link))
}

fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vlc_flag_values() {
        let q = |v: Option<&str>| VideoQuery {
            vlc: v.map(str::to_string),
        };
        assert!(q(Some("1")).wants_vlc());
        assert!(q(Some("true")).wants_vlc());
        assert!(q(Some("TRUE")).wants_vlc());
        assert!(!q(Some("0")).wants_vlc());
        assert!(!q(Some("")).wants_vlc());
        assert!(!q(None).wants_vlc());
    }

    #[test]
    fn vlc_link_keeps_manifest_verbatim() {
        assert_eq!(
            vlc_link("https://cdn.example.com/a.m3u8"),
            "vlc-x-callback://x-callback-url/stream?url=https://cdn.example.com/a.m3u8"
        );
    }

    #[test]
    fn player_receives_escaped_link() {
        let page = render_player("https://proxy.example.com/?a=1&url=x");
        assert!(page.contains("https://proxy.example.com/?a=1&amp;url=x"));
        assert!(!page.contains(MANIFEST_PLACEHOLDER));
    }
}
