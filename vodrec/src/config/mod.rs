//! Application configuration loaded from environment variables.
//!
//! Unset variables fall back to defaults. Unparsable numbers fall back with a
//! warning; anything that would change behavior in a surprising way (an
//! unknown strategy, a proxy template without `{url}`) is an error.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;
use twitch_vod::recovery::URL_PLACEHOLDER;
use twitch_vod::{MetadataConfig, RecoveryConfig};

use crate::cache::CacheConfig;
use crate::resolver::ResolveStrategy;
use crate::{Error, Result};

pub const ENV_STRATEGY: &str = "VODREC_STRATEGY";
pub const ENV_CACHE_PATH: &str = "VODREC_CACHE_PATH";
pub const ENV_CACHE_TTL_SECS: &str = "VODREC_CACHE_TTL_SECS";
pub const ENV_CACHE_DEBOUNCE_MS: &str = "VODREC_CACHE_DEBOUNCE_MS";
pub const ENV_RECOVERY_IMAGE: &str = "VODREC_RECOVERY_IMAGE";
pub const ENV_RECOVERY_COMMAND: &str = "VODREC_RECOVERY_COMMAND";
pub const ENV_RECOVERY_SCRIPT: &str = "VODREC_RECOVERY_SCRIPT";
pub const ENV_RECOVERY_TIMEOUT_SECS: &str = "VODREC_RECOVERY_TIMEOUT_SECS";
pub const ENV_TARGET_URL_TEMPLATE: &str = "VODREC_TARGET_URL_TEMPLATE";
pub const ENV_DOCKER_PATH: &str = "DOCKER_PATH";
pub const ENV_DOCKER_STOP_TIMEOUT_SECS: &str = "VODREC_DOCKER_STOP_TIMEOUT_SECS";
pub const ENV_GQL_URL: &str = "VODREC_GQL_URL";
pub const ENV_TWITCH_CLIENT_ID: &str = "VODREC_TWITCH_CLIENT_ID";
pub const ENV_PROXY_URL_TEMPLATE: &str = "VODREC_PROXY_URL_TEMPLATE";
pub const ENV_PUBLIC_DIR: &str = "VODREC_PUBLIC_DIR";
pub const ENV_LOG_DIR: &str = "VODREC_LOG_DIR";

/// Separator between scripted stdin lines in `VODREC_RECOVERY_SCRIPT`.
const SCRIPT_SEPARATOR: char = '|';

/// Proxy mode: serve a player page pointing at a proxied manifest instead of
/// redirecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Proxy link template; `{url}` receives the percent-encoded manifest URL.
    pub url_template: String,
}

impl ProxyConfig {
    pub fn new(url_template: impl Into<String>) -> Result<Self> {
        let url_template = url_template.into();
        if !url_template.contains(URL_PLACEHOLDER) {
            return Err(Error::config(format!(
                "{ENV_PROXY_URL_TEMPLATE} must contain {URL_PLACEHOLDER}"
            )));
        }
        Ok(Self { url_template })
    }

    /// Build the proxy link for a manifest URL.
    pub fn proxy_url(&self, manifest_url: &str) -> String {
        self.url_template
            .replace(URL_PLACEHOLDER, &urlencoding::encode(manifest_url))
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub strategy: ResolveStrategy,
    pub cache: CacheConfig,
    pub recovery: RecoveryConfig,
    pub docker_path: String,
    /// Grace period `docker stop` gives the tool before killing it.
    pub docker_stop_timeout_secs: u32,
    pub metadata: MetadataConfig,
    pub proxy: Option<ProxyConfig>,
    pub public_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            strategy: ResolveStrategy::default(),
            cache: CacheConfig::default(),
            recovery: RecoveryConfig::default(),
            docker_path: "docker".to_string(),
            docker_stop_timeout_secs: 5,
            metadata: MetadataConfig::default(),
            proxy: None,
            public_dir: PathBuf::from("public"),
            log_dir: None,
        }
    }
}

impl AppConfig {
    pub fn from_env_or_default() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(strategy) = get(ENV_STRATEGY) {
            config.strategy = strategy.parse()?;
        }

        // An explicitly empty cache path keeps the cache in memory.
        if let Some(path) = lookup(ENV_CACHE_PATH) {
            config.cache.path = (!path.trim().is_empty()).then(|| PathBuf::from(path.trim()));
        }
        if let Some(secs) = parse_or_warn::<u64>(ENV_CACHE_TTL_SECS, get(ENV_CACHE_TTL_SECS)) {
            config.cache.ttl = Duration::from_secs(secs);
        }
        if let Some(ms) = parse_or_warn::<u64>(ENV_CACHE_DEBOUNCE_MS, get(ENV_CACHE_DEBOUNCE_MS)) {
            config.cache.debounce = Duration::from_millis(ms);
        }

        if let Some(image) = get(ENV_RECOVERY_IMAGE) {
            config.recovery.image = image.trim().to_string();
        }
        if let Some(command) = get(ENV_RECOVERY_COMMAND) {
            config.recovery.command = command.split_whitespace().map(str::to_string).collect();
        }
        // An explicitly empty script means the tool takes the URL as an argument.
        if let Some(script) = lookup(ENV_RECOVERY_SCRIPT) {
            config.recovery.script = parse_script(&script);
        }
        if let Some(secs) =
            parse_or_warn::<u64>(ENV_RECOVERY_TIMEOUT_SECS, get(ENV_RECOVERY_TIMEOUT_SECS))
        {
            config.recovery.timeout = Duration::from_secs(secs);
        }
        if let Some(template) = get(ENV_TARGET_URL_TEMPLATE) {
            config.recovery.target_url_template = template.trim().to_string();
        }
        if let Some(docker) = get(ENV_DOCKER_PATH) {
            config.docker_path = docker.trim().to_string();
        }
        if let Some(secs) = parse_or_warn::<u32>(
            ENV_DOCKER_STOP_TIMEOUT_SECS,
            get(ENV_DOCKER_STOP_TIMEOUT_SECS),
        ) {
            config.docker_stop_timeout_secs = secs;
        }

        if let Some(gql_url) = get(ENV_GQL_URL) {
            config.metadata.gql_url = gql_url.trim().to_string();
        }
        if let Some(client_id) = get(ENV_TWITCH_CLIENT_ID) {
            config.metadata.client_id = client_id.trim().to_string();
        }

        if let Some(template) = get(ENV_PROXY_URL_TEMPLATE) {
            config.proxy = Some(ProxyConfig::new(template.trim())?);
        }
        if let Some(dir) = get(ENV_PUBLIC_DIR) {
            config.public_dir = PathBuf::from(dir.trim());
        }
        if let Some(dir) = get(ENV_LOG_DIR) {
            config.log_dir = Some(PathBuf::from(dir.trim()));
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.strategy.uses_recovery() && self.recovery.command.is_empty() {
            return Err(Error::config(format!("{ENV_RECOVERY_COMMAND} is empty")));
        }
        if self.recovery.timeout.is_zero() {
            return Err(Error::config(format!("{ENV_RECOVERY_TIMEOUT_SECS} must be positive")));
        }
        url::Url::parse(&self.metadata.gql_url)
            .map_err(|e| Error::config(format!("{ENV_GQL_URL} is not a valid URL: {e}")))?;
        Ok(())
    }
}

fn parse_script(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    raw.split(SCRIPT_SEPARATOR).map(str::to_string).collect()
}

fn parse_or_warn<T>(key: &str, value: Option<String>) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let value = value?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(key, value = %value, error = %e, "Ignoring unparsable setting, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.strategy, ResolveStrategy::Recovery);
        assert_eq!(config.cache.path, Some(PathBuf::from("cache.json")));
        assert_eq!(config.cache.ttl, Duration::from_secs(172_800));
        assert_eq!(config.cache.debounce, Duration::from_millis(4000));
        assert_eq!(config.recovery.script, vec!["3", "3", "{url}"]);
        assert_eq!(config.recovery.timeout, Duration::from_secs(120));
        assert_eq!(config.docker_path, "docker");
        assert_eq!(config.docker_stop_timeout_secs, 5);
        assert!(config.proxy.is_none());
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            (ENV_STRATEGY, "metadata-then-recovery"),
            (ENV_CACHE_PATH, "/var/lib/vodrec/cache.json"),
            (ENV_CACHE_TTL_SECS, "60"),
            (ENV_RECOVERY_COMMAND, "python3  recover.py --url {url}"),
            (ENV_RECOVERY_SCRIPT, "1|{url}"),
            (ENV_PROXY_URL_TEMPLATE, "https://proxy.example.com/?u={url}"),
            (ENV_LOG_DIR, "logs"),
            (ENV_DOCKER_STOP_TIMEOUT_SECS, "20"),
        ])
        .unwrap();

        assert_eq!(config.strategy, ResolveStrategy::MetadataThenRecovery);
        assert_eq!(config.cache.path, Some(PathBuf::from("/var/lib/vodrec/cache.json")));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.recovery.command, vec!["python3", "recover.py", "--url", "{url}"]);
        assert_eq!(config.recovery.script, vec!["1", "{url}"]);
        assert!(config.proxy.is_some());
        assert_eq!(config.log_dir, Some(PathBuf::from("logs")));
        assert_eq!(config.docker_stop_timeout_secs, 20);
    }

    #[test]
    fn empty_script_and_cache_path_disable_them() {
        let config = config_from(&[(ENV_RECOVERY_SCRIPT, ""), (ENV_CACHE_PATH, "")]).unwrap();

        assert!(config.recovery.script.is_empty());
        assert!(config.cache.path.is_none());
    }

    #[test]
    fn unparsable_numbers_fall_back() {
        let config = config_from(&[(ENV_CACHE_TTL_SECS, "two days")]).unwrap();
        assert_eq!(config.cache.ttl, Duration::from_secs(172_800));
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(matches!(
            config_from(&[(ENV_STRATEGY, "guess")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            config_from(&[(ENV_PROXY_URL_TEMPLATE, "https://proxy.example.com/")]),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            config_from(&[(ENV_RECOVERY_TIMEOUT_SECS, "0")]),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn proxy_url_encodes_manifest() {
        let proxy = ProxyConfig::new("https://proxy.example.com/hls?url={url}").unwrap();
        assert_eq!(
            proxy.proxy_url("https://cdn.example.com/a b/index-dvr.m3u8?x=1"),
            "https://proxy.example.com/hls?url=https%3A%2F%2Fcdn.example.com%2Fa%20b%2Findex-dvr.m3u8%3Fx%3D1"
        );
    }
}
