use std::time::Duration;

use reqwest::{Client, ClientBuilder};

pub(crate) const DEFAULT_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

/// Request timeout applied to every Twitch API call.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client builder with the crate's user agent and request timeout.
pub fn create_client_builder(timeout: Option<Duration>) -> ClientBuilder {
    Client::builder()
        .user_agent(DEFAULT_UA)
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
}

pub fn default_client() -> Result<Client, reqwest::Error> {
    create_client_builder(None).build()
}
