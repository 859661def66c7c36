use crate::config::HttpConfig;
use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("upc-lister/", env!("CARGO_PKG_VERSION"));

pub fn build_client(config: &HttpConfig) -> Client {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Trims a response body for inclusion in an error message.
pub fn body_excerpt(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(300) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
