use crate::config::Secret;
use serde::Deserialize;

pub const PRODUCTION_FINDING_URL: &str = "https://svcs.ebay.com/services/search/FindingService/v1";
pub const SANDBOX_FINDING_URL: &str =
    "https://svcs.sandbox.ebay.com/services/search/FindingService/v1";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FindingConfig {
    pub endpoint: String,
    pub app_id: Secret,
    pub global_id: String,
    /// `None` searches every condition.
    pub condition: Option<String>,
    pub entries_per_page: u32,
}

impl Default for FindingConfig {
    fn default() -> Self {
        Self {
            endpoint: PRODUCTION_FINDING_URL.to_string(),
            app_id: Secret::default(),
            global_id: "EBAY-US".to_string(),
            condition: Some("Used".to_string()),
            entries_per_page: 100,
        }
    }
}

impl FindingConfig {
    /// Accepts `sandbox`/`production` shorthands as well as a full URL.
    pub fn endpoint_url(&self) -> &str {
        let endpoint = self.endpoint.trim();
        if endpoint.eq_ignore_ascii_case("sandbox") {
            SANDBOX_FINDING_URL
        } else if endpoint.eq_ignore_ascii_case("production") || endpoint.eq_ignore_ascii_case("prod") {
            PRODUCTION_FINDING_URL
        } else {
            endpoint
        }
    }
}
