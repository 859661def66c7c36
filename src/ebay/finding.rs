use crate::config::HttpConfig;
use crate::ebay::config::FindingConfig;
use crate::http::{body_excerpt, build_client};
use crate::pricing::{PriceError, SalesSource, first_element};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

const OPERATION: &str = "findCompletedItems";
const RESPONSE_KEY: &str = "findCompletedItemsResponse";

/// Completed-items search against the eBay Finding service (JSON encoding).
pub struct FindingClient {
    http: Client,
    config: FindingConfig,
}

impl FindingClient {
    pub fn new(config: FindingConfig, http: &HttpConfig) -> Self {
        Self {
            http: build_client(http),
            config,
        }
    }

    fn query_params(&self, terms: &str) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = [
            ("OPERATION-NAME", OPERATION),
            ("SERVICE-VERSION", "1.0.0"),
            ("SECURITY-APPNAME", self.config.app_id.expose()),
            ("GLOBAL-ID", self.config.global_id.as_str()),
            ("RESPONSE-DATA-FORMAT", "JSON"),
            ("REST-PAYLOAD", ""),
            ("keywords", terms),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut filters = vec![("SoldItemsOnly", "true"), ("HideDuplicateItems", "true")];
        if let Some(condition) = self.config.condition.as_deref() {
            filters.push(("Condition", condition));
        }
        for (idx, (name, value)) in filters.into_iter().enumerate() {
            params.push((format!("itemFilter({idx}).name"), name.to_string()));
            params.push((format!("itemFilter({idx}).value"), value.to_string()));
        }
        params.push((
            "paginationInput.entriesPerPage".into(),
            self.config.entries_per_page.to_string(),
        ));
        params
    }
}

#[async_trait]
impl SalesSource for FindingClient {
    async fn completed_sales(&self, terms: &str) -> Result<Vec<Value>, PriceError> {
        if self.config.app_id.is_empty() {
            return Err(PriceError::MissingAppId);
        }
        let response = self
            .http
            .get(self.config.endpoint_url())
            .query(&self.query_params(terms))
            .send()
            .await
            .map_err(|err| PriceError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| PriceError::Request(err.to_string()))?;
        if !status.is_success() {
            return Err(PriceError::Status {
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|err| PriceError::InvalidResponse(err.to_string()))?;
        let items = items_from_response(&payload)?;
        debug!(target = "lister.ebay", terms, items = items.len(), "completed_items_fetched");
        Ok(items)
    }
}

/// Unwraps the item list, turning a `Failure` ack into an error.
pub fn items_from_response(payload: &Value) -> Result<Vec<Value>, PriceError> {
    let Some(root) = payload.get(RESPONSE_KEY).map(first_element) else {
        if let Some(message) = error_message(payload) {
            return Err(PriceError::Rejected(message));
        }
        return Err(PriceError::InvalidResponse(format!("missing {RESPONSE_KEY}")));
    };

    let ack = root
        .get("ack")
        .map(first_element)
        .and_then(Value::as_str)
        .unwrap_or("Success");
    if ack.eq_ignore_ascii_case("Failure") {
        let message = error_message(root).unwrap_or_else(|| "ack=Failure".to_string());
        return Err(PriceError::Rejected(message));
    }

    let items = root
        .get("searchResult")
        .map(first_element)
        .and_then(|result| result.get("item"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    Ok(items)
}

fn error_message(value: &Value) -> Option<String> {
    let error = first_element(value.get("errorMessage")?);
    let detail = first_element(error.get("error")?);
    let message = first_element(detail.get("message")?).as_str()?;
    Some(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Secret;
    use crate::pricing::extract_sale_price;
    use serde_json::json;

    fn client(condition: Option<&str>) -> FindingClient {
        let config = FindingConfig {
            app_id: Secret::new("app-123"),
            condition: condition.map(str::to_string),
            ..FindingConfig::default()
        };
        FindingClient::new(config, &HttpConfig::default())
    }

    fn param<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
        params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    #[test]
    fn query_requests_sold_items_only() {
        let params = client(Some("Used")).query_params("Acme Kettle");
        assert_eq!(param(&params, "OPERATION-NAME"), Some("findCompletedItems"));
        assert_eq!(param(&params, "SECURITY-APPNAME"), Some("app-123"));
        assert_eq!(param(&params, "keywords"), Some("Acme Kettle"));
        assert_eq!(param(&params, "itemFilter(0).name"), Some("SoldItemsOnly"));
        assert_eq!(param(&params, "itemFilter(0).value"), Some("true"));
        assert_eq!(param(&params, "itemFilter(2).name"), Some("Condition"));
        assert_eq!(param(&params, "itemFilter(2).value"), Some("Used"));
        assert_eq!(param(&params, "paginationInput.entriesPerPage"), Some("100"));
    }

    #[test]
    fn condition_filter_is_optional() {
        let params = client(None).query_params("Acme Kettle");
        assert_eq!(param(&params, "itemFilter(2).name"), None);
    }

    #[tokio::test]
    async fn missing_app_id_fails_before_network() {
        let client = FindingClient::new(FindingConfig::default(), &HttpConfig::default());
        let err = client.completed_sales("x").await.expect_err("no app id");
        assert!(matches!(err, PriceError::MissingAppId));
    }

    #[test]
    fn sandbox_shorthand() {
        let config = FindingConfig {
            endpoint: "sandbox".into(),
            ..FindingConfig::default()
        };
        assert_eq!(config.endpoint_url(), crate::ebay::config::SANDBOX_FINDING_URL);
    }

    #[test]
    fn items_are_unwrapped() {
        let payload = json!({
            "findCompletedItemsResponse": [{
                "ack": ["Success"],
                "searchResult": [{
                    "@count": "3",
                    "item": [
                        {"sellingStatus": [{"currentPrice": [{"@currencyId": "USD", "__value__": "20.0"}]}]},
                        {"sellingStatus": [{"currentPrice": [{"@currencyId": "USD", "__value__": "30.0"}]}]},
                        {"title": ["no selling status"]}
                    ]
                }]
            }]
        });
        let items = items_from_response(&payload).expect("items");
        assert_eq!(items.len(), 3);
        let prices: Vec<f64> = items.iter().filter_map(extract_sale_price).collect();
        assert_eq!(prices, vec![20.0, 30.0]);
    }

    #[test]
    fn empty_search_result() {
        let payload = json!({
            "findCompletedItemsResponse": [{
                "ack": ["Success"],
                "searchResult": [{"@count": "0"}]
            }]
        });
        assert!(items_from_response(&payload).expect("items").is_empty());
    }

    #[test]
    fn failure_ack_is_rejected() {
        let payload = json!({
            "findCompletedItemsResponse": [{
                "ack": ["Failure"],
                "errorMessage": [{"error": [{"message": ["Invalid keywords"]}]}]
            }]
        });
        let err = items_from_response(&payload).expect_err("failure");
        assert!(matches!(err, PriceError::Rejected(ref m) if m == "Invalid keywords"));
    }

    #[test]
    fn top_level_error_envelope() {
        let payload = json!({
            "errorMessage": [{"error": [{"message": ["Invalid Application: app-123"]}]}]
        });
        let err = items_from_response(&payload).expect_err("auth");
        assert!(matches!(err, PriceError::Rejected(_)));
    }
}
