use crate::config::{HttpConfig, Secret};
use crate::http::{body_excerpt, build_client};
use crate::listing::ListingPayload;
use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use reqwest::{Client, header};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SellbriteConfig {
    pub base_url: String,
    pub account_token: Secret,
    pub secret_key: Secret,
}

impl Default for SellbriteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.sellbrite.com/v1".into(),
            account_token: Secret::default(),
            secret_key: Secret::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SellbriteError {
    #[error("missing listing backend account token or secret key")]
    MissingCredentials,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReceipt {
    pub status: u16,
    pub sku: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

#[async_trait]
pub trait ListingBackend: Send + Sync {
    /// Fails when no submission could be attempted, such as missing credentials.
    fn preflight(&self) -> Result<(), SellbriteError> {
        Ok(())
    }

    async fn submit(&self, payload: &ListingPayload) -> Result<SubmissionReceipt, SellbriteError>;
}

/// Standard HTTP Basic credentials: `Basic base64(token:secret)`.
pub fn basic_authorization(token: &str, secret: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{token}:{secret}")))
}

pub struct SellbriteClient {
    http: Client,
    config: SellbriteConfig,
}

impl SellbriteClient {
    pub fn new(config: SellbriteConfig, http: &HttpConfig) -> Self {
        Self {
            http: build_client(http),
            config,
        }
    }

    fn authorization(&self) -> Result<String, SellbriteError> {
        if self.config.account_token.is_empty() || self.config.secret_key.is_empty() {
            return Err(SellbriteError::MissingCredentials);
        }
        Ok(basic_authorization(
            self.config.account_token.expose(),
            self.config.secret_key.expose(),
        ))
    }
}

#[async_trait]
impl ListingBackend for SellbriteClient {
    fn preflight(&self) -> Result<(), SellbriteError> {
        self.authorization().map(|_| ())
    }

    async fn submit(&self, payload: &ListingPayload) -> Result<SubmissionReceipt, SellbriteError> {
        let authorization = self.authorization()?;
        let base = self.config.base_url.trim().trim_end_matches('/');
        let response = self
            .http
            .post(format!("{base}/products"))
            .header(header::AUTHORIZATION, authorization)
            .json(payload)
            .send()
            .await
            .map_err(|err| SellbriteError::Request(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SellbriteError::Request(err.to_string()))?;
        if !status.is_success() {
            return Err(SellbriteError::Status {
                status: status.as_u16(),
                body: body_excerpt(&body),
            });
        }

        Ok(SubmissionReceipt {
            status: status.as_u16(),
            sku: payload.sku.clone(),
            response: serde_json::from_str(&body).ok(),
        })
    }
}
