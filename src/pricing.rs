use crate::models::ScannedCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Share of the average sold price used as the listing price.
pub const DEFAULT_MARKDOWN: f64 = 0.5;

const CURRENCY_SYMBOLS: &[char] = &[
    '$', '€', '£', '¥', '₹', '¢', '₩', '₽', '₺', '₪', '฿', '₱', '₦',
];

#[derive(Debug, Error)]
pub enum PriceError {
    #[error("missing sales data application id")]
    MissingAppId,
    #[error("request failed: {0}")]
    Request(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("sales source rejected the query: {0}")]
    Rejected(String),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("no usable sold prices for {terms:?} ({records} records returned)")]
    NoPriceData { terms: String, records: usize },
}

impl PriceError {
    pub fn is_no_price_data(&self) -> bool {
        matches!(self, Self::NoPriceData { .. })
    }
}

/// Which text is sent to the completed-sales search.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceQuery {
    #[default]
    Title,
    Code,
}

impl FromStr for PriceQuery {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "code" | "upc" | "barcode" => Ok(Self::Code),
            other => Err(format!("expected `title` or `code`, got `{other}`")),
        }
    }
}

impl PriceQuery {
    /// Search terms for a run; an empty title falls back to the code.
    pub fn terms(self, title: &str, code: &ScannedCode) -> String {
        let title = title.trim();
        match self {
            Self::Title if !title.is_empty() => title.to_string(),
            _ => code.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PricingPolicy {
    pub markdown: f64,
    pub query: PriceQuery,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            markdown: DEFAULT_MARKDOWN,
            query: PriceQuery::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEstimate {
    pub listing_price: f64,
    pub mean: f64,
    pub samples: usize,
    pub skipped: usize,
    pub markdown: f64,
}

impl PriceEstimate {
    /// `None` when there is nothing to average.
    pub fn from_samples(samples: &[f64], skipped: usize, markdown: f64) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mean = samples.iter().sum::<f64>() / samples.len() as f64;
        Some(Self {
            listing_price: mean * markdown,
            mean,
            samples: samples.len(),
            skipped,
            markdown,
        })
    }
}

/// Currency codes accepted around an amount, matched case-insensitively as
/// whole words.
const CURRENCY_CODES: &[&str] = &[
    "USD", "US", "EUR", "GBP", "CAD", "AUD", "NZD", "CHF", "JPY", "MXN", "C", "A", "R",
];

/// Parses a human-written amount such as `$19.99`, `USD 19.99`, `US $1,299.00`
/// or `19,99 €`. Negative input, unknown words and units yield `None`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let text = strip_trailing_marker(strip_leading_marker(raw.trim()));
    if text.is_empty() {
        return None;
    }

    let normalized = normalize_separators(text)?;
    if !normalized.chars().all(|c| c.is_ascii_digit() || c == '.')
        || !normalized.chars().any(|c| c.is_ascii_digit())
    {
        return None;
    }
    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

fn is_currency_code(word: &str) -> bool {
    CURRENCY_CODES
        .iter()
        .any(|code| code.eq_ignore_ascii_case(word))
}

/// `19,99` is a decimal comma; otherwise commas must split the integer part
/// into groups of three.
fn normalize_separators(text: &str) -> Option<String> {
    if !text.contains(',') {
        return Some(text.to_string());
    }
    if let Some((head, tail)) = text.split_once(',')
        && !text.contains('.')
        && !tail.contains(',')
        && (1..=2).contains(&tail.len())
    {
        return Some(format!("{head}.{tail}"));
    }

    let (integer, fraction) = match text.split_once('.') {
        Some((integer, fraction)) => (integer, Some(fraction)),
        None => (text, None),
    };
    let mut groups = integer.split(',');
    let first = groups.next()?;
    if first.is_empty() || first.len() > 3 {
        return None;
    }
    let mut out = first.to_string();
    for group in groups {
        if group.len() != 3 {
            return None;
        }
        out.push_str(group);
    }
    if let Some(fraction) = fraction {
        out.push('.');
        out.push_str(fraction);
    }
    Some(out)
}

fn strip_leading_marker(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if let Some(rest) = text.strip_prefix(CURRENCY_SYMBOLS) {
            text = rest;
            continue;
        }
        let code_len = text.chars().take_while(char::is_ascii_alphabetic).count();
        if code_len > 0 && is_currency_code(&text[..code_len]) {
            text = &text[code_len..];
            continue;
        }
        return text;
    }
}

fn strip_trailing_marker(mut text: &str) -> &str {
    loop {
        text = text.trim_end();
        if let Some(rest) = text.strip_suffix(CURRENCY_SYMBOLS) {
            text = rest;
            continue;
        }
        let code_len = text
            .chars()
            .rev()
            .take_while(char::is_ascii_alphabetic)
            .count();
        let split = text.len() - code_len;
        if code_len > 0 && is_currency_code(&text[split..]) {
            text = &text[..split];
            continue;
        }
        return text;
    }
}

/// Price fields tried on record objects, first match wins.
const PRICE_PATHS: &[&[&str]] = &[
    &["sellingStatus", "currentPrice"],
    &["sellingStatus", "convertedCurrentPrice"],
    &["currentPrice"],
    &["price"],
    &["__value__"],
    &["value"],
    &["amount"],
];

/// Pulls one sold price out of a sales record of unknown shape.
pub fn extract_sale_price(record: &Value) -> Option<f64> {
    let price = match record {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => parse_amount(text),
        Value::Array(items) => items.first().and_then(extract_sale_price),
        Value::Object(_) => PRICE_PATHS
            .iter()
            .find_map(|path| lookup(record, path).and_then(extract_sale_price)),
        _ => None,
    }?;
    (price.is_finite() && price >= 0.0).then_some(price)
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(value, |current, key| first_element(current).get(*key))
}

/// The sales source wraps most scalars in one-element arrays.
pub(crate) fn first_element(mut value: &Value) -> &Value {
    while let Value::Array(items) = value {
        match items.first() {
            Some(first) => value = first,
            None => break,
        }
    }
    value
}

/// Completed/sold listings search.
#[async_trait]
pub trait SalesSource: Send + Sync {
    async fn completed_sales(&self, terms: &str) -> Result<Vec<Value>, PriceError>;
}

pub struct PriceEstimator {
    source: Box<dyn SalesSource>,
    policy: PricingPolicy,
}

impl PriceEstimator {
    pub fn new(source: Box<dyn SalesSource>, policy: PricingPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    pub async fn estimate(&self, terms: &str) -> Result<PriceEstimate, PriceError> {
        let records = self.source.completed_sales(terms).await?;
        let samples: Vec<f64> = records.iter().filter_map(extract_sale_price).collect();
        let skipped = records.len() - samples.len();
        crate::metrics::price_samples(samples.len(), skipped);
        debug!(
            target = "lister.pricing",
            terms,
            usable = samples.len(),
            skipped,
            "sold_prices_collected"
        );
        PriceEstimate::from_samples(&samples, skipped, self.policy.markdown).ok_or_else(|| {
            PriceError::NoPriceData {
                terms: terms.to_string(),
                records: records.len(),
            }
        })
    }
}
