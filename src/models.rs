use crate::listing::ListingPayload;
use crate::pipeline::PipelineState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Decoded barcode value as reported by the capture collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScannedCode(String);

impl ScannedCode {
    /// Trims surrounding whitespace; rejects empty values and control characters.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.chars().any(char::is_control) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScannedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductMetadata {
    pub title: String,
    pub description: String,
    pub brand: String,
    pub manufacturer: String,
    pub model: String,
    /// Plain decimal with any currency marker removed.
    pub msrp: Option<f64>,
    pub category: String,
}

/// Non-fatal problem found while shaping generated metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldParseWarning {
    pub field: &'static str,
    pub raw: String,
    pub reason: String,
}

impl fmt::Display for FieldParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}: {}", self.field, self.raw, self.reason)
    }
}

#[derive(Debug, Serialize, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub sku: String,
    pub dry_run: bool,
    pub payload: ListingPayload,
    pub warnings: Vec<FieldParseWarning>,
    pub states: Vec<PipelineState>,
    pub stages: Vec<StageReport>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}
