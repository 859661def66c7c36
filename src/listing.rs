use crate::models::{ProductMetadata, ScannedCode};
use crate::pricing::PriceEstimate;
use crate::sku::ProductIdentifier;
use serde::Serialize;
use serde_with::skip_serializing_none;

/// Product record in the field layout of the listing backend.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingPayload {
    pub sku: String,
    pub title: String,
    pub description: String,
    pub brand: String,
    pub manufacturer: String,
    pub model_number: String,
    pub msrp: Option<f64>,
    pub price: f64,
    pub category: String,
    pub upc: String,
}

pub fn build(
    code: &ScannedCode,
    metadata: &ProductMetadata,
    estimate: &PriceEstimate,
    identifier: &ProductIdentifier,
) -> ListingPayload {
    ListingPayload {
        sku: identifier.to_string(),
        title: metadata.title.clone(),
        description: metadata.description.clone(),
        brand: metadata.brand.clone(),
        manufacturer: metadata.manufacturer.clone(),
        model_number: metadata.model.clone(),
        msrp: metadata.msrp.map(round_cents),
        price: round_cents(estimate.listing_price),
        category: metadata.category.clone(),
        upc: code.to_string(),
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
