use super::openai::{ChatBackend, LlmError, LlmMessage};
use crate::models::{FieldParseWarning, ProductMetadata, ScannedCode};
use crate::pricing::parse_amount;
use serde_json::Value;

const SYSTEM_PROMPT: &str = "You write product data for marketplace listings. \
Reply with one JSON object with exactly these string keys: \
title, description, brand, manufacturer, model_number, msrp, category. \
Keep the title under 80 characters. Use an empty string for anything you do not know.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    Brand,
    Manufacturer,
    Model,
    Msrp,
    Category,
}

/// Order used by plain line-per-field answers.
const FIELD_ORDER: [Field; 7] = [
    Field::Title,
    Field::Description,
    Field::Brand,
    Field::Manufacturer,
    Field::Model,
    Field::Msrp,
    Field::Category,
];

impl Field {
    fn from_key(key: &str) -> Option<Self> {
        let normalized = key
            .trim()
            .trim_matches(|c: char| c == '"' || c == '*')
            .to_ascii_lowercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "title" | "name" | "product_title" | "product_name" => Some(Self::Title),
            "description" | "product_description" => Some(Self::Description),
            "brand" | "brand_name" => Some(Self::Brand),
            "manufacturer" | "maker" => Some(Self::Manufacturer),
            "model" | "model_number" | "model_no" | "mpn" => Some(Self::Model),
            "msrp" | "msrp_usd" | "list_price" | "retail_price" => Some(Self::Msrp),
            "category" | "product_category" => Some(Self::Category),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct RawFields([Option<String>; 7]);

impl RawFields {
    fn set(&mut self, field: Field, value: String) {
        let slot = &mut self.0[field.slot()];
        if slot.is_none() {
            *slot = Some(value.trim().to_string());
        }
    }

    fn take(&mut self, field: Field) -> String {
        self.0[field.slot()].take().unwrap_or_default()
    }

    fn found(&self) -> usize {
        self.0.iter().filter(|v| v.is_some()).count()
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedMetadata {
    pub metadata: ProductMetadata,
    pub warnings: Vec<FieldParseWarning>,
}

pub struct MetadataGenerator {
    backend: Box<dyn ChatBackend>,
}

impl MetadataGenerator {
    pub fn new(backend: Box<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    pub async fn generate(&self, code: &ScannedCode) -> Result<GeneratedMetadata, LlmError> {
        let messages = [
            LlmMessage::system(SYSTEM_PROMPT),
            LlmMessage::user(format!(
                "Generate the product title, description, brand, manufacturer, model number, \
                 MSRP and category for the product with barcode {code}."
            )),
        ];
        let text = self.backend.chat(&messages, true).await?;
        parse_metadata(&text)
    }
}

/// Resolves a generation answer into metadata; JSON first, then labelled
/// lines, then the fixed seven-line layout.
pub fn parse_metadata(text: &str) -> Result<GeneratedMetadata, LlmError> {
    let body = strip_code_fence(text);
    let mut raw = from_json(body)
        .or_else(|| from_labelled_lines(body))
        .or_else(|| from_positional_lines(body))
        .ok_or_else(|| {
            LlmError::InvalidResponse("response does not contain product fields".into())
        })?;

    let mut warnings = Vec::new();
    let msrp_raw = raw.take(Field::Msrp);
    let msrp = if msrp_raw.is_empty() {
        None
    } else {
        match parse_amount(&msrp_raw) {
            Some(value) => Some(value),
            None => {
                crate::metrics::field_warning("msrp");
                warnings.push(FieldParseWarning {
                    field: "msrp",
                    raw: msrp_raw,
                    reason: "not a price".into(),
                });
                None
            }
        }
    };

    let metadata = ProductMetadata {
        title: raw.take(Field::Title),
        description: raw.take(Field::Description),
        brand: raw.take(Field::Brand),
        manufacturer: raw.take(Field::Manufacturer),
        model: raw.take(Field::Model),
        msrp,
        category: raw.take(Field::Category),
    };
    Ok(GeneratedMetadata { metadata, warnings })
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // drop the info string (e.g. `json`) on the opening fence line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

fn from_json(body: &str) -> Option<RawFields> {
    let value: Value = serde_json::from_str(body).ok()?;
    let object = value.as_object()?;
    let mut raw = collect_object(object);
    if raw.found() == 0 {
        // tolerate a single wrapping object such as {"product": {...}}
        let nested = object.values().find_map(Value::as_object)?;
        raw = collect_object(nested);
    }
    (raw.found() > 0).then_some(raw)
}

fn collect_object(object: &serde_json::Map<String, Value>) -> RawFields {
    let mut raw = RawFields::default();
    for (key, value) in object {
        if let Some(field) = Field::from_key(key) {
            raw.set(field, value_text(value));
        }
    }
    raw
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    let line = line.trim_start_matches(['-', '*', '•']).trim_start();
    match line.split_once(['.', ')']) {
        Some((prefix, rest))
            if !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_digit())
                && rest.starts_with(char::is_whitespace) =>
        {
            rest.trim_start()
        }
        _ => line,
    }
}

fn from_labelled_lines(body: &str) -> Option<RawFields> {
    let mut raw = RawFields::default();
    for line in body.lines().map(strip_bullet) {
        if let Some((key, value)) = line.split_once(':')
            && let Some(field) = Field::from_key(key)
        {
            raw.set(field, value.to_string());
        }
    }
    (raw.found() > 0).then_some(raw)
}

fn from_positional_lines(body: &str) -> Option<RawFields> {
    let lines: Vec<&str> = body
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.len() < FIELD_ORDER.len() {
        return None;
    }
    let mut raw = RawFields::default();
    for (field, line) in FIELD_ORDER.iter().zip(lines) {
        raw.set(*field, line.to_string());
    }
    Some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct CannedChat(Result<String, ()>);

    #[async_trait]
    impl ChatBackend for CannedChat {
        async fn chat(&self, messages: &[LlmMessage], json_mode: bool) -> Result<String, LlmError> {
            assert!(json_mode);
            assert!(messages.iter().any(|m| m.content.contains("012345678905")));
            self.0
                .clone()
                .map_err(|_| LlmError::Http("connection refused".into()))
        }
    }

    #[test]
    fn parses_json_object() {
        let out = parse_metadata(
            r#"{"title":"Acme Kettle","description":"1.7L electric kettle","brand":"Acme",
               "manufacturer":"Acme Corp","model_number":"AK-17","msrp":"$49.99","category":"Kitchen"}"#,
        )
        .expect("parse");
        assert_eq!(out.metadata.title, "Acme Kettle");
        assert_eq!(out.metadata.model, "AK-17");
        assert_eq!(out.metadata.msrp, Some(49.99));
        assert_eq!(out.metadata.category, "Kitchen");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn missing_fields_become_empty_strings() {
        let out = parse_metadata(r#"{"title":"Widget","msrp":null,"brand":null}"#).expect("parse");
        assert_eq!(out.metadata.title, "Widget");
        assert_eq!(out.metadata.brand, "");
        assert_eq!(out.metadata.manufacturer, "");
        assert_eq!(out.metadata.msrp, None);
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn numeric_msrp_and_code_fence() {
        let out = parse_metadata("```json\n{\"title\":\"Widget\",\"msrp\":19.5}\n```").expect("parse");
        assert_eq!(out.metadata.msrp, Some(19.5));
    }

    #[test]
    fn msrp_currency_variants() {
        for raw in ["$19.99", "USD 19.99"] {
            let text = format!(r#"{{"title":"Widget","msrp":"{raw}"}}"#);
            let out = parse_metadata(&text).expect("parse");
            assert_eq!(out.metadata.msrp, Some(19.99), "input {raw}");
        }
    }

    #[test]
    fn unit_and_filler_msrp_values_warn() {
        for raw in ["12 oz", "1.5k", "see 12"] {
            let text = format!(r#"{{"title":"Widget","msrp":"{raw}"}}"#);
            let out = parse_metadata(&text).expect("parse");
            assert_eq!(out.metadata.msrp, None, "input {raw}");
            assert_eq!(out.warnings.len(), 1, "input {raw}");
            assert_eq!(out.warnings[0].raw, raw);
        }
    }

    #[test]
    fn unparseable_msrp_is_a_warning() {
        let out = parse_metadata(r#"{"title":"Widget","msrp":"ask"}"#).expect("parse");
        assert_eq!(out.metadata.msrp, None);
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].field, "msrp");
        assert_eq!(out.warnings[0].raw, "ask");
    }

    #[test]
    fn nested_product_object() {
        let out = parse_metadata(r#"{"product":{"name":"Widget","brand":"Acme"}}"#).expect("parse");
        assert_eq!(out.metadata.title, "Widget");
        assert_eq!(out.metadata.brand, "Acme");
    }

    #[test]
    fn labelled_lines() {
        let text = "Title: Acme Kettle\n- Brand: Acme\n**Model Number**: AK-17\nMSRP: $39.00\nCategory: Kitchen";
        let out = parse_metadata(text).expect("parse");
        assert_eq!(out.metadata.title, "Acme Kettle");
        assert_eq!(out.metadata.brand, "Acme");
        assert_eq!(out.metadata.model, "AK-17");
        assert_eq!(out.metadata.msrp, Some(39.0));
        assert_eq!(out.metadata.description, "");
    }

    #[test]
    fn positional_lines() {
        let text = "Acme Kettle\nA fast kettle\nAcme\nAcme Corp\nAK-17\n$29.99\nKitchen\n";
        let out = parse_metadata(text).expect("parse");
        assert_eq!(out.metadata.description, "A fast kettle");
        assert_eq!(out.metadata.manufacturer, "Acme Corp");
        assert_eq!(out.metadata.msrp, Some(29.99));
        assert_eq!(out.metadata.category, "Kitchen");
    }

    #[test]
    fn unresolvable_response_is_error() {
        let err = parse_metadata("I could not find that product.").expect_err("malformed");
        assert!(matches!(err, LlmError::InvalidResponse(_)));
        assert!(parse_metadata(r#"{"foo":"bar"}"#).is_err());
        assert!(parse_metadata("[1,2,3]").is_err());
    }

    #[tokio::test]
    async fn generator_sends_code_and_parses() {
        let generator = MetadataGenerator::new(Box::new(CannedChat(Ok(
            r#"{"title":"Widget","msrp":"USD 5"}"#.into(),
        ))));
        let code = ScannedCode::parse("012345678905").expect("code");
        let out = generator.generate(&code).await.expect("generate");
        assert_eq!(out.metadata.title, "Widget");
        assert_eq!(out.metadata.msrp, Some(5.0));
    }

    #[tokio::test]
    async fn generator_propagates_transport_errors() {
        let generator = MetadataGenerator::new(Box::new(CannedChat(Err(()))));
        let code = ScannedCode::parse("012345678905").expect("code");
        let err = generator.generate(&code).await.expect_err("transport");
        assert!(matches!(err, LlmError::Http(_)));
    }
}
