use crate::ebay::config::FindingConfig;
use crate::llm::LlmConfig;
use crate::pricing::{PriceQuery, PricingPolicy};
use crate::sellbrite::SellbriteConfig;
use serde::Deserialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "UPC_LISTER_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Credential string whose `Debug` output never reveals the value.
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Secret(<unset>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// `-` / `stdin`, or a path to a device or file emitting one code per line.
    pub source: String,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            source: "-".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    pub path: PathBuf,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("sequential_number.txt"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub counter: CounterConfig,
    pub openai: LlmConfig,
    pub ebay: FindingConfig,
    pub sellbrite: SellbriteConfig,
    pub pricing: PricingPolicy,
    pub http: HttpConfig,
}

impl AppConfig {
    /// Defaults, then the YAML file (explicit path or `UPC_LISTER_CONFIG`), then
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from);
        let file = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(Self::read_file(&path)?),
            None => None,
        };
        Self::from_sources(file, |key| std::env::var(key).ok())
    }

    pub fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn from_sources<F>(file: Option<Self>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = file.unwrap_or_default();
        let env = EnvLayer { lookup };

        env.string("SCANNER_SOURCE", &mut config.scanner.source);
        if let Some(path) = env.get("COUNTER_PATH") {
            config.counter.path = PathBuf::from(path);
        }

        env.secret("OPENAI_API_KEY", &mut config.openai.api_key);
        env.string("OPENAI_BASE_URL", &mut config.openai.base_url);
        env.string("OPENAI_MODEL", &mut config.openai.model);

        env.secret("EBAY_APP_ID", &mut config.ebay.app_id);
        env.string("EBAY_FINDING_URL", &mut config.ebay.endpoint);
        env.string("EBAY_GLOBAL_ID", &mut config.ebay.global_id);
        if let Some(condition) = env.get("EBAY_CONDITION") {
            config.ebay.condition = Some(condition).filter(|c| !c.eq_ignore_ascii_case("any"));
        }

        env.secret("SELLBRITE_ACCOUNT_TOKEN", &mut config.sellbrite.account_token);
        env.secret("SELLBRITE_SECRET_KEY", &mut config.sellbrite.secret_key);
        env.string("SELLBRITE_BASE_URL", &mut config.sellbrite.base_url);

        if let Some(markdown) = env.parsed::<f64>("PRICE_MARKDOWN")? {
            config.pricing.markdown = markdown;
        }
        if let Some(query) = env.parsed::<PriceQuery>("PRICE_QUERY")? {
            config.pricing.query = query;
        }
        if let Some(secs) = env.parsed::<u64>("HTTP_TIMEOUT_SECS")? {
            config.http.timeout_secs = secs;
        }
        if let Some(secs) = env.parsed::<u64>("HTTP_CONNECT_TIMEOUT_SECS")? {
            config.http.connect_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let markdown = self.pricing.markdown;
        if !markdown.is_finite() || markdown <= 0.0 {
            return Err(ConfigError::Invalid {
                key: "pricing.markdown",
                value: markdown.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        if self.scanner.source.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "scanner.source",
                value: String::new(),
                reason: "capture source must not be empty".into(),
            });
        }
        Ok(())
    }
}

struct EnvLayer<F> {
    lookup: F,
}

impl<F> EnvLayer<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, slot: &mut String) {
        if let Some(value) = self.get(key) {
            *slot = value;
        }
    }

    fn secret(&self, key: &str, slot: &mut Secret) {
        if let Some(value) = self.get(key) {
            *slot = Secret::new(value);
        }
    }

    fn parsed<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map(Some)
                .map_err(|err| ConfigError::Invalid {
                    key,
                    value: raw,
                    reason: err.to_string(),
                }),
            None => Ok(None),
        }
    }
}
