use serde::Deserialize;
use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

pub const MAX_PHOTOS: usize = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read listing defaults from {path}: {message}")]
    DefaultsFile { path: String, message: String },
    #[error("PRICE_MULTIPLIER must be a positive number, got {0}")]
    InvalidMultiplier(f64),
}

/// Marketplace metadata written on the first row of every product.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListingDefaults {
    pub who_made_it: String,
    pub what_is_it: String,
    pub when_made: String,
    pub renewal_options: String,
    pub materials: String,
    pub default_quantity: u32,
    pub production_partners: String,
    pub section: String,
    pub shipping_profile: String,
    pub return_policy: String,
}

impl Default for ListingDefaults {
    fn default() -> Self {
        Self {
            who_made_it: "I did".into(),
            what_is_it: "A finished product".into(),
            when_made: "2020_2024".into(),
            renewal_options: "Automatic".into(),
            materials: String::new(),
            default_quantity: 8,
            production_partners: String::new(),
            section: String::new(),
            shipping_profile: "Free Delivery".into(),
            return_policy: String::new(),
        }
    }
}

impl ListingDefaults {
    pub fn from_yaml(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path).map_err(|err| ConfigError::DefaultsFile {
            path: path.to_string(),
            message: err.to_string(),
        })?;
        Self::from_yaml(&raw).map_err(|err| ConfigError::DefaultsFile {
            path: path.to_string(),
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ConversionConfig {
    pub price_multiplier: f64,
    pub default_category: String,
    pub default_product_type: String,
    pub sku_width: usize,
    pub defaults: ListingDefaults,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            price_multiplier: 4.0,
            default_category: String::new(),
            default_product_type: "physical".into(),
            sku_width: 5,
            defaults: ListingDefaults::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub concurrency: usize,
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub image_timeout: Duration,
    pub image_width_hint: u32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_retries: 3,
            backoff_unit: Duration::from_secs(2),
            image_timeout: Duration::from_secs(5),
            image_width_hint: 800,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaxonomyConfig {
    pub catalog_path: PathBuf,
    pub delimiter: String,
    pub candidate_limit: usize,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("data/categories.json"),
            delimiter: " > ".into(),
            candidate_limit: 30,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub conversion: ConversionConfig,
    pub enrichment: EnrichmentConfig,
    pub taxonomy: TaxonomyConfig,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base = Self::default();
        let defaults_path = env::var("LISTING_DEFAULTS_PATH").ok();
        let conversion = ConversionConfig {
            price_multiplier: checked_multiplier(env_parse(
                "PRICE_MULTIPLIER",
                base.conversion.price_multiplier,
            ))?,
            default_category: env::var("DEFAULT_CATEGORY").unwrap_or_default(),
            default_product_type: env::var("DEFAULT_PRODUCT_TYPE")
                .unwrap_or(base.conversion.default_product_type),
            sku_width: env_parse("SKU_WIDTH", base.conversion.sku_width).max(1),
            defaults: ListingDefaults::load(defaults_path.as_deref())?,
        };
        let enrichment = EnrichmentConfig {
            concurrency: env_parse("ENRICH_CONCURRENCY", base.enrichment.concurrency).max(1),
            max_retries: env_parse("ENRICH_MAX_RETRIES", base.enrichment.max_retries).max(1),
            backoff_unit: Duration::from_secs(env_parse("ENRICH_BACKOFF_SECS", 2u64)),
            image_timeout: Duration::from_secs(env_parse("IMAGE_TIMEOUT_SECS", 5u64).max(1)),
            image_width_hint: env_parse("IMAGE_WIDTH_HINT", base.enrichment.image_width_hint),
        };
        let taxonomy = TaxonomyConfig {
            catalog_path: env::var("CATEGORY_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(base.taxonomy.catalog_path),
            delimiter: env::var("CATEGORY_DELIMITER")
                .ok()
                .filter(|value| !value.is_empty())
                .unwrap_or(base.taxonomy.delimiter),
            candidate_limit: env_parse("CATEGORY_CANDIDATES", base.taxonomy.candidate_limit)
                .max(1),
        };
        Ok(Self {
            conversion,
            enrichment,
            taxonomy,
        })
    }
}

/// Multipliers must be finite and positive, from env and requests alike.
pub fn checked_multiplier(value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::InvalidMultiplier(value))
    }
}

pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<T>().ok())
        .unwrap_or(default)
}
