use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /convert`. Omitted knobs fall back to the configured defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertRequest {
    pub csv: String,
    #[serde(default)]
    pub price_multiplier: Option<f64>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub product_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertResponse {
    pub products_count: usize,
    pub rows_count: usize,
    pub csv: String,
    pub stages: Vec<StageReport>,
}

/// Body of `POST /enhance`: a document in the listing schema.
#[derive(Debug, Clone, Deserialize)]
pub struct EnhanceRequest {
    pub csv: String,
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

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
