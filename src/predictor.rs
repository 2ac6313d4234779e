//! Waste prediction client.
//!
//! The prediction model itself is an external service. [`HttpPredictor`]
//! POSTs the six model inputs as JSON and expects a JSON object back that
//! carries at least `Total_Waste_kg`.
//!
//! # Example
//!
//! ```rust,ignore
//! use event_consumer::predictor::HttpPredictor;
//! use std::time::Duration;
//!
//! let predictor = HttpPredictor::new("http://localhost:8000/predict")
//!     .with_timeout(Duration::from_secs(5));
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};

/// Default timeout for prediction requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Result field holding the predicted total waste
pub const TOTAL_WASTE_FIELD: &str = "Total_Waste_kg";

/// Errors raised by the prediction service.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("prediction request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("prediction service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid prediction response: {0}")]
    InvalidResponse(String),
}

/// Inputs to the waste prediction model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WasteParameters {
    /// Production volume in units
    pub production_volume: f64,
    /// Total rainfall in mm
    pub rain_sum: f64,
    /// Mean temperature in Celsius
    pub temperature_mean: f64,
    /// Mean humidity percentage
    pub humidity_mean: f64,
    /// Mean wind speed in km/h
    pub wind_speed_mean: f64,
    /// Month number (1-12)
    pub month: u32,
}

#[async_trait]
pub trait Predictor: Send + Sync {
    async fn predict(&self, params: &WasteParameters) -> Result<Value, PredictorError>;
}

/// Prediction client backed by an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpPredictor {
    url: String,

    /// HTTP client (reused for connection pooling)
    client: Client,

    timeout: Duration,
}

impl HttpPredictor {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Check the response shape: an object with a numeric total.
fn check_response(value: Value) -> Result<Value, PredictorError> {
    let Some(fields) = value.as_object() else {
        return Err(PredictorError::InvalidResponse(
            "expected a JSON object".to_string(),
        ));
    };

    match fields.get(TOTAL_WASTE_FIELD) {
        Some(total) if total.is_number() => Ok(value),
        Some(_) => Err(PredictorError::InvalidResponse(format!(
            "'{TOTAL_WASTE_FIELD}' is not a number"
        ))),
        None => Err(PredictorError::InvalidResponse(format!(
            "missing '{TOTAL_WASTE_FIELD}'"
        ))),
    }
}

#[async_trait]
impl Predictor for HttpPredictor {
    #[instrument(level = "debug", skip(self))]
    async fn predict(&self, params: &WasteParameters) -> Result<Value, PredictorError> {
        let response = self
            .client
            .post(&self.url)
            .json(params)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PredictorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        debug!(url = %self.url, "Prediction received");
        check_response(value)
    }
}
