//! Waste Prediction Handler.
//!
//! Validates the six model inputs, asks the [`Predictor`] for a prediction
//! and stores the input together with the prediction in the
//! `waste_predictions` collection.
//!
//! # Payload
//!
//! ```json
//! {
//!   "production_volume": 50000,
//!   "rain_sum": 200,
//!   "temperature_mean": 28,
//!   "humidity_mean": 85,
//!   "wind_speed_mean": 15,
//!   "month": 6,
//!   "metadata": { "request_id": "req-42" }
//! }
//! ```
//!
//! `metadata` is optional. Numeric fields may also be sent as numeric strings.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::info;

use super::{Handler, HandlerError};
use crate::predictor::{Predictor, WasteParameters, TOTAL_WASTE_FIELD};
use crate::store::DocumentStore;

/// Canonical event name
pub const EVENT_TYPE: &str = "WastePredictionEvent";

/// Event name used by older producers
pub const LEGACY_EVENT_TYPE: &str = "WASTE/PREDICTION";

/// Collection that prediction documents are written to
pub const COLLECTION: &str = "waste_predictions";

pub const PROCESSOR_VERSION: &str = "1.0.0";

/// Model inputs, in the order they are reported when missing.
pub const REQUIRED_FIELDS: [&str; 6] = [
    "production_volume",
    "rain_sum",
    "temperature_mean",
    "humidity_mean",
    "wind_speed_mean",
    "month",
];

pub struct WastePredictionHandler {
    store: Arc<dyn DocumentStore>,
    predictor: Arc<dyn Predictor>,
}

impl WastePredictionHandler {
    pub fn new(store: Arc<dyn DocumentStore>, predictor: Arc<dyn Predictor>) -> Self {
        Self { store, predictor }
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn as_month(value: &Value) -> Option<u32> {
    let n = as_number(value)?;
    (n.fract() == 0.0 && (1.0..=12.0).contains(&n)).then_some(n as u32)
}

/// Pull the model inputs out of a payload, reporting every missing or
/// invalid field at once.
pub fn extract_parameters(payload: &Value) -> Result<WasteParameters, HandlerError> {
    let mut missing = Vec::new();
    let mut invalid = Vec::new();
    let mut numbers = [0.0_f64; 5];
    let mut month = 0_u32;

    for (i, field) in REQUIRED_FIELDS.iter().enumerate() {
        match payload.get(field) {
            None | Some(Value::Null) => missing.push(field.to_string()),
            Some(value) if *field == "month" => match as_month(value) {
                Some(m) => month = m,
                None => invalid.push(field.to_string()),
            },
            Some(value) => match as_number(value) {
                Some(n) => numbers[i] = n,
                None => invalid.push(field.to_string()),
            },
        }
    }

    if !missing.is_empty() || !invalid.is_empty() {
        return Err(HandlerError::InvalidFields { missing, invalid });
    }

    let [production_volume, rain_sum, temperature_mean, humidity_mean, wind_speed_mean] = numbers;
    Ok(WasteParameters {
        production_volume,
        rain_sum,
        temperature_mean,
        humidity_mean,
        wind_speed_mean,
        month,
    })
}

fn request_id(payload: &Value) -> String {
    payload
        .get("metadata")
        .and_then(|m| m.get("request_id"))
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Build the stored document for one prediction. `input_parameters` holds
/// the six model inputs only; other payload keys are not copied.
pub fn build_document(payload: &Value, result: &Value) -> Value {
    let mut input_parameters = Map::new();
    for field in REQUIRED_FIELDS {
        input_parameters.insert(
            field.to_string(),
            payload.get(field).cloned().unwrap_or(Value::Null),
        );
    }

    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "input_parameters": input_parameters,
        "prediction_result": result,
        "metadata": {
            "event_type": EVENT_TYPE,
            "processor_version": PROCESSOR_VERSION,
            "request_id": request_id(payload),
        }
    })
}

#[async_trait]
impl Handler for WastePredictionHandler {
    fn name(&self) -> &str {
        "waste-prediction"
    }

    fn validate(&self, payload: &Value) -> Result<(), HandlerError> {
        extract_parameters(payload).map(|_| ())
    }

    async fn compute(&self, payload: &Value) -> Result<Value, HandlerError> {
        let params = extract_parameters(payload)?;

        info!(
            production_volume = params.production_volume,
            month = params.month,
            request_id = %request_id(payload),
            "Predicting waste"
        );

        let result = self.predictor.predict(&params).await?;

        let total_waste = result
            .get(TOTAL_WASTE_FIELD)
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        info!("Prediction result: Total Waste = {:.2} kg", total_waste);

        Ok(result)
    }

    async fn persist(&self, payload: &Value, result: &Value) -> Result<(), HandlerError> {
        let document = build_document(payload, result);
        let id = self.store.insert(COLLECTION, document).await?;

        info!(collection = COLLECTION, id = %id, "Saved prediction to database");
        Ok(())
    }
}
