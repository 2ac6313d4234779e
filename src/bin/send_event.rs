//! Publish sample waste prediction events to the source queue.
//!
//! ```text
//! send-event            # one event, high production summer scenario
//! send-event --batch    # all sample scenarios
//! ```
//!
//! Environment variables:
//! - `SQS_QUEUE_URL`: target queue (required)
//! - `AWS_REGION`: default "us-east-1"
//! - `SQS_ENDPOINT_URL`: SQS-compatible endpoint, e.g. LocalStack
//! - `MESSAGE_GROUP_ID`: FIFO group (default "waste-predictions")

use std::env;
use tracing::{error, info};
use uuid::Uuid;

use event_consumer::envelope::EventBody;
use event_consumer::handlers::waste_prediction::EVENT_TYPE;
use event_consumer::logging;
use event_consumer::predictor::WasteParameters;
use event_consumer::queue::real::AwsSqsApi;
use event_consumer::queue::{is_fifo_queue, SendOptions, SqsApi};

const DEFAULT_GROUP: &str = "waste-predictions";

fn scenarios() -> Vec<(&'static str, WasteParameters)> {
    vec![
        (
            "High production, summer conditions",
            WasteParameters {
                production_volume: 50000.0,
                rain_sum: 200.0,
                temperature_mean: 28.0,
                humidity_mean: 85.0,
                wind_speed_mean: 15.0,
                month: 6,
            },
        ),
        (
            "Medium production, rainy winter",
            WasteParameters {
                production_volume: 30000.0,
                rain_sum: 350.0,
                temperature_mean: 15.0,
                humidity_mean: 75.0,
                wind_speed_mean: 20.0,
                month: 11,
            },
        ),
        (
            "High production, dry hot conditions",
            WasteParameters {
                production_volume: 75000.0,
                rain_sum: 100.0,
                temperature_mean: 32.0,
                humidity_mean: 60.0,
                wind_speed_mean: 10.0,
                month: 3,
            },
        ),
    ]
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::init();

    let queue_url = env::var("SQS_QUEUE_URL").map_err(|_| "SQS_QUEUE_URL must be set")?;
    let region = env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let endpoint = env::var("SQS_ENDPOINT_URL").ok();
    let group = env::var("MESSAGE_GROUP_ID").unwrap_or_else(|_| DEFAULT_GROUP.to_string());
    let batch = env::args().any(|arg| arg == "--batch");

    let sqs = AwsSqsApi::from_env(&region, endpoint.as_deref()).await;

    let mut selected = scenarios();
    if !batch {
        selected.truncate(1);
    }

    let mut failures = 0;
    for (description, params) in selected {
        let body = serde_json::to_string(&EventBody::new(
            EVENT_TYPE,
            serde_json::to_value(&params)?,
        ))?;

        let options = if is_fifo_queue(&queue_url) {
            SendOptions::fifo(group.clone(), Uuid::new_v4().to_string())
        } else {
            SendOptions::default()
        };

        match sqs.send_message(&queue_url, &body, options).await {
            Ok(id) => info!(message_id = %id, scenario = description, body = %body, "Message sent"),
            Err(e) => {
                failures += 1;
                error!(scenario = description, error = %e, "Failed to send message");
            }
        }
    }

    if failures > 0 {
        return Err(format!("{failures} message(s) failed to send").into());
    }
    Ok(())
}
