//! Event Consumer - long-running queue worker
//!
//! Long-polls an SQS FIFO queue, routes each event to its handler, writes
//! results to MongoDB and dead-letters anything that fails.
//!
//! ## Configuration
//!
//! `config/consumer.toml` (or the file named by `CONSUMER_CONFIG`), with
//! environment overrides:
//! - `SQS_QUEUE_URL`, `DLQ_URL`: source and dead-letter queues (required)
//! - `AWS_REGION`: default "us-east-1"
//! - `SQS_ENDPOINT_URL`: SQS-compatible endpoint, e.g. LocalStack
//! - `MONGODB_URL`: document store (required)
//! - `PREDICTOR_URL`: prediction service endpoint (required)
//! - `POLL_WAIT`, `MAX_MESSAGES`: long-poll tuning
//! - `RUST_LOG`, `LOG_FORMAT`: logging

use std::sync::Arc;
use tracing::{error, info};

use event_consumer::config::ConsumerConfig;
use event_consumer::dlq::DeadLetterQueue;
use event_consumer::handlers::build_registry;
use event_consumer::predictor::HttpPredictor;
use event_consumer::queue::real::AwsSqsApi;
use event_consumer::store::mongo::MongoStore;
use event_consumer::{logging, Dispatcher, Poller, ShutdownSignal};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    logging::init();

    let config = ConsumerConfig::load().map_err(|e| {
        error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        queue_url = %config.queue.url,
        region = %config.queue.region,
        "Event consumer starting"
    );

    let store = Arc::new(
        MongoStore::connect(&config.store.url, config.store.database.clone())
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to connect to document store");
                e
            })?,
    );

    let predictor = Arc::new(
        HttpPredictor::new(config.predictor.url.clone()).with_timeout(config.predictor_timeout()),
    );

    let registry = build_registry(store.clone(), predictor, &config.routing.aliases)?;
    info!(
        handler_count = registry.len(),
        event_types = ?registry.event_types(),
        "Registry configured"
    );

    let sqs = Arc::new(
        AwsSqsApi::from_env(&config.queue.region, config.queue.endpoint_url.as_deref()).await,
    );

    let shutdown = ShutdownSignal::new();
    let listener = shutdown.clone();
    tokio::spawn(async move { listener.listen_for_signals().await });

    let poller = Poller::new(
        sqs.clone(),
        Dispatcher::new(Arc::new(registry)),
        DeadLetterQueue::new(sqs, config.queue.dlq_url.clone()),
        store,
        shutdown,
        config.poller_settings(),
    );

    let stats = poller.run().await;

    info!(
        batches = stats.batches,
        succeeded = stats.succeeded,
        failed = stats.failed,
        dead_lettered = stats.dead_lettered,
        "Event consumer shut down gracefully"
    );

    Ok(())
}
