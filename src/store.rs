//! Persistent document store.
//!
//! Handlers write one JSON document per processed event through
//! [`DocumentStore::insert`]. The connection is opened once by the process
//! entry point, shared by `Arc`, and closed once by the poller after it stops.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when talking to the store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection error: {0}")]
    Connection(String),

    #[error("store write error: {0}")]
    Write(String),

    #[error("document serialization error: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document into `collection`, returning the assigned document ID.
    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError>;

    /// Release the underlying connection.
    async fn close(&self);
}

/// MongoDB-backed store (only compiled when the `mongo` feature is enabled).
#[cfg(feature = "mongo")]
pub mod mongo {
    use super::{DocumentStore, StoreError};
    use async_trait::async_trait;
    use mongodb::bson::{self, doc, Bson, Document};
    use mongodb::Client;
    use serde_json::Value;
    use tracing::{debug, info, instrument};

    #[derive(Clone)]
    pub struct MongoStore {
        client: Client,
        database: String,
    }

    impl MongoStore {
        /// Connect and verify the server answers a ping.
        pub async fn connect(url: &str, database: impl Into<String>) -> Result<Self, StoreError> {
            let client = Client::with_uri_str(url)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            let database = database.into();
            client
                .database(&database)
                .run_command(doc! { "ping": 1 })
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;

            info!(database = %database, "Connected to MongoDB");
            Ok(Self { client, database })
        }
    }

    /// Convert a JSON document into BSON. An RFC 3339 `timestamp` field is
    /// stored as a native BSON date.
    fn to_bson_document(document: Value) -> Result<Document, StoreError> {
        let mut bson_doc =
            bson::to_document(&document).map_err(|e| StoreError::Serialization(e.to_string()))?;

        let timestamp = match bson_doc.get("timestamp") {
            Some(Bson::String(ts)) => bson::DateTime::parse_rfc3339_str(ts).ok(),
            _ => None,
        };
        if let Some(date) = timestamp {
            bson_doc.insert("timestamp", Bson::DateTime(date));
        }

        Ok(bson_doc)
    }

    #[async_trait]
    impl DocumentStore for MongoStore {
        #[instrument(level = "debug", skip(self, document))]
        async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError> {
            let bson_doc = to_bson_document(document)?;

            let result = self
                .client
                .database(&self.database)
                .collection::<Document>(collection)
                .insert_one(bson_doc)
                .await
                .map_err(|e| StoreError::Write(e.to_string()))?;

            let id = match result.inserted_id {
                Bson::ObjectId(oid) => oid.to_hex(),
                other => other.to_string(),
            };
            debug!(collection = %collection, id = %id, "Inserted document");
            Ok(id)
        }

        async fn close(&self) {
            self.client.clone().shutdown().await;
            info!("Database connection closed");
        }
    }

}
