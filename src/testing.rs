//! In-memory fakes shared by unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::handlers::{Handler, HandlerError};
use crate::predictor::{Predictor, PredictorError, WasteParameters};
use crate::queue::{QueueError, QueueMessage, ReceiptToken, SendOptions, SqsApi};
use crate::shutdown::ShutdownSignal;
use crate::store::{DocumentStore, StoreError};

pub fn message(id: &str, body: &str) -> QueueMessage {
    QueueMessage::new(id, body, format!("receipt-{id}"))
}

pub fn routed(id: &str, key: &str, event_name: &str) -> QueueMessage {
    let body = format!(r#"{{"eventName":"{event_name}","eventData":{{"id":"{id}"}}}}"#);
    message(id, &body).with_ordering_key(key)
}

/// Store that keeps documents in memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<Vec<(String, Value)>>,
    fail_writes: bool,
    closed: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub fn documents(&self) -> Vec<(String, Value)> {
        self.documents.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, document: Value) -> Result<String, StoreError> {
        if self.fail_writes {
            return Err(StoreError::Write("connection reset".to_string()));
        }
        let mut docs = self.documents.lock().unwrap();
        docs.push((collection.to_string(), document));
        Ok(format!("doc-{}", docs.len()))
    }

    async fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Predictor returning a fixed result.
pub struct StaticPredictor {
    result: Value,
    calls: AtomicUsize,
}

impl StaticPredictor {
    pub fn new(result: Value) -> Self {
        Self {
            result,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Predictor for StaticPredictor {
    async fn predict(&self, _params: &WasteParameters) -> Result<Value, PredictorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

pub struct FailingPredictor;

#[async_trait]
impl Predictor for FailingPredictor {
    async fn predict(&self, _params: &WasteParameters) -> Result<Value, PredictorError> {
        Err(PredictorError::InvalidResponse("model unavailable".to_string()))
    }
}

/// Handler that records which steps ran and echoes the payload as result.
pub struct RecordingHandler {
    name: String,
    calls: Mutex<Vec<&'static str>>,
    seen: Mutex<Vec<Value>>,
    fail_validate: Option<String>,
    fail_compute: Option<String>,
    fail_persist: Option<String>,
    panic_in_compute: bool,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            calls: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
            fail_validate: None,
            fail_compute: None,
            fail_persist: None,
            panic_in_compute: false,
        }
    }

    pub fn fail_validate(mut self, reason: &str) -> Self {
        self.fail_validate = Some(reason.to_string());
        self
    }

    pub fn fail_compute(mut self, reason: &str) -> Self {
        self.fail_compute = Some(reason.to_string());
        self
    }

    pub fn fail_persist(mut self, reason: &str) -> Self {
        self.fail_persist = Some(reason.to_string());
        self
    }

    pub fn panic_in_compute(mut self) -> Self {
        self.panic_in_compute = true;
        self
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    /// Payloads that reached `compute`, in order.
    pub fn seen(&self) -> Vec<Value> {
        self.seen.lock().unwrap().clone()
    }

    fn record(&self, step: &'static str) {
        self.calls.lock().unwrap().push(step);
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, _payload: &Value) -> Result<(), HandlerError> {
        self.record("validate");
        match &self.fail_validate {
            Some(reason) => Err(HandlerError::Failed(reason.clone())),
            None => Ok(()),
        }
    }

    async fn compute(&self, payload: &Value) -> Result<Value, HandlerError> {
        self.record("compute");
        if self.panic_in_compute {
            panic!("boom");
        }
        self.seen.lock().unwrap().push(payload.clone());
        match &self.fail_compute {
            Some(reason) => Err(HandlerError::Failed(reason.clone())),
            None => Ok(payload.clone()),
        }
    }

    async fn persist(&self, _payload: &Value, _result: &Value) -> Result<(), HandlerError> {
        self.record("persist");
        match &self.fail_persist {
            Some(reason) => Err(HandlerError::Failed(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Scripted SQS queue.
///
/// Each receive pops the next scripted batch. Once the script is exhausted
/// the queue requests a stop (when a signal is attached) and returns an
/// empty batch.
#[derive(Default)]
pub struct FakeQueue {
    batches: Mutex<VecDeque<Result<Vec<QueueMessage>, QueueError>>>,
    receives: AtomicUsize,
    deleted: Mutex<Vec<ReceiptToken>>,
    sent: Mutex<Vec<(String, String, SendOptions)>>,
    fail_sends: bool,
    fail_deletes: bool,
    stop_on_receive: Mutex<Option<(usize, ShutdownSignal)>>,
    stop_when_drained: Mutex<Option<ShutdownSignal>>,
}

impl FakeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batch(self, batch: Vec<QueueMessage>) -> Self {
        self.batches.lock().unwrap().push_back(Ok(batch));
        self
    }

    pub fn with_receive_error(self) -> Self {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(QueueError::Receive("throttled".to_string())));
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    /// Request a stop while serving the `n`th receive (1-based).
    pub fn stop_during_receive(self, n: usize, signal: ShutdownSignal) -> Self {
        *self.stop_on_receive.lock().unwrap() = Some((n, signal));
        self
    }

    pub fn stop_when_drained(self, signal: ShutdownSignal) -> Self {
        *self.stop_when_drained.lock().unwrap() = Some(signal);
        self
    }

    pub fn receive_count(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.as_str().to_string())
            .collect()
    }

    /// `(queue_url, body, options)` for every send attempt.
    pub fn sent(&self) -> Vec<(String, String, SendOptions)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqsApi for FakeQueue {
    async fn receive_messages(
        &self,
        _queue_url: &str,
        max_messages: i32,
        _wait_time_secs: i32,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let n = self.receives.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some((at, signal)) = self.stop_on_receive.lock().unwrap().as_ref() {
            if *at == n {
                signal.request_stop();
            }
        }

        let next = self.batches.lock().unwrap().pop_front();
        match next {
            Some(Ok(mut batch)) => {
                batch.truncate(max_messages.max(0) as usize);
                Ok(batch)
            }
            Some(Err(e)) => Err(e),
            None => {
                if let Some(signal) = self.stop_when_drained.lock().unwrap().as_ref() {
                    signal.request_stop();
                }
                Ok(Vec::new())
            }
        }
    }

    async fn delete_message(
        &self,
        _queue_url: &str,
        receipt: &ReceiptToken,
    ) -> Result<(), QueueError> {
        self.deleted.lock().unwrap().push(receipt.clone());
        if self.fail_deletes {
            return Err(QueueError::Delete("receipt expired".to_string()));
        }
        Ok(())
    }

    async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
        options: SendOptions,
    ) -> Result<String, QueueError> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((queue_url.to_string(), body.to_string(), options));
        if self.fail_sends {
            return Err(QueueError::Send("access denied".to_string()));
        }
        Ok(format!("sent-{}", sent.len()))
    }
}

/// Collects JSON log lines emitted on the current thread.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route this thread's events into the capture until the guard drops.
    pub fn set_default(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
