//! Stub collaborators shared by the use case tests.

use crate::cancellation::CancelHandle;
use crate::ports::ai_caller::{AiCallRequest, AiCaller, GatewayError};
use crate::ports::config_store::{ConfigStore, ConfigStoreError};
use crate::ports::progress::ProgressSink;
use crate::ports::worldbook_store::{WorldbookStore, WorldbookStoreError};
use async_trait::async_trait;
use conclave_domain::{ConfigSnapshot, TaskStatus, Worldbook};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Responder = Box<dyn Fn(&AiCallRequest) -> Result<String, GatewayError> + Send + Sync>;

/// Programmable AI caller that records every request.
pub struct StubCaller {
    responder: Responder,
    delay: Duration,
    slow_model: Option<(String, Duration)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    requests: Mutex<Vec<AiCallRequest>>,
}

impl StubCaller {
    pub fn responding(
        f: impl Fn(&AiCallRequest) -> Result<String, GatewayError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            responder: Box::new(f),
            delay: Duration::ZERO,
            slow_model: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Returns the user prompt unchanged.
    pub fn echo() -> Self {
        Self::responding(|req| Ok(req.user_prompt.clone()))
    }

    pub fn failing(message: &'static str) -> Self {
        Self::responding(move |_| Err(GatewayError::RequestFailed(message.to_string())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Calls to `model` take `delay` instead of the default delay.
    pub fn with_slow_model(mut self, model: &str, delay: Duration) -> Self {
        self.slow_model = Some((model.to_string(), delay));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<AiCallRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn models_called(&self) -> Vec<String> {
        let mut models: Vec<String> = self.requests().into_iter().map(|r| r.model).collect();
        models.sort();
        models
    }
}

#[async_trait]
impl AiCaller for StubCaller {
    async fn call(
        &self,
        request: AiCallRequest,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let delay = match &self.slow_model {
            Some((model, delay)) if *model == request.model => *delay,
            _ => self.delay,
        };
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::Aborted),
            _ = tokio::time::sleep(delay) => (self.responder)(&request),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Worldbooks held in memory; names in `broken` fail to load.
#[derive(Default)]
pub struct MemoryWorldbookStore {
    books: HashMap<String, Worldbook>,
    broken: HashSet<String>,
    loads: AtomicUsize,
}

impl MemoryWorldbookStore {
    pub fn with(mut self, book: Worldbook) -> Self {
        self.books.insert(book.name.clone(), book);
        self
    }

    pub fn with_broken(mut self, name: &str) -> Self {
        self.broken.insert(name.to_string());
        self
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorldbookStore for MemoryWorldbookStore {
    async fn load(&self, name: &str) -> Result<Option<Worldbook>, WorldbookStoreError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(name) {
            return Err(WorldbookStoreError::Parse {
                name: name.to_string(),
                message: "unexpected end of input".to_string(),
            });
        }
        Ok(self.books.get(name).cloned())
    }
}

/// Progress sink that records every update and keeps the cancel handles.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<(String, TaskStatus)>>,
    pub handles: Mutex<HashMap<String, CancelHandle>>,
    pub cancel_all: Mutex<Option<CancelHandle>>,
}

impl RecordingProgress {
    pub fn final_status(&self, id: &str) -> Option<TaskStatus> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(task, _)| task == id)
            .map(|(_, status)| *status)
    }

    pub fn task_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

impl ProgressSink for RecordingProgress {
    fn add_task(&self, id: &str, _label: &str, status: TaskStatus) {
        self.events.lock().unwrap().push((id.to_string(), status));
    }

    fn update_task(&self, id: &str, status: TaskStatus, _percent: u8) {
        self.events.lock().unwrap().push((id.to_string(), status));
    }

    fn set_cancel_handle(&self, id: &str, handle: CancelHandle) {
        self.handles.lock().unwrap().insert(id.to_string(), handle);
    }

    fn set_cancel_all_handle(&self, handle: CancelHandle) {
        *self.cancel_all.lock().unwrap() = Some(handle);
    }
}

/// Config store backed by a mutex.
pub struct MemoryConfigStore {
    pub snapshot: Mutex<ConfigSnapshot>,
    pub saves: AtomicUsize,
}

impl MemoryConfigStore {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            snapshot: Mutex::new(snapshot),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn current(&self) -> ConfigSnapshot {
        self.snapshot.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<ConfigSnapshot, ConfigStoreError> {
        Ok(self.current())
    }

    async fn save(&self, snapshot: &ConfigSnapshot) -> Result<(), ConfigStoreError> {
        *self.snapshot.lock().unwrap() = snapshot.clone();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
