//! Host side of the recorder bridge
//!
//! Workers are started lazily on the first call and replaced when the current
//! one has exited. Each worker instance owns its pending-call table and id
//! counter; when its event stream ends every call still pending on it is
//! rejected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use super::protocol::{
    Ack, DrainPayload, DrainReply, ListenerReply, PushOscPayload, RecorderRequest, RpcEnvelope,
    StartListenerPayload, WorkerEvent, WorkerMessage,
};
use super::worker::{ThreadSpawner, WorkerLink, WorkerSpawner};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::network::{ListenerState, ListenerStatus};
use crate::recorder::RecordingConfig;

type CallResult = Result<Value, BridgeError>;

const STATUS_CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct PendingState {
    calls: HashMap<u64, oneshot::Sender<CallResult>>,
    closed: bool,
}

/// Calls awaiting a reply from one worker instance
#[derive(Default)]
struct PendingCalls {
    state: Mutex<PendingState>,
}

impl PendingCalls {
    /// Register a call; fails once the table is closed
    fn register(&self, id: u64) -> Result<oneshot::Receiver<CallResult>, BridgeError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(BridgeError::WorkerExited("worker no longer running".into()));
        }
        let (tx, rx) = oneshot::channel();
        state.calls.insert(id, tx);
        Ok(rx)
    }

    fn resolve(&self, id: u64, result: CallResult) {
        let sender = self.state.lock().calls.remove(&id);
        match sender {
            Some(tx) => {
                let _ = tx.send(result);
            }
            None => tracing::debug!(id, "Reply for unknown call id"),
        }
    }

    fn cancel(&self, id: u64) -> Option<oneshot::Sender<CallResult>> {
        self.state.lock().calls.remove(&id)
    }

    /// Close the table and reject everything still in it
    fn close(&self, error: BridgeError) -> usize {
        let calls: Vec<_> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.calls.drain().collect()
        };
        let count = calls.len();
        for (_, tx) in calls {
            let _ = tx.send(Err(error.clone()));
        }
        count
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn len(&self) -> usize {
        self.state.lock().calls.len()
    }
}

struct WorkerHandle {
    requests: mpsc::UnboundedSender<WorkerMessage>,
    pending: Arc<PendingCalls>,
    next_id: AtomicU64,
}

impl WorkerHandle {
    fn is_alive(&self) -> bool {
        !self.pending.is_closed() && !self.requests.is_closed()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Shared with the per-worker reader tasks
struct StatusHub {
    tx: broadcast::Sender<ListenerStatus>,
    listen_port: Mutex<Option<u16>>,
}

impl StatusHub {
    fn publish(&self, status: ListenerStatus) {
        {
            let mut port = self.listen_port.lock();
            match status.status {
                ListenerState::Listening => *port = status.port,
                ListenerState::Stopped | ListenerState::Error => *port = None,
                ListenerState::Binding => {}
            }
        }
        // No subscribers is fine
        let _ = self.tx.send(status);
    }
}

/// Host handle to the recorder worker
pub struct RecorderBridge {
    spawner: Arc<dyn WorkerSpawner>,
    worker: Mutex<Option<Arc<WorkerHandle>>>,
    status: Arc<StatusHub>,
}

impl RecorderBridge {
    /// Bridge running its workers on dedicated threads
    pub fn new(config: &AppConfig) -> Self {
        Self::with_spawner(ThreadSpawner::new(config.clone()))
    }

    pub fn with_spawner(spawner: impl WorkerSpawner) -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self {
            spawner: Arc::new(spawner),
            worker: Mutex::new(None),
            status: Arc::new(StatusHub {
                tx,
                listen_port: Mutex::new(None),
            }),
        }
    }

    /// Listener status updates, from the worker and from host-side failures
    pub fn subscribe_status(&self) -> broadcast::Receiver<ListenerStatus> {
        self.status.tx.subscribe()
    }

    /// Port of the active listener, if any
    pub fn listen_port(&self) -> Option<u16> {
        *self.status.listen_port.lock()
    }

    pub fn is_worker_running(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .map(|w| w.is_alive())
            .unwrap_or(false)
    }

    /// Calls awaiting a reply on the current worker
    pub fn pending_calls(&self) -> usize {
        self.worker
            .lock()
            .as_ref()
            .map(|w| w.pending.len())
            .unwrap_or(0)
    }

    fn ensure_worker(&self) -> Result<Arc<WorkerHandle>, BridgeError> {
        let mut slot = self.worker.lock();
        if let Some(worker) = slot.as_ref() {
            if worker.is_alive() {
                return Ok(worker.clone());
            }
        }
        if let Some(old) = slot.take() {
            let rejected = old
                .pending
                .close(BridgeError::WorkerExited("worker replaced".into()));
            tracing::info!(rejected, "Replacing exited recorder worker");
        }

        // The event reader needs a runtime; check before starting a worker
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::WorkerUnavailable(e.to_string()))?;
        let WorkerLink { requests, events } = self.spawner.spawn()?;
        let worker = Arc::new(WorkerHandle {
            requests,
            pending: Arc::new(PendingCalls::default()),
            next_id: AtomicU64::new(1),
        });
        runtime.spawn(read_events(
            events,
            worker.pending.clone(),
            self.status.clone(),
        ));
        tracing::debug!("Recorder worker spawned");

        *slot = Some(worker.clone());
        Ok(worker)
    }

    /// Issue one call and wait for its reply
    pub async fn call(&self, method: &str, payload: Value) -> CallResult {
        let worker = self.ensure_worker()?;
        let id = worker.next_id();
        let reply = worker.pending.register(id)?;

        let envelope = RpcEnvelope {
            id,
            method: method.to_string(),
            payload,
        };
        if worker.requests.send(WorkerMessage::Rpc(envelope)).is_err() {
            worker.pending.cancel(id);
            return Err(BridgeError::WorkerExited(
                "worker stopped accepting requests".into(),
            ));
        }

        match reply.await {
            Ok(result) => result,
            Err(_) => Err(BridgeError::WorkerExited("reply channel dropped".into())),
        }
    }

    pub async fn request(&self, request: RecorderRequest) -> CallResult {
        self.call(request.method().as_str(), request.payload()).await
    }

    async fn request_typed<T: DeserializeOwned>(
        &self,
        request: RecorderRequest,
    ) -> Result<T, BridgeError> {
        let method = request.method();
        let value = self.request(request).await?;
        serde_json::from_value(value).map_err(|e| BridgeError::InvalidPayload {
            method: method.to_string(),
            reason: e.to_string(),
        })
    }

    /// Start (or move) the listener
    ///
    /// Transport failures are reported as `{ok: false}` plus an error status.
    pub async fn start_listener(&self, port: Option<f64>) -> ListenerReply {
        let payload = StartListenerPayload { port };
        let port = payload.port();
        match self
            .request_typed(RecorderRequest::StartListener(payload))
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                let error = e.to_string();
                tracing::warn!(port, "Failed to start OSC listener: {}", error);
                self.status
                    .publish(ListenerStatus::error(Some(port), error.clone()));
                ListenerReply {
                    ok: false,
                    port: Some(port),
                    error: Some(error),
                }
            }
        }
    }

    pub async fn stop_listener(&self) -> ListenerReply {
        match self.request_typed(RecorderRequest::StopListener).await {
            Ok(reply) => reply,
            Err(e) => {
                let error = e.to_string();
                tracing::warn!("Failed to stop OSC listener: {}", error);
                self.status.publish(ListenerStatus::error(None, error.clone()));
                ListenerReply {
                    ok: false,
                    port: None,
                    error: Some(error),
                }
            }
        }
    }

    pub async fn set_recording_config(&self, config: RecordingConfig) -> Ack {
        self.request_typed(RecorderRequest::SetRecordingConfig(config))
            .await
            .unwrap_or_else(|e| Ack::failed(e.to_string()))
    }

    pub async fn drain_buffer(&self, limit: Option<f64>) -> DrainReply {
        self.request_typed(RecorderRequest::DrainBuffer(DrainPayload { limit }))
            .await
            .unwrap_or_else(|e| DrainReply::failed(e.to_string()))
    }

    pub async fn clear_queues(&self) -> Ack {
        self.request_typed(RecorderRequest::ClearQueues)
            .await
            .unwrap_or_else(|e| Ack::failed(e.to_string()))
    }

    /// Inject a sample as if it had arrived on the listener
    pub fn push_osc(&self, payload: PushOscPayload) -> Ack {
        let result = self.ensure_worker().and_then(|worker| {
            worker
                .requests
                .send(WorkerMessage::PushOsc { payload })
                .map_err(|_| BridgeError::WorkerExited("worker stopped accepting requests".into()))
        });
        match result {
            Ok(()) => Ack::ok(),
            Err(e) => {
                tracing::debug!("push-osc dropped: {}", e);
                Ack::failed(e.to_string())
            }
        }
    }

    /// Stop the worker and reject every pending call
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };
        let _ = worker.requests.send(WorkerMessage::Shutdown);
        let rejected = worker.pending.close(BridgeError::ShuttingDown);
        *self.status.listen_port.lock() = None;
        tracing::info!(rejected, "Recorder bridge shut down");
    }
}

impl Drop for RecorderBridge {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            let _ = worker.requests.send(WorkerMessage::Shutdown);
            worker.pending.close(BridgeError::ShuttingDown);
        }
    }
}

async fn read_events(
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
    pending: Arc<PendingCalls>,
    status: Arc<StatusHub>,
) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::RpcResult(reply) => {
                let id = reply.id;
                pending.resolve(id, reply.into_result());
            }
            WorkerEvent::ListenStatus { payload } => status.publish(payload),
        }
    }

    let rejected = pending.close(BridgeError::WorkerExited(
        "worker event stream closed".into(),
    ));
    if rejected > 0 {
        tracing::warn!(rejected, "Recorder worker exited with calls pending");
    }
    let mut port = status.listen_port.lock();
    if port.is_some() {
        *port = None;
    }
}
