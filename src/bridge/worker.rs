//! Recorder worker
//!
//! Owns the listener socket, the recording engine and the frame timer. All
//! three are driven from one `select!` loop, so engine state is only ever
//! touched from this context.

use std::thread;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use super::protocol::{
    Ack, DrainReply, ListenerReply, PushOscPayload, RecorderRequest, RpcEnvelope, RpcReply,
    WorkerEvent, WorkerMessage,
};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::network::{ListenerState, ListenerStatus, ReceivedMessage, UdpChannel};
use crate::recorder::{Clock, FrameScheduler, PushContext, RecorderEngine, SystemClock};

/// Host-side ends of one worker's channels
pub struct WorkerLink {
    pub requests: mpsc::UnboundedSender<WorkerMessage>,
    pub events: mpsc::UnboundedReceiver<WorkerEvent>,
}

/// Starts recorder workers on demand
pub trait WorkerSpawner: Send + Sync + 'static {
    fn spawn(&self) -> Result<WorkerLink, BridgeError>;
}

/// Runs each worker on a dedicated thread with its own runtime
pub struct ThreadSpawner {
    config: AppConfig,
}

impl ThreadSpawner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl WorkerSpawner for ThreadSpawner {
    fn spawn(&self) -> Result<WorkerLink, BridgeError> {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let config = self.config.clone();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| BridgeError::WorkerUnavailable(e.to_string()))?;

        thread::Builder::new()
            .name("osc-recorder-worker".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let worker = RecorderWorker::new(&config, Box::new(SystemClock), event_tx);
                    worker.run(request_rx).await;
                });
            })
            .map_err(|e| BridgeError::WorkerUnavailable(e.to_string()))?;

        Ok(WorkerLink {
            requests: request_tx,
            events: event_rx,
        })
    }
}

/// Runs each worker as a task on the caller's runtime
pub struct TaskSpawner {
    config: AppConfig,
}

impl TaskSpawner {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl WorkerSpawner for TaskSpawner {
    fn spawn(&self) -> Result<WorkerLink, BridgeError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| BridgeError::WorkerUnavailable(e.to_string()))?;
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let worker = RecorderWorker::new(&self.config, Box::new(SystemClock), event_tx);
        handle.spawn(worker.run(request_rx));

        Ok(WorkerLink {
            requests: request_tx,
            events: event_rx,
        })
    }
}

pub struct RecorderWorker {
    id: Uuid,
    engine: RecorderEngine,
    listener: UdpChannel,
    scheduler: FrameScheduler,
    events: mpsc::UnboundedSender<WorkerEvent>,
}

impl RecorderWorker {
    pub fn new(
        config: &AppConfig,
        clock: Box<dyn Clock>,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            engine: RecorderEngine::from_config(&config.recorder, clock),
            listener: UdpChannel::new(config.network.bind_address.clone()),
            scheduler: FrameScheduler::new(),
            events,
        }
    }

    /// Serve `inbox` until shutdown or until the host drops its sender
    pub async fn run(self, inbox: mpsc::UnboundedReceiver<WorkerMessage>) {
        let span = tracing::info_span!("recorder_worker", instance = %self.id);
        self.serve(inbox).instrument(span).await
    }

    async fn serve(mut self, mut inbox: mpsc::UnboundedReceiver<WorkerMessage>) {
        tracing::info!("Recorder worker started");

        loop {
            tokio::select! {
                message = inbox.recv() => match message {
                    Some(WorkerMessage::Rpc(envelope)) => self.handle_rpc(envelope).await,
                    Some(WorkerMessage::PushOsc { payload }) => self.push_osc(payload),
                    Some(WorkerMessage::Shutdown) => {
                        tracing::info!("Recorder worker shutdown requested");
                        break;
                    }
                    None => {
                        tracing::info!("Host went away, stopping recorder worker");
                        break;
                    }
                },
                received = self.listener.recv() => match received {
                    Ok(messages) => self.record(messages),
                    Err(e) => {
                        self.engine.reset_listener_state();
                        self.emit_status(ListenerStatus::error(None, e.to_string()));
                    }
                },
                _ = self.scheduler.tick() => {
                    let emitted = self.engine.emit_frames();
                    if emitted > 0 {
                        tracing::trace!(emitted, "frames emitted");
                    }
                }
            }
        }

        self.listener.stop().await;
        self.engine.shutdown();
        self.scheduler.stop();
        tracing::info!(
            pending = self.engine.pending(),
            dropped = self.engine.dropped(),
            "Recorder worker stopped"
        );
    }

    fn record(&mut self, messages: Vec<ReceivedMessage>) {
        for received in messages {
            let context = PushContext {
                args: received.message.args,
                host: Some(received.source.ip().to_string()),
                source_port: Some(received.source.port()),
                listen_port: Some(received.listen_port),
                timestamp: Some(received.timestamp),
            };
            self.engine
                .push(&received.message.address, received.value, context);
        }
    }

    fn push_osc(&mut self, payload: PushOscPayload) {
        if !payload.value.is_finite() {
            return;
        }
        let (address, value, context) = payload.into_parts();
        self.engine.push(&address, value, context);
    }

    async fn handle_rpc(&mut self, envelope: RpcEnvelope) {
        let RpcEnvelope { id, method, payload } = envelope;
        let result = match RecorderRequest::parse(&method, &payload) {
            Ok(request) => self.dispatch(request).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::debug!(id, %method, "RPC failed: {}", e);
        }
        self.send(WorkerEvent::RpcResult(RpcReply::from_result(id, result)));
    }

    async fn dispatch(&mut self, request: RecorderRequest) -> Result<Value, BridgeError> {
        match request {
            RecorderRequest::StartListener(payload) => {
                let reply = self.start_listener(payload.port()).await;
                to_json(&reply)
            }
            RecorderRequest::StopListener => {
                let reply = self.stop_listener().await;
                to_json(&reply)
            }
            RecorderRequest::SetRecordingConfig(config) => {
                self.engine.set_recording_config(&config);
                self.scheduler.restart(self.engine.tick_interval());
                let state = self.engine.state();
                tracing::debug!(
                    armed = state.armed,
                    playing = state.playing,
                    fps = state.fps,
                    "Recording config applied"
                );
                to_json(&Ack::ok())
            }
            RecorderRequest::DrainBuffer(payload) => {
                let drained = self.engine.drain_buffer(payload.limit());
                to_json(&DrainReply::from(drained))
            }
            RecorderRequest::ClearQueues => {
                self.engine.clear_queues();
                to_json(&Ack::ok())
            }
        }
    }

    async fn start_listener(&mut self, port: u16) -> ListenerReply {
        if self.listener.is_listening() && self.listener.port() == Some(port) {
            self.emit_status(ListenerStatus::new(ListenerState::Listening, Some(port)));
            return ListenerReply {
                ok: true,
                port: Some(port),
                error: None,
            };
        }

        self.stop_listener().await;

        match self.listener.start(port).await {
            Ok(port) => {
                self.emit_status(ListenerStatus::new(ListenerState::Listening, Some(port)));
                ListenerReply {
                    ok: true,
                    port: Some(port),
                    error: None,
                }
            }
            Err(e) => {
                let error = e.to_string();
                self.emit_status(ListenerStatus::error(Some(port), error.clone()));
                ListenerReply {
                    ok: false,
                    port: Some(port),
                    error: Some(error),
                }
            }
        }
    }

    async fn stop_listener(&mut self) -> ListenerReply {
        self.listener.stop().await;
        self.engine.reset_listener_state();
        self.emit_status(ListenerStatus::new(ListenerState::Stopped, None));
        ListenerReply {
            ok: true,
            port: None,
            error: None,
        }
    }

    fn emit_status(&self, status: ListenerStatus) {
        self.send(WorkerEvent::ListenStatus { payload: status });
    }

    fn send(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            tracing::debug!("Host event channel closed");
        }
    }
}

fn to_json<T: Serialize>(reply: &T) -> Result<Value, BridgeError> {
    serde_json::to_value(reply).map_err(|e| BridgeError::Remote(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_float_message;
    use crate::recorder::ManualClock;
    use serde_json::json;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.network.bind_address = "127.0.0.1".into();
        config
    }

    fn start_worker() -> (
        mpsc::UnboundedSender<WorkerMessage>,
        mpsc::UnboundedReceiver<WorkerEvent>,
        tokio::task::JoinHandle<()>,
    ) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let worker = RecorderWorker::new(
            &test_config(),
            Box::new(ManualClock::new(1_700_000_000_000)),
            event_tx,
        );
        let handle = tokio::spawn(worker.run(request_rx));
        (request_tx, event_rx, handle)
    }

    fn rpc(id: u64, method: &str, payload: Value) -> WorkerMessage {
        WorkerMessage::Rpc(RpcEnvelope {
            id,
            method: method.into(),
            payload,
        })
    }

    async fn next_reply(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> RpcReply {
        loop {
            match events.recv().await {
                Some(WorkerEvent::RpcResult(reply)) => return reply,
                Some(WorkerEvent::ListenStatus { .. }) => continue,
                None => panic!("worker exited"),
            }
        }
    }

    async fn next_status(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> ListenerStatus {
        loop {
            match events.recv().await {
                Some(WorkerEvent::ListenStatus { payload }) => return payload,
                Some(WorkerEvent::RpcResult(_)) => continue,
                None => panic!("worker exited"),
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_method_replies_with_error() {
        let (requests, mut events, _handle) = start_worker();
        requests.send(rpc(1, "reboot", Value::Null)).unwrap();

        let reply = next_reply(&mut events).await;
        assert_eq!(reply.id, 1);
        assert_eq!(
            reply.error.as_deref(),
            Some("Unknown recorder RPC method: reboot")
        );

        requests.send(rpc(2, "clear-queues", Value::Null)).unwrap();
        let reply = next_reply(&mut events).await;
        assert_eq!(reply.id, 2);
        assert_eq!(reply.result, Some(json!({ "ok": true })));
    }

    #[tokio::test]
    async fn test_push_then_drain_preview() {
        let (requests, mut events, _handle) = start_worker();
        requests
            .send(WorkerMessage::PushOsc {
                payload: PushOscPayload {
                    address: "/a".into(),
                    value: 0.5,
                    ..Default::default()
                },
            })
            .unwrap();
        requests
            .send(WorkerMessage::PushOsc {
                payload: PushOscPayload {
                    address: "/nan".into(),
                    value: f64::NAN,
                    ..Default::default()
                },
            })
            .unwrap();
        requests.send(rpc(1, "drain-buffer", json!({}))).unwrap();

        let reply = next_reply(&mut events).await;
        let drained: DrainReply = serde_json::from_value(reply.result.unwrap()).unwrap();
        assert!(drained.ok);
        assert_eq!(drained.items.len(), 1);
        assert_eq!(drained.items[0].address(), "/a");
        assert_eq!(drained.remaining, 0);
    }

    #[tokio::test]
    async fn test_start_listener_emits_status_and_records() {
        let (requests, mut events, _handle) = start_worker();

        let reserved = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = reserved.local_addr().unwrap().port();
        drop(reserved);

        requests
            .send(rpc(1, "start-listener", json!({ "port": port })))
            .unwrap();

        assert_eq!(next_status(&mut events).await.status, ListenerState::Stopped);
        let listening = next_status(&mut events).await;
        assert_eq!(listening.status, ListenerState::Listening);
        assert_eq!(listening.port, Some(port));

        let reply = next_reply(&mut events).await;
        let reply: ListenerReply = serde_json::from_value(reply.result.unwrap()).unwrap();
        assert!(reply.ok);
        assert_eq!(reply.port, Some(port));

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender
            .send_to(&encode_float_message("/fader", 0.25), ("127.0.0.1", port))
            .await
            .unwrap();

        let mut items = Vec::new();
        for id in 2..200 {
            requests.send(rpc(id, "drain-buffer", Value::Null)).unwrap();
            let reply = next_reply(&mut events).await;
            let drained: DrainReply = serde_json::from_value(reply.result.unwrap()).unwrap();
            items.extend(drained.items);
            if !items.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].address(), "/fader");
        assert_eq!(items[0].value(), 0.25);
    }

    #[tokio::test]
    async fn test_port_move_reports_stop_then_listen() {
        let (requests, mut events, _handle) = start_worker();

        let reserved_a = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let reserved_b = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let first = reserved_a.local_addr().unwrap().port();
        let second = reserved_b.local_addr().unwrap().port();
        drop((reserved_a, reserved_b));

        requests
            .send(rpc(1, "start-listener", json!({ "port": first })))
            .unwrap();
        assert!(next_reply(&mut events).await.error.is_none());

        requests
            .send(rpc(2, "start-listener", json!({ "port": second })))
            .unwrap();
        let stopped = next_status(&mut events).await;
        assert_eq!(stopped.status, ListenerState::Stopped);
        assert_eq!(stopped.port, None);
        let listening = next_status(&mut events).await;
        assert_eq!(listening.status, ListenerState::Listening);
        assert_eq!(listening.port, Some(second));

        let reply = next_reply(&mut events).await;
        assert_eq!(reply.id, 2);
        let reply: ListenerReply = serde_json::from_value(reply.result.unwrap()).unwrap();
        assert!(reply.ok);
        assert_eq!(reply.port, Some(second));

        // The first port was released by the move
        tokio::net::UdpSocket::bind(("127.0.0.1", first))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_start_listener_bind_failure() {
        let (requests, mut events, _handle) = start_worker();
        let holder = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();

        requests
            .send(rpc(1, "start-listener", json!({ "port": port })))
            .unwrap();

        assert_eq!(next_status(&mut events).await.status, ListenerState::Stopped);
        let status = next_status(&mut events).await;
        assert_eq!(status.status, ListenerState::Error);
        assert_eq!(status.port, Some(port));
        assert!(status.error.is_some());

        let reply = next_reply(&mut events).await;
        let reply: ListenerReply = serde_json::from_value(reply.result.unwrap()).unwrap();
        assert!(!reply.ok);
        assert_eq!(reply.port, Some(port));
        assert!(reply.error.is_some());
    }

    #[tokio::test]
    async fn test_shutdown_ends_worker() {
        let (requests, mut events, handle) = start_worker();
        requests.send(WorkerMessage::Shutdown).unwrap();
        handle.await.unwrap();
        assert!(events.recv().await.is_none());
        assert!(requests.is_closed());
    }
}
