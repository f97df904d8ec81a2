//! Host/worker RPC bridge
//!
//! The recorder runs in its own execution context. The host talks to it with
//! id-correlated request/reply messages and receives listener status events.

pub mod host;
pub mod protocol;
pub mod worker;

pub use host::RecorderBridge;
pub use protocol::{
    Ack, DrainReply, ListenerReply, PushOscPayload, RecorderMethod, RecorderRequest,
    RpcEnvelope, RpcReply, WorkerEvent, WorkerMessage,
};
pub use worker::{RecorderWorker, TaskSpawner, ThreadSpawner, WorkerLink, WorkerSpawner};
