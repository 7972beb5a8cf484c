//! Peer transport
//!
//! The core only needs an ordered, fire-and-forget outbound path. Inbound
//! messages are handed to the orchestrator with [`SyncHandle::deliver`].

pub mod tcp;

pub use tcp::TcpTransport;

use tandem_common::WireMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::SyncHandle;

/// Outbound half of an ordered link to the peer
pub trait Transport: Send + Sync {
    /// Queue a message; must not block
    fn send(&self, message: WireMessage) -> Result<()>;
}

/// In-process transport backed by an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<WireMessage>,
}

impl ChannelTransport {
    /// Transport plus the receiving end of everything sent through it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<WireMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, message: WireMessage) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|_| Error::Transport("peer channel closed".to_string()))
    }
}

/// Deliver everything from `rx` to the orchestrator behind `handle`
pub fn forward_inbound(mut rx: mpsc::UnboundedReceiver<WireMessage>, handle: SyncHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if handle.deliver(message).is_err() {
                debug!("Orchestrator gone, inbound forwarding stopped");
                break;
            }
        }
    })
}
