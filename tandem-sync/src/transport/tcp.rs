//! Newline-delimited JSON over TCP
//!
//! One [`WireMessage`] per line. A `TcpTransport` serves one connection at a
//! time; the peer binary accepts (or reconnects) in a loop and hands each
//! stream to [`TcpTransport::run_connection`].

use std::sync::Mutex;
use tandem_common::WireMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::Transport;
use crate::error::{Error, Result};
use crate::sync::SyncHandle;

/// TCP link to the peer
#[derive(Debug, Default)]
pub struct TcpTransport {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
        self.outbound.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Serve one connection until the peer closes it
    ///
    /// Marks the orchestrator connected for the lifetime of the stream, which
    /// makes a host re-announce its state.
    pub async fn run_connection(&self, stream: TcpStream, handle: &SyncHandle) -> Result<()> {
        let peer = stream.peer_addr()?;
        let (read_half, mut write_half) = stream.into_split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.lock() = Some(tx);
        info!("Connected to peer {}", peer);

        let writer = tokio::spawn(async move {
            while let Some(mut line) = rx.recv().await {
                line.push('\n');
                if let Err(e) = write_half.write_all(line.as_bytes()).await {
                    warn!("Write to peer failed: {}", e);
                    break;
                }
            }
        });

        handle.set_connected(true)?;

        let mut lines = BufReader::new(read_half).lines();
        let result = loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match WireMessage::from_line(&line) {
                        Ok(message) => {
                            if let Err(e) = handle.deliver(message) {
                                break Err(e);
                            }
                        }
                        Err(e) => warn!("Discarding malformed message from {}: {}", peer, e),
                    }
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(Error::Io(e)),
            }
        };

        *self.lock() = None;
        writer.abort();
        info!("Disconnected from peer {}", peer);
        // The orchestrator may already be gone during shutdown
        if handle.set_connected(false).is_err() {
            debug!("Orchestrator stopped before disconnect was reported");
        }
        result
    }
}

impl Transport for TcpTransport {
    fn send(&self, message: WireMessage) -> Result<()> {
        let line = message.to_line()?;
        match self.lock().as_ref() {
            Some(tx) => tx
                .send(line)
                .map_err(|_| Error::Transport("connection closed".to_string())),
            None => Err(Error::Transport("not connected".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::WallClock;
    use crate::config::SyncConfig;
    use crate::player::SimulatedPlayer;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_answered_over_tcp() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let transport = Arc::new(TcpTransport::new());
        let player = Arc::new(SimulatedPlayer::new(60_000));
        let (handle, _task) = crate::sync::spawn(
            SyncConfig::default(),
            player,
            transport.clone(),
            Arc::new(WallClock::new()),
        );

        let server = {
            let transport = transport.clone();
            let handle = handle.clone();
            tokio::spawn(async move {
                let (stream, _) = listener.accept().await.unwrap();
                transport.run_connection(stream, &handle).await
            })
        };

        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(b"\nnot json\n").await.unwrap();
        write_half
            .write_all(b"{\"kind\":\"probe\",\"sent_at_ms\":5}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(read_half).lines();
        let reply = lines.next_line().await.unwrap().unwrap();
        assert_eq!(
            WireMessage::from_line(&reply).unwrap(),
            WireMessage::ProbeResponse { sent_at_ms: 5 }
        );
        assert!(transport.is_connected());

        drop(write_half);
        drop(lines);
        server.await.unwrap().unwrap();
        assert!(!transport.is_connected());
        assert!(transport.send(WireMessage::Probe { sent_at_ms: 1 }).is_err());
    }
}
