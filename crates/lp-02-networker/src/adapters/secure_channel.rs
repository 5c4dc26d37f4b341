//! # Encrypted TCP Channels
//!
//! Production `NodeConnector`.
//!
//! ## Wire Protocol
//!
//! ```text
//! client → node : client x25519 public key (32 bytes)
//! both ways     : u32 BE len ‖ nonce(24) ‖ XChaCha20-Poly1305 ciphertext
//! ```
//!
//! `connect` returns at once. A background task dials the node, writes the
//! handshake and then drains the channel's outbound queue; a second task
//! reads frames and forwards them to the pool loop. Dropping the channel
//! ends both tasks and closes the socket.

use std::time::Duration;

use shared_types::{ConnectionId, NodeAlias};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::domain::{check_frame_len, encode_frame, FrameCipher, NetworkerError, SessionKeys};
use crate::ports::{InboundFrame, NodeChannel, NodeConnector, NodeLink};

/// Opens encrypted TCP channels on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    /// Connector giving up on a dial after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

impl NodeConnector for TcpConnector {
    fn connect(&self, link: NodeLink<'_>) -> Result<Box<dyn NodeChannel>, NetworkerError> {
        let runtime = Handle::try_current().map_err(|e| NetworkerError::Runtime(e.to_string()))?;
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let session = ChannelSession {
            pool_id: link.pool_id,
            node_index: link.node_index,
            alias: link.node.name.clone(),
            address: link.node.socket_address().to_string(),
            client_pk: link.client_secret.public_bytes(),
            keys: link.client_secret.session_keys(&link.node.boxed_pubkey),
            connect_timeout: self.connect_timeout,
        };
        debug!(pool = link.pool_id, alias = %session.alias, address = %session.address, "Opening channel");
        runtime.spawn(session.run(outbound_rx, link.inbound));

        Ok(Box::new(TcpChannel {
            alias: link.node.name.clone(),
            outbound: outbound_tx,
        }))
    }
}

struct TcpChannel {
    alias: NodeAlias,
    outbound: mpsc::UnboundedSender<String>,
}

impl NodeChannel for TcpChannel {
    fn send(&mut self, message: &str) -> Result<(), NetworkerError> {
        self.outbound
            .send(message.to_string())
            .map_err(|_| NetworkerError::ChannelClosed(self.alias.clone()))
    }
}

struct ChannelSession {
    pool_id: ConnectionId,
    node_index: usize,
    alias: NodeAlias,
    address: String,
    client_pk: [u8; 32],
    keys: SessionKeys,
    connect_timeout: Duration,
}

impl ChannelSession {
    async fn run(self, mut outbound: mpsc::UnboundedReceiver<String>, inbound: mpsc::Sender<InboundFrame>) {
        let stream = match tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                warn!(alias = %self.alias, address = %self.address, error = %e, "Node connect failed");
                return;
            }
            Err(_) => {
                warn!(alias = %self.alias, address = %self.address, "Node connect timed out");
                return;
            }
        };
        let _ = stream.set_nodelay(true);
        let (reader, mut writer) = stream.into_split();

        if let Err(e) = writer.write_all(&self.client_pk).await {
            warn!(alias = %self.alias, error = %e, "Handshake write failed");
            return;
        }

        let reader_task = tokio::spawn(read_frames(
            reader,
            self.keys.opener(),
            self.alias.clone(),
            self.pool_id,
            self.node_index,
            inbound,
        ));

        let sealer = self.keys.sealer();
        while let Some(message) = outbound.recv().await {
            let frame = match sealer.seal(message.as_bytes()).and_then(|body| encode_frame(&body)) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(alias = %self.alias, error = %e, "Dropping unsendable message");
                    continue;
                }
            };
            if let Err(e) = writer.write_all(&frame).await {
                warn!(alias = %self.alias, error = %e, "Node write failed");
                break;
            }
        }

        reader_task.abort();
        debug!(alias = %self.alias, pool = self.pool_id, "Channel closed");
    }
}

async fn read_frames(
    mut reader: OwnedReadHalf,
    opener: FrameCipher,
    alias: NodeAlias,
    pool_id: ConnectionId,
    node_index: usize,
    inbound: mpsc::Sender<InboundFrame>,
) {
    loop {
        let mut header = [0u8; 4];
        if reader.read_exact(&mut header).await.is_err() {
            debug!(alias = %alias, "Node closed the connection");
            return;
        }
        let len = match check_frame_len(header) {
            Ok(len) => len,
            Err(e) => {
                warn!(alias = %alias, error = %e, "Dropping connection");
                return;
            }
        };
        let mut body = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut body).await {
            warn!(alias = %alias, error = %e, "Truncated frame");
            return;
        }

        let payload = match opener.open(&body).map(String::from_utf8) {
            Ok(Ok(text)) => text,
            Ok(Err(_)) => {
                warn!(alias = %alias, "Frame is not UTF-8");
                continue;
            }
            Err(e) => {
                warn!(alias = %alias, error = %e, "Frame failed authentication");
                continue;
            }
        };

        let frame = InboundFrame {
            pool_id,
            node_index,
            payload,
        };
        if inbound.send(frame).await.is_err() {
            return;
        }
    }
}
