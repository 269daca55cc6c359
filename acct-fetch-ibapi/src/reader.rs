//! Async message reader for the IB TWS API.
//!
//! Spawns a tokio task that continuously reads messages from the server,
//! decodes them into `IBEvent`s, and sends them through an mpsc channel.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::decoder::decode_server_msg;
use crate::errors::IBApiError;
use crate::transport::TransportReader;
use crate::wrapper::IBEvent;

/// Background reader over the read half of a transport.
///
/// The task ends when the socket closes, a read fails, or the receiver is
/// dropped. The last event sent on a closed socket is always
/// `IBEvent::ConnectionClosed`.
pub struct MessageReader {
    transport_reader: TransportReader,
    server_version: i32,
}

impl MessageReader {
    pub fn new(transport_reader: TransportReader, server_version: i32) -> Self {
        Self {
            transport_reader,
            server_version,
        }
    }

    /// Spawn the reader task and return the event receiver + task handle.
    pub fn spawn(self) -> (mpsc::UnboundedReceiver<IBEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            self.run(tx).await;
        });

        (rx, handle)
    }

    async fn run(mut self, tx: mpsc::UnboundedSender<IBEvent>) {
        loop {
            match self.transport_reader.read_message().await {
                Ok(msg) => {
                    let event = decode_server_msg(&msg, self.server_version);
                    if tx.send(event).is_err() {
                        tracing::debug!("event receiver dropped, reader stopping");
                        break;
                    }
                }
                Err(IBApiError::Disconnected(reason)) => {
                    tracing::info!("server disconnected: {reason}");
                    let _ = tx.send(IBEvent::ConnectionClosed);
                    break;
                }
                Err(e) => {
                    tracing::error!("reader error: {e}");
                    let _ = tx.send(IBEvent::ReaderError {
                        message: format!("reader error: {e}"),
                    });
                    let _ = tx.send(IBEvent::ConnectionClosed);
                    break;
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
