//! IB TWS API client.
//!
//! `IBClient` is the outbound half of a session: it owns the write side of the
//! socket and encodes requests. The inbound half is the reader task spawned on
//! connect, whose events arrive on the returned channel.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::encoder::MessageEncoder;
use crate::errors::{IBApiError, Result};
use crate::protocol::{outgoing, server_version};
use crate::reader::MessageReader;
use crate::transport::{Transport, TransportWriter};
use crate::wrapper::IBEvent;

/// How long `disconnect` waits for the reader to see EOF before aborting it.
const READER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Async IB TWS API request sender.
///
/// ## Usage
///
/// ```rust,ignore
/// let (mut client, mut rx) = IBClient::connect("127.0.0.1", 4002, 0, None).await?;
///
/// let req_id = client.next_req_id();
/// client.req_account_summary(req_id, "All", "NetLiquidation").await?;
///
/// while let Some(event) = rx.recv().await {
///     match event {
///         IBEvent::AccountSummaryEnd { .. } => break,
///         IBEvent::Error { code, message, .. } => eprintln!("Error {code}: {message}"),
///         _ => {}
///     }
/// }
/// client.disconnect().await;
/// ```
pub struct IBClient {
    writer: TransportWriter,
    server_version: i32,
    tws_time: String,
    client_id: i32,
    next_req_id: AtomicI32,
    connected: AtomicBool,
    reader_handle: Option<JoinHandle<()>>,
}

impl IBClient {
    /// Connect to TWS/Gateway, perform the handshake, send START_API, and
    /// spawn the background reader task.
    ///
    /// The first events on the receiver are normally `NextValidId` and
    /// `ManagedAccounts`; callers that need a confirmed session should wait
    /// for `NextValidId`.
    pub async fn connect(
        host: &str,
        port: u16,
        client_id: i32,
        optional_capabilities: Option<&str>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<IBEvent>)> {
        let mut transport = Transport::connect(host, port, None).await?;
        let server_version = transport.server_version();
        let tws_time = transport.tws_time().to_string();

        tracing::info!(server_version, client_id, "IBClient connecting");

        transport.start_api(client_id, optional_capabilities).await?;

        let (transport_reader, transport_writer) = transport.into_split();
        let reader = MessageReader::new(transport_reader, server_version);
        let (rx, reader_handle) = reader.spawn();

        let client = Self {
            writer: transport_writer,
            server_version,
            tws_time,
            client_id,
            next_req_id: AtomicI32::new(9000),
            connected: AtomicBool::new(true),
            reader_handle: Some(reader_handle),
        };

        Ok((client, rx))
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub fn tws_time(&self) -> &str {
        &self.tws_time
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Allocate a request id for correlating responses.
    pub fn next_req_id(&self) -> i32 {
        self.next_req_id.fetch_add(1, Ordering::Relaxed)
    }

    // ========================================================================
    // Connection Management
    // ========================================================================

    /// Disconnect from the server. Safe to call more than once.
    ///
    /// Shuts down the write half, then waits briefly for the reader task to
    /// observe EOF; a reader still blocked after the grace period is aborted
    /// so no task outlives the session.
    pub async fn disconnect(&mut self) {
        if !self.connected.swap(false, Ordering::Relaxed) {
            return;
        }

        tracing::info!("IBClient disconnecting");
        self.writer.shutdown().await;

        if let Some(mut handle) = self.reader_handle.take() {
            if tokio::time::timeout(READER_SHUTDOWN_GRACE, &mut handle).await.is_err() {
                tracing::debug!("reader still running after shutdown, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }
    }

    // ========================================================================
    // Message Sending
    // ========================================================================

    fn encoder(&self) -> MessageEncoder {
        MessageEncoder::new(self.server_version)
    }

    async fn send_encoded(&mut self, enc: MessageEncoder) -> Result<()> {
        if !self.is_connected() {
            return Err(IBApiError::Connection("not connected".into()));
        }
        let bytes = enc.finalize()?;
        self.writer.send_message(&bytes).await
    }

    fn check_server_version(&self, required: i32, feature: &str) -> Result<()> {
        if self.server_version < required {
            return Err(IBApiError::Protocol(format!(
                "server version {} does not support {feature} (requires {required})",
                self.server_version
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Account & Positions
    // ========================================================================

    /// Request account summary for `group_name` ("All" for every account).
    pub async fn req_account_summary(&mut self, req_id: i32, group_name: &str, tags: &str) -> Result<()> {
        self.check_server_version(server_version::ACCOUNT_SUMMARY, "req_account_summary")?;
        let mut enc = self.encoder();
        enc.encode_msg_id(outgoing::REQ_ACCOUNT_SUMMARY);
        enc.encode_field_i32(1); // version
        enc.encode_field_i32(req_id);
        enc.encode_field_str(group_name);
        enc.encode_field_str(tags);
        self.send_encoded(enc).await
    }

    pub async fn cancel_account_summary(&mut self, req_id: i32) -> Result<()> {
        self.check_server_version(server_version::ACCOUNT_SUMMARY, "cancel_account_summary")?;
        let mut enc = self.encoder();
        enc.encode_msg_id(outgoing::CANCEL_ACCOUNT_SUMMARY);
        enc.encode_field_i32(1); // version
        enc.encode_field_i32(req_id);
        self.send_encoded(enc).await
    }

    /// Request positions for all accounts.
    pub async fn req_positions(&mut self) -> Result<()> {
        self.check_server_version(server_version::POSITIONS, "req_positions")?;
        let mut enc = self.encoder();
        enc.encode_msg_id(outgoing::REQ_POSITIONS);
        enc.encode_field_i32(1); // version
        self.send_encoded(enc).await
    }

    pub async fn cancel_positions(&mut self) -> Result<()> {
        self.check_server_version(server_version::POSITIONS, "cancel_positions")?;
        let mut enc = self.encoder();
        enc.encode_msg_id(outgoing::CANCEL_POSITIONS);
        enc.encode_field_i32(1); // version
        self.send_encoded(enc).await
    }

    /// Subscribe to (or unsubscribe from) account value and portfolio updates.
    ///
    /// An empty `account` selects the logged-in account.
    pub async fn req_account_updates(&mut self, subscribe: bool, account: &str) -> Result<()> {
        let mut enc = self.encoder();
        enc.encode_msg_id(outgoing::REQ_ACCT_DATA);
        enc.encode_field_i32(2); // version
        enc.encode_field_bool(subscribe);
        enc.encode_field_str(account);
        self.send_encoded(enc).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::MessageDecoder;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn build_framed_msg(fields: &[&str]) -> Vec<u8> {
        let mut body = Vec::new();
        for f in fields {
            body.extend_from_slice(f.as_bytes());
            body.push(0);
        }
        let mut frame = Vec::new();
        frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
        frame.extend(body);
        frame
    }

    async fn read_fields(stream: &mut TcpStream) -> Option<Vec<String>> {
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).await.ok()?;
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut body).await.ok()?;
        let mut dec = MessageDecoder::new(&body, 176);
        let mut fields = Vec::new();
        while dec.has_remaining() {
            fields.push(dec.decode_string().ok()?);
        }
        Some(fields)
    }

    /// Mock TWS that handshakes at `sv`, then records every framed request
    /// (START_API included) until the client closes its side.
    async fn recording_tws(sv: i32) -> (u16, JoinHandle<Vec<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();

            let mut sign = [0u8; 4];
            stream.read_exact(&mut sign).await.unwrap();
            let mut len = [0u8; 4];
            stream.read_exact(&mut len).await.unwrap();
            let mut version = vec![0u8; u32::from_be_bytes(len) as usize];
            stream.read_exact(&mut version).await.unwrap();

            let sv = sv.to_string();
            stream
                .write_all(&build_framed_msg(&[&sv, "20260101 12:00:00"]))
                .await
                .unwrap();

            let mut requests = Vec::new();
            while let Some(fields) = read_fields(&mut stream).await {
                requests.push(fields);
            }
            requests
        });

        (port, handle)
    }

    #[tokio::test]
    async fn sends_account_requests_in_wire_format() {
        let (port, server) = recording_tws(176).await;

        let (mut client, _rx) = IBClient::connect("127.0.0.1", port, 3, None).await.unwrap();
        assert_eq!(client.server_version(), 176);
        assert_eq!(client.client_id(), 3);

        let req_id = client.next_req_id();
        client.req_account_summary(req_id, "All", "NetLiquidation,BuyingPower").await.unwrap();
        client.cancel_account_summary(req_id).await.unwrap();
        client.req_positions().await.unwrap();
        client.cancel_positions().await.unwrap();
        client.req_account_updates(true, "DU123").await.unwrap();
        client.disconnect().await;

        let requests = server.await.unwrap();
        let rid = req_id.to_string();
        assert_eq!(
            requests,
            vec![
                vec!["71", "2", "3", ""],
                vec!["62", "1", rid.as_str(), "All", "NetLiquidation,BuyingPower"],
                vec!["63", "1", rid.as_str()],
                vec!["61", "1"],
                vec!["64", "1"],
                vec!["6", "2", "1", "DU123"],
            ]
        );
    }

    #[tokio::test]
    async fn request_ids_are_unique() {
        let (port, _server) = recording_tws(176).await;
        let (mut client, _rx) = IBClient::connect("127.0.0.1", port, 0, None).await.unwrap();
        let a = client.next_req_id();
        let b = client.next_req_id();
        assert_ne!(a, b);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_blocks_sends() {
        let (port, _server) = recording_tws(176).await;
        let (mut client, _rx) = IBClient::connect("127.0.0.1", port, 0, None).await.unwrap();

        client.disconnect().await;
        assert!(!client.is_connected());
        client.disconnect().await;

        match client.req_positions().await {
            Err(IBApiError::Connection(msg)) => assert!(msg.contains("not connected")),
            other => panic!("expected Connection error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_aborts_reader_when_server_keeps_socket_open() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 512];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(&build_framed_msg(&["176", "20260101 12:00:00"]))
                .await
                .unwrap();
            // Never close; keep the socket alive past the client's grace period.
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let (mut client, mut rx) = IBClient::connect("127.0.0.1", port, 0, None).await.unwrap();
        let started = std::time::Instant::now();
        client.disconnect().await;
        assert!(started.elapsed() < Duration::from_secs(10));

        // Aborted reader drops its sender, so the channel drains to None.
        while rx.recv().await.is_some() {}
    }
}
