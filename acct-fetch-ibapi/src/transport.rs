//! Async TCP transport for the IB TWS API protocol.
//!
//! Handles V100+ message framing (4-byte big-endian length prefix), the
//! connection handshake, and reading/writing complete messages.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::decoder::MessageDecoder;
use crate::encoder::{build_connect_request, MessageEncoder};
use crate::errors::{IBApiError, Result};
use crate::protocol::{
    outgoing, server_version, HEADER_LEN, MAX_CLIENT_VER, MAX_MSG_LEN, MIN_CLIENT_VER,
};

/// Connection state of the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

// ============================================================================
// Frame reading (shared by Transport and TransportReader)
// ============================================================================

/// Read one length-prefixed frame, buffering partial reads in `read_buf`.
async fn read_frame<R>(reader: &mut R, read_buf: &mut BytesMut) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    while read_buf.len() < HEADER_LEN {
        let n = reader.read_buf(read_buf).await?;
        if n == 0 {
            return Err(IBApiError::Disconnected(
                "connection closed while reading message header".into(),
            ));
        }
    }

    let msg_len = u32::from_be_bytes([read_buf[0], read_buf[1], read_buf[2], read_buf[3]]) as usize;
    if msg_len == 0 || msg_len > MAX_MSG_LEN {
        return Err(IBApiError::Protocol(format!("invalid message length: {msg_len}")));
    }

    let total_needed = HEADER_LEN + msg_len;
    while read_buf.len() < total_needed {
        let n = reader.read_buf(read_buf).await?;
        if n == 0 {
            return Err(IBApiError::Disconnected(
                "connection closed while reading message body".into(),
            ));
        }
    }

    read_buf.advance(HEADER_LEN);
    Ok(read_buf.split_to(msg_len).to_vec())
}

// ============================================================================
// Transport
// ============================================================================

/// Async TCP transport for the IB TWS API protocol.
///
/// Owns both halves of the socket until [`Transport::into_split`] hands them
/// to the reader task and the request writer.
pub struct Transport {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    read_buf: BytesMut,
    server_version: i32,
    tws_time: String,
    conn_state: ConnState,
}

impl Transport {
    /// Connect to TWS/Gateway, send the V100+ connect request and validate
    /// the server's version acknowledgment.
    ///
    /// `start_api()` is a separate step.
    pub async fn connect(host: &str, port: u16, connect_options: Option<&str>) -> Result<Self> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| IBApiError::Connection(format!("failed to connect to {addr}: {e}")))?;
        stream.set_nodelay(true)?;

        let (reader, writer) = stream.into_split();
        let mut transport = Self {
            reader,
            writer,
            read_buf: BytesMut::with_capacity(8192),
            server_version: 0,
            tws_time: String::new(),
            conn_state: ConnState::Connecting,
        };

        let request = build_connect_request(connect_options)?;
        transport
            .writer
            .write_all(&request)
            .await
            .map_err(|e| IBApiError::Connection(format!("failed to send connect request: {e}")))?;

        transport.process_connect_ack().await?;
        Ok(transport)
    }

    /// Server sends `[server_version][tws_time]`, or for a redirect
    /// `[negative_version][host:port]`.
    async fn process_connect_ack(&mut self) -> Result<()> {
        let msg = self.read_message().await?;
        let mut dec = MessageDecoder::new(&msg, 0);

        let sv = dec.decode_i32()?;
        if sv < 0 {
            let hostport = dec.decode_string()?;
            return Err(IBApiError::Protocol(format!("server redirect to {hostport}")));
        }

        if !(MIN_CLIENT_VER..=MAX_CLIENT_VER).contains(&sv) {
            return Err(IBApiError::Protocol(format!(
                "unsupported server version {sv} (expected {MIN_CLIENT_VER}..{MAX_CLIENT_VER})"
            )));
        }

        self.tws_time = dec.decode_string()?;
        self.server_version = sv;
        self.conn_state = ConnState::Connected;

        tracing::info!(
            server_version = sv,
            tws_time = %self.tws_time,
            "IB TWS API handshake complete"
        );
        Ok(())
    }

    /// Read a single complete message body from the server.
    pub async fn read_message(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.reader, &mut self.read_buf).await
    }

    /// Send a pre-encoded, framed message.
    pub async fn send_message(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .await
            .map_err(|e| IBApiError::Connection(format!("failed to send message: {e}")))
    }

    /// Send START_API with the client id. Completes the initialization
    /// sequence; the server answers with `NEXT_VALID_ID` and `MANAGED_ACCTS`.
    pub async fn start_api(&mut self, client_id: i32, optional_capabilities: Option<&str>) -> Result<()> {
        let mut enc = MessageEncoder::new(self.server_version);
        enc.encode_msg_id(outgoing::START_API);
        enc.encode_field_i32(2); // VERSION = 2
        enc.encode_field_i32(client_id);

        if self.server_version >= server_version::OPTIONAL_CAPABILITIES {
            enc.encode_field_str(optional_capabilities.unwrap_or(""));
        }

        let bytes = enc.finalize()?;
        self.send_message(&bytes).await
    }

    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub fn tws_time(&self) -> &str {
        &self.tws_time
    }

    pub fn conn_state(&self) -> ConnState {
        self.conn_state
    }

    pub fn is_connected(&self) -> bool {
        self.conn_state == ConnState::Connected
    }

    /// Split into read and write halves for the reader task and the client.
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        (
            TransportReader {
                reader: self.reader,
                read_buf: self.read_buf,
                server_version: self.server_version,
            },
            TransportWriter {
                writer: self.writer,
                server_version: self.server_version,
            },
        )
    }
}

// ============================================================================
// TransportReader
// ============================================================================

/// Read half of a split transport.
pub struct TransportReader {
    reader: OwnedReadHalf,
    read_buf: BytesMut,
    server_version: i32,
}

impl TransportReader {
    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub async fn read_message(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.reader, &mut self.read_buf).await
    }
}

// ============================================================================
// TransportWriter
// ============================================================================

/// Write half of a split transport.
pub struct TransportWriter {
    writer: OwnedWriteHalf,
    server_version: i32,
}

impl TransportWriter {
    pub fn server_version(&self) -> i32 {
        self.server_version
    }

    pub async fn send_message(&mut self, data: &[u8]) -> Result<()> {
        self.writer
            .write_all(data)
            .await
            .map_err(|e| IBApiError::Connection(format!("failed to send: {e}")))
    }

    /// Shut down the write half (TCP FIN).
    pub async fn shutdown(&mut self) {
        let _ = self.writer.shutdown().await;
    }
}

// ============================================================================
// Tests
// ============================================================================
