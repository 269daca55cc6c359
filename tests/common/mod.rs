//! Scripted mock IB Gateway for end-to-end tests.
//!
//! Accepts one connection, completes the V100+ handshake (server version
//! 176 unless another ack is given), then answers every framed request through a caller-supplied script.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const SERVER_VERSION: &str = "176";

/// What the mock does after receiving a request.
pub enum Reply {
    /// Send these messages, each a list of fields.
    Send(Vec<Vec<String>>),
    /// Close the socket.
    Close,
    /// Send nothing.
    Nothing,
}

pub struct MockGateway {
    pub port: u16,
    requests: Arc<Mutex<Vec<Vec<String>>>>,
    handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start<F>(script: F) -> Self
    where
        F: Fn(&[String]) -> Reply + Send + 'static,
    {
        Self::start_with_ack(vec![SERVER_VERSION.into(), "20260101 12:00:00 EST".into()], script).await
    }

    /// Like `start`, but answers the handshake with `ack` instead of the
    /// usual version and time.
    pub async fn start_with_ack<F>(ack: Vec<String>, script: F) -> Self
    where
        F: Fn(&[String]) -> Reply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_handshake(&mut stream).await;
            write_msg(&mut stream, &ack).await;

            while let Some(fields) = read_request(&mut stream).await {
                recorded.lock().unwrap().push(fields.clone());
                match script(&fields) {
                    Reply::Send(messages) => {
                        for msg in messages {
                            write_msg(&mut stream, &msg).await;
                        }
                    }
                    Reply::Close => return,
                    Reply::Nothing => {}
                }
            }
        });

        Self { port, requests, handle }
    }

    /// Every request received so far, START_API included.
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().unwrap().clone()
    }

    /// Wait for the client to hang up, then return every request received.
    pub async fn finished(self) -> Vec<Vec<String>> {
        let _ = self.handle.await;
        self.requests.lock().unwrap().clone()
    }
}

async fn read_handshake(stream: &mut TcpStream) {
    let mut sign = [0u8; 4];
    stream.read_exact(&mut sign).await.unwrap();
    assert_eq!(&sign, b"API\0");
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.unwrap();
    let mut version = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut version).await.unwrap();
}

async fn read_request(stream: &mut TcpStream) -> Option<Vec<String>> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).await.ok()?;
    let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
    stream.read_exact(&mut body).await.ok()?;
    let mut fields: Vec<String> = body
        .split(|b| *b == 0)
        .map(|f| String::from_utf8_lossy(f).into_owned())
        .collect();
    // Trailing NUL leaves one empty element.
    fields.pop();
    Some(fields)
}

async fn write_msg(stream: &mut TcpStream, fields: &[String]) {
    let mut body = Vec::new();
    for f in fields {
        body.extend_from_slice(f.as_bytes());
        body.push(0);
    }
    let mut frame = (body.len() as u32).to_be_bytes().to_vec();
    frame.extend(body);
    let _ = stream.write_all(&frame).await;
}

// ============================================================================
// Message builders
// ============================================================================

fn msg(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

/// ManagedAccounts, NextValidId and a data farm notice, as sent after START_API.
pub fn session_start() -> Vec<Vec<String>> {
    vec![
        msg(&["15", "1", "DU123"]),
        next_valid_id(1),
        error(-1, 2104, "Market data farm connection is OK:usfarm"),
    ]
}

pub fn next_valid_id(order_id: i64) -> Vec<String> {
    msg(&["9", "1", &order_id.to_string()])
}

pub fn error(req_id: i32, code: i32, message: &str) -> Vec<String> {
    msg(&["4", "2", &req_id.to_string(), &code.to_string(), message, ""])
}

pub fn summary_row(req_id: &str, tag: &str, value: &str, currency: &str) -> Vec<String> {
    msg(&["63", "1", req_id, "DU123", tag, value, currency])
}

pub fn summary_end(req_id: &str) -> Vec<String> {
    msg(&["64", "1", req_id])
}

pub fn position(symbol: &str, qty: &str, avg_cost: &str) -> Vec<String> {
    msg(&[
        "61", "3", "DU123", "265598", symbol, "STK", "", "0", "", "", "NASDAQ", "USD", symbol, "NMS", qty, avg_cost,
    ])
}

pub fn position_end() -> Vec<String> {
    msg(&["62", "1"])
}

pub fn account_value(key: &str, value: &str, currency: &str) -> Vec<String> {
    msg(&["6", "2", key, value, currency, "DU123"])
}

pub fn portfolio(symbol: &str, qty: &str, market_value: &str) -> Vec<String> {
    msg(&[
        "7", "8", "265598", symbol, "STK", "", "0", "", "", "NASDAQ", "USD", symbol, "NMS", qty, "190.5",
        market_value, "150.25", "400", "0", "DU123",
    ])
}

pub fn account_time(ts: &str) -> Vec<String> {
    msg(&["8", "1", ts])
}

pub fn download_end() -> Vec<String> {
    msg(&["54", "1", "DU123"])
}
