//! acct-fetch-ibapi -- minimal Rust native IB TWS API client for account data.
//!
//! Speaks the V100+ socket protocol (text encoding) and covers the handshake,
//! account summary, positions and account-update subscriptions.
//!
//! ## Modules
//!
//! - [`protocol`] -- Protocol constants, message IDs, server version requirements
//! - [`errors`] -- Error types for the library
//! - [`encoder`] -- Wire-format message encoding
//! - [`decoder`] -- Wire-format message decoding + server message dispatch
//! - [`transport`] -- Async TCP transport with V100+ framing
//! - [`wrapper`] -- IBEvent enum (server callback events)
//! - [`reader`] -- Async message reader (spawned tokio task)
//! - [`client`] -- IBClient (request sender)

pub mod client;
pub mod decoder;
pub mod encoder;
pub mod errors;
pub mod models;
pub mod protocol;
pub mod reader;
pub mod transport;
pub mod wrapper;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use errors::IBApiError;

pub use models::contract::{Contract, SecType};

pub use decoder::MessageDecoder;
pub use encoder::MessageEncoder;
pub use transport::Transport;

pub use client::IBClient;
pub use reader::MessageReader;
pub use wrapper::IBEvent;
