//! IB TWS API event types.
//!
//! `IBEvent` stands in for the upstream `EWrapper` callback interface: every
//! decoded server message becomes one variant, delivered to the consumer over
//! a `tokio::sync::mpsc` channel returned from `IBClient::connect()`.

use rust_decimal::Decimal;

use crate::models::contract::Contract;

/// Events from the IB TWS/Gateway server relevant to account data.
///
/// ## Usage
///
/// ```rust,ignore
/// let (mut client, mut rx) = IBClient::connect("127.0.0.1", 4002, 0, None).await?;
///
/// while let Some(event) = rx.recv().await {
///     match event {
///         IBEvent::AccountSummary { tag, value, currency, .. } => { /* ... */ },
///         IBEvent::Error { code, message, .. } => { /* ... */ },
///         _ => {}
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum IBEvent {
    // ========================================================================
    // Connection & Error
    // ========================================================================

    /// Next valid order ID. Marks the end of the connection handshake.
    NextValidId { order_id: i64 },

    /// Comma-separated list of managed accounts, sent after connection.
    ManagedAccounts { accounts: String },

    /// Server error, warning or notice.
    Error {
        req_id: i32,
        code: i32,
        message: String,
        advanced_order_reject_json: String,
    },

    /// The reader hit a transport or framing failure. Always followed by
    /// `ConnectionClosed`.
    ReaderError { message: String },

    /// The socket was closed, by either side.
    ConnectionClosed,

    // ========================================================================
    // Account Summary
    // ========================================================================

    /// One tag/value row of an account summary subscription.
    AccountSummary {
        req_id: i32,
        account: String,
        tag: String,
        value: String,
        currency: String,
    },

    /// All rows for the summary request have been delivered.
    AccountSummaryEnd { req_id: i32 },

    // ========================================================================
    // Positions
    // ========================================================================

    Position {
        account: String,
        contract: Box<Contract>,
        position: Decimal,
        avg_cost: f64,
    },

    PositionEnd,

    // ========================================================================
    // Account Updates
    // ========================================================================

    UpdateAccountValue {
        key: String,
        value: String,
        currency: String,
        account_name: String,
    },

    UpdatePortfolio {
        contract: Box<Contract>,
        position: Decimal,
        market_price: f64,
        market_value: f64,
        average_cost: f64,
        unrealized_pnl: f64,
        realized_pnl: f64,
        account_name: String,
    },

    UpdateAccountTime { timestamp: String },

    AccountDownloadEnd { account: String },

    // ========================================================================
    // Other
    // ========================================================================

    /// A message this client does not decode.
    Unknown { msg_id: i32, data: Vec<u8> },
}
