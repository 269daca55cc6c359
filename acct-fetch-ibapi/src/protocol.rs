//! IB TWS API protocol constants.
//!
//! Only the message ids and version gates used by the account fetcher are
//! listed here; the numbering follows the upstream `EDecoder.h` / `EClient.h`
//! tables so new messages can be added without renumbering.

// ============================================================================
// Client / Protocol Constants
// ============================================================================

/// Minimum supported client version in the version range.
pub const MIN_CLIENT_VER: i32 = 100;

/// Maximum supported client version.
///
/// Kept below `server_version::ERROR_TIME` so error messages and message ids
/// stay in the plain text field encoding.
pub const MAX_CLIENT_VER: i32 = 176;

/// Message header length (4-byte big-endian message length prefix).
pub const HEADER_LEN: usize = 4;

/// Maximum message length: 16 MB - 1 byte.
pub const MAX_MSG_LEN: usize = 0xFFFFFF;

/// API protocol signature sent at connection start.
pub const API_SIGN: &[u8; 4] = b"API\0";

// ============================================================================
// Incoming Message IDs (server -> client)
// ============================================================================

/// Incoming message type identifiers.
///
/// These are the first field in every message received from TWS/Gateway.
pub mod incoming {
    pub const ERR_MSG: i32 = 4;
    pub const ACCT_VALUE: i32 = 6;
    pub const PORTFOLIO_VALUE: i32 = 7;
    pub const ACCT_UPDATE_TIME: i32 = 8;
    pub const NEXT_VALID_ID: i32 = 9;
    pub const MANAGED_ACCTS: i32 = 15;
    pub const ACCT_DOWNLOAD_END: i32 = 54;
    pub const POSITION_DATA: i32 = 61;
    pub const POSITION_END: i32 = 62;
    pub const ACCOUNT_SUMMARY: i32 = 63;
    pub const ACCOUNT_SUMMARY_END: i32 = 64;
}

// ============================================================================
// Outgoing Message IDs (client -> server)
// ============================================================================

/// Outgoing request type identifiers.
pub mod outgoing {
    pub const REQ_ACCT_DATA: i32 = 6;
    pub const REQ_POSITIONS: i32 = 61;
    pub const REQ_ACCOUNT_SUMMARY: i32 = 62;
    pub const CANCEL_ACCOUNT_SUMMARY: i32 = 63;
    pub const CANCEL_POSITIONS: i32 = 64;
    pub const START_API: i32 = 71;
}

// ============================================================================
// Minimum Server Version Constants
// ============================================================================

/// Server version gates that control which fields are sent or expected.
pub mod server_version {
    pub const POSITIONS: i32 = 67;
    pub const ACCOUNT_SUMMARY: i32 = 67;
    pub const OPTIONAL_CAPABILITIES: i32 = 72;
    pub const ADVANCED_ORDER_REJECT: i32 = 166;
    pub const ERROR_TIME: i32 = 194;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_range_stays_in_text_encoding() {
        assert!(MIN_CLIENT_VER < MAX_CLIENT_VER);
        assert!(MAX_CLIENT_VER < server_version::ERROR_TIME);
        assert!(MAX_CLIENT_VER >= server_version::ADVANCED_ORDER_REJECT);
    }

    #[test]
    fn account_message_ids() {
        assert_eq!(incoming::ACCOUNT_SUMMARY, 63);
        assert_eq!(incoming::ACCOUNT_SUMMARY_END, 64);
        assert_eq!(incoming::POSITION_DATA, 61);
        assert_eq!(incoming::POSITION_END, 62);
        assert_eq!(outgoing::REQ_ACCOUNT_SUMMARY, 62);
        assert_eq!(outgoing::REQ_POSITIONS, 61);
    }
}
