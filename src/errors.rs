//! Fetch-level error type.

use acct_fetch_ibapi::IBApiError;
use thiserror::Error;

/// Failure of a connect or data request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Target unreachable, handshake rejected, or the socket dropped.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server did not signal completion in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The server reported a fatal error code for the request.
    #[error("protocol error {code}: {message}")]
    Protocol { code: i32, message: String },
}

/// Wire-level failures carry no server error code and surface as `Connection`.
/// `Protocol` is reserved for codes reported in `ERR_MSG`.
impl From<IBApiError> for FetchError {
    fn from(e: IBApiError) -> Self {
        FetchError::Connection(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_errors_map_to_connection() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(FetchError::from(IBApiError::Io(io)), FetchError::Connection(_)));
        assert!(matches!(
            FetchError::from(IBApiError::Disconnected("eof".into())),
            FetchError::Connection(_)
        ));
        assert_eq!(
            FetchError::from(IBApiError::Protocol("server redirect to 10.0.0.1:4002".into())),
            FetchError::Connection("Protocol error: server redirect to 10.0.0.1:4002".into())
        );
        assert!(matches!(
            FetchError::from(IBApiError::Decoding("bad ack".into())),
            FetchError::Connection(_)
        ));
    }

    #[test]
    fn protocol_display_includes_code() {
        let e = FetchError::Protocol {
            code: 321,
            message: "Error validating request".into(),
        };
        assert_eq!(e.to_string(), "protocol error 321: Error validating request");
    }
}
