//! Contract-related data structures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// SecType
// ============================================================================

/// Security type as sent on the wire ("STK", "OPT", ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SecType {
    #[serde(rename = "STK")]
    Stock,
    #[serde(rename = "OPT")]
    Option,
    #[serde(rename = "FUT")]
    Future,
    #[serde(rename = "CASH")]
    Forex,
    #[serde(rename = "IND")]
    Index,
    #[serde(rename = "FOP")]
    FutureOption,
    #[serde(rename = "BOND")]
    Bond,
    #[serde(rename = "FUND")]
    Fund,
    #[serde(rename = "WAR")]
    Warrant,
    #[serde(rename = "CMDTY")]
    Commodity,
    #[serde(rename = "CFD")]
    Cfd,
    #[serde(rename = "CRYPTO")]
    Crypto,
    /// Unrecognized security type from the server.
    #[serde(untagged)]
    Other(String),
}

impl fmt::Display for SecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stock => write!(f, "STK"),
            Self::Option => write!(f, "OPT"),
            Self::Future => write!(f, "FUT"),
            Self::Forex => write!(f, "CASH"),
            Self::Index => write!(f, "IND"),
            Self::FutureOption => write!(f, "FOP"),
            Self::Bond => write!(f, "BOND"),
            Self::Fund => write!(f, "FUND"),
            Self::Warrant => write!(f, "WAR"),
            Self::Commodity => write!(f, "CMDTY"),
            Self::Cfd => write!(f, "CFD"),
            Self::Crypto => write!(f, "CRYPTO"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for SecType {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "STK" => Self::Stock,
            "OPT" => Self::Option,
            "FUT" => Self::Future,
            "CASH" => Self::Forex,
            "IND" => Self::Index,
            "FOP" => Self::FutureOption,
            "BOND" => Self::Bond,
            "FUND" => Self::Fund,
            "WAR" => Self::Warrant,
            "CMDTY" => Self::Commodity,
            "CFD" => Self::Cfd,
            "CRYPTO" => Self::Crypto,
            other => Self::Other(other.to_string()),
        })
    }
}

// ============================================================================
// Contract
// ============================================================================

/// The instrument fields carried by position and portfolio messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub con_id: i64,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sec_type: Option<SecType>,
    pub last_trade_date_or_contract_month: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strike: Option<f64>,
    /// "C" / "P" for options, empty otherwise.
    pub right: String,
    pub multiplier: String,
    pub exchange: String,
    pub primary_exchange: String,
    pub currency: String,
    pub local_symbol: String,
    pub trading_class: String,
}

impl Contract {
    /// Wire form of the security type, empty when unset.
    pub fn sec_type_str(&self) -> String {
        self.sec_type
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_default()
    }
}
