//! Error code classification.
//!
//! The server reports notices, warnings and failures through the same error
//! message. `ErrorCodeTable` decides which of them end a request.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// TWS reports status notices and warnings in this range.
const WARNING_CODES: RangeInclusive<i32> = 2100..=2169;

/// Data farm status and connectivity-restored notices. 0 is the code given
/// to version-1 error messages, which are plain text notices.
const DEFAULT_INFORMATIONAL: &[i32] = &[0, 1101, 1102, 2104, 2106, 2107, 2108, 2119, 2158];

/// Codes that end a request even though some sit inside the warning range.
/// 2103/2105/2110: farm or server connection broken. 1100: connectivity lost.
/// 1300: socket port reset. 326: client id in use. 502/504: not connected.
const DEFAULT_FATAL: &[i32] = &[326, 502, 504, 1100, 1300, 2103, 2105, 2110];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Logged and otherwise ignored.
    Informational,
    /// Fails the affected request.
    Fatal,
}

/// Lookup table from error code to severity.
///
/// Codes not listed explicitly are informational when they fall in the TWS
/// warning range and fatal otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorCodeTable {
    informational: BTreeSet<i32>,
    fatal: BTreeSet<i32>,
}

impl Default for ErrorCodeTable {
    fn default() -> Self {
        Self {
            informational: DEFAULT_INFORMATIONAL.iter().copied().collect(),
            fatal: DEFAULT_FATAL.iter().copied().collect(),
        }
    }
}

impl ErrorCodeTable {
    /// Default table with extra codes reclassified. A code given in both
    /// lists ends up fatal.
    pub fn with_overrides(informational: &[i32], fatal: &[i32]) -> Self {
        let mut table = Self::default();
        for &code in informational {
            table.fatal.remove(&code);
            table.informational.insert(code);
        }
        for &code in fatal {
            table.informational.remove(&code);
            table.fatal.insert(code);
        }
        table
    }

    pub fn classify(&self, code: i32) -> Severity {
        if self.fatal.contains(&code) {
            Severity::Fatal
        } else if self.informational.contains(&code) || WARNING_CODES.contains(&code) {
            Severity::Informational
        } else {
            Severity::Fatal
        }
    }

    pub fn is_informational(&self, code: i32) -> bool {
        self.classify(code) == Severity::Informational
    }
}
