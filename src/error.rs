//! Error types for the inspection engine.
//!
//! This module defines the [`Error`] enum covering *configuration-plane*
//! failures: a malformed decoder manifest or campaign document is rejected
//! and the previous one is kept. Data-plane failures (decode_failure,
//! dictionary_absent, expression_type_mismatch, queue_overflow,
//! out_of_order_sample) are never exceptions: they are logged via `tracing`
//! and/or tracked with counters on the owning component, since a bad frame
//! or sample should never bring the agent down.
//!
//! # Example
//!
//! ```
//! use inspect_engine::error::{Error, Result};
//!
//! fn reject(reason: &str) -> Result<()> {
//!     Err(Error::CampaignRejected(reason.to_string()))
//! }
//! ```

use std::fmt;

/// Errors that can occur while accepting configuration-plane documents or
/// driving the retry executor.
#[derive(Debug)]
pub enum Error {
    /// A decoder manifest failed to parse or validate; the previous
    /// dictionary snapshot is kept.
    DictionaryRejected(String),

    /// A campaign document failed to parse or validate; the previous
    /// campaign set is kept.
    CampaignRejected(String),

    /// A custom function name referenced by a campaign expression has no
    /// registered implementation.
    UnknownCustomFunction(String),

    /// `RetryExecutor::start` was called while a previous run is still in
    /// progress. Start is rejected, not queued.
    AlreadyRunning,

    /// Underlying JSON document could not be deserialized.
    Json(serde_json::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::DictionaryRejected(reason) => {
                write!(f, "decoder manifest rejected: {reason}")
            }
            Error::CampaignRejected(reason) => {
                write!(f, "campaign document rejected: {reason}")
            }
            Error::UnknownCustomFunction(name) => {
                write!(f, "no custom function registered under name {name:?}")
            }
            Error::AlreadyRunning => write!(f, "retry executor is already running"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}

/// A specialized Result type for inspection-engine configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_reason() {
        let e = Error::CampaignRejected("missing expression".to_string());
        assert!(e.to_string().contains("missing expression"));
    }

    #[test]
    fn json_error_roundtrips_source() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let e: Error = parse_err.into();
        assert!(std::error::Error::source(&e).is_some());
    }
}
