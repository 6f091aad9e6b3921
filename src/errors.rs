//! Error Taxonomy
//!
//! Four error classes with different blast radii:
//! - Connection / NotConnected block the whole pipeline (nothing can be read
//!   without a provider/signer) and surface as a global "disconnected" state.
//! - ExternalFetch / ContractCall are contained to the single vault or APY
//!   component being computed; the record degrades to nulled fields instead.
//!
//! No automatic retries anywhere - the next trigger (new block, price tick)
//! retries naturally.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Wallet or network unavailable, or the node reports a chain id we
    /// don't support.
    #[error("connection failed: {0}")]
    Connection(String),

    /// A call was attempted before a provider/signer exists.
    #[error("not connected")]
    NotConnected,

    /// Price API, subgraph, or lending-rates API failure (non-200, timeout,
    /// malformed body).
    #[error("external fetch failed: {0}")]
    ExternalFetch(String),

    /// A view call reverted or the node is unreachable.
    #[error("contract call failed: {0}")]
    ContractCall(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for errors that abort the whole pipeline rather than degrading
    /// a single vault record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality_split() {
        assert!(Error::Connection("nope".into()).is_fatal());
        assert!(Error::NotConnected.is_fatal());
        assert!(!Error::ExternalFetch("503".into()).is_fatal());
        assert!(!Error::ContractCall("revert".into()).is_fatal());
    }
}
