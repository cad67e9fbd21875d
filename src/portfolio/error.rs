//! Error taxonomy for upstream access, builders and withdrawals.

use thiserror::Error;

/// Every failure the portfolio layer can produce.
///
/// The fetch client and data sources return these directly. The builders
/// convert them into zero-valued results at their public boundary, and the
/// submitter folds them into a failed `TransactionResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PortfolioError {
    /// Bad address or amount, rejected before any I/O.
    #[error("{0}")]
    InvalidInput(String),
    /// Upstream kept signalling rate limiting after every retry.
    #[error("Upstream rate limit exceeded after {attempts} attempts: {message}")]
    RateLimited { attempts: usize, message: String },
    /// Upstream returned a structured application error.
    #[error("Upstream API error: {message}")]
    Upstream { message: String },
    /// Network-level failure.
    #[error("Transport error: {0}")]
    Transport(String),
    /// Upstream payload did not have the expected shape.
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Insufficient balance. Available: {available} ETH")]
    InsufficientFunds { available: String },
    /// Signing/broadcast collaborator failure.
    #[error("{0}")]
    Signer(String),
    #[error("No transaction signer configured")]
    SignerUnavailable,
}

impl PortfolioError {
    /// True for the transient rate-limit signal that the fetch client retries.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PortfolioError::RateLimited { .. })
    }
}

impl From<reqwest::Error> for PortfolioError {
    fn from(err: reqwest::Error) -> Self {
        // The request URL carries the API key in its query string.
        let err = err.without_url();
        if err.is_decode() {
            PortfolioError::Decode(err.to_string())
        } else {
            PortfolioError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PortfolioError {
    fn from(err: serde_json::Error) -> Self {
        PortfolioError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_funds_message() {
        let err = PortfolioError::InsufficientFunds { available: "0.5".to_string() };
        assert_eq!(err.to_string(), "Insufficient balance. Available: 0.5 ETH");
    }

    #[test]
    fn test_is_rate_limited() {
        let err = PortfolioError::RateLimited { attempts: 5, message: "rate limit".to_string() };
        assert!(err.is_rate_limited());
        assert!(!PortfolioError::Transport("reset".to_string()).is_rate_limited());
    }
}
