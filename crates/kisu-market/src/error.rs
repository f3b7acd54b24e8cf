//! Error types for marketplace operations.

use kisu_dbmap::MapError;
use kisu_qidb::QidbError;
use thiserror::Error;

/// Errors that can occur during marketplace operations.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Prices must be at least 1.
    #[error("invalid price: {0}")]
    InvalidPrice(i64),

    /// Page numbers start at 1.
    #[error("invalid page: {0}")]
    InvalidPage(u32),

    /// No listing with this code on the given page.
    #[error("listing {code} not found on page {page}")]
    NotFound { page: u32, code: String },

    /// A balance would overflow.
    #[error("balance overflow for {0}")]
    BalanceOverflow(String),

    /// The item store failed.
    #[error("item store error: {0}")]
    Items(#[from] QidbError),

    /// A record map failed.
    #[error("record map error: {0}")]
    Records(#[from] MapError),
}

/// Convenience type alias for marketplace operations.
pub type MarketResult<T> = std::result::Result<T, MarketError>;
