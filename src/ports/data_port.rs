//! Market data access port trait.

use crate::domain::error::SoltradeError;
use crate::domain::ohlcv::OhlcvBar;

pub trait DataPort {
    /// Bars for `token` at `interval`, oldest first.
    fn fetch_ohlcv(&self, token: &str, interval: &str) -> Result<Vec<OhlcvBar>, SoltradeError>;

    /// Tokens with data available at `interval`, sorted.
    fn list_tokens(&self, interval: &str) -> Result<Vec<String>, SoltradeError>;
}
