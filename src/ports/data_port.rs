//! Price data access port trait.

use crate::domain::error::EngineError;
use crate::domain::ohlcv::PriceBar;

pub trait DataPort {
    /// Load every bar the source holds, in source order.
    ///
    /// Ordering and value checks are left to `PriceSeries::new`.
    fn load_bars(&self) -> Result<Vec<PriceBar>, EngineError>;
}
