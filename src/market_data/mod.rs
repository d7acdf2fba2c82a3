pub mod aggregator;
pub mod candle_buffer;

// Re-export the Candle struct for convenient access (e.g. `use crate::market_data::Candle`).
pub use aggregator::CandleAggregator;
pub use candle_buffer::{Candle, CandleHistory};
