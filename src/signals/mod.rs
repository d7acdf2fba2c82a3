// =============================================================================
// Signals Module
// =============================================================================
//
// Signal pipeline for the spike scanner:
// - Gate evaluation and rate limiting per finalized candle
// - Append-only record of every emitted signal
// - Output sinks (log banner, bounded channel)

pub mod evaluator;
pub mod record;
pub mod sink;

pub use evaluator::{Evaluation, SignalEvaluator};
pub use record::SignalRecord;
pub use sink::{ChannelSink, FanoutSink, LogSink, SignalSink};
