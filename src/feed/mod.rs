// =============================================================================
// Feed Module
// =============================================================================
//
// Everything between the upstream tick feed and the analysis loop:
// - Session state machine with backoff and scheduled refresh
// - JSON wire protocol
// - Fatal connection errors

pub mod backoff;
pub mod connection;
pub mod error;
pub mod protocol;

pub use connection::{ConnectionHandle, ConnectionManager, FeedEvent, TungsteniteConnector};
pub use error::ConnectionError;
