//! Network-side bookkeeping.
//!
//! # Data Flow
//! ```text
//! Inbound event (decoded by hyper)
//!     → connection.rs (assign ID, count open stream)
//!     → Hand off to HTTP layer
//!
//! Stream States:
//!     Open → (writes...) → Closed
//! ```
//!
//! TCP accept, TLS and HTTP decoding stay inside hyper.

pub mod connection;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
