//! Resilience helpers.
//!
//! The chain client bounds every RPC call and confirmation wait itself;
//! what lives here is the backoff used by background loops after failures.

pub mod backoff;

pub use backoff::calculate_backoff;
