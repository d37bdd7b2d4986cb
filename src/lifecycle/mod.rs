//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, main.rs):
//!     Load config → Validate → Warn on missing credentials → Open ledger
//!     → Build chain client → Spawn reconciler / admin API
//!
//! Shutdown (shutdown.rs):
//!     SIGTERM/SIGINT → broadcast → reconciler and admin server stop
//! ```

pub mod shutdown;
pub mod startup;

pub use shutdown::{wait_for_signal, Shutdown};
pub use startup::{build_orchestrator, load_merchant, StartupError};
