//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → stop accepting → open tunnels close → drain → exit
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::{cancelled, Shutdown};
