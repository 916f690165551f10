//! Concrete channels for tether peers.
//!
//! Production embedders bring their own transport (a socket, a worker
//! boundary); this crate ships the in-memory pipe both they and the test
//! suites use to wire two peers together in one process.

pub mod pipe;

pub use pipe::{drive, PipeEnd};
