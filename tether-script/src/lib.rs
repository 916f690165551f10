//! Script-side runtime for tether channels.
//!
//! Wraps a [`tether_core::Peer`] with the capability acquisition protocol:
//! [`ScriptRuntime::load_apis`] performs the `LoadComponents` handshake and
//! hands back [`Capability`] stubs, and [`ScriptRuntime::start`] drives a
//! user [`Script`] through injection and its `system_did_enable` hook.

pub mod capability;
pub mod logging;
pub mod runtime;

pub use capability::Capability;
pub use logging::{init_logging, init_test_logging};
pub use runtime::{Script, ScriptError, ScriptRuntime, LOAD_COMPONENTS};
