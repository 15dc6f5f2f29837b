//! Mock implementations for testing
//!
//! Deterministic stand-ins for execution mechanisms and work functions.

mod executor;
mod probe;
mod work;

pub use executor::{Script, ScriptedExecutor};
pub use probe::{ConcurrencyProbe, ProbeGuard};
pub use work::LineWork;
