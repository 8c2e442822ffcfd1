//! BIOS interrupt dispatch and per-vector service handlers.
//!
//! [`services::BiosServices`] is the vector table; each module below
//! implements one BIOS service family from it. Callers wire it onto an
//! `mbios_engine::ExecutionCore` themselves (see `mbios-cli`), since doing
//! so alongside a debug supervisor requires wrapping the handler before
//! registering it.

pub mod cpuid;
mod disk;
mod halt;
mod keyboard;
pub mod services;
pub mod sinks;
mod system;
mod video;

pub use services::BiosServices;
pub use sinks::{DebugSink, KeyboardSource, OutputSink};
