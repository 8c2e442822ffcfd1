//! Breakpoint/single-step state machine and pane formatters for the
//! interactive debug surface.

mod frontend;
mod panes;
mod supervisor;

pub use frontend::{DebugFrontend, ResumeKey};
pub use panes::{disassembly_pane, register_pane};
pub use supervisor::DebugSupervisor;
