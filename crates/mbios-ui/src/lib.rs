//! Front ends implementing `mbios-bios`'s output/debug/keyboard sinks and
//! `mbios-debug`'s debug frontend, for non-interactive and interactive use.

mod interactive;
mod non_interactive;

pub use interactive::InteractiveUi;
pub use non_interactive::NonInteractiveUi;
