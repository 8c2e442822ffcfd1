//! The seam between [`crate::supervisor::DebugSupervisor`] and whatever
//! front end is currently driving the session.

/// The key the user pressed to resume from a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKey {
    /// Step exactly one more instruction, then pause again.
    Space,
    /// Resume freely until the next breakpoint or stop condition.
    Other,
    /// Sentinel returned when `stop()` unblocks a pending pause rather than
    /// the user actually resuming it.
    Stop,
}

/// Receives debug-pane output and supplies resume decisions.
pub trait DebugFrontend: Send + Sync {
    /// Writes one diagnostic line (a pause banner, a breakpoint hit, …).
    fn write_debug_line(&self, line: &str);

    /// Blocks until the user chooses how to resume from a pause.
    fn wait_for_user_resume(&self) -> ResumeKey;
}
