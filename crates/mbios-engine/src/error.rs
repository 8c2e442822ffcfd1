use std::fmt;

/// Which engine primitive failed. Distinguished internally for better
/// diagnostics; collapsed to a single [`EngineError`] at the crate boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EngineErrorKind {
    Open,
    MemMap,
    HookAdd,
    EmuStart,
    EmuStop,
    RegAccess,
    MemAccess,
    Context,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Open => "opening the engine handle",
            Self::MemMap => "mapping guest memory",
            Self::HookAdd => "registering a hook",
            Self::EmuStart => "running the emulation loop",
            Self::EmuStop => "stopping the emulation loop",
            Self::RegAccess => "accessing a register",
            Self::MemAccess => "accessing guest memory",
            Self::Context => "saving or restoring CPU context",
        };
        f.write_str(s)
    }
}

/// A failure from the underlying CPU emulation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineError {
    pub(crate) kind: EngineErrorKind,
    diagnostic: String,
}

impl EngineError {
    pub(crate) fn new(kind: EngineErrorKind, diagnostic: impl Into<String>) -> Self {
        Self {
            kind,
            diagnostic: diagnostic.into(),
        }
    }

    /// The engine's diagnostic string, as reported by the underlying library.
    #[must_use]
    pub fn diagnostic(&self) -> &str {
        &self.diagnostic
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error {}: {}", self.kind, self.diagnostic)
    }
}

impl std::error::Error for EngineError {}

/// No hook claimed a software interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnhandledInterrupt(pub u32);

impl fmt::Display for UnhandledInterrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhandled interrupt {:#04x}", self.0)
    }
}

impl std::error::Error for UnhandledInterrupt {}

/// A memory access to an unmapped address, or a mapped-but-protected one
/// while the core is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidMemoryAccess {
    /// The address the access targeted.
    pub address: u64,
    /// The number of bytes the access spanned.
    pub size: u64,
}

impl fmt::Display for InvalidMemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid memory access at {:#010x} ({} bytes)",
            self.address, self.size
        )
    }
}

impl std::error::Error for InvalidMemoryAccess {}

/// Any of the fatal conditions an `on_exception` hook may be asked to
/// handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An engine primitive failed.
    Engine(EngineError),
    /// No hook claimed a software interrupt.
    UnhandledInterrupt(UnhandledInterrupt),
    /// An invalid or disallowed memory access.
    InvalidMemoryAccess(InvalidMemoryAccess),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "{e}"),
            Self::UnhandledInterrupt(e) => write!(f, "{e}"),
            Self::InvalidMemoryAccess(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<EngineError> for CoreError {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_display_includes_kind_and_diagnostic() {
        let e = EngineError::new(EngineErrorKind::EmuStart, "bad address");
        assert_eq!(
            format!("{e}"),
            "error running the emulation loop: bad address"
        );
    }

    #[test]
    fn unhandled_interrupt_display() {
        let e = UnhandledInterrupt(0x21);
        assert_eq!(format!("{e}"), "unhandled interrupt 0x21");
    }
}
