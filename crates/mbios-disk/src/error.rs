use std::fmt;

/// Errors raised by disk sector reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiskError {
    /// A read was requested from a drive number other than 0 — the only
    /// drive this shim serves, per spec.md §1's Non-goals.
    UnsupportedDrive {
        /// The drive number the guest requested.
        drive: u8,
    },
    /// The requested sector range lies beyond the end of the image.
    EmptyRead {
        /// The byte offset the read started from.
        offset: u64,
        /// The number of bytes requested.
        len: u64,
    },
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedDrive { drive } => {
                write!(f, "reading from drive {drive:#04x} is not supported")
            }
            Self::EmptyRead { offset, len } => {
                write!(f, "no data received reading {len} bytes at offset {offset:#x}")
            }
        }
    }
}

impl std::error::Error for DiskError {}
