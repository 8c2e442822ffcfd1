use std::fmt;

/// Errors raised while parsing or validating an MBR / BIOS parameter block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    /// The supplied buffer is not exactly 512 bytes.
    WrongLength {
        /// The length that was supplied.
        len: usize,
    },
    /// `bytes_per_sector` is outside the allowed set `{512, 1024, 2048, 4096}`.
    BadBytesPerSector {
        /// The value read from the MBR.
        value: u16,
    },
    /// `sectors_per_cluster` is outside the allowed set of powers of two 1..=128.
    BadSectorsPerCluster {
        /// The value read from the MBR.
        value: u8,
    },
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WrongLength { len } => {
                write!(f, "MBR buffer has {len} bytes, expected 512")
            }
            Self::BadBytesPerSector { value } => {
                write!(f, "bytes-per-sector {value} is not one of 512/1024/2048/4096")
            }
            Self::BadSectorsPerCluster { value } => {
                write!(f, "sectors-per-cluster {value} is not a power of two in 1..=128")
            }
        }
    }
}

impl std::error::Error for ImageError {}
