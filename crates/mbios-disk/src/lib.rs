//! File-backed disk image and CHS/LBA sector reads for `mbios`.

pub mod disk;
pub mod error;

pub use disk::{chs_to_lba, DiskImage, OpenError, SUPPORTED_DRIVE};
pub use error::DiskError;
