//! File-backed disk image providing CHS/LBA sector reads.

use std::fs;
use std::path::Path;

use mbios_mbr::{ImageError, Mbr, MBR_SIZE};

use crate::error::DiskError;

/// The drive number this shim serves; reads from any other drive fail.
pub const SUPPORTED_DRIVE: u8 = 0x00;

/// Converts a cylinder/head/sector tuple to a flat logical block address.
///
/// `LBA = ((cylinder * heads_per_cylinder) + head) * sectors_per_track +
/// (sector - 1)`, matching `FAT::chsToLBA` in the reference implementation.
/// `sector` is 1-based per the x86 BIOS disk convention.
#[must_use]
pub fn chs_to_lba(cylinder: u8, head: u8, sector: u8, heads_per_cylinder: u16, sectors_per_track: u16) -> u64 {
    let c = u64::from(cylinder);
    let h = u64::from(head);
    let s = u64::from(sector);
    let hpc = u64::from(heads_per_cylinder);
    let spt = u64::from(sectors_per_track);
    (c * hpc + h) * spt + (s - 1)
}

/// A raw disk image held in memory, backed by the file it was loaded from.
#[derive(Debug, Clone)]
pub struct DiskImage {
    bytes: Vec<u8>,
    mbr: Mbr,
}

impl DiskImage {
    /// Loads and parses the boot sector of a disk image at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError`] if the file is shorter than 512 bytes or the
    /// boot sector fails field validation. I/O failures are not modeled
    /// here; callers running from a CLI should wrap the `std::io::Error`
    /// from a failed read with `anyhow::Context` at the call site.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, OpenError> {
        let bytes = fs::read(path).map_err(OpenError::Io)?;
        if bytes.len() < MBR_SIZE {
            return Err(OpenError::Image(ImageError::WrongLength { len: bytes.len() }));
        }
        let mbr = Mbr::parse(&bytes[..MBR_SIZE]).map_err(OpenError::Image)?;
        Ok(Self { bytes, mbr })
    }

    /// Builds a disk image directly from an in-memory buffer, for tests and
    /// programmatic callers that don't read from the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError`] under the same conditions as [`Self::open`].
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageError> {
        if bytes.len() < MBR_SIZE {
            return Err(ImageError::WrongLength { len: bytes.len() });
        }
        let mbr = Mbr::parse(&bytes[..MBR_SIZE])?;
        Ok(Self { bytes, mbr })
    }

    /// The parsed boot sector.
    #[must_use]
    pub fn mbr(&self) -> &Mbr {
        &self.mbr
    }

    /// Reads `sectors` sectors starting at the given CHS address for
    /// `drive`. Only [`SUPPORTED_DRIVE`] is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::UnsupportedDrive`] for any other drive number,
    /// or [`DiskError::EmptyRead`] if the computed range lies beyond the
    /// end of the image.
    pub fn read_sectors(
        &self,
        drive: u8,
        cylinder: u8,
        head: u8,
        sector: u8,
        sectors: u8,
    ) -> Result<Vec<u8>, DiskError> {
        if drive != SUPPORTED_DRIVE {
            return Err(DiskError::UnsupportedDrive { drive });
        }

        let lba = chs_to_lba(
            cylinder,
            head,
            sector,
            self.mbr.heads_per_cylinder,
            self.mbr.sectors_per_track,
        );
        let bytes_per_sector = u64::from(self.mbr.bytes_per_sector);
        let offset = lba * bytes_per_sector;
        let len = u64::from(sectors) * bytes_per_sector;
        self.read_raw(offset, len)
    }

    /// Reads `len` bytes starting at byte `offset` directly, bypassing CHS
    /// translation. Used internally by [`Self::read_sectors`] and exposed
    /// for callers that already hold an LBA.
    ///
    /// # Errors
    ///
    /// Returns [`DiskError::EmptyRead`] if the range exceeds the image size.
    pub fn read_raw(&self, offset: u64, len: u64) -> Result<Vec<u8>, DiskError> {
        let start = offset as usize;
        let end = start.saturating_add(len as usize);
        if end > self.bytes.len() {
            return Err(DiskError::EmptyRead { offset, len });
        }
        Ok(self.bytes[start..end].to_vec())
    }
}

/// Errors opening a disk image from the filesystem.
#[derive(Debug)]
pub enum OpenError {
    /// The underlying file could not be read.
    Io(std::io::Error),
    /// The boot sector failed validation.
    Image(ImageError),
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read disk image: {e}"),
            Self::Image(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Image(e) => Some(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image() -> Vec<u8> {
        let mut b = vec![0u8; 512 * 40];
        b[11..13].copy_from_slice(&512u16.to_le_bytes());
        b[13] = 4;
        b[24..26].copy_from_slice(&18u16.to_le_bytes()); // sectors_per_track
        b[26..28].copy_from_slice(&2u16.to_le_bytes()); // heads_per_cylinder
        b[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
        // Mark sector 1 (bytes 512..1024) with a distinguishable pattern.
        for (i, byte) in b[512..1024].iter_mut().enumerate() {
            *byte = (i % 256) as u8;
        }
        b
    }

    #[test]
    fn chs_to_lba_matches_formula() {
        assert_eq!(chs_to_lba(0, 0, 1, 2, 18), 0);
        assert_eq!(chs_to_lba(0, 0, 2, 2, 18), 1);
        assert_eq!(chs_to_lba(1, 0, 1, 2, 18), 36);
        assert_eq!(chs_to_lba(0, 1, 1, 2, 18), 18);
    }

    #[test]
    fn read_sectors_rejects_unsupported_drive() {
        let image = DiskImage::from_bytes(sample_image()).unwrap();
        let err = image.read_sectors(1, 0, 0, 1, 1).unwrap_err();
        assert_eq!(err, DiskError::UnsupportedDrive { drive: 1 });
    }

    #[test]
    fn read_sectors_returns_expected_bytes() {
        let image = DiskImage::from_bytes(sample_image()).unwrap();
        // CH=0, CL=2, DH=0 -> LBA=1 -> offset 512
        let data = image.read_sectors(0, 0, 0, 2, 1).unwrap();
        assert_eq!(data.len(), 512);
        assert_eq!(data[0], 0);
        assert_eq!(data[1], 1);
        assert_eq!(data[255], 255);
    }

    #[test]
    fn read_beyond_end_is_empty_read_error() {
        let image = DiskImage::from_bytes(sample_image()).unwrap();
        let err = image.read_sectors(0, 100, 0, 1, 1).unwrap_err();
        assert!(matches!(err, DiskError::EmptyRead { .. }));
    }

    #[test]
    fn from_bytes_rejects_short_buffer() {
        let err = DiskImage::from_bytes(vec![0u8; 10]).unwrap_err();
        assert_eq!(err, ImageError::WrongLength { len: 10 });
    }
}
