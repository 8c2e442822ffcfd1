//! Static BIOS memory map (int 15h, E820 convention).

use crate::error::ConfigError;

/// Minimum configured memory size, in bytes (2 MiB).
pub const MIN_MEMORY: u64 = 2 * 1024 * 1024;

/// Classification of a memory-map region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// Free for general use by the guest.
    Usable,
    /// Reserved by firmware or hardware; must not be used by the guest.
    Reserved,
    /// Reserved for ACPI tables; reclaimable once ACPI data is consumed.
    Acpi,
}

impl MemoryType {
    /// The E820 type code written into a memory-map entry on the wire.
    #[must_use]
    pub const fn e820_code(self) -> u32 {
        match self {
            Self::Usable => 1,
            Self::Reserved => 2,
            Self::Acpi => 3,
        }
    }
}

/// A single memory-map region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryMapEntry {
    /// Start address of the region.
    pub base: u64,
    /// Length of the region in bytes.
    pub length: u64,
    /// Region classification.
    pub kind: MemoryType,
}

impl MemoryMapEntry {
    /// The last address covered by this region (inclusive).
    ///
    /// Equal to `base` for a zero-length entry.
    #[must_use]
    pub const fn end(&self) -> u64 {
        if self.length == 0 {
            self.base
        } else {
            self.base + self.length - 1
        }
    }

    /// Whether `[address, address + size)` intersects this region.
    #[must_use]
    pub const fn intersects(&self, address: u64, size: u64) -> bool {
        if size == 0 {
            return false;
        }
        let last = address + size - 1;
        address <= self.end() && last >= self.base
    }

    /// Packs this entry into the 20-byte little-endian E820 wire format:
    /// `base(8) | length(8) | type(4)`.
    #[must_use]
    pub fn to_e820_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        out[0..8].copy_from_slice(&self.base.to_le_bytes());
        out[8..16].copy_from_slice(&self.length.to_le_bytes());
        out[16..20].copy_from_slice(&self.kind.e820_code().to_le_bytes());
        out
    }
}

/// The static table of memory regions derived from a configured memory size.
///
/// Immutable once built; see spec.md §3 for the fixed layout this encodes.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    entries: Vec<MemoryMapEntry>,
}

impl MemoryMap {
    /// Builds the fixed 7-entry memory map for `memory_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MemoryTooSmall`] if `memory_size` is below
    /// [`MIN_MEMORY`].
    pub fn new(memory_size: u64) -> Result<Self, ConfigError> {
        if memory_size < MIN_MEMORY {
            return Err(ConfigError::MemoryTooSmall {
                requested: memory_size,
            });
        }

        let free = memory_size - 0x0010_0000 - 0x0001_0000;
        let acpi_base = memory_size - 0x0001_0000;

        let entries = vec![
            MemoryMapEntry {
                base: 0x0000_0000,
                length: 0x0009_FC00,
                kind: MemoryType::Usable,
            },
            MemoryMapEntry {
                base: 0x0009_FC00,
                length: 0x0000_0400,
                kind: MemoryType::Reserved,
            },
            MemoryMapEntry {
                base: 0x000F_0000,
                length: 0x0001_0000,
                kind: MemoryType::Reserved,
            },
            MemoryMapEntry {
                base: 0x0010_0000,
                length: free,
                kind: MemoryType::Usable,
            },
            MemoryMapEntry {
                base: acpi_base,
                length: 0x0001_0000,
                kind: MemoryType::Acpi,
            },
            MemoryMapEntry {
                base: 0xFEC0_0000,
                length: 0x0000_1000,
                kind: MemoryType::Reserved,
            },
            MemoryMapEntry {
                base: 0xFEE0_0000,
                length: 0x0000_1000,
                kind: MemoryType::Reserved,
            },
        ];

        Ok(Self { entries })
    }

    /// All regions, in construction order.
    #[must_use]
    pub fn entries(&self) -> &[MemoryMapEntry] {
        &self.entries
    }

    /// Whether `[address, address + size)` falls inside a `Reserved` or
    /// `Acpi` region.
    #[must_use]
    pub fn intersects_protected(&self, address: u64, size: u64) -> bool {
        self.entries
            .iter()
            .filter(|e| e.kind != MemoryType::Usable)
            .any(|e| e.intersects(address, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_memory_below_minimum() {
        let err = MemoryMap::new(1024 * 1024).unwrap_err();
        assert_eq!(err, ConfigError::MemoryTooSmall { requested: 1024 * 1024 });
    }

    #[test]
    fn has_exactly_seven_entries() {
        let map = MemoryMap::new(64 * 1024 * 1024).unwrap();
        assert_eq!(map.entries().len(), 7);
    }

    #[test]
    fn partitions_low_and_high_memory() {
        for mem in [MIN_MEMORY, 4 * 1024 * 1024, 64 * 1024 * 1024, 256 * 1024 * 1024] {
            let map = MemoryMap::new(mem).unwrap();
            // The low 640KB-ish region and extended memory should both be covered
            // by some entry; spot check the known boundaries from spec.md §3.
            assert!(map.entries().iter().any(|e| e.base == 0 && e.kind == MemoryType::Usable));
            assert!(map
                .entries()
                .iter()
                .any(|e| e.base == 0x0010_0000 && e.kind == MemoryType::Usable));
            let last = map.entries().last().unwrap();
            assert_eq!(last.base, 0xFEE0_0000);
        }
    }

    #[test]
    fn acpi_entry_sits_just_below_top_of_memory() {
        let mem = 64 * 1024 * 1024;
        let map = MemoryMap::new(mem).unwrap();
        let acpi = map
            .entries()
            .iter()
            .find(|e| e.kind == MemoryType::Acpi)
            .unwrap();
        assert_eq!(acpi.base, mem - 0x0001_0000);
        assert_eq!(acpi.length, 0x0001_0000);
    }

    #[test]
    fn end_address_of_zero_length_entry_equals_base() {
        let e = MemoryMapEntry {
            base: 0x1000,
            length: 0,
            kind: MemoryType::Reserved,
        };
        assert_eq!(e.end(), 0x1000);
    }

    #[test]
    fn e820_bytes_roundtrip_fields() {
        let e = MemoryMapEntry {
            base: 0,
            length: 0x0009_FC00,
            kind: MemoryType::Usable,
        };
        let bytes = e.to_e820_bytes();
        assert_eq!(
            bytes,
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFC, 0x09, 0, 0, 0, 0, 0, 1, 0, 0, 0]
        );
    }

    #[test]
    fn intersects_protected_flags_reserved_region() {
        let map = MemoryMap::new(64 * 1024 * 1024).unwrap();
        assert!(map.intersects_protected(0x000F_0000, 4));
        assert!(!map.intersects_protected(0x0010_0000, 4));
    }
}
