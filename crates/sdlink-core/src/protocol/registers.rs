//! Register space shared by the host and the device.
//!
//! The same registers are reachable through two views: byte offsets on the
//! block device (what the host sees) and MMIO addresses on the SoC (what the
//! firmware sees). Both views are described by one `RegisterMap` type so the
//! two sides are always built from the same table.

use thiserror::Error;

/// Width of a scalar register or buffer word in bytes.
pub const WORD_SIZE: usize = 4;

// ============================================================================
// Buffer Sizes
// ============================================================================

/// MOSI (host -> device) buffer size in bytes.
pub const MOSI_BUFFER_BYTES: usize = 4096;
/// MOSI buffer size in words.
pub const MOSI_BUFFER_WORDS: usize = MOSI_BUFFER_BYTES / WORD_SIZE;

/// MISO (device -> host) buffer size in bytes.
pub const MISO_BUFFER_BYTES: usize = 4096;
/// MISO buffer size in words.
pub const MISO_BUFFER_WORDS: usize = MISO_BUFFER_BYTES / WORD_SIZE;

// ============================================================================
// Configuration Status and Device Information (host offsets only)
// ============================================================================

/// Offset of the configuration status block (128 KiB into the device).
pub const CONFIG_STATUS_OFFSET: u64 = 0x20000;
/// Number of words in the configuration status block.
pub const CONFIG_STATUS_WORDS: usize = 3;
/// Size of the configuration status block in bytes.
pub const CONFIG_STATUS_BYTES: usize = CONFIG_STATUS_WORDS * WORD_SIZE;

/// Serial number string region.
pub const SERIAL_NUMBER_OFFSET: u64 = 0x22040;
pub const SERIAL_NUMBER_BYTES: usize = 0x40;

/// UUID string region.
pub const UUID_OFFSET: u64 = 0x22080;
pub const UUID_BYTES: usize = 0x40;

// ============================================================================
// Register Map
// ============================================================================

/// A word access that does not land on a single mapped register word.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    #[error("Address 0x{addr:08X} is outside the register map")]
    Unmapped { addr: u64 },

    #[error("Address 0x{addr:08X} is not word aligned")]
    Unaligned { addr: u64 },

    #[error("Word {index} is past the end of the {region:?} buffer")]
    IndexOutOfRange { region: Region, index: usize },
}

/// A named region of the register space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Status,
    SocControl,
    Command,
    Mosi,
    Miso,
}

impl Region {
    pub const ALL: [Region; 5] = [
        Region::Status,
        Region::SocControl,
        Region::Command,
        Region::Mosi,
        Region::Miso,
    ];

    /// Length of the region in bytes.
    pub const fn len(self) -> usize {
        match self {
            Region::Status | Region::SocControl | Region::Command => WORD_SIZE,
            Region::Mosi => MOSI_BUFFER_BYTES,
            Region::Miso => MISO_BUFFER_BYTES,
        }
    }
}

/// Base address of every region in one view of the register space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterMap {
    pub status: u64,
    pub soc_control: u64,
    pub command: u64,
    pub mosi: u64,
    pub miso: u64,
}

impl RegisterMap {
    /// Byte offsets used by the host on the block device.
    pub const HOST: RegisterMap = RegisterMap {
        status: 0x00000,
        soc_control: 0x00004,
        command: 0x10000,
        mosi: 0x50000,
        miso: 0x60000,
    };

    /// MMIO addresses used by firmware running on the SoC.
    pub const DEVICE: RegisterMap = RegisterMap {
        status: 0x4000_0000,
        soc_control: 0x4000_0004,
        command: 0x4000_0008,
        miso: 0x4001_0000,
        mosi: 0x4002_0000,
    };

    pub const fn base(&self, region: Region) -> u64 {
        match region {
            Region::Status => self.status,
            Region::SocControl => self.soc_control,
            Region::Command => self.command,
            Region::Mosi => self.mosi,
            Region::Miso => self.miso,
        }
    }

    /// Address of word `index` inside a buffer region.
    pub const fn word(&self, region: Region, index: usize) -> u64 {
        self.base(region) + (index * WORD_SIZE) as u64
    }

    /// Find the region containing `addr` and the byte offset inside it.
    pub fn locate(&self, addr: u64) -> Option<(Region, u64)> {
        Region::ALL.into_iter().find_map(|region| {
            let base = self.base(region);
            (addr >= base && addr < base + region.len() as u64).then(|| (region, addr - base))
        })
    }

    /// Check that a 4-byte access at `addr` stays inside one region and is
    /// word aligned. Returns the region and the offset inside it.
    pub fn check_word(&self, addr: u64) -> Result<(Region, u64), RegisterError> {
        if addr % WORD_SIZE as u64 != 0 {
            return Err(RegisterError::Unaligned { addr });
        }
        match self.locate(addr) {
            Some((region, offset)) if offset + WORD_SIZE as u64 <= region.len() as u64 => {
                Ok((region, offset))
            }
            _ => Err(RegisterError::Unmapped { addr }),
        }
    }

    /// Translate an address in this view to the same location in `to`.
    pub fn translate(&self, addr: u64, to: &RegisterMap) -> Option<u64> {
        self.locate(addr)
            .map(|(region, offset)| to.base(region) + offset)
    }

    /// One past the highest mapped byte in this view.
    pub fn end(&self) -> u64 {
        Region::ALL
            .into_iter()
            .map(|r| self.base(r) + r.len() as u64)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_sizes() {
        assert_eq!(MOSI_BUFFER_WORDS, 1024);
        assert_eq!(MISO_BUFFER_WORDS, 1024);
        assert_eq!(CONFIG_STATUS_BYTES, 12);
    }

    #[test]
    fn test_regions_do_not_overlap() {
        for map in [RegisterMap::HOST, RegisterMap::DEVICE] {
            for a in Region::ALL {
                for b in Region::ALL {
                    if a == b {
                        continue;
                    }
                    let (a0, a1) = (map.base(a), map.base(a) + a.len() as u64);
                    let (b0, b1) = (map.base(b), map.base(b) + b.len() as u64);
                    assert!(a1 <= b0 || b1 <= a0, "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_translate_device_to_host() {
        let dev = RegisterMap::DEVICE;
        let host = RegisterMap::HOST;
        assert_eq!(dev.translate(0x4000_0008, &host), Some(0x10000));
        assert_eq!(dev.translate(dev.word(Region::Mosi, 1), &host), Some(0x50004));
        assert_eq!(dev.translate(dev.word(Region::Miso, 0), &host), Some(0x60000));
        assert_eq!(dev.translate(0x5000_0000, &host), None);
    }

    #[test]
    fn test_check_word() {
        let dev = RegisterMap::DEVICE;
        assert_eq!(dev.check_word(dev.command), Ok((Region::Command, 0)));
        assert_eq!(
            dev.check_word(dev.word(Region::Mosi, MOSI_BUFFER_WORDS - 1)),
            Ok((Region::Mosi, (MOSI_BUFFER_BYTES - WORD_SIZE) as u64))
        );
        assert_eq!(
            dev.check_word(dev.status + 2),
            Err(RegisterError::Unaligned { addr: dev.status + 2 })
        );
        let past_miso = dev.word(Region::Miso, MISO_BUFFER_WORDS);
        assert_eq!(
            dev.check_word(past_miso),
            Err(RegisterError::Unmapped { addr: past_miso })
        );
    }

    #[test]
    fn test_host_window_end_covers_miso() {
        assert_eq!(RegisterMap::HOST.end(), 0x60000 + MISO_BUFFER_BYTES as u64);
        assert!(CONFIG_STATUS_OFFSET < RegisterMap::HOST.mosi);
        assert!(UUID_OFFSET + UUID_BYTES as u64 <= RegisterMap::HOST.mosi);
    }
}
