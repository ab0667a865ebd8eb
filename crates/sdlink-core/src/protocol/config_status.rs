//! Configuration status block decoding.
//!
//! The block is three words at `CONFIG_STATUS_OFFSET`:
//!
//! | Word | Content                                          |
//! |------|--------------------------------------------------|
//! | 0    | identity tag, 4 ASCII bytes (`SBLD` / `SSOC`)    |
//! | 1    | version, big-endian major then big-endian minor  |
//! | 2    | state, bit 0 set while switching configuration   |

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error;

use super::registers::CONFIG_STATUS_BYTES;

/// Identity tag of the bootloader configuration.
pub const BOOTLOADER_TAG: &[u8; 4] = b"SBLD";
/// Identity tag of the SoC firmware that speaks the command protocol.
pub const SOC_FIRMWARE_TAG: &[u8; 4] = b"SSOC";

const STATE_SWITCHING: u32 = 1 << 0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Configuration block too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },

    #[error("Device did not report a known configuration")]
    NotADevice,

    #[error("Device is running the {found} configuration, not the SoC firmware")]
    WrongConfiguration { found: Identity },

    #[error("Device is switching configuration; power-cycle it and try again")]
    Switching,
}

/// Which configuration is currently loaded on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Unknown,
    Bootloader,
    SocFirmware,
}

impl Identity {
    pub fn from_tag(tag: &[u8]) -> Self {
        if tag == BOOTLOADER_TAG {
            Identity::Bootloader
        } else if tag == SOC_FIRMWARE_TAG {
            Identity::SocFirmware
        } else {
            Identity::Unknown
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Unknown => write!(f, "Unknown"),
            Identity::Bootloader => write!(f, "Bootloader"),
            Identity::SocFirmware => write!(f, "SoC Firmware"),
        }
    }
}

/// Configuration version pair (major, minor).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
}

impl Version {
    pub fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Decoded configuration status block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigurationDescriptor {
    pub identity: Identity,
    raw_version: Version,
    /// Raw state word.
    pub state: u32,
    /// Device is in the middle of switching configuration.
    pub switching: bool,
}

impl ConfigurationDescriptor {
    pub const SIZE: usize = CONFIG_STATUS_BYTES;

    /// Decode a configuration block. Never fails: unrecognized tags decode
    /// as `Identity::Unknown`.
    pub fn decode(block: &[u8; CONFIG_STATUS_BYTES]) -> Self {
        // Version bytes are stored most significant first, the reverse of
        // the little-endian word order used everywhere else.
        let raw_version = Version {
            major: BigEndian::read_u16(&block[4..6]),
            minor: BigEndian::read_u16(&block[6..8]),
        };
        let state = LittleEndian::read_u32(&block[8..12]);

        Self {
            identity: Identity::from_tag(&block[0..4]),
            raw_version,
            state,
            switching: state & STATE_SWITCHING != 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, ConfigError> {
        let block: &[u8; CONFIG_STATUS_BYTES] = data
            .get(..CONFIG_STATUS_BYTES)
            .and_then(|b| b.try_into().ok())
            .ok_or(ConfigError::BufferTooSmall {
                expected: CONFIG_STATUS_BYTES,
                actual: data.len(),
            })?;
        Ok(Self::decode(block))
    }

    /// Version of the SoC firmware. Only meaningful for the SoC firmware
    /// identity; `None` otherwise.
    pub fn version(&self) -> Option<Version> {
        (self.identity == Identity::SocFirmware).then_some(self.raw_version)
    }

    /// Check the device can accept commands.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.identity {
            Identity::Unknown => return Err(ConfigError::NotADevice),
            Identity::SocFirmware => {}
            found => return Err(ConfigError::WrongConfiguration { found }),
        }
        if self.switching {
            return Err(ConfigError::Switching);
        }
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for ConfigurationDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Configuration: {}", self.identity)?;
        match self.version() {
            Some(v) => write!(f, " | Version: {}", v)?,
            None => write!(f, " | Version: N/A")?,
        }
        if self.switching {
            write!(f, " | State: SWITCHING")
        } else {
            write!(f, " | State: IDLE")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(tag: &[u8; 4], version: [u8; 4], state: u32) -> [u8; 12] {
        let mut b = [0u8; 12];
        b[0..4].copy_from_slice(tag);
        b[4..8].copy_from_slice(&version);
        b[8..12].copy_from_slice(&state.to_le_bytes());
        b
    }

    #[test]
    fn test_decode_soc_firmware() {
        let desc = ConfigurationDescriptor::decode(&block(b"SSOC", [0x01, 0x02, 0x00, 0x05], 0));
        assert_eq!(desc.identity, Identity::SocFirmware);
        assert_eq!(desc.version(), Some(Version::new(0x0102, 0x0005)));
        assert!(!desc.switching);
        assert!(desc.validate().is_ok());
        assert_eq!(desc.to_string(), "Configuration: SoC Firmware | Version: 258.5 | State: IDLE");
    }

    #[test]
    fn test_version_is_byte_swapped_word() {
        // Same block viewed as a native little-endian word: major is the low
        // half with its bytes swapped, minor the high half swapped.
        let raw = block(b"SSOC", [0x00, 0x02, 0x00, 0x07], 0);
        let word = LittleEndian::read_u32(&raw[4..8]);
        let desc = ConfigurationDescriptor::decode(&raw);
        let v = desc.version().unwrap();
        assert_eq!(v.major, ((word & 0xFFFF) as u16).swap_bytes());
        assert_eq!(v.minor, ((word >> 16) as u16).swap_bytes());
        assert_eq!(v, Version::new(2, 7));
    }

    #[test]
    fn test_bootloader_is_refused() {
        let desc = ConfigurationDescriptor::decode(&block(b"SBLD", [0, 1, 0, 0], 0));
        assert_eq!(desc.identity, Identity::Bootloader);
        assert_eq!(desc.version(), None);
        assert_eq!(
            desc.validate(),
            Err(ConfigError::WrongConfiguration {
                found: Identity::Bootloader
            })
        );
    }

    #[test]
    fn test_unknown_is_refused() {
        let desc = ConfigurationDescriptor::decode(&block(b"ssoc", [0, 1, 0, 0], 0));
        assert_eq!(desc.identity, Identity::Unknown);
        assert_eq!(desc.validate(), Err(ConfigError::NotADevice));
        assert!(desc.to_string().contains("N/A"));
    }

    #[test]
    fn test_switching_is_refused() {
        let desc = ConfigurationDescriptor::decode(&block(b"SSOC", [0, 1, 0, 0], 0x0000_0003));
        assert!(desc.switching);
        assert_eq!(desc.state, 3);
        assert_eq!(desc.validate(), Err(ConfigError::Switching));

        let desc = ConfigurationDescriptor::decode(&block(b"SSOC", [0, 1, 0, 0], 0x0000_0002));
        assert!(!desc.switching);
        assert!(desc.is_ready());
    }

    #[test]
    fn test_decode_is_pure() {
        let raw = block(b"SSOC", [0xAB, 0xCD, 0x12, 0x34], 0x10);
        assert_eq!(
            ConfigurationDescriptor::decode(&raw),
            ConfigurationDescriptor::decode(&raw)
        );
    }

    #[test]
    fn test_from_bytes_too_small() {
        assert_eq!(
            ConfigurationDescriptor::from_bytes(b"SSOC"),
            Err(ConfigError::BufferTooSmall {
                expected: 12,
                actual: 4
            })
        );
    }
}
