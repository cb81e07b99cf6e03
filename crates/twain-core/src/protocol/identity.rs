//! Identity records and their per-platform native layout.
//!
//! Both sides of a session identify themselves with the same record. The
//! layout differs between platforms: Windows and macOS carry a 32-bit id,
//! Linux a 64-bit one, and macOS aligns the protocol block to four bytes.

use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::wire::{read_fixed_str, write_fixed_str};

/// Width of every string field of an identity record.
pub const IDENTITY_STR_WIDTH: usize = 34;

/// Longest text a 34-byte identity string can hold.
pub const IDENTITY_STR_MAX: usize = 32;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Buffer too small for {platform} identity: expected {expected}, got {actual}")]
    BufferTooSmall {
        platform: Platform,
        expected: usize,
        actual: usize,
    },

    #[error("Identity id {id:#x} does not fit the 32-bit {platform} layout")]
    IdTooLarge { id: u64, platform: Platform },

    #[error("Identity field '{field}' is {len} bytes, limit is 32")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Operating system flavour of the driver-manager ABI.
///
/// Injected into the session at construction; nothing in the crate detects it
/// lazily behind the caller's back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    Macosx,
}

impl Platform {
    /// Platform of the running host, if it is one the protocol knows.
    pub fn host() -> Option<Platform> {
        if cfg!(target_os = "windows") {
            Some(Platform::Windows)
        } else if cfg!(target_os = "linux") {
            Some(Platform::Linux)
        } else if cfg!(target_os = "macos") {
            Some(Platform::Macosx)
        } else {
            None
        }
    }

    fn id_width(self) -> usize {
        match self {
            Platform::Linux => 8,
            Platform::Windows | Platform::Macosx => 4,
        }
    }

    fn protocol_padding(self) -> usize {
        match self {
            Platform::Macosx => 2,
            Platform::Windows | Platform::Linux => 0,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Linux => write!(f, "linux"),
            Platform::Macosx => write!(f, "macosx"),
        }
    }
}

/// Version block of an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub language: u16,
    pub country: u16,
    pub info: String,
}

impl Version {
    const SIZE: usize = 8 + IDENTITY_STR_WIDTH;
}

/// Identity of an application or a driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Id assigned by the driver manager (0 until assigned).
    pub id: u64,
    pub version: Version,
    pub protocol_major: u16,
    pub protocol_minor: u16,
    /// Bitmask of supported data groups and feature flags.
    pub supported_groups: u32,
    pub manufacturer: String,
    pub product_family: String,
    pub product_name: String,
}

impl Identity {
    /// Size of the native record on `platform`.
    pub fn wire_size(platform: Platform) -> usize {
        platform.id_width()
            + Version::SIZE
            + platform.protocol_padding()
            + 2
            + 2
            + 4
            + 3 * IDENTITY_STR_WIDTH
    }

    /// Serialize into the native layout of `platform`.
    pub fn to_bytes(&self, platform: Platform) -> Result<Vec<u8>, IdentityError> {
        self.check_lengths()?;

        let mut buf = Vec::with_capacity(Self::wire_size(platform));
        match platform {
            Platform::Linux => buf.write_u64::<LittleEndian>(self.id)?,
            Platform::Windows | Platform::Macosx => {
                let id = u32::try_from(self.id)
                    .map_err(|_| IdentityError::IdTooLarge { id: self.id, platform })?;
                buf.write_u32::<LittleEndian>(id)?;
            }
        }
        buf.write_u16::<LittleEndian>(self.version.major)?;
        buf.write_u16::<LittleEndian>(self.version.minor)?;
        buf.write_u16::<LittleEndian>(self.version.language)?;
        buf.write_u16::<LittleEndian>(self.version.country)?;
        write_fixed_str(&mut buf, &self.version.info, IDENTITY_STR_WIDTH)?;
        buf.resize(buf.len() + platform.protocol_padding(), 0);
        buf.write_u16::<LittleEndian>(self.protocol_major)?;
        buf.write_u16::<LittleEndian>(self.protocol_minor)?;
        buf.write_u32::<LittleEndian>(self.supported_groups)?;
        write_fixed_str(&mut buf, &self.manufacturer, IDENTITY_STR_WIDTH)?;
        write_fixed_str(&mut buf, &self.product_family, IDENTITY_STR_WIDTH)?;
        write_fixed_str(&mut buf, &self.product_name, IDENTITY_STR_WIDTH)?;
        Ok(buf)
    }

    /// Parse the native layout of `platform`.
    pub fn from_bytes(platform: Platform, data: &[u8]) -> Result<Self, IdentityError> {
        let expected = Self::wire_size(platform);
        if data.len() < expected {
            return Err(IdentityError::BufferTooSmall {
                platform,
                expected,
                actual: data.len(),
            });
        }

        let mut cursor = Cursor::new(data);
        let id = match platform {
            Platform::Linux => cursor.read_u64::<LittleEndian>()?,
            Platform::Windows | Platform::Macosx => u64::from(cursor.read_u32::<LittleEndian>()?),
        };
        let version = Version {
            major: cursor.read_u16::<LittleEndian>()?,
            minor: cursor.read_u16::<LittleEndian>()?,
            language: cursor.read_u16::<LittleEndian>()?,
            country: cursor.read_u16::<LittleEndian>()?,
            info: read_fixed_str(&mut cursor, IDENTITY_STR_WIDTH)?,
        };
        cursor.set_position(cursor.position() + platform.protocol_padding() as u64);

        Ok(Self {
            id,
            version,
            protocol_major: cursor.read_u16::<LittleEndian>()?,
            protocol_minor: cursor.read_u16::<LittleEndian>()?,
            supported_groups: cursor.read_u32::<LittleEndian>()?,
            manufacturer: read_fixed_str(&mut cursor, IDENTITY_STR_WIDTH)?,
            product_family: read_fixed_str(&mut cursor, IDENTITY_STR_WIDTH)?,
            product_name: read_fixed_str(&mut cursor, IDENTITY_STR_WIDTH)?,
        })
    }

    fn check_lengths(&self) -> Result<(), IdentityError> {
        let fields = [
            ("version.info", &self.version.info),
            ("manufacturer", &self.manufacturer),
            ("product_family", &self.product_family),
            ("product_name", &self.product_name),
        ];
        for (field, value) in fields {
            if value.len() > IDENTITY_STR_MAX {
                return Err(IdentityError::FieldTooLong {
                    field,
                    len: value.len(),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} (id {}, protocol {}.{})",
            self.manufacturer,
            self.product_family,
            self.product_name,
            self.id,
            self.protocol_major,
            self.protocol_minor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Identity {
        Identity {
            id: 7,
            version: Version {
                major: 2,
                minor: 5,
                language: 13,
                country: 1,
                info: "2.5 sample".into(),
            },
            protocol_major: 2,
            protocol_minor: 4,
            supported_groups: 0x2000_0003,
            manufacturer: "Acme".into(),
            product_family: "Capture".into(),
            product_name: "Acme Scan".into(),
        }
    }

    #[test]
    fn test_wire_sizes() {
        assert_eq!(Identity::wire_size(Platform::Windows), 156);
        assert_eq!(Identity::wire_size(Platform::Linux), 160);
        assert_eq!(Identity::wire_size(Platform::Macosx), 158);
    }

    #[test]
    fn test_layout_per_platform() {
        let identity = sample();
        for platform in [Platform::Windows, Platform::Linux, Platform::Macosx] {
            let bytes = identity.to_bytes(platform).unwrap();
            assert_eq!(bytes.len(), Identity::wire_size(platform));
            assert_eq!(Identity::from_bytes(platform, &bytes).unwrap(), identity);
        }
    }

    #[test]
    fn test_linux_id_is_64_bit() {
        let mut identity = sample();
        identity.id = 0x1_0000_0001;
        let bytes = identity.to_bytes(Platform::Linux).unwrap();
        assert_eq!(&bytes[..8], &0x1_0000_0001u64.to_le_bytes());

        let err = identity.to_bytes(Platform::Windows).unwrap_err();
        assert!(matches!(err, IdentityError::IdTooLarge { .. }));
    }

    #[test]
    fn test_macos_protocol_block_is_aligned() {
        let bytes = sample().to_bytes(Platform::Macosx).unwrap();
        // 4 byte id + 42 byte version + 2 bytes of padding
        assert_eq!(&bytes[46..48], &[0, 0]);
        assert_eq!(u16::from_le_bytes([bytes[48], bytes[49]]), 2);
    }

    #[test]
    fn test_rejects_short_buffer() {
        let err = Identity::from_bytes(Platform::Windows, &[0u8; 20]).unwrap_err();
        assert!(matches!(err, IdentityError::BufferTooSmall { expected: 156, .. }));
    }

    #[test]
    fn test_rejects_long_field() {
        let mut identity = sample();
        identity.product_name = "x".repeat(40);
        assert!(matches!(
            identity.to_bytes(Platform::Linux),
            Err(IdentityError::FieldTooLong { field: "product_name", .. })
        ));
    }
}
