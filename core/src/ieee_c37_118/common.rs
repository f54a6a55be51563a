use crate::channel::common::ParseError;
use crate::channel::image::{
    composed_length, require_length, BinaryImage, BinaryLength, ParseBinaryImage,
};
use crate::utils::Ticks;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of the common frame prefix: SYNC, FRAMESIZE, IDCODE, SOC and
/// FRACSEC fields.
pub const PREFIX_LENGTH: usize = 14;

// Enum to track standard revision based on the SYNC field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    V2005, // IEEE C37.118-2005 (version 0x1)
    V2011, // IEEE C37.118.2-2011 (version 0x2)
}

impl Version {
    pub fn from_sync(sync: u16) -> Result<Self, ParseError> {
        match sync & 0x000F {
            0x0001 => Ok(Version::V2005),
            0x0002 => Ok(Version::V2011),
            other => Err(ParseError::VersionNotSupported {
                message: format!("sync version bits 0x{:X}", other),
            }),
        }
    }

    fn bits(&self) -> u16 {
        match self {
            Version::V2005 => 0x1,
            Version::V2011 => 0x2,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V2011
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::V2005 => write!(f, "IEEE Std C37.118-2005"),
            Version::V2011 => write!(f, "IEEE Std C37.118.2-2011"),
        }
    }
}

/// Represents the type of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Header,
    Config1,
    Config2,
    Command,
}

impl FrameKind {
    pub fn from_sync(sync: u16) -> Result<FrameKind, ParseError> {
        // Verify first byte is 0xAA
        if (sync >> 8) != 0xAA {
            return Err(ParseError::InvalidFrameType {
                message: format!("leading byte 0x{:02X} is not 0xAA", sync >> 8),
            });
        }
        match (sync >> 4) & 0x7 {
            0 => Ok(FrameKind::Data),
            1 => Ok(FrameKind::Header),
            2 => Ok(FrameKind::Config1),
            3 => Ok(FrameKind::Config2),
            4 => Ok(FrameKind::Command),
            other => Err(ParseError::InvalidFrameType {
                message: format!("frame type bits 0x{:X}", other),
            }),
        }
    }

    fn bits(&self) -> u16 {
        match self {
            FrameKind::Data => 0,
            FrameKind::Header => 1,
            FrameKind::Config1 => 2,
            FrameKind::Config2 => 3,
            FrameKind::Command => 4,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Data => write!(f, "IEEE Std C37.118 Data Frame"),
            FrameKind::Header => write!(f, "IEEE Std C37.118 Header Frame"),
            FrameKind::Config1 => write!(f, "IEEE Std C37.118 Configuration Frame 1"),
            FrameKind::Config2 => write!(f, "IEEE Std C37.118 Configuration Frame 2"),
            FrameKind::Command => write!(f, "IEEE Std C37.118 Command Frame"),
        }
    }
}

/// Builds the frame sync word: leading byte 0xAA, frame type in bits 6-4,
/// standard revision in bits 3-0.
pub fn make_sync(version: Version, kind: FrameKind) -> u16 {
    (0xAA << 8) | (kind.bits() << 4) | version.bits()
}

/// The common frame prefix shared by every C37.118 frame kind.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Prefix {
    pub sync: u16,
    pub framesize: u16,
    pub idcode: u16,
    pub soc: u32,
    pub time_quality: u8,
    pub fracsec: u32, // 24-bit fraction-of-second count
}

impl Prefix {
    pub fn new(version: Version, kind: FrameKind, idcode: u16) -> Self {
        Prefix {
            sync: make_sync(version, kind),
            framesize: PREFIX_LENGTH as u16, // updated once the body is known
            idcode,
            soc: 0,
            time_quality: 0,
            fracsec: 0,
        }
    }

    pub fn version(&self) -> Result<Version, ParseError> {
        Version::from_sync(self.sync)
    }

    pub fn kind(&self) -> Result<FrameKind, ParseError> {
        FrameKind::from_sync(self.sync)
    }

    /// Stamps the prefix from a tick timestamp at the given fractional
    /// resolution.
    pub fn set_time(&mut self, ticks: Ticks, time_base: u32) {
        let (soc, fracsec) = ticks.to_soc_fracsec(time_base);
        self.soc = soc;
        self.fracsec = fracsec & 0x00FF_FFFF;
    }

    pub fn ticks(&self, time_base: u32) -> Ticks {
        Ticks::from_soc_fracsec(self.soc, self.fracsec, time_base)
    }
}

impl BinaryLength for Prefix {
    fn binary_length(&self) -> usize {
        composed_length(self)
    }
}

impl BinaryImage for Prefix {
    fn header_length(&self) -> usize {
        PREFIX_LENGTH
    }

    fn write_header(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.sync.to_be_bytes());
        out.extend_from_slice(&self.framesize.to_be_bytes());
        out.extend_from_slice(&self.idcode.to_be_bytes());
        out.extend_from_slice(&self.soc.to_be_bytes());
        out.push(self.time_quality);
        let fracsec = self.fracsec.to_be_bytes();
        out.push(fracsec[1]);
        out.push(fracsec[2]);
        out.push(fracsec[3]);
    }
}

impl ParseBinaryImage for Prefix {
    type State = ();

    fn parse_header(&mut self, _state: &(), bytes: &[u8]) -> Result<usize, ParseError> {
        require_length(bytes, PREFIX_LENGTH, "C37.118 prefix")?;
        self.sync = u16::from_be_bytes([bytes[0], bytes[1]]);
        self.framesize = u16::from_be_bytes([bytes[2], bytes[3]]);
        self.idcode = u16::from_be_bytes([bytes[4], bytes[5]]);
        self.soc = u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        self.time_quality = bytes[10];
        self.fracsec = u32::from_be_bytes([0, bytes[11], bytes[12], bytes[13]]);
        Ok(PREFIX_LENGTH)
    }
}
