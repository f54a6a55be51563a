//! The binary-image contract shared by every wire entity.
//!
//! Every channel-level entity is, on the wire, a fixed header + body + footer
//! layout. The traits here fix that composition order once: implementers
//! override only the sections they actually use (each section defaults to a
//! zero-length no-op), and the provided `to_hex` / `parse_image` drivers walk
//! header, body, footer in that order. Only the frame envelope replaces the
//! parse driver, to validate the trailing checksum before any section is read.

use super::common::ParseError;

/// Total serialized length of a wire entity.
pub trait BinaryLength {
    fn binary_length(&self) -> usize;
}

/// Serialization half of the contract: section lengths and writers.
pub trait BinaryImage: BinaryLength {
    fn header_length(&self) -> usize {
        0
    }
    fn body_length(&self) -> usize {
        0
    }
    fn footer_length(&self) -> usize {
        0
    }

    fn write_header(&self, _out: &mut Vec<u8>) {}
    fn write_body(&self, _out: &mut Vec<u8>) {}
    fn write_footer(&self, _out: &mut Vec<u8>) {}

    /// Assembles the full image, always header then body then footer.
    fn to_hex(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.binary_length());
        self.write_header(&mut out);
        self.write_body(&mut out);
        self.write_footer(&mut out);
        out
    }
}

/// Sum of the three section lengths, for `BinaryLength` impls of plain
/// header+body+footer entities.
pub fn composed_length<T: BinaryImage>(image: &T) -> usize {
    image.header_length() + image.body_length() + image.footer_length()
}

/// Parsing half of the contract.
///
/// Each section hook consumes from the start of its slice and returns the
/// number of bytes it used; sections default to consuming nothing, mirroring
/// the zero-length serialization defaults.
pub trait ParseBinaryImage {
    type State;

    fn parse_header(&mut self, _state: &Self::State, _bytes: &[u8]) -> Result<usize, ParseError> {
        Ok(0)
    }
    fn parse_body(&mut self, _state: &Self::State, _bytes: &[u8]) -> Result<usize, ParseError> {
        Ok(0)
    }
    fn parse_footer(&mut self, _state: &Self::State, _bytes: &[u8]) -> Result<usize, ParseError> {
        Ok(0)
    }

    /// Drives the three section hooks in fixed header, body, footer order and
    /// returns the total number of bytes consumed.
    fn parse_image(&mut self, state: &Self::State, bytes: &[u8]) -> Result<usize, ParseError> {
        let mut offset = self.parse_header(state, bytes)?;
        offset += self.parse_body(state, &bytes[offset..])?;
        offset += self.parse_footer(state, &bytes[offset..])?;
        Ok(offset)
    }
}

/// Takes the next `count` bytes at the cursor, advancing it.
pub fn take<'a>(
    bytes: &'a [u8],
    offset: &mut usize,
    count: usize,
    what: &str,
) -> Result<&'a [u8], ParseError> {
    if *offset + count > bytes.len() {
        return Err(ParseError::InvalidLength {
            message: format!(
                "{}: needed {} bytes at offset {}, but only {} remain",
                what,
                count,
                *offset,
                bytes.len().saturating_sub(*offset)
            ),
        });
    }
    let slice = &bytes[*offset..*offset + count];
    *offset += count;
    Ok(slice)
}

/// Reads a big-endian u16 at the cursor, advancing it.
pub fn read_u16(bytes: &[u8], offset: &mut usize, what: &str) -> Result<u16, ParseError> {
    let slice = take(bytes, offset, 2, what)?;
    Ok(u16::from_be_bytes([slice[0], slice[1]]))
}

/// Reads a big-endian i16 at the cursor, advancing it.
pub fn read_i16(bytes: &[u8], offset: &mut usize, what: &str) -> Result<i16, ParseError> {
    let slice = take(bytes, offset, 2, what)?;
    Ok(i16::from_be_bytes([slice[0], slice[1]]))
}

/// Reads a big-endian u32 at the cursor, advancing it.
pub fn read_u32(bytes: &[u8], offset: &mut usize, what: &str) -> Result<u32, ParseError> {
    let slice = take(bytes, offset, 4, what)?;
    Ok(u32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Reads a big-endian f32 at the cursor, advancing it.
pub fn read_f32(bytes: &[u8], offset: &mut usize, what: &str) -> Result<f32, ParseError> {
    let slice = take(bytes, offset, 4, what)?;
    Ok(f32::from_be_bytes([slice[0], slice[1], slice[2], slice[3]]))
}

/// Checks that `bytes` holds at least `required` bytes, with a uniform error.
pub fn require_length(bytes: &[u8], required: usize, entity: &str) -> Result<(), ParseError> {
    if bytes.len() < required {
        return Err(ParseError::InvalidLength {
            message: format!(
                "{}: expected at least {} bytes, but got {}",
                entity,
                required,
                bytes.len()
            ),
        });
    }
    Ok(())
}
