//! Command and header frame layouts, plus constructors for the outbound
//! device-command vocabulary.

use super::common::{FrameKind, Prefix, Version, PREFIX_LENGTH};
use crate::channel::checksum::{open_frame, seal_frame, ChecksumKind};
use crate::channel::common::ParseError;
use crate::channel::frame::{CommandFrame, DeviceCommand, HeaderFrame};
use crate::channel::image::{read_u16, BinaryImage, ParseBinaryImage};
use crate::utils::Ticks;

/// Serializes a command frame: prefix, 2-byte command code, optional
/// extended data, checksum.
pub fn encode_command(frame: &CommandFrame, version: Version) -> Vec<u8> {
    let mut prefix = Prefix::new(version, FrameKind::Command, frame.id_code());
    prefix.set_time(frame.ticks, 1_000_000);
    let mut out = prefix.to_hex();

    out.extend_from_slice(&frame.command.code().to_be_bytes());
    out.extend_from_slice(&frame.extended_data());

    let framesize = (out.len() + 2) as u16;
    out[2..4].copy_from_slice(&framesize.to_be_bytes());
    seal_frame(ChecksumKind::CrcCcitt, out)
}

/// Parses a command frame. Commands outside the device vocabulary are a
/// format error.
pub fn parse_command(bytes: &[u8]) -> Result<CommandFrame, ParseError> {
    let payload = open_frame(ChecksumKind::CrcCcitt, bytes)?;

    let mut prefix = Prefix::default();
    prefix.parse_image(&(), payload)?;
    if prefix.framesize as usize != bytes.len() {
        return Err(ParseError::InvalidLength {
            message: format!(
                "command frame declared {} bytes but buffer holds {}",
                prefix.framesize,
                bytes.len()
            ),
        });
    }

    let mut offset = PREFIX_LENGTH;
    let code = read_u16(payload, &mut offset, "command code")?;
    let command = DeviceCommand::from_code(code).ok_or_else(|| ParseError::InvalidFormat {
        message: format!("unknown device command code {}", code),
    })?;

    let mut frame = CommandFrame::new(prefix.idcode, command);
    frame.ticks = prefix.ticks(1_000_000);
    frame.set_extended_data(&payload[offset..])?;
    Ok(frame)
}

/// Serializes a header frame: prefix, free ASCII text, checksum.
pub fn encode_header(frame: &HeaderFrame, version: Version) -> Vec<u8> {
    let mut prefix = Prefix::new(version, FrameKind::Header, frame.id_code());
    prefix.set_time(frame.ticks, 1_000_000);
    let mut out = prefix.to_hex();

    out.extend_from_slice(frame.header_data().as_bytes());

    let framesize = (out.len() + 2) as u16;
    out[2..4].copy_from_slice(&framesize.to_be_bytes());
    seal_frame(ChecksumKind::CrcCcitt, out)
}

pub fn parse_header(bytes: &[u8]) -> Result<HeaderFrame, ParseError> {
    let payload = open_frame(ChecksumKind::CrcCcitt, bytes)?;

    let mut prefix = Prefix::default();
    prefix.parse_image(&(), payload)?;
    if prefix.framesize as usize != bytes.len() {
        return Err(ParseError::InvalidLength {
            message: format!(
                "header frame declared {} bytes but buffer holds {}",
                prefix.framesize,
                bytes.len()
            ),
        });
    }

    let mut frame = HeaderFrame::new(prefix.idcode);
    frame.ticks = prefix.ticks(1_000_000);
    let text = String::from_utf8_lossy(&payload[PREFIX_LENGTH..]).to_string();
    frame.set_header_data(&text)?;
    Ok(frame)
}

fn new_command(id_code: u16, command: DeviceCommand, time: Option<Ticks>) -> CommandFrame {
    let mut frame = CommandFrame::new(id_code, command);
    frame.ticks = time.unwrap_or_else(Ticks::now);
    frame
}

/// Creates a command to stop real-time data transmission.
pub fn new_disable_real_time_data(id_code: u16, time: Option<Ticks>) -> CommandFrame {
    new_command(id_code, DeviceCommand::DisableRealTimeData, time)
}

/// Creates a command to start real-time data transmission.
pub fn new_enable_real_time_data(id_code: u16, time: Option<Ticks>) -> CommandFrame {
    new_command(id_code, DeviceCommand::EnableRealTimeData, time)
}

/// Creates a command requesting a header frame.
pub fn new_send_header_frame(id_code: u16, time: Option<Ticks>) -> CommandFrame {
    new_command(id_code, DeviceCommand::SendHeaderFrame, time)
}

/// Creates a command requesting configuration frame 1.
pub fn new_send_configuration_frame1(id_code: u16, time: Option<Ticks>) -> CommandFrame {
    new_command(id_code, DeviceCommand::SendConfigurationFrame1, time)
}

/// Creates a command requesting configuration frame 2.
pub fn new_send_configuration_frame2(id_code: u16, time: Option<Ticks>) -> CommandFrame {
    new_command(id_code, DeviceCommand::SendConfigurationFrame2, time)
}

/// Creates an extended-frame command carrying user data.
pub fn new_extended_command(
    id_code: u16,
    time: Option<Ticks>,
    extended_data: &[u8],
) -> Result<CommandFrame, crate::channel::common::ChannelError> {
    let mut frame = new_command(id_code, DeviceCommand::ReceiveExtendedFrame, time);
    frame.set_extended_data(extended_data)?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::checksum::validate_frame;

    #[test]
    fn test_command_frame_creation_and_parsing() {
        let ticks = Ticks::from_soc_fracsec(1_149_577_200, 0, 1_000_000);
        let command = new_enable_real_time_data(7734, Some(ticks));
        let bytes = encode_command(&command, Version::V2011);

        // Prefix + command + checksum
        assert_eq!(bytes.len(), 18);
        assert_eq!(bytes[0], 0xAA);
        assert_eq!(u16::from_be_bytes([bytes[4], bytes[5]]), 7734);
        assert_eq!(bytes[15], 2); // Turn on transmission
        validate_frame(ChecksumKind::CrcCcitt, &bytes).unwrap();

        let parsed = parse_command(&bytes).unwrap();
        assert_eq!(parsed.id_code(), 7734);
        assert_eq!(parsed.command, DeviceCommand::EnableRealTimeData);
        assert!(parsed.extended_data().is_empty());
        assert_eq!(parsed.ticks, ticks);
    }

    #[test]
    fn test_extended_command_roundtrip() {
        let ext_data = vec![0x01, 0x02, 0x03, 0x04];
        let command = new_extended_command(7734, Some(Ticks(0)), &ext_data).unwrap();
        let bytes = encode_command(&command, Version::V2011);
        assert_eq!(bytes.len(), 18 + ext_data.len());
        assert_eq!(&bytes[16..20], &ext_data[..]);

        let parsed = parse_command(&bytes).unwrap();
        assert_eq!(parsed.command, DeviceCommand::ReceiveExtendedFrame);
        assert_eq!(parsed.extended_data(), ext_data);
    }

    #[test]
    fn test_unknown_command_code_rejected() {
        let command = new_enable_real_time_data(1, Some(Ticks(0)));
        let mut bytes = encode_command(&command, Version::V2011);
        // Overwrite the command code with an unassigned value and re-seal
        bytes[15] = 7;
        let resealed = seal_frame(
            ChecksumKind::CrcCcitt,
            bytes[..bytes.len() - 2].to_vec(),
        );
        let result = parse_command(&resealed);
        assert!(matches!(result, Err(ParseError::InvalidFormat { .. })));
    }

    #[test]
    fn test_header_frame_roundtrip() {
        let mut header = HeaderFrame::new(42);
        header.set_header_data("PMU station firmware v2.1").unwrap();
        let bytes = encode_header(&header, Version::V2005);

        let parsed = parse_header(&bytes).unwrap();
        assert_eq!(parsed.id_code(), 42);
        assert_eq!(parsed.header_data(), "PMU station firmware v2.1");
    }

    #[test]
    fn test_every_device_command_serializes() {
        for (constructor, expected) in [
            (
                new_disable_real_time_data as fn(u16, Option<Ticks>) -> CommandFrame,
                DeviceCommand::DisableRealTimeData,
            ),
            (new_enable_real_time_data, DeviceCommand::EnableRealTimeData),
            (new_send_header_frame, DeviceCommand::SendHeaderFrame),
            (
                new_send_configuration_frame1,
                DeviceCommand::SendConfigurationFrame1,
            ),
            (
                new_send_configuration_frame2,
                DeviceCommand::SendConfigurationFrame2,
            ),
        ] {
            let frame = constructor(9, Some(Ticks(0)));
            let parsed = parse_command(&encode_command(&frame, Version::V2011)).unwrap();
            assert_eq!(parsed.command, expected);
        }
    }
}
