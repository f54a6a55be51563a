//! Configuration frame layout (CFG-1 and CFG-2): TIME_BASE and PMU count,
//! then one section per PMU carrying its station name, data format, channel
//! names and conversion factors, followed by the stream data rate.

use super::common::{FrameKind, Prefix, Version, PREFIX_LENGTH};
use crate::channel::cell::{ConfigurationCell, DataFormat};
use crate::channel::checksum::{open_frame, seal_frame, ChecksumKind};
use crate::channel::definition::{
    AnalogDefinition, AnalogKind, DigitalDefinition, NominalFrequency, PhasorDefinition,
    PhasorKind,
};
use crate::channel::common::ParseError;
use crate::channel::frame::ConfigurationFrame;
use crate::channel::image::{read_i16, read_u16, read_u32, take, BinaryImage, ParseBinaryImage};
use crate::channel::value::{NumericFormat, PhasorFormat};

/// Width of every C37.118 name field.
pub const NAME_LENGTH: usize = 16;

/// Encodes the FORMAT word: bit 0 polar coordinates, bit 1 floating-point
/// phasors, bit 2 floating-point analogs, bit 3 floating-point frequency.
pub fn format_word(format: &DataFormat) -> u16 {
    let mut word = 0;
    if format.phasor.is_polar() {
        word |= 0x0001;
    }
    if !format.phasor.is_fixed() {
        word |= 0x0002;
    }
    if !format.analog.is_fixed() {
        word |= 0x0004;
    }
    if !format.frequency.is_fixed() {
        word |= 0x0008;
    }
    word
}

pub fn format_from_word(word: u16) -> DataFormat {
    let phasor = match (word & 0x0002 != 0, word & 0x0001 != 0) {
        (false, false) => PhasorFormat::IntRect,
        (false, true) => PhasorFormat::IntPolar,
        (true, false) => PhasorFormat::FloatRect,
        (true, true) => PhasorFormat::FloatPolar,
    };
    DataFormat {
        phasor,
        frequency: if word & 0x0008 != 0 {
            NumericFormat::Float
        } else {
            NumericFormat::Fixed
        },
        analog: if word & 0x0004 != 0 {
            NumericFormat::Float
        } else {
            NumericFormat::Fixed
        },
    }
}

/// Writes a name into a fixed-width, space-padded field.
pub fn write_name(out: &mut Vec<u8>, name: &str, width: usize) {
    let bytes = name.as_bytes();
    let used = bytes.len().min(width);
    out.extend_from_slice(&bytes[..used]);
    out.resize(out.len() + width - used, b' ');
}

/// Reads a fixed-width name field back into a trimmed string.
pub fn read_name(field: &[u8]) -> String {
    String::from_utf8_lossy(field).trim().to_string()
}

fn write_cell(out: &mut Vec<u8>, cell: &ConfigurationCell) {
    write_name(out, cell.station_name(), NAME_LENGTH);
    out.extend_from_slice(&cell.id_code().to_be_bytes());
    out.extend_from_slice(&format_word(&cell.format).to_be_bytes());
    out.extend_from_slice(&(cell.phasor_definitions.len() as u16).to_be_bytes());
    out.extend_from_slice(&(cell.analog_definitions.len() as u16).to_be_bytes());
    out.extend_from_slice(&(cell.digital_definitions.len() as u16).to_be_bytes());

    // CHNAM: phasor and analog names, then sixteen names per digital word
    for definition in &cell.phasor_definitions {
        write_name(out, definition.definition.label(), NAME_LENGTH);
    }
    for definition in &cell.analog_definitions {
        write_name(out, definition.definition.label(), NAME_LENGTH);
    }
    for definition in &cell.digital_definitions {
        for bit_label in &definition.bit_labels {
            write_name(out, bit_label, NAME_LENGTH);
        }
    }

    // PHUNIT: voltage/current flag plus the 24-bit scale factor
    for definition in &cell.phasor_definitions {
        let kind_byte = match definition.kind {
            PhasorKind::Voltage => 0u8,
            PhasorKind::Current => 1u8,
        };
        out.push(kind_byte);
        out.extend_from_slice(&definition.definition.scaling().to_be_bytes()[1..]);
    }

    // ANUNIT: measurement kind plus the user-defined 24-bit scale
    for definition in &cell.analog_definitions {
        let kind_byte = match definition.kind {
            AnalogKind::SinglePointOnWave => 0u8,
            AnalogKind::Rms => 1u8,
            AnalogKind::Peak => 2u8,
        };
        out.push(kind_byte);
        out.extend_from_slice(&definition.definition.scaling().to_be_bytes()[1..]);
    }

    // DIGUNIT: normal-status and valid-inputs mask words
    for definition in &cell.digital_definitions {
        out.extend_from_slice(&definition.normal_status.to_be_bytes());
        out.extend_from_slice(&definition.valid_inputs.to_be_bytes());
    }

    let fnom: [u8; 2] = match cell.nominal_frequency() {
        NominalFrequency::Hz50 => [0, 0],
        NominalFrequency::Hz60 => [1, 0],
    };
    out.extend_from_slice(&fnom);
    out.extend_from_slice(&cell.revision_count.to_be_bytes());
}

fn parse_cell(payload: &[u8], offset: &mut usize) -> Result<ConfigurationCell, ParseError> {
    let station = read_name(take(payload, offset, NAME_LENGTH, "PMU station name")?);
    let idcode = read_u16(payload, offset, "PMU id code")?;
    let format = format_from_word(read_u16(payload, offset, "PMU format word")?);
    let phnmr = read_u16(payload, offset, "PMU phasor count")? as usize;
    let annmr = read_u16(payload, offset, "PMU analog count")? as usize;
    let dgnmr = read_u16(payload, offset, "PMU digital count")? as usize;

    let mut cell = ConfigurationCell::new(idcode);
    cell.format = format;
    cell.set_station_name(&station)?;

    let mut phasor_names = Vec::with_capacity(phnmr);
    for _ in 0..phnmr {
        phasor_names.push(read_name(take(payload, offset, NAME_LENGTH, "phasor name")?));
    }
    let mut analog_names = Vec::with_capacity(annmr);
    for _ in 0..annmr {
        analog_names.push(read_name(take(payload, offset, NAME_LENGTH, "analog name")?));
    }
    let mut digital_names = Vec::with_capacity(dgnmr);
    for _ in 0..dgnmr {
        let mut bit_labels = Vec::with_capacity(DigitalDefinition::BITS_PER_WORD);
        for _ in 0..DigitalDefinition::BITS_PER_WORD {
            bit_labels.push(read_name(take(payload, offset, NAME_LENGTH, "digital name")?));
        }
        digital_names.push(bit_labels);
    }

    for name in &phasor_names {
        let unit = take(payload, offset, 4, "phasor conversion factor")?;
        let kind = if unit[0] == 1 {
            PhasorKind::Current
        } else {
            PhasorKind::Voltage
        };
        let mut definition = PhasorDefinition::new(name, kind, NAME_LENGTH)?;
        definition
            .definition
            .set_scaling(u32::from_be_bytes([0, unit[1], unit[2], unit[3]]))?;
        cell.phasor_definitions.push(definition)?;
    }

    for name in &analog_names {
        let unit = take(payload, offset, 4, "analog conversion factor")?;
        let kind = match unit[0] {
            0 => AnalogKind::SinglePointOnWave,
            1 => AnalogKind::Rms,
            2 => AnalogKind::Peak,
            other => {
                return Err(ParseError::InvalidFormat {
                    message: format!("analog measurement kind {}", other),
                })
            }
        };
        let mut definition = AnalogDefinition::new(name, kind, NAME_LENGTH)?;
        definition
            .definition
            .set_scaling(u32::from_be_bytes([0, unit[1], unit[2], unit[3]]))?;
        cell.analog_definitions.push(definition)?;
    }

    for bit_labels in digital_names {
        let unit = take(payload, offset, 4, "digital mask words")?;
        let mut definition = DigitalDefinition::new(&bit_labels[0], NAME_LENGTH)?;
        definition.set_bit_labels(bit_labels)?;
        definition.normal_status = u16::from_be_bytes([unit[0], unit[1]]);
        definition.valid_inputs = u16::from_be_bytes([unit[2], unit[3]]);
        cell.digital_definitions.push(definition)?;
    }

    let fnom = take(payload, offset, 2, "nominal frequency word")?;
    cell.set_nominal_frequency(match fnom[0] {
        0 => NominalFrequency::Hz50,
        1 => NominalFrequency::Hz60,
        other => {
            return Err(ParseError::InvalidFormat {
                message: format!("nominal frequency code {}", other),
            })
        }
    });
    cell.revision_count = read_u16(payload, offset, "configuration count")?;

    Ok(cell)
}

/// Serializes a configuration frame as CFG-1 or CFG-2.
pub fn encode_configuration(
    frame: &ConfigurationFrame,
    version: Version,
    kind: FrameKind,
) -> Result<Vec<u8>, ParseError> {
    if !matches!(kind, FrameKind::Config1 | FrameKind::Config2) {
        return Err(ParseError::InvalidFrameType {
            message: format!("{} is not a configuration frame kind", kind),
        });
    }

    let mut prefix = Prefix::new(version, kind, frame.id_code());
    prefix.set_time(frame.ticks, frame.time_base);
    let mut out = prefix.to_hex();

    out.extend_from_slice(&(frame.time_base & 0x00FF_FFFF).to_be_bytes());
    out.extend_from_slice(&(frame.cells.len() as u16).to_be_bytes());
    for cell in frame.cells.iter() {
        write_cell(&mut out, cell);
    }
    out.extend_from_slice(&frame.frame_rate().to_be_bytes());

    // Patch the declared frame size now that the body is complete
    let framesize = (out.len() + 2) as u16;
    out[2..4].copy_from_slice(&framesize.to_be_bytes());

    Ok(seal_frame(ChecksumKind::CrcCcitt, out))
}

/// Parses a CFG-1 or CFG-2 frame. The checksum is validated before any
/// field is read; a mismatch rejects the frame outright.
pub fn parse_configuration(bytes: &[u8]) -> Result<ConfigurationFrame, ParseError> {
    let payload = open_frame(ChecksumKind::CrcCcitt, bytes)?;

    let mut prefix = Prefix::default();
    prefix.parse_image(&(), payload)?;
    if prefix.framesize as usize != bytes.len() {
        return Err(ParseError::InvalidLength {
            message: format!(
                "configuration frame declared {} bytes but buffer holds {}",
                prefix.framesize,
                bytes.len()
            ),
        });
    }
    // Rejects unsupported revisions up front
    prefix.version()?;

    let mut offset = PREFIX_LENGTH;
    let time_base = read_u32(payload, &mut offset, "time base")? & 0x00FF_FFFF;
    let num_pmu = read_u16(payload, &mut offset, "PMU count")? as usize;

    let mut frame = ConfigurationFrame::new(prefix.idcode, 0);
    frame.time_base = time_base.max(1);
    for _ in 0..num_pmu {
        let cell = parse_cell(payload, &mut offset)?;
        frame.cells.push(cell)?;
    }

    let data_rate = read_i16(payload, &mut offset, "data rate")?;
    frame.set_frame_rate(data_rate);
    frame.ticks = prefix.ticks(frame.time_base);
    frame.record_parsed_length(prefix.framesize as usize);
    Ok(frame)
}

/// A one-PMU configuration (four phasors, one analog, one digital word)
/// used as the shared fixture across the codec test suites.
#[cfg(test)]
pub(crate) fn sample_frame() -> ConfigurationFrame {
    let mut frame = ConfigurationFrame::new(7734, 30);
    frame.time_base = 1_000_000;
    frame.ticks = crate::utils::Ticks::from_soc_fracsec(1_149_580_800, 16_817, 1_000_000);

    let mut cell = ConfigurationCell::new(7734);
    cell.set_station_name("STATION A").unwrap();
    cell.format = DataFormat {
        phasor: PhasorFormat::IntRect,
        frequency: NumericFormat::Fixed,
        analog: NumericFormat::Fixed,
    };
    for (label, kind) in [
        ("VA", PhasorKind::Voltage),
        ("VB", PhasorKind::Voltage),
        ("VC", PhasorKind::Voltage),
        ("I1", PhasorKind::Current),
    ] {
        let mut definition = PhasorDefinition::new(label, kind, NAME_LENGTH).unwrap();
        definition
            .definition
            .set_scaling(if kind == PhasorKind::Voltage {
                915_527
            } else {
                45_776
            })
            .unwrap();
        cell.phasor_definitions.push(definition).unwrap();
    }
    let mut analog = AnalogDefinition::new("ANALOG1", AnalogKind::Rms, NAME_LENGTH).unwrap();
    analog.definition.set_scaling(1).unwrap();
    cell.analog_definitions.push(analog).unwrap();
    let digital = DigitalDefinition::new("BREAKER1", NAME_LENGTH).unwrap();
    cell.digital_definitions.push(digital).unwrap();
    cell.set_nominal_frequency(NominalFrequency::Hz60);
    cell.revision_count = 1;
    frame.cells.push(cell).unwrap();
    frame
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::common::ChannelError;

    #[test]
    fn test_format_word_roundtrip() {
        for phasor in [
            PhasorFormat::IntRect,
            PhasorFormat::IntPolar,
            PhasorFormat::FloatRect,
            PhasorFormat::FloatPolar,
        ] {
            for frequency in [NumericFormat::Fixed, NumericFormat::Float] {
                for analog in [NumericFormat::Fixed, NumericFormat::Float] {
                    let format = DataFormat {
                        phasor,
                        frequency,
                        analog,
                    };
                    assert_eq!(format_from_word(format_word(&format)), format);
                }
            }
        }
    }

    #[test]
    fn test_configuration_roundtrip() {
        let frame = sample_frame();
        let bytes = encode_configuration(&frame, Version::V2011, FrameKind::Config2).unwrap();

        // Declared size matches the actual image
        assert_eq!(
            u16::from_be_bytes([bytes[2], bytes[3]]) as usize,
            bytes.len()
        );

        let parsed = parse_configuration(&bytes).unwrap();
        assert_eq!(parsed.id_code(), 7734);
        assert_eq!(parsed.frame_rate(), 30);
        assert_eq!(parsed.time_base, 1_000_000);
        assert_eq!(parsed.ticks, frame.ticks);
        assert_eq!(parsed.parsed_binary_length(), Some(bytes.len()));

        let cell = parsed.cells.get(0).unwrap();
        assert_eq!(cell.station_name(), "STATION A");
        assert_eq!(cell.phasor_definitions.len(), 4);
        assert_eq!(cell.phasor_definitions.get(3).unwrap().kind, PhasorKind::Current);
        assert_eq!(
            cell.phasor_definitions.get(0).unwrap().definition.scaling(),
            915_527
        );
        assert_eq!(cell.analog_definitions.len(), 1);
        assert_eq!(cell.digital_definitions.len(), 1);
        assert_eq!(cell.nominal_frequency(), NominalFrequency::Hz60);

        // Structural equality holds across the round trip
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_configuration_rejects_corrupt_checksum() {
        let frame = sample_frame();
        let mut bytes = encode_configuration(&frame, Version::V2011, FrameKind::Config2).unwrap();
        let body_middle = bytes.len() / 2;
        bytes[body_middle] ^= 0x40;
        let result = parse_configuration(&bytes);
        assert!(matches!(result, Err(ParseError::InvalidChecksum { .. })));
    }

    #[test]
    fn test_definitions_auto_indexed_after_parse() {
        let frame = sample_frame();
        let bytes = encode_configuration(&frame, Version::V2011, FrameKind::Config1).unwrap();
        let parsed = parse_configuration(&bytes).unwrap();
        let cell = parsed.cells.get(0).unwrap();
        for (position, definition) in cell.phasor_definitions.iter().enumerate() {
            assert_eq!(definition.definition.index(), position);
        }
    }

    #[test]
    fn test_encode_rejects_non_config_kind() {
        let frame = sample_frame();
        let result = encode_configuration(&frame, Version::V2011, FrameKind::Data);
        assert!(matches!(result, Err(ParseError::InvalidFrameType { .. })));
    }

    #[test]
    fn test_wire_labels_within_cap_always_fit() {
        // A 16-byte wire field can never overflow the 16-character cap
        let mut cell = ConfigurationCell::new(1);
        let result: Result<(), ChannelError> = cell.set_station_name("SIXTEEN CHARS OK");
        assert!(result.is_ok());
    }
}
