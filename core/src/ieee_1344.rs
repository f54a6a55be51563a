//! IEEE 1344 codec: the single-PMU predecessor of C37.118.
//!
//! Frames carry no synchronization byte; the stream is expected to be
//! frame-aligned and every frame declares its own length. The 8-byte header
//! holds SOC, a sample count and a status word whose top two bits select the
//! frame kind (data, header, configuration, command) and whose low eleven
//! bits give the frame size in 16-bit words. Fixed-point rectangular
//! phasors only; CRC-CCITT trailer.

use crate::channel::cell::{ConfigurationCell, DataCell, StatusFlags};
use crate::channel::checksum::{open_frame, seal_frame, ChecksumKind};
use crate::channel::common::{ParseError, CHECKSUM_LENGTH};
use crate::channel::definition::{
    DigitalDefinition, NominalFrequency, PhasorDefinition, PhasorKind,
};
use crate::channel::frame::{
    CommandFrame, ConfigurationFrame, DataFrame, DeviceCommand, HeaderFrame, ParsedFrame,
};
use crate::channel::image::{read_i16, read_u16, read_u32, take};
use crate::channel::parser::ProtocolCodec;
use crate::channel::value::{
    ChannelValue, DigitalValue, FrequencyValue, NumericFormat, PhasorFormat, PhasorValue,
};
use crate::utils::{Ticks, TICKS_PER_SECOND};
use std::sync::Arc;

/// Header: SOC, sample count, status word.
pub const HEADER_LENGTH: usize = 8;

/// Width of the 1344 name fields.
pub const NAME_LENGTH: usize = 16;

const KIND_DATA: u16 = 0;
const KIND_HEADER: u16 = 1;
const KIND_CONFIG: u16 = 2;
const KIND_COMMAND: u16 = 3;

const SIZE_MASK: u16 = 0x07FF;

fn status_word(kind: u16, frame_bytes: usize) -> u16 {
    (kind << 14) | ((frame_bytes / 2) as u16 & SIZE_MASK)
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    let bytes = name.as_bytes();
    let used = bytes.len().min(NAME_LENGTH);
    out.extend_from_slice(&bytes[..used]);
    out.resize(out.len() + NAME_LENGTH - used, b' ');
}

fn read_name(field: &[u8]) -> String {
    String::from_utf8_lossy(field).trim().to_string()
}

fn sample_count_for(frame_rate: i16, ticks: Ticks) -> u16 {
    if frame_rate <= 0 {
        return 0;
    }
    let within_second = ticks.0.rem_euclid(TICKS_PER_SECOND);
    let ticks_per_frame = TICKS_PER_SECOND / frame_rate as i64;
    (within_second / ticks_per_frame.max(1)) as u16
}

fn header_bytes(kind: u16, body_length: usize, soc: u32, sample_count: u16) -> Vec<u8> {
    let frame_bytes = HEADER_LENGTH + body_length + CHECKSUM_LENGTH;
    let mut out = Vec::with_capacity(frame_bytes);
    out.extend_from_slice(&soc.to_be_bytes());
    out.extend_from_slice(&sample_count.to_be_bytes());
    out.extend_from_slice(&status_word(kind, frame_bytes).to_be_bytes());
    out
}

/// Serializes a single-cell configuration frame. 1344 transmits fixed-point
/// rectangular phasors only; other formats are rejected.
pub fn encode_configuration(frame: &ConfigurationFrame) -> Result<Vec<u8>, ParseError> {
    if frame.cells.len() != 1 {
        return Err(ParseError::InvalidFormat {
            message: format!(
                "IEEE 1344 frames describe exactly one device, not {}",
                frame.cells.len()
            ),
        });
    }
    let cell = frame.cells.get(0).ok_or_else(|| ParseError::InvalidFormat {
        message: "configuration frame has no cell".to_string(),
    })?;
    if cell.format.phasor != PhasorFormat::IntRect
        || cell.format.frequency != NumericFormat::Fixed
    {
        return Err(ParseError::InvalidFormat {
            message: "IEEE 1344 carries fixed-point rectangular data only".to_string(),
        });
    }

    let mut body = Vec::new();
    body.extend_from_slice(&frame.id_code().to_be_bytes());
    body.extend_from_slice(&frame.frame_rate().to_be_bytes());
    let fnom: [u8; 2] = match cell.nominal_frequency() {
        NominalFrequency::Hz50 => [0, 0],
        NominalFrequency::Hz60 => [1, 0],
    };
    body.extend_from_slice(&fnom);
    body.extend_from_slice(&(cell.phasor_definitions.len() as u16).to_be_bytes());
    body.extend_from_slice(&(cell.digital_definitions.len() as u16).to_be_bytes());
    write_name(&mut body, cell.station_name());
    for definition in &cell.phasor_definitions {
        write_name(&mut body, definition.definition.label());
        body.push(match definition.kind {
            PhasorKind::Voltage => 0,
            PhasorKind::Current => 1,
        });
        body.extend_from_slice(&definition.definition.scaling().to_be_bytes()[1..]);
    }
    for definition in &cell.digital_definitions {
        write_name(&mut body, definition.definition.label());
        body.extend_from_slice(&definition.normal_status.to_be_bytes());
        body.extend_from_slice(&definition.valid_inputs.to_be_bytes());
    }
    body.extend_from_slice(&cell.revision_count.to_be_bytes());

    let (soc, _) = frame.ticks.to_soc_fracsec(1);
    let mut out = header_bytes(KIND_CONFIG, body.len(), soc, 0);
    out.extend_from_slice(&body);
    Ok(seal_frame(ChecksumKind::CrcCcitt, out))
}

pub fn parse_configuration(bytes: &[u8]) -> Result<ConfigurationFrame, ParseError> {
    let payload = open_frame(ChecksumKind::CrcCcitt, bytes)?;
    let mut offset = 0;
    let soc = read_u32(payload, &mut offset, "SOC")?;
    let _sample_count = read_u16(payload, &mut offset, "sample count")?;
    let _status = read_u16(payload, &mut offset, "status word")?;

    let idcode = read_u16(payload, &mut offset, "id code")?;
    let data_rate = read_i16(payload, &mut offset, "data rate")?;
    let fnom = take(payload, &mut offset, 2, "nominal frequency")?;
    let nominal = match fnom[0] {
        0 => NominalFrequency::Hz50,
        1 => NominalFrequency::Hz60,
        other => {
            return Err(ParseError::InvalidFormat {
                message: format!("nominal frequency code {}", other),
            })
        }
    };
    let phasor_count = read_u16(payload, &mut offset, "phasor count")? as usize;
    let digital_count = read_u16(payload, &mut offset, "digital count")? as usize;
    let station = read_name(take(payload, &mut offset, NAME_LENGTH, "station name")?);

    let mut cell = ConfigurationCell::new(idcode);
    cell.set_station_name(&station)?;
    cell.set_nominal_frequency(nominal);

    for _ in 0..phasor_count {
        let name = read_name(take(payload, &mut offset, NAME_LENGTH, "phasor name")?);
        let unit = take(payload, &mut offset, 4, "phasor conversion factor")?;
        let kind = if unit[0] == 1 {
            PhasorKind::Current
        } else {
            PhasorKind::Voltage
        };
        let mut definition = PhasorDefinition::new(&name, kind, NAME_LENGTH)?;
        definition
            .definition
            .set_scaling(u32::from_be_bytes([0, unit[1], unit[2], unit[3]]))?;
        cell.phasor_definitions.push(definition)?;
    }
    for _ in 0..digital_count {
        let name = read_name(take(payload, &mut offset, NAME_LENGTH, "digital name")?);
        let unit = take(payload, &mut offset, 4, "digital mask words")?;
        let mut definition = DigitalDefinition::new(&name, NAME_LENGTH)?;
        definition.normal_status = u16::from_be_bytes([unit[0], unit[1]]);
        definition.valid_inputs = u16::from_be_bytes([unit[2], unit[3]]);
        cell.digital_definitions.push(definition)?;
    }
    cell.revision_count = read_u16(payload, &mut offset, "configuration count")?;

    let mut frame = ConfigurationFrame::new(idcode, data_rate);
    frame.time_base = 1;
    frame.ticks = Ticks::from_soc_fracsec(soc, 0, 1);
    frame.cells.push(cell)?;
    frame.record_parsed_length(bytes.len());
    Ok(frame)
}

/// Serializes a data frame: per-cell status word, fixed-point rectangular
/// phasors, the mHz/centi-Hz-per-second frequency pair and digital words.
pub fn encode_data(frame: &DataFrame) -> Result<Vec<u8>, ParseError> {
    let mut body = Vec::new();
    for cell in frame.cells.iter() {
        body.extend_from_slice(&cell.status.to_raw().to_be_bytes());
        for value in &cell.phasor_values {
            let (a, b) = value.raw().ok_or_else(|| ParseError::InvalidFormat {
                message: "cannot serialize an empty phasor value".to_string(),
            })?;
            body.extend_from_slice(&(a as i16).to_be_bytes());
            body.extend_from_slice(&(b as i16).to_be_bytes());
        }
        let (frequency, dfdt) =
            cell.frequency_value
                .raw()
                .ok_or_else(|| ParseError::InvalidFormat {
                    message: "cannot serialize an empty frequency value".to_string(),
                })?;
        body.extend_from_slice(&(frequency as i16).to_be_bytes());
        body.extend_from_slice(&(dfdt as i16).to_be_bytes());
        for value in &cell.digital_values {
            let word = value
                .composite(0)
                .ok_or_else(|| ParseError::InvalidFormat {
                    message: "cannot serialize an empty digital word".to_string(),
                })? as u16;
            body.extend_from_slice(&word.to_be_bytes());
        }
    }

    let configuration = &frame.configuration;
    let (soc, _) = frame.ticks.to_soc_fracsec(1);
    let sample_count = sample_count_for(configuration.frame_rate(), frame.ticks);
    let mut out = header_bytes(KIND_DATA, body.len(), soc, sample_count);
    out.extend_from_slice(&body);
    Ok(seal_frame(ChecksumKind::CrcCcitt, out))
}

pub fn parse_data(
    bytes: &[u8],
    configuration: &Arc<ConfigurationFrame>,
) -> Result<DataFrame, ParseError> {
    let payload = open_frame(ChecksumKind::CrcCcitt, bytes)?;
    let mut offset = 0;
    let soc = read_u32(payload, &mut offset, "SOC")?;
    let sample_count = read_u16(payload, &mut offset, "sample count")?;
    let _status = read_u16(payload, &mut offset, "status word")?;

    let mut frame = DataFrame::new(configuration.clone());
    let ticks_per_frame = configuration.ticks_per_frame();
    frame.ticks = Ticks(
        soc as i64 * TICKS_PER_SECOND + (sample_count as f64 * ticks_per_frame) as i64,
    );

    for configuration_cell in configuration.cells.iter() {
        let mut cell = DataCell::new(configuration_cell)?;
        cell.status = StatusFlags::from_raw(read_u16(payload, &mut offset, "status flags")?);
        for index in 0..configuration_cell.phasor_definitions.len() {
            let real = read_i16(payload, &mut offset, "phasor real")? as f64;
            let imaginary = read_i16(payload, &mut offset, "phasor imaginary")? as f64;
            if let Some(slot) = cell.phasor_values.get_mut(index) {
                *slot = PhasorValue::from_raw(PhasorFormat::IntRect, real, imaginary);
            }
        }
        let frequency = read_i16(payload, &mut offset, "frequency")? as f64;
        let dfdt = read_i16(payload, &mut offset, "df/dt")? as f64;
        cell.frequency_value = FrequencyValue::from_raw(NumericFormat::Fixed, frequency, dfdt);
        for index in 0..configuration_cell.digital_definitions.len() {
            let word = read_u16(payload, &mut offset, "digital word")?;
            if let Some(slot) = cell.digital_values.get_mut(index) {
                *slot = DigitalValue::from_word(word);
            }
        }
        frame.cells.push(cell)?;
    }
    frame.record_parsed_length(bytes.len());
    Ok(frame)
}

pub fn encode_header_frame(frame: &HeaderFrame) -> Vec<u8> {
    let text = frame.header_data();
    let (soc, _) = frame.ticks.to_soc_fracsec(1);
    let mut out = header_bytes(KIND_HEADER, text.len(), soc, 0);
    out.extend_from_slice(text.as_bytes());
    seal_frame(ChecksumKind::CrcCcitt, out)
}

pub fn encode_command(frame: &CommandFrame) -> Vec<u8> {
    let (soc, _) = frame.ticks.to_soc_fracsec(1);
    let mut out = header_bytes(KIND_COMMAND, 2, soc, 0);
    out.extend_from_slice(&frame.command.code().to_be_bytes());
    seal_frame(ChecksumKind::CrcCcitt, out)
}

/// The IEEE 1344 protocol codec. With no sync byte, frame alignment relies
/// entirely on the declared word counts.
pub struct Ieee1344Codec {
    configuration: Option<Arc<ConfigurationFrame>>,
    /// Device id to stamp on parsed header and command frames, which carry
    /// none of their own on this wire.
    pub id_code: u16,
}

impl Ieee1344Codec {
    pub fn new() -> Self {
        Ieee1344Codec {
            configuration: None,
            id_code: 0,
        }
    }
}

impl Default for Ieee1344Codec {
    fn default() -> Self {
        Ieee1344Codec::new()
    }
}

impl ProtocolCodec for Ieee1344Codec {
    fn name(&self) -> &'static str {
        "IEEE 1344"
    }

    fn sync_byte(&self) -> Option<u8> {
        None
    }

    fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        self.configuration.clone()
    }

    fn set_configuration(&mut self, configuration: Arc<ConfigurationFrame>) {
        self.configuration = Some(configuration);
    }

    fn parse_frame(&mut self, buffer: &[u8]) -> Result<Option<(ParsedFrame, usize)>, ParseError> {
        if buffer.len() < HEADER_LENGTH {
            return Ok(None);
        }
        let status = u16::from_be_bytes([buffer[6], buffer[7]]);
        let framesize = ((status & SIZE_MASK) as usize) * 2;
        if framesize < HEADER_LENGTH + CHECKSUM_LENGTH {
            return Err(ParseError::InvalidLength {
                message: format!("declared frame size {} below minimum", framesize),
            });
        }
        if buffer.len() < framesize {
            return Ok(None);
        }
        let frame_bytes = &buffer[..framesize];

        let frame = match status >> 14 {
            KIND_CONFIG => {
                let configuration = Arc::new(parse_configuration(frame_bytes)?);
                self.configuration = Some(configuration.clone());
                ParsedFrame::Configuration(configuration)
            }
            KIND_DATA => match &self.configuration {
                Some(configuration) => ParsedFrame::Data(parse_data(frame_bytes, configuration)?),
                None => {
                    crate::channel::checksum::validate_frame(ChecksumKind::CrcCcitt, frame_bytes)?;
                    ParsedFrame::Undetermined(frame_bytes.to_vec())
                }
            },
            KIND_HEADER => {
                let payload = open_frame(ChecksumKind::CrcCcitt, frame_bytes)?;
                let mut frame = HeaderFrame::new(self.id_code);
                frame.ticks = Ticks::from_soc_fracsec(
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    0,
                    1,
                );
                let text = String::from_utf8_lossy(&payload[HEADER_LENGTH..]).to_string();
                frame.set_header_data(&text)?;
                ParsedFrame::Header(frame)
            }
            _ => {
                let payload = open_frame(ChecksumKind::CrcCcitt, frame_bytes)?;
                let mut offset = HEADER_LENGTH;
                let code = read_u16(payload, &mut offset, "command code")?;
                let command =
                    DeviceCommand::from_code(code).ok_or_else(|| ParseError::InvalidFormat {
                        message: format!("unknown device command code {}", code),
                    })?;
                let mut frame = CommandFrame::new(self.id_code, command);
                frame.ticks = Ticks::from_soc_fracsec(
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]),
                    0,
                    1,
                );
                ParsedFrame::Command(frame)
            }
        };
        Ok(Some((frame, framesize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_configuration() -> ConfigurationFrame {
        let mut frame = ConfigurationFrame::new(61, 30);
        frame.ticks = Ticks::from_soc_fracsec(1_149_580_800, 0, 1);
        frame.time_base = 1;
        let mut cell = ConfigurationCell::new(61);
        cell.set_station_name("SHAWVILLE").unwrap();
        cell.set_nominal_frequency(NominalFrequency::Hz60);
        for label in ["VA", "VB", "VC"] {
            let mut definition =
                PhasorDefinition::new(label, PhasorKind::Voltage, NAME_LENGTH).unwrap();
            definition.definition.set_scaling(915_527).unwrap();
            cell.phasor_definitions.push(definition).unwrap();
        }
        cell.digital_definitions
            .push(DigitalDefinition::new("RELAY", NAME_LENGTH).unwrap())
            .unwrap();
        frame.cells.push(cell).unwrap();
        frame
    }

    #[test]
    fn test_configuration_roundtrip() {
        let frame = sample_configuration();
        let bytes = encode_configuration(&frame).unwrap();

        // Declared word count covers the whole image
        let status = u16::from_be_bytes([bytes[6], bytes[7]]);
        assert_eq!(((status & SIZE_MASK) as usize) * 2, bytes.len());
        assert_eq!(status >> 14, KIND_CONFIG);

        let parsed = parse_configuration(&bytes).unwrap();
        assert_eq!(parsed.id_code(), 61);
        assert_eq!(parsed.frame_rate(), 30);
        let cell = parsed.cells.get(0).unwrap();
        assert_eq!(cell.station_name(), "SHAWVILLE");
        assert_eq!(cell.phasor_definitions.len(), 3);
        assert_eq!(cell.digital_definitions.len(), 1);
        assert_eq!(
            cell.phasor_definitions.get(0).unwrap().definition.scaling(),
            915_527
        );
    }

    #[test]
    fn test_data_roundtrip_through_codec() {
        let configuration = sample_configuration();
        let config_bytes = encode_configuration(&configuration).unwrap();

        let configuration = Arc::new(configuration);
        let mut data = DataFrame::new(configuration.clone());
        data.ticks = Ticks::from_soc_fracsec(1_149_580_800, 0, 1);
        let mut cell = DataCell::new(configuration.cells.get(0).unwrap()).unwrap();
        cell.status = StatusFlags::from_raw(0);
        for (index, (real, imaginary)) in
            [(14_635.0, 0.0), (-7_318.0, -12_676.0), (-7_318.0, 12_675.0)]
                .iter()
                .enumerate()
        {
            *cell.phasor_values.get_mut(index).unwrap() =
                PhasorValue::from_raw(PhasorFormat::IntRect, *real, *imaginary);
        }
        cell.frequency_value = FrequencyValue::from_raw(NumericFormat::Fixed, -12.0, 5.0);
        *cell.digital_values.get_mut(0).unwrap() = DigitalValue::from_word(0x0001);
        data.cells.push(cell).unwrap();
        let data_bytes = encode_data(&data).unwrap();

        let mut codec = Ieee1344Codec::new();
        let (frame, consumed) = codec.parse_frame(&config_bytes).unwrap().unwrap();
        assert_eq!(consumed, config_bytes.len());
        assert!(matches!(frame, ParsedFrame::Configuration(_)));

        let (frame, consumed) = codec.parse_frame(&data_bytes).unwrap().unwrap();
        assert_eq!(consumed, data_bytes.len());
        match frame {
            ParsedFrame::Data(parsed) => {
                let parsed_cell = parsed.cells.get(0).unwrap();
                assert_eq!(
                    parsed_cell.phasor_values.get(0).unwrap().raw(),
                    Some((14_635.0, 0.0))
                );
                assert_eq!(
                    parsed_cell.frequency_value.raw(),
                    Some((-12.0, 5.0))
                );
                assert!(!parsed_cell.is_empty());
            }
            other => panic!("expected a data frame, got {}", other.kind()),
        }
    }

    #[test]
    fn test_partial_header_waits() {
        let mut codec = Ieee1344Codec::new();
        assert!(codec.parse_frame(&[0x00; 5]).unwrap().is_none());
    }

    #[test]
    fn test_rejects_non_1344_formats() {
        let mut frame = sample_configuration();
        frame.cells.get_mut(0).unwrap().format.phasor = PhasorFormat::FloatPolar;
        assert!(matches!(
            encode_configuration(&frame),
            Err(ParseError::InvalidFormat { .. })
        ));
    }
}
