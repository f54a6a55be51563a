//! BPA PDCstream codec: descriptor and data packets with word-count
//! framing, 8-byte name fields and a revision-selected checksum (legacy
//! revision 0 streams fold a 16-bit XOR; later revisions use CRC-16).

use crate::channel::cell::{ConfigurationCell, DataCell, StatusFlags};
use crate::channel::checksum::{open_frame, seal_frame, validate_frame, ChecksumKind};
use crate::channel::common::{ParseError, CHECKSUM_LENGTH, SYNC_BYTE};
use crate::channel::definition::{DigitalDefinition, NominalFrequency, PhasorDefinition, PhasorKind};
use crate::channel::frame::{ConfigurationFrame, DataFrame, ParsedFrame};
use crate::channel::image::{read_i16, read_u16, read_u32, take};
use crate::channel::parser::ProtocolCodec;
use crate::channel::value::{
    ChannelValue, DigitalValue, FrequencyValue, NumericFormat, PhasorFormat, PhasorValue,
};
use crate::utils::Ticks;
use std::sync::Arc;

/// Packet header: sync byte, flag byte, word count, stream id, SOC,
/// millisecond fraction.
pub const HEADER_LENGTH: usize = 12;

/// Width of the PDCstream name fields.
pub const NAME_LENGTH: usize = 8;

/// Fractional-second resolution of the wire timestamps.
pub const TIME_BASE: u32 = 1000;

const FLAG_DESCRIPTOR: u8 = 0x01;

/// Legacy revision 0 streams checksum with a word XOR; everything later
/// uses CRC-16.
pub fn checksum_for(revision: u8) -> ChecksumKind {
    if revision == 0 {
        ChecksumKind::Xor16
    } else {
        ChecksumKind::Crc16
    }
}

fn flag_byte(revision: u8, descriptor: bool) -> u8 {
    let mut flag = (revision & 0x0F) << 4;
    if descriptor {
        flag |= FLAG_DESCRIPTOR;
    }
    flag
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

fn header_bytes(
    revision: u8,
    descriptor: bool,
    body_length: usize,
    stream_id: u16,
    ticks: Ticks,
) -> Vec<u8> {
    let frame_bytes = HEADER_LENGTH + body_length + CHECKSUM_LENGTH;
    let (soc, fracms) = ticks.to_soc_fracsec(TIME_BASE);
    let mut out = Vec::with_capacity(frame_bytes);
    out.push(SYNC_BYTE);
    out.push(flag_byte(revision, descriptor));
    out.extend_from_slice(&((frame_bytes / 2) as u16).to_be_bytes());
    out.extend_from_slice(&stream_id.to_be_bytes());
    out.extend_from_slice(&soc.to_be_bytes());
    out.extend_from_slice(&(fracms as u16).to_be_bytes());
    out
}

/// Serializes the stream descriptor: data rate, cell count, then each
/// cell's station, id, channel counts, phasor names and conversion factors,
/// nominal frequency and digital names.
pub fn encode_descriptor(frame: &ConfigurationFrame, revision: u8) -> Result<Vec<u8>, ParseError> {
    let mut body = Vec::new();
    body.extend_from_slice(&frame.frame_rate().to_be_bytes());
    body.extend_from_slice(&(frame.cells.len() as u16).to_be_bytes());
    for cell in frame.cells.iter() {
        if cell.format.phasor != PhasorFormat::IntRect
            || cell.format.frequency != NumericFormat::Fixed
        {
            return Err(ParseError::InvalidFormat {
                message: "PDCstream carries fixed-point rectangular data only".to_string(),
            });
        }
        write_name(&mut body, cell.station_name());
        body.extend_from_slice(&cell.id_code().to_be_bytes());
        body.extend_from_slice(&(cell.phasor_definitions.len() as u16).to_be_bytes());
        body.extend_from_slice(&(cell.digital_definitions.len() as u16).to_be_bytes());
        for definition in &cell.phasor_definitions {
            write_name(&mut body, definition.definition.label());
            body.push(match definition.kind {
                PhasorKind::Voltage => 0,
                PhasorKind::Current => 1,
            });
            body.extend_from_slice(&definition.definition.scaling().to_be_bytes()[1..]);
        }
        let fnom: [u8; 2] = match cell.nominal_frequency() {
            NominalFrequency::Hz50 => [0, 0],
            NominalFrequency::Hz60 => [1, 0],
        };
        body.extend_from_slice(&fnom);
        for definition in &cell.digital_definitions {
            write_name(&mut body, definition.definition.label());
        }
    }

    let mut out = header_bytes(revision, true, body.len(), frame.id_code(), frame.ticks);
    out.extend_from_slice(&body);
    Ok(seal_frame(checksum_for(revision), out))
}

pub fn parse_descriptor(bytes: &[u8], revision: u8) -> Result<ConfigurationFrame, ParseError> {
    let payload = open_frame(checksum_for(revision), bytes)?;
    let mut offset = 2;
    let _word_count = read_u16(payload, &mut offset, "word count")?;
    let stream_id = read_u16(payload, &mut offset, "stream id")?;
    let soc = read_u32(payload, &mut offset, "SOC")?;
    let fracms = read_u16(payload, &mut offset, "millisecond fraction")?;

    let data_rate = read_i16(payload, &mut offset, "data rate")?;
    let cell_count = read_u16(payload, &mut offset, "cell count")? as usize;

    let mut frame = ConfigurationFrame::new(stream_id, data_rate);
    frame.time_base = TIME_BASE;
    frame.ticks = Ticks::from_soc_fracsec(soc, fracms as u32, TIME_BASE);

    for _ in 0..cell_count {
        let station = read_name(take(payload, &mut offset, NAME_LENGTH, "station name")?);
        let idcode = read_u16(payload, &mut offset, "cell id code")?;
        let phasor_count = read_u16(payload, &mut offset, "phasor count")? as usize;
        let digital_count = read_u16(payload, &mut offset, "digital count")? as usize;

        let mut cell = ConfigurationCell::with_label_length(idcode, NAME_LENGTH);
        cell.set_station_name(&station)?;
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
        let fnom = take(payload, &mut offset, 2, "nominal frequency")?;
        cell.set_nominal_frequency(match fnom[0] {
            0 => NominalFrequency::Hz50,
            1 => NominalFrequency::Hz60,
            other => {
                return Err(ParseError::InvalidFormat {
                    message: format!("nominal frequency code {}", other),
                })
            }
        });
        for _ in 0..digital_count {
            let name = read_name(take(payload, &mut offset, NAME_LENGTH, "digital name")?);
            cell.digital_definitions
                .push(DigitalDefinition::new(&name, NAME_LENGTH)?)?;
        }
        frame.cells.push(cell)?;
    }
    frame.record_parsed_length(bytes.len());
    Ok(frame)
}

pub fn encode_data(frame: &DataFrame, revision: u8) -> Result<Vec<u8>, ParseError> {
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

    let mut out = header_bytes(
        revision,
        false,
        body.len(),
        frame.id_code(),
        frame.ticks,
    );
    out.extend_from_slice(&body);
    Ok(seal_frame(checksum_for(revision), out))
}

pub fn parse_data(
    bytes: &[u8],
    revision: u8,
    configuration: &Arc<ConfigurationFrame>,
) -> Result<DataFrame, ParseError> {
    let payload = open_frame(checksum_for(revision), bytes)?;
    let mut offset = 6;
    let soc = read_u32(payload, &mut offset, "SOC")?;
    let fracms = read_u16(payload, &mut offset, "millisecond fraction")?;

    let mut frame = DataFrame::new(configuration.clone());
    frame.ticks = Ticks::from_soc_fracsec(soc, fracms as u32, TIME_BASE);

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

/// The BPA PDCstream protocol codec. Each packet's flag byte carries the
/// stream revision, which selects the checksum algorithm.
pub struct BpaPdcStreamCodec {
    configuration: Option<Arc<ConfigurationFrame>>,
}

impl BpaPdcStreamCodec {
    pub fn new() -> Self {
        BpaPdcStreamCodec {
            configuration: None,
        }
    }
}

impl Default for BpaPdcStreamCodec {
    fn default() -> Self {
        BpaPdcStreamCodec::new()
    }
}

impl ProtocolCodec for BpaPdcStreamCodec {
    fn name(&self) -> &'static str {
        "BPA PDCstream"
    }

    fn checksum_kind(&self) -> ChecksumKind {
        ChecksumKind::Crc16
    }

    fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        self.configuration.clone()
    }

    fn set_configuration(&mut self, configuration: Arc<ConfigurationFrame>) {
        self.configuration = Some(configuration);
    }

    fn parse_frame(&mut self, buffer: &[u8]) -> Result<Option<(ParsedFrame, usize)>, ParseError> {
        if buffer.len() < 4 {
            return Ok(None);
        }
        if buffer[0] != SYNC_BYTE {
            return Err(ParseError::InvalidFrameType {
                message: format!("expected sync 0x{:02X}, got 0x{:02X}", SYNC_BYTE, buffer[0]),
            });
        }
        let flag = buffer[1];
        let revision = flag >> 4;
        let descriptor = flag & FLAG_DESCRIPTOR != 0;
        let framesize = (u16::from_be_bytes([buffer[2], buffer[3]]) as usize) * 2;
        if framesize < HEADER_LENGTH + CHECKSUM_LENGTH {
            return Err(ParseError::InvalidLength {
                message: format!("declared frame size {} below minimum", framesize),
            });
        }
        if buffer.len() < framesize {
            return Ok(None);
        }
        let frame_bytes = &buffer[..framesize];

        let frame = if descriptor {
            let configuration = Arc::new(parse_descriptor(frame_bytes, revision)?);
            self.configuration = Some(configuration.clone());
            ParsedFrame::Configuration(configuration)
        } else {
            match &self.configuration {
                Some(configuration) => {
                    ParsedFrame::Data(parse_data(frame_bytes, revision, configuration)?)
                }
                None => {
                    validate_frame(checksum_for(revision), frame_bytes)?;
                    ParsedFrame::Undetermined(frame_bytes.to_vec())
                }
            }
        };
        Ok(Some((frame, framesize)))
    }
}
