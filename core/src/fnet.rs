//! FNET codec: ASCII measurement frames delimited by 0x01/0x00 markers.
//!
//! The wire carries no configuration frame and no checksum; a configuration
//! is synthesized from the first data frame's field count and delivered to
//! consumers before the data itself. Fields are space-separated: device id,
//! SOC, sample index, absolute frequency in Hz, then one magnitude/angle
//! pair per phasor (angles in radians).

use crate::channel::cell::{ConfigurationCell, DataCell, DataFormat, StatusFlags};
use crate::channel::checksum::ChecksumKind;
use crate::channel::common::ParseError;
use crate::channel::definition::{NominalFrequency, PhasorDefinition, PhasorKind};
use crate::channel::frame::{ConfigurationFrame, DataFrame, ParsedFrame};
use crate::channel::parser::ProtocolCodec;
use crate::channel::value::{FrequencyValue, NumericFormat, PhasorFormat, PhasorValue};
use crate::utils::{Ticks, TICKS_PER_SECOND};
use std::sync::Arc;

/// Start-of-frame marker.
pub const FRAME_START: u8 = 0x01;
/// End-of-frame marker.
pub const FRAME_END: u8 = 0x00;

/// Reporting rate assumed for FNET devices, frames per second.
pub const DEFAULT_FRAME_RATE: i16 = 10;

fn parse_field<T: std::str::FromStr>(field: Option<&str>, what: &str) -> Result<T, ParseError> {
    field
        .ok_or_else(|| ParseError::InvalidFormat {
            message: format!("missing {} field", what),
        })?
        .parse()
        .map_err(|_| ParseError::InvalidFormat {
            message: format!("malformed {} field", what),
        })
}

/// Builds the configuration a data frame with `phasor_count` phasors
/// implies: one cell, floating polar phasors, floating frequency.
pub fn synthesize_configuration(
    id_code: u16,
    phasor_count: usize,
) -> Result<ConfigurationFrame, ParseError> {
    let mut frame = ConfigurationFrame::new(id_code, DEFAULT_FRAME_RATE);
    frame.time_base = 1;

    let mut cell = ConfigurationCell::new(id_code);
    cell.set_station_name(&format!("FNET {}", id_code))?;
    cell.set_nominal_frequency(NominalFrequency::Hz60);
    cell.format = DataFormat {
        phasor: PhasorFormat::FloatPolar,
        frequency: NumericFormat::Float,
        analog: NumericFormat::Float,
    };
    for index in 0..phasor_count {
        cell.phasor_definitions.push(PhasorDefinition::new(
            &format!("PHASOR {}", index + 1),
            PhasorKind::Voltage,
            16,
        )?)?;
    }
    frame.cells.push(cell)?;
    Ok(frame)
}

/// Serializes a data frame as one delimited ASCII line.
pub fn encode_data(frame: &DataFrame) -> Result<Vec<u8>, ParseError> {
    let configuration = &frame.configuration;
    let cell = frame.cells.get(0).ok_or_else(|| ParseError::InvalidFormat {
        message: "FNET frames carry exactly one cell".to_string(),
    })?;
    let nominal = configuration
        .cells
        .get(0)
        .map(|cell| cell.nominal_frequency())
        .unwrap_or_default();

    let (soc, _) = frame.ticks.to_soc_fracsec(1);
    let ticks_per_frame = configuration.ticks_per_frame();
    let within_second = frame.ticks.0.rem_euclid(TICKS_PER_SECOND);
    let sample_index = (within_second as f64 / ticks_per_frame) as u32;

    let frequency = cell
        .frequency_value
        .frequency_hz(nominal)
        .ok_or_else(|| ParseError::InvalidFormat {
            message: "cannot serialize an empty frequency value".to_string(),
        })?;

    let mut line = format!(
        "{} {} {} {}",
        frame.id_code(),
        soc,
        sample_index,
        frequency
    );
    for value in &cell.phasor_values {
        let (magnitude, angle) = value.raw().ok_or_else(|| ParseError::InvalidFormat {
            message: "cannot serialize an empty phasor value".to_string(),
        })?;
        line.push_str(&format!(" {} {}", magnitude, angle));
    }

    let mut out = Vec::with_capacity(line.len() + 2);
    out.push(FRAME_START);
    out.extend_from_slice(line.as_bytes());
    out.push(FRAME_END);
    Ok(out)
}

fn parse_data(
    text: &str,
    configuration: &Arc<ConfigurationFrame>,
) -> Result<DataFrame, ParseError> {
    let mut fields = text.split_whitespace();
    let _id_code: u16 = parse_field(fields.next(), "device id")?;
    let soc: u32 = parse_field(fields.next(), "SOC")?;
    let sample_index: u32 = parse_field(fields.next(), "sample index")?;
    let frequency_hz: f64 = parse_field(fields.next(), "frequency")?;

    let configuration_cell =
        configuration
            .cells
            .get(0)
            .ok_or_else(|| ParseError::InvalidFormat {
                message: "configuration frame has no cell".to_string(),
            })?;
    let nominal = configuration_cell.nominal_frequency();

    let mut frame = DataFrame::new(configuration.clone());
    let ticks_per_frame = configuration.ticks_per_frame();
    frame.ticks = Ticks(
        soc as i64 * TICKS_PER_SECOND + (sample_index as f64 * ticks_per_frame) as i64,
    );

    let mut cell = DataCell::new(configuration_cell)?;
    cell.status = StatusFlags::from_raw(0);
    cell.frequency_value = FrequencyValue::from_raw(
        NumericFormat::Float,
        frequency_hz - nominal.hertz(),
        0.0,
    );
    for index in 0..configuration_cell.phasor_definitions.len() {
        let magnitude: f64 = parse_field(fields.next(), "phasor magnitude")?;
        let angle: f64 = parse_field(fields.next(), "phasor angle")?;
        if let Some(slot) = cell.phasor_values.get_mut(index) {
            *slot = PhasorValue::from_raw(PhasorFormat::FloatPolar, magnitude, angle);
        }
    }
    frame.cells.push(cell)?;
    frame.record_parsed_length(text.len() + 2);
    Ok(frame)
}

/// The FNET protocol codec. The first data frame also yields a synthesized
/// configuration frame, delivered before the data it was derived from.
pub struct FnetCodec {
    configuration: Option<Arc<ConfigurationFrame>>,
}

impl FnetCodec {
    pub fn new() -> Self {
        FnetCodec {
            configuration: None,
        }
    }
}

impl Default for FnetCodec {
    fn default() -> Self {
        FnetCodec::new()
    }
}

impl ProtocolCodec for FnetCodec {
    fn name(&self) -> &'static str {
        "FNET"
    }

    fn sync_byte(&self) -> Option<u8> {
        Some(FRAME_START)
    }

    fn checksum_kind(&self) -> ChecksumKind {
        ChecksumKind::None
    }

    fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        self.configuration.clone()
    }

    fn set_configuration(&mut self, configuration: Arc<ConfigurationFrame>) {
        self.configuration = Some(configuration);
    }

    fn parse_frame(&mut self, buffer: &[u8]) -> Result<Option<(ParsedFrame, usize)>, ParseError> {
        if buffer.is_empty() {
            return Ok(None);
        }
        if buffer[0] != FRAME_START {
            return Err(ParseError::InvalidFrameType {
                message: format!("expected frame start 0x01, got 0x{:02X}", buffer[0]),
            });
        }
        let terminator = match buffer.iter().position(|&byte| byte == FRAME_END) {
            Some(position) => position,
            None => return Ok(None),
        };
        let text = String::from_utf8_lossy(&buffer[1..terminator]).to_string();

        if self.configuration.is_none() {
            // Synthesize and deliver the configuration first; the data
            // frame itself is parsed on the next call, consuming nothing
            // this time.
            let mut fields = text.split_whitespace();
            let id_code: u16 = parse_field(fields.next(), "device id")?;
            let value_fields = fields.count();
            if value_fields < 3 {
                return Err(ParseError::InvalidFormat {
                    message: format!("frame has only {} fields", value_fields + 1),
                });
            }
            let phasor_count = (value_fields - 3) / 2;
            let configuration = Arc::new(synthesize_configuration(id_code, phasor_count)?);
            self.configuration = Some(configuration.clone());
            return Ok(Some((ParsedFrame::Configuration(configuration), 0)));
        }

        let configuration = match &self.configuration {
            Some(configuration) => configuration.clone(),
            None => {
                return Err(ParseError::InvalidFormat {
                    message: "no configuration".to_string(),
                })
            }
        };
        let frame = parse_data(&text, &configuration)?;
        Ok(Some((ParsedFrame::Data(frame), terminator + 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_stream_frame() -> Vec<u8> {
        let configuration = Arc::new(synthesize_configuration(995, 3).unwrap());
        let mut frame = DataFrame::new(configuration.clone());
        frame.ticks = Ticks(1_149_580_800 * TICKS_PER_SECOND + 3 * TICKS_PER_SECOND / 10);
        let mut cell = DataCell::new(configuration.cells.get(0).unwrap()).unwrap();
        cell.status = StatusFlags::from_raw(0);
        for (index, (magnitude, angle)) in [(134000.0, 0.0), (134000.0, 2.0944), (134000.0, -2.0944)]
            .iter()
            .enumerate()
        {
            *cell.phasor_values.get_mut(index).unwrap() =
                PhasorValue::from_raw(PhasorFormat::FloatPolar, *magnitude, *angle);
        }
        cell.frequency_value = FrequencyValue::from_raw(NumericFormat::Float, -0.018, 0.0);
        frame.cells.push(cell).unwrap();
        encode_data(&frame).unwrap()
    }

    #[test]
    fn test_frame_is_delimited_ascii() {
        let bytes = sample_stream_frame();
        assert_eq!(bytes[0], FRAME_START);
        assert_eq!(*bytes.last().unwrap(), FRAME_END);
        let text = std::str::from_utf8(&bytes[1..bytes.len() - 1]).unwrap();
        assert!(text.starts_with("995 1149580800 3 59.98"));
    }

    #[test]
    fn test_codec_synthesizes_configuration_then_data() {
        let bytes = sample_stream_frame();
        let mut codec = FnetCodec::new();

        // First call: synthesized configuration, nothing consumed
        let (frame, consumed) = codec.parse_frame(&bytes).unwrap().unwrap();
        assert_eq!(consumed, 0);
        match frame {
            ParsedFrame::Configuration(configuration) => {
                assert_eq!(configuration.id_code(), 995);
                assert_eq!(configuration.frame_rate(), DEFAULT_FRAME_RATE);
                let cell = configuration.cells.get(0).unwrap();
                assert_eq!(cell.phasor_definitions.len(), 3);
                assert_eq!(cell.format.phasor, PhasorFormat::FloatPolar);
            }
            other => panic!("expected a configuration frame, got {}", other.kind()),
        }

        // Second call: the data frame itself
        let (frame, consumed) = codec.parse_frame(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        match frame {
            ParsedFrame::Data(data) => {
                let cell = data.cells.get(0).unwrap();
                assert_eq!(
                    cell.phasor_values.get(0).unwrap().raw(),
                    Some((134_000.0, 0.0))
                );
                let hz = cell
                    .frequency_value
                    .frequency_hz(NominalFrequency::Hz60)
                    .unwrap();
                assert!((hz - 59.982).abs() < 1e-9);
                assert_eq!(data.ticks.seconds(), 1_149_580_800);
            }
            other => panic!("expected a data frame, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unterminated_frame_waits_for_more() {
        let bytes = sample_stream_frame();
        let mut codec = FnetCodec::new();
        assert!(codec
            .parse_frame(&bytes[..bytes.len() - 1])
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_malformed_field_is_format_error() {
        let mut codec = FnetCodec::new();
        codec.set_configuration(Arc::new(synthesize_configuration(995, 1).unwrap()));
        let mut bytes = vec![FRAME_START];
        bytes.extend_from_slice(b"995 not-a-number 0 60.0 1.0 0.0");
        bytes.push(FRAME_END);
        let result = codec.parse_frame(&bytes);
        assert!(matches!(result, Err(ParseError::InvalidFormat { .. })));
    }
}
