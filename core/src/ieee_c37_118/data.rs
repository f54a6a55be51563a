//! Data frame layout: per-PMU STAT word, phasor block, frequency pair,
//! analog block and digital words, in the widths the configuration frame's
//! FORMAT word selected.

use super::common::{FrameKind, Prefix, Version, PREFIX_LENGTH};
use crate::channel::cell::{DataCell, StatusFlags};
use crate::channel::checksum::{open_frame, seal_frame, ChecksumKind};
use crate::channel::common::ParseError;
use crate::channel::frame::{ConfigurationFrame, DataFrame};
use crate::channel::image::{read_f32, read_i16, read_u16, BinaryImage, ParseBinaryImage};
use crate::channel::state::{CellParseState, FrameParseState};
use crate::channel::value::{
    ChannelValue,
    AnalogValue, DigitalValue, FrequencyValue, NumericFormat, PhasorFormat, PhasorValue,
};
use std::sync::Arc;

fn require_slot(slot: Option<f64>, what: &str) -> Result<f64, ParseError> {
    slot.ok_or_else(|| ParseError::InvalidFormat {
        message: format!("cannot serialize {}: composite slot never assigned", what),
    })
}

fn write_phasor(out: &mut Vec<u8>, value: &PhasorValue) -> Result<(), ParseError> {
    let (a, b) = (
        require_slot(value.composite(0), "phasor value")?,
        require_slot(value.composite(1), "phasor value")?,
    );
    match value.format() {
        PhasorFormat::IntRect => {
            out.extend_from_slice(&(a as i16).to_be_bytes());
            out.extend_from_slice(&(b as i16).to_be_bytes());
        }
        PhasorFormat::IntPolar => {
            out.extend_from_slice(&(a as u16).to_be_bytes());
            out.extend_from_slice(&(b as i16).to_be_bytes());
        }
        PhasorFormat::FloatRect | PhasorFormat::FloatPolar => {
            out.extend_from_slice(&(a as f32).to_be_bytes());
            out.extend_from_slice(&(b as f32).to_be_bytes());
        }
    }
    Ok(())
}

fn read_phasor(
    payload: &[u8],
    offset: &mut usize,
    format: PhasorFormat,
) -> Result<PhasorValue, ParseError> {
    let (a, b) = match format {
        PhasorFormat::IntRect => (
            read_i16(payload, offset, "phasor real")? as f64,
            read_i16(payload, offset, "phasor imaginary")? as f64,
        ),
        PhasorFormat::IntPolar => (
            read_u16(payload, offset, "phasor magnitude")? as f64,
            read_i16(payload, offset, "phasor angle")? as f64,
        ),
        PhasorFormat::FloatRect | PhasorFormat::FloatPolar => (
            read_f32(payload, offset, "phasor first component")? as f64,
            read_f32(payload, offset, "phasor second component")? as f64,
        ),
    };
    Ok(PhasorValue::from_raw(format, a, b))
}

fn write_scalar(out: &mut Vec<u8>, format: NumericFormat, raw: f64) {
    match format {
        NumericFormat::Fixed => out.extend_from_slice(&(raw as i16).to_be_bytes()),
        NumericFormat::Float => out.extend_from_slice(&(raw as f32).to_be_bytes()),
    }
}

fn read_scalar(
    payload: &[u8],
    offset: &mut usize,
    format: NumericFormat,
    what: &str,
) -> Result<f64, ParseError> {
    match format {
        NumericFormat::Fixed => Ok(read_i16(payload, offset, what)? as f64),
        NumericFormat::Float => Ok(read_f32(payload, offset, what)? as f64),
    }
}

fn write_cell(out: &mut Vec<u8>, cell: &DataCell) -> Result<(), ParseError> {
    out.extend_from_slice(&cell.status.to_raw().to_be_bytes());
    for value in &cell.phasor_values {
        write_phasor(out, value)?;
    }
    let frequency = &cell.frequency_value;
    write_scalar(
        out,
        frequency.format(),
        require_slot(frequency.composite(0), "frequency value")?,
    );
    write_scalar(
        out,
        frequency.format(),
        require_slot(frequency.composite(1), "df/dt value")?,
    );
    for value in &cell.analog_values {
        write_scalar(
            out,
            value.format(),
            require_slot(value.composite(0), "analog value")?,
        );
    }
    for value in &cell.digital_values {
        let word = require_slot(value.composite(0), "digital word")? as u16;
        out.extend_from_slice(&word.to_be_bytes());
    }
    Ok(())
}

fn parse_cell(
    payload: &[u8],
    offset: &mut usize,
    state: &CellParseState,
) -> Result<(StatusFlags, Vec<PhasorValue>, FrequencyValue, Vec<AnalogValue>, Vec<DigitalValue>), ParseError>
{
    let status = StatusFlags::from_raw(read_u16(payload, offset, "status word")?);

    let mut phasors = Vec::with_capacity(state.phasor_count);
    for _ in 0..state.phasor_count {
        phasors.push(read_phasor(payload, offset, state.format.phasor)?);
    }

    let frequency_raw = read_scalar(payload, offset, state.format.frequency, "frequency")?;
    let dfdt_raw = read_scalar(payload, offset, state.format.frequency, "df/dt")?;
    let frequency = FrequencyValue::from_raw(state.format.frequency, frequency_raw, dfdt_raw);

    let mut analogs = Vec::with_capacity(state.analog_count);
    for _ in 0..state.analog_count {
        let raw = read_scalar(payload, offset, state.format.analog, "analog value")?;
        analogs.push(AnalogValue::from_raw(state.format.analog, raw));
    }

    let mut digitals = Vec::with_capacity(state.digital_count);
    for _ in 0..state.digital_count {
        digitals.push(DigitalValue::from_word(read_u16(
            payload,
            offset,
            "digital word",
        )?));
    }

    Ok((status, phasors, frequency, analogs, digitals))
}

/// Serializes a data frame against its configuration.
pub fn encode_data(frame: &DataFrame, version: Version) -> Result<Vec<u8>, ParseError> {
    let configuration = &frame.configuration;
    let mut prefix = Prefix::new(version, FrameKind::Data, frame.id_code());
    prefix.set_time(frame.ticks, configuration.time_base);
    let mut out = prefix.to_hex();

    for cell in frame.cells.iter() {
        write_cell(&mut out, cell)?;
    }

    let framesize = (out.len() + 2) as u16;
    out[2..4].copy_from_slice(&framesize.to_be_bytes());
    Ok(seal_frame(ChecksumKind::CrcCcitt, out))
}

/// Parses a data frame, shaping each cell positionally after the
/// corresponding configuration cell. Checksum first; a mismatch rejects
/// the frame.
pub fn parse_data(
    bytes: &[u8],
    configuration: &Arc<ConfigurationFrame>,
) -> Result<DataFrame, ParseError> {
    let payload = open_frame(ChecksumKind::CrcCcitt, bytes)?;

    let mut prefix = Prefix::default();
    prefix.parse_image(&(), payload)?;
    if prefix.framesize as usize != bytes.len() {
        return Err(ParseError::InvalidLength {
            message: format!(
                "data frame declared {} bytes but buffer holds {}",
                prefix.framesize,
                bytes.len()
            ),
        });
    }

    let state = FrameParseState {
        cell_count: configuration.cells.len(),
        time_base: configuration.time_base,
        nominal_frequency: configuration
            .cells
            .get(0)
            .map(|cell| cell.nominal_frequency())
            .unwrap_or_default(),
        label_length: super::config::NAME_LENGTH,
    };

    let mut frame = DataFrame::new(configuration.clone());
    frame.ticks = prefix.ticks(state.time_base);

    let mut offset = PREFIX_LENGTH;
    for configuration_cell in configuration.cells.iter().take(state.cell_count) {
        let cell_state = CellParseState::from_configuration(configuration_cell);
        let (status, phasors, frequency, analogs, digitals) =
            parse_cell(payload, &mut offset, &cell_state)?;

        let mut cell = DataCell::new(configuration_cell)?;
        cell.status = status;
        for (index, value) in phasors.into_iter().enumerate() {
            if let Some(slot) = cell.phasor_values.get_mut(index) {
                *slot = value;
            }
        }
        cell.frequency_value = frequency;
        for (index, value) in analogs.into_iter().enumerate() {
            if let Some(slot) = cell.analog_values.get_mut(index) {
                *slot = value;
            }
        }
        for (index, value) in digitals.into_iter().enumerate() {
            if let Some(slot) = cell.digital_values.get_mut(index) {
                *slot = value;
            }
        }
        frame.cells.push(cell)?;
    }

    frame.record_parsed_length(prefix.framesize as usize);
    Ok(frame)
}
