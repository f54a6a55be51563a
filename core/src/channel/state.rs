//! Parse-time parameter structs.
//!
//! Deserialization needs context the frame object model never stores:
//! expected counts, name-field widths, value formats. These structs carry
//! that context into the parse functions and are dropped when the call
//! returns; nothing here survives alongside a parsed frame.

use super::cell::{ConfigurationCell, DataFormat};
use super::definition::NominalFrequency;

/// Context for parsing one frame's cell sequence.
#[derive(Debug, Clone, Copy)]
pub struct FrameParseState {
    /// Number of cells the frame header declared.
    pub cell_count: usize,
    /// Fractional-second resolution of the stream, counts per second.
    pub time_base: u32,
    /// Nominal line frequency to assume until the wire says otherwise.
    pub nominal_frequency: NominalFrequency,
    /// Width of the protocol's name fields in bytes.
    pub label_length: usize,
}

impl Default for FrameParseState {
    fn default() -> Self {
        FrameParseState {
            cell_count: 1,
            time_base: 1_000_000,
            nominal_frequency: NominalFrequency::default(),
            label_length: super::definition::DEFAULT_LABEL_LENGTH,
        }
    }
}

/// Context for parsing one cell's channel blocks.
#[derive(Debug, Clone, Copy)]
pub struct CellParseState {
    pub label_length: usize,
    pub phasor_count: usize,
    pub analog_count: usize,
    pub digital_count: usize,
    pub format: DataFormat,
}

impl CellParseState {
    /// Derives the state a data cell parse needs from the configuration
    /// cell at the same position.
    pub fn from_configuration(cell: &ConfigurationCell) -> Self {
        CellParseState {
            label_length: cell.label_length(),
            phasor_count: cell.phasor_definitions.len(),
            analog_count: cell.analog_definitions.len(),
            digital_count: cell.digital_definitions.len(),
            format: cell.format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::definition::{PhasorDefinition, PhasorKind};
    use crate::channel::value::PhasorFormat;

    #[test]
    fn test_cell_state_from_configuration() {
        let mut cell = ConfigurationCell::new(7);
        cell.format.phasor = PhasorFormat::FloatPolar;
        for label in ["VA", "IA"] {
            cell.phasor_definitions
                .push(PhasorDefinition::new(label, PhasorKind::Voltage, 16).unwrap())
                .unwrap();
        }

        let state = CellParseState::from_configuration(&cell);
        assert_eq!(state.phasor_count, 2);
        assert_eq!(state.analog_count, 0);
        assert_eq!(state.format.phasor, PhasorFormat::FloatPolar);
        assert_eq!(state.label_length, 16);
    }
}
