//! Configuration and data cells: the addressable per-device records inside
//! a frame.

use super::collection::{Aligned, CellCollection, DefinitionCollection, ValueCollection};
use super::common::ChannelError;
use super::definition::{
    sanitize_label, AnalogDefinition, DigitalDefinition, FrequencyDefinition, NominalFrequency,
    PhasorDefinition, DEFAULT_LABEL_LENGTH,
};
use super::image::BinaryLength;
use super::value::{
    AnalogValue, ChannelValue, DigitalValue, FrequencyValue, Measurement, NumericFormat,
    PhasorFormat, PhasorValue,
};
use serde::{Deserialize, Serialize};

/// Highest definition index a single cell may address.
pub const MAXIMUM_DEFINITION_INDEX: usize = u16::MAX as usize;

/// Rounds a serialized length up to the next 32-bit boundary.
pub fn pad_to_dword(length: usize) -> usize {
    (length + 3) & !0x3
}

/// The wire formats a cell's value blocks were (or will be) encoded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFormat {
    pub phasor: PhasorFormat,
    pub frequency: NumericFormat,
    pub analog: NumericFormat,
}

impl Default for DataFormat {
    fn default() -> Self {
        DataFormat {
            phasor: PhasorFormat::IntRect,
            frequency: NumericFormat::Fixed,
            analog: NumericFormat::Fixed,
        }
    }
}

/// Protocol-independent interpretation of a data cell's status word.
///
/// Codecs map their wire bits into this common layout; the raw word is kept
/// so a cell re-serializes exactly as received.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFlags {
    pub raw: u16,
    pub data_error: u8,               // 2-bit field, zero when data is valid
    pub sync_invalid: bool,           // Bit 13
    pub data_sorted_by_arrival: bool, // Bit 12
    pub trigger_detected: bool,       // Bit 11
    pub configuration_changed: bool,  // Bit 10
    pub data_modified: bool,          // Bit 9
    pub time_quality: u8,             // 3-bit field
    pub unlock_time: u8,              // 2-bit field
    pub trigger_reason: u8,           // 4-bit field
}

impl StatusFlags {
    pub fn from_raw(raw: u16) -> Self {
        StatusFlags {
            raw,
            data_error: ((raw >> 14) & 0x03) as u8,
            sync_invalid: (raw & 0x2000) != 0,
            data_sorted_by_arrival: (raw & 0x1000) != 0,
            trigger_detected: (raw & 0x0800) != 0,
            configuration_changed: (raw & 0x0400) != 0,
            data_modified: (raw & 0x0200) != 0,
            time_quality: ((raw >> 6) & 0x07) as u8,
            unlock_time: ((raw >> 4) & 0x03) as u8,
            trigger_reason: (raw & 0x000F) as u8,
        }
    }

    pub fn to_raw(&self) -> u16 {
        let mut raw = 0;
        raw |= (self.data_error as u16 & 0x03) << 14;
        raw |= (self.sync_invalid as u16) << 13;
        raw |= (self.data_sorted_by_arrival as u16) << 12;
        raw |= (self.trigger_detected as u16) << 11;
        raw |= (self.configuration_changed as u16) << 10;
        raw |= (self.data_modified as u16) << 9;
        raw |= ((self.time_quality & 0x07) as u16) << 6;
        raw |= ((self.unlock_time & 0x03) as u16) << 4;
        raw |= self.trigger_reason as u16 & 0x000F;
        raw
    }

    pub fn data_is_valid(&self) -> bool {
        self.data_error == 0
    }

    pub fn device_synchronized(&self) -> bool {
        !self.sync_invalid
    }
}

/// Describes one monitored device: its identity, channel definitions and
/// nominal line frequency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationCell {
    id_code: u16,
    station_name: String,
    id_label: String,
    label_length: usize,
    pub format: DataFormat,
    pub phasor_definitions: DefinitionCollection<PhasorDefinition>,
    pub analog_definitions: DefinitionCollection<AnalogDefinition>,
    pub digital_definitions: DefinitionCollection<DigitalDefinition>,
    pub frequency_definition: FrequencyDefinition,
    pub revision_count: u16,
    align_on_dword_boundary: bool,
}

impl ConfigurationCell {
    pub fn new(id_code: u16) -> Self {
        Self::with_label_length(id_code, DEFAULT_LABEL_LENGTH)
    }

    /// Creates a cell for a protocol with name fields of `label_length`
    /// bytes.
    pub fn with_label_length(id_code: u16, label_length: usize) -> Self {
        ConfigurationCell {
            id_code,
            station_name: String::new(),
            id_label: String::new(),
            label_length,
            format: DataFormat::default(),
            phasor_definitions: DefinitionCollection::new(MAXIMUM_DEFINITION_INDEX),
            analog_definitions: DefinitionCollection::new(MAXIMUM_DEFINITION_INDEX),
            digital_definitions: DefinitionCollection::new(MAXIMUM_DEFINITION_INDEX),
            frequency_definition: FrequencyDefinition::new(NominalFrequency::default()),
            revision_count: 0,
            align_on_dword_boundary: false,
        }
    }

    pub fn id_code(&self) -> u16 {
        self.id_code
    }

    pub fn set_id_code(&mut self, id_code: u16) {
        self.id_code = id_code;
    }

    pub fn label_length(&self) -> usize {
        self.label_length
    }

    pub fn station_name(&self) -> &str {
        &self.station_name
    }

    pub fn set_station_name(&mut self, name: &str) -> Result<(), ChannelError> {
        let sanitized = sanitize_label(name);
        if sanitized.len() > self.label_length {
            return Err(ChannelError::LabelTooLong {
                label: sanitized,
                maximum: self.label_length,
            });
        }
        self.station_name = sanitized;
        Ok(())
    }

    pub fn id_label(&self) -> &str {
        &self.id_label
    }

    pub fn set_id_label(&mut self, label: &str) -> Result<(), ChannelError> {
        let sanitized = sanitize_label(label);
        if sanitized.len() > self.label_length {
            return Err(ChannelError::LabelTooLong {
                label: sanitized,
                maximum: self.label_length,
            });
        }
        self.id_label = sanitized;
        Ok(())
    }

    pub fn nominal_frequency(&self) -> NominalFrequency {
        self.frequency_definition.nominal
    }

    pub fn set_nominal_frequency(&mut self, nominal: NominalFrequency) {
        self.frequency_definition.nominal = nominal;
    }
}

impl Aligned for ConfigurationCell {
    fn align_on_dword_boundary(&self) -> bool {
        self.align_on_dword_boundary
    }
    fn set_align_on_dword_boundary(&mut self, align: bool) {
        self.align_on_dword_boundary = align;
    }
}

impl BinaryLength for ConfigurationCell {
    fn binary_length(&self) -> usize {
        // Station name, id code, format word, three channel counts, the
        // definition blocks, nominal frequency word and revision count
        let length = self.label_length
            + 2
            + 2
            + 6
            + self.phasor_definitions.binary_length()
            + self.analog_definitions.binary_length()
            + self.digital_definitions.binary_length()
            + self.frequency_definition.binary_length()
            + 2;
        if self.align_on_dword_boundary {
            pad_to_dword(length)
        } else {
            length
        }
    }
}

/// One device's live measurements within a data frame. Value collections
/// align positionally with the configuration cell's definition collections;
/// the parser assumes, and does not re-validate, that correspondence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataCell {
    id_code: u16,
    pub status: StatusFlags,
    pub phasor_values: ValueCollection<PhasorValue>,
    pub analog_values: ValueCollection<AnalogValue>,
    pub digital_values: ValueCollection<DigitalValue>,
    pub frequency_value: FrequencyValue,
    align_on_dword_boundary: bool,
}

impl DataCell {
    /// Creates an empty data cell shaped after its configuration cell: one
    /// unassigned value per definition, in definition order.
    pub fn new(configuration: &ConfigurationCell) -> Result<Self, ChannelError> {
        let format = configuration.format;
        let mut phasor_values = ValueCollection::new(MAXIMUM_DEFINITION_INDEX);
        for _ in &configuration.phasor_definitions {
            phasor_values.push(PhasorValue::empty(format.phasor))?;
        }
        let mut analog_values = ValueCollection::new(MAXIMUM_DEFINITION_INDEX);
        for _ in &configuration.analog_definitions {
            analog_values.push(AnalogValue::empty(format.analog))?;
        }
        let mut digital_values = ValueCollection::new(MAXIMUM_DEFINITION_INDEX);
        for _ in &configuration.digital_definitions {
            digital_values.push(DigitalValue::empty())?;
        }
        Ok(DataCell {
            id_code: configuration.id_code(),
            status: StatusFlags::default(),
            phasor_values,
            analog_values,
            digital_values,
            frequency_value: FrequencyValue::empty(format.frequency),
            align_on_dword_boundary: false,
        })
    }

    pub fn id_code(&self) -> u16 {
        self.id_code
    }

    /// True while any contained value still has an unassigned slot.
    pub fn is_empty(&self) -> bool {
        self.frequency_value.is_empty()
            || self.phasor_values.iter().any(|value| value.is_empty())
            || self.analog_values.iter().any(|value| value.is_empty())
            || self.digital_values.iter().any(|value| value.is_empty())
    }

    /// Flattens the cell into labeled engineering values, resolving labels
    /// and conversion factors positionally against the configuration cell.
    pub fn measurements(&self, configuration: &ConfigurationCell) -> Vec<Measurement> {
        let mut measurements = Vec::new();

        for (index, value) in self.phasor_values.iter().enumerate() {
            if let Some(definition) = configuration.phasor_definitions.get(index) {
                if let (Some(magnitude), Some(angle)) =
                    (value.magnitude(definition), value.angle())
                {
                    let label = definition.definition.label();
                    measurements.push(Measurement {
                        label: format!("{}.MAGNITUDE", label),
                        value: magnitude,
                    });
                    measurements.push(Measurement {
                        label: format!("{}.ANGLE", label),
                        value: angle,
                    });
                }
            }
        }

        let nominal = configuration.nominal_frequency();
        if let Some(hz) = self.frequency_value.frequency_hz(nominal) {
            measurements.push(Measurement {
                label: "FREQ".to_string(),
                value: hz,
            });
        }
        if let Some(rate) = self.frequency_value.dfdt_hz_per_second() {
            measurements.push(Measurement {
                label: "DFDT".to_string(),
                value: rate,
            });
        }

        for (index, value) in self.analog_values.iter().enumerate() {
            if let Some(definition) = configuration.analog_definitions.get(index) {
                if let Some(scaled) = value.scaled_value(definition) {
                    measurements.push(Measurement {
                        label: definition.definition.label().to_string(),
                        value: scaled,
                    });
                }
            }
        }

        for (index, value) in self.digital_values.iter().enumerate() {
            if let Some(definition) = configuration.digital_definitions.get(index) {
                if let Some(word) = value.word() {
                    measurements.push(Measurement {
                        label: definition.definition.label().to_string(),
                        value: word as f64,
                    });
                }
            }
        }

        measurements
    }
}

impl Aligned for DataCell {
    fn align_on_dword_boundary(&self) -> bool {
        self.align_on_dword_boundary
    }
    fn set_align_on_dword_boundary(&mut self, align: bool) {
        self.align_on_dword_boundary = align;
    }
}

impl BinaryLength for DataCell {
    fn binary_length(&self) -> usize {
        // Status word plus the value blocks
        let length = 2
            + self.phasor_values.binary_length()
            + self.frequency_value.binary_length()
            + self.analog_values.binary_length()
            + self.digital_values.binary_length();
        if self.align_on_dword_boundary {
            pad_to_dword(length)
        } else {
            length
        }
    }
}

/// A cell collection of configuration cells, at the default frame bound.
pub type ConfigurationCellCollection = CellCollection<ConfigurationCell>;

/// A cell collection of data cells, at the default frame bound.
pub type DataCellCollection = CellCollection<DataCell>;
