//! Channel definitions: the named, scaled quantities a configuration cell
//! declares and a data cell later fills with values.

use super::common::{ChannelError, MAX_SCALING_FACTOR};
use super::image::BinaryLength;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default maximum label length; protocols with shorter name fields pass
/// their own cap when constructing definitions.
pub const DEFAULT_LABEL_LENGTH: usize = 16;

/// Per-unit scale applied to integer phasor magnitudes: conversion factors
/// are transmitted in 10^-5 units per bit.
pub const PER_UNIT_SCALE: f64 = 0.00001;

/// Entities whose position inside their parent collection is part of their
/// identity. The collection assigns the index at insertion; callers never do.
pub trait Indexed {
    fn index(&self) -> usize;
    fn set_index(&mut self, index: usize);
}

/// Strips control characters and collapses duplicate whitespace from a raw
/// wire or caller-supplied label.
pub fn sanitize_label(raw: &str) -> String {
    let mut label = String::with_capacity(raw.len());
    let mut last_was_space = false;
    for ch in raw.chars() {
        if ch.is_control() {
            continue;
        }
        if ch.is_whitespace() {
            if !last_was_space {
                label.push(' ');
            }
            last_was_space = true;
        } else {
            label.push(ch);
            last_was_space = false;
        }
    }
    label.trim().to_string()
}

/// The nominal line frequency designation carried by configuration frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NominalFrequency {
    Hz50,
    Hz60,
}

impl NominalFrequency {
    pub fn hertz(&self) -> f64 {
        match self {
            NominalFrequency::Hz50 => 50.0,
            NominalFrequency::Hz60 => 60.0,
        }
    }
}

impl Default for NominalFrequency {
    fn default() -> Self {
        NominalFrequency::Hz60
    }
}

impl fmt::Display for NominalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NominalFrequency::Hz50 => write!(f, "50 Hz"),
            NominalFrequency::Hz60 => write!(f, "60 Hz"),
        }
    }
}

/// Describes one named quantity within a configuration cell: its label,
/// 24-bit scale factor and offset, and its collection-assigned index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    index: usize,
    label: String,
    scaling: u32,
    offset: f64,
    label_limit: usize,
}

impl ChannelDefinition {
    pub fn new(label: &str, label_limit: usize) -> Result<Self, ChannelError> {
        let mut definition = ChannelDefinition {
            index: 0,
            label: String::new(),
            scaling: 1,
            offset: 0.0,
            label_limit,
        };
        definition.set_label(label)?;
        Ok(definition)
    }

    /// Position within the parent definition collection. Assigned on
    /// insertion; meaningless until the definition has been added.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sets the label after sanitizing it. Rejects labels whose sanitized
    /// form still exceeds the protocol's cap; nothing is truncated.
    pub fn set_label(&mut self, label: &str) -> Result<(), ChannelError> {
        let sanitized = sanitize_label(label);
        if sanitized.len() > self.label_limit {
            return Err(ChannelError::LabelTooLong {
                label: sanitized,
                maximum: self.label_limit,
            });
        }
        self.label = sanitized;
        Ok(())
    }

    pub fn label_limit(&self) -> usize {
        self.label_limit
    }

    pub fn scaling(&self) -> u32 {
        self.scaling
    }

    /// Sets the integer scale factor. Values that do not fit the 24-bit
    /// wire field are rejected outright.
    pub fn set_scaling(&mut self, scaling: u32) -> Result<(), ChannelError> {
        if scaling > MAX_SCALING_FACTOR {
            return Err(ChannelError::ScalingOutOfRange { value: scaling });
        }
        self.scaling = scaling;
        Ok(())
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: f64) {
        self.offset = offset;
    }

    /// Conversion factor applied to integer wire values: the scale factor in
    /// 10^-5 units per bit.
    pub fn conversion_factor(&self) -> f64 {
        self.scaling as f64 * PER_UNIT_SCALE
    }
}

impl Indexed for ChannelDefinition {
    fn index(&self) -> usize {
        self.index
    }
    fn set_index(&mut self, index: usize) {
        self.index = index;
    }
}

/// Whether a phasor measures a voltage or a current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasorKind {
    Voltage,
    Current,
}

/// Defines one phasor channel. Current phasors may reference the voltage
/// phasor they were measured against (by index within the same cell).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorDefinition {
    pub definition: ChannelDefinition,
    pub kind: PhasorKind,
    voltage_reference: Option<usize>,
}

impl PhasorDefinition {
    pub fn new(label: &str, kind: PhasorKind, label_limit: usize) -> Result<Self, ChannelError> {
        Ok(PhasorDefinition {
            definition: ChannelDefinition::new(label, label_limit)?,
            kind,
            voltage_reference: None,
        })
    }

    pub fn voltage_reference(&self) -> Option<usize> {
        self.voltage_reference
    }

    /// Associates a current phasor with its reference voltage phasor.
    /// A voltage phasor is its own reference; giving it one is an error.
    pub fn set_voltage_reference(&mut self, index: usize) -> Result<(), ChannelError> {
        if self.kind == PhasorKind::Voltage {
            return Err(ChannelError::VoltageReferenceOnVoltagePhasor {
                label: self.definition.label().to_string(),
            });
        }
        self.voltage_reference = Some(index);
        Ok(())
    }
}

impl Indexed for PhasorDefinition {
    fn index(&self) -> usize {
        self.definition.index()
    }
    fn set_index(&mut self, index: usize) {
        self.definition.set_index(index);
    }
}

impl BinaryLength for PhasorDefinition {
    // Name field plus the four-byte conversion word
    fn binary_length(&self) -> usize {
        self.definition.label_limit() + 4
    }
}

/// How an analog channel samples its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalogKind {
    SinglePointOnWave,
    Rms,
    Peak,
}

impl fmt::Display for AnalogKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AnalogKind::SinglePointOnWave => write!(f, "Single Point-On-Wave"),
            AnalogKind::Rms => write!(f, "RMS"),
            AnalogKind::Peak => write!(f, "Peak"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogDefinition {
    pub definition: ChannelDefinition,
    pub kind: AnalogKind,
}

impl AnalogDefinition {
    pub fn new(label: &str, kind: AnalogKind, label_limit: usize) -> Result<Self, ChannelError> {
        Ok(AnalogDefinition {
            definition: ChannelDefinition::new(label, label_limit)?,
            kind,
        })
    }

    /// Analog conversion is user-defined scaling applied directly, not the
    /// per-unit phasor scale.
    pub fn conversion_factor(&self) -> f64 {
        self.definition.scaling() as f64
    }
}

impl Indexed for AnalogDefinition {
    fn index(&self) -> usize {
        self.definition.index()
    }
    fn set_index(&mut self, index: usize) {
        self.definition.set_index(index);
    }
}

impl BinaryLength for AnalogDefinition {
    fn binary_length(&self) -> usize {
        self.definition.label_limit() + 4
    }
}

/// Defines one 16-bit digital status word: a label per input bit plus the
/// normal-status and valid-inputs mask words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalDefinition {
    pub definition: ChannelDefinition,
    /// One label per input bit, 16 in all. The first doubles as the word's
    /// own label.
    pub bit_labels: Vec<String>,
    /// XORed with the status word, zero indicates normal status.
    pub normal_status: u16,
    /// Bits set where the corresponding digital input is currently valid.
    pub valid_inputs: u16,
}

impl DigitalDefinition {
    pub const BITS_PER_WORD: usize = 16;

    pub fn new(label: &str, label_limit: usize) -> Result<Self, ChannelError> {
        let definition = ChannelDefinition::new(label, label_limit)?;
        let word_label = definition.label().to_string();
        let mut bit_labels = Vec::with_capacity(Self::BITS_PER_WORD);
        bit_labels.push(word_label.clone());
        for bit in 1..Self::BITS_PER_WORD {
            bit_labels.push(sanitize_label(&format!("{} {}", word_label, bit + 1)));
        }
        Ok(DigitalDefinition {
            definition,
            bit_labels,
            normal_status: 0,
            valid_inputs: 0xFFFF,
        })
    }

    /// Replaces the per-bit labels, keeping the word label in sync with the
    /// first entry. Short lists are padded with empty labels.
    pub fn set_bit_labels(&mut self, labels: Vec<String>) -> Result<(), ChannelError> {
        let mut bit_labels: Vec<String> =
            labels.iter().map(|label| sanitize_label(label)).collect();
        bit_labels.resize(Self::BITS_PER_WORD, String::new());
        let word_label = bit_labels[0].clone();
        self.definition.set_label(&word_label)?;
        self.bit_labels = bit_labels;
        Ok(())
    }
}

impl Indexed for DigitalDefinition {
    fn index(&self) -> usize {
        self.definition.index()
    }
    fn set_index(&mut self, index: usize) {
        self.definition.set_index(index);
    }
}

impl BinaryLength for DigitalDefinition {
    // A name field per bit plus the four-byte mask word
    fn binary_length(&self) -> usize {
        self.definition.label_limit() * Self::BITS_PER_WORD + 4
    }
}

/// Defines the frequency channel of a cell and its nominal designation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrequencyDefinition {
    pub definition: ChannelDefinition,
    pub nominal: NominalFrequency,
}

impl FrequencyDefinition {
    pub fn new(nominal: NominalFrequency) -> Self {
        FrequencyDefinition {
            definition: ChannelDefinition {
                index: 0,
                label: "FREQ".to_string(),
                scaling: 1,
                offset: 0.0,
                label_limit: DEFAULT_LABEL_LENGTH,
            },
            nominal,
        }
    }
}

impl BinaryLength for FrequencyDefinition {
    // The nominal-frequency word
    fn binary_length(&self) -> usize {
        2
    }
}
