//! Live measurement values bound to channel definitions.
//!
//! A value keeps the raw numbers exactly as they crossed the wire (both i16
//! and f32 sources are exact in an `f64` slot, so serialization round-trips
//! bit for bit) and derives the engineering quantities on demand using the
//! owning definition's conversion factor. A slot that was never assigned
//! leaves the value "empty" - partially filled values report empty too.

use super::definition::{AnalogDefinition, NominalFrequency, PhasorDefinition};
use super::image::BinaryLength;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire representation of a phasor pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasorFormat {
    IntRect,
    IntPolar,
    FloatRect,
    FloatPolar,
}

impl PhasorFormat {
    pub fn is_fixed(&self) -> bool {
        matches!(self, PhasorFormat::IntRect | PhasorFormat::IntPolar)
    }

    pub fn is_polar(&self) -> bool {
        matches!(self, PhasorFormat::IntPolar | PhasorFormat::FloatPolar)
    }

    pub fn binary_length(&self) -> usize {
        if self.is_fixed() {
            4
        } else {
            8
        }
    }
}

impl fmt::Display for PhasorFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhasorFormat::IntRect => write!(f, "IntRect"),
            PhasorFormat::IntPolar => write!(f, "IntPolar"),
            PhasorFormat::FloatRect => write!(f, "FloatRect"),
            PhasorFormat::FloatPolar => write!(f, "FloatPolar"),
        }
    }
}

/// Wire representation of a scalar channel (frequency or analog).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumericFormat {
    Fixed,
    Float,
}

impl NumericFormat {
    pub fn is_fixed(&self) -> bool {
        matches!(self, NumericFormat::Fixed)
    }

    pub fn binary_length(&self) -> usize {
        match self {
            NumericFormat::Fixed => 2,
            NumericFormat::Float => 4,
        }
    }
}

/// Scale applied to the raw integer angle field: transmitted in 1e-4 radian.
const INT_ANGLE_SCALE: f64 = 0.0001;

/// A measurement instance: up to two composite numeric slots addressable by
/// index, plus emptiness tracking. This is the protocol-blind surface a
/// generic measurement consumer works against.
pub trait ChannelValue: BinaryLength {
    fn composite_count(&self) -> usize;

    /// Raw wire number held in the given slot, `None` while unassigned.
    fn composite(&self, index: usize) -> Option<f64>;

    fn set_composite(&mut self, index: usize, value: f64);

    /// True while at least one composite slot was never assigned.
    fn is_empty(&self) -> bool {
        (0..self.composite_count()).any(|i| self.composite(i).is_none())
    }

    fn is_fixed_format(&self) -> bool;
}

/// One phasor measurement. Slot 0 holds real (rectangular) or magnitude
/// (polar); slot 1 holds imaginary or angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorValue {
    format: PhasorFormat,
    slot_a: Option<f64>,
    slot_b: Option<f64>,
}

impl PhasorValue {
    pub fn empty(format: PhasorFormat) -> Self {
        PhasorValue {
            format,
            slot_a: None,
            slot_b: None,
        }
    }

    pub fn from_raw(format: PhasorFormat, slot_a: f64, slot_b: f64) -> Self {
        PhasorValue {
            format,
            slot_a: Some(slot_a),
            slot_b: Some(slot_b),
        }
    }

    pub fn format(&self) -> PhasorFormat {
        self.format
    }

    pub fn raw(&self) -> Option<(f64, f64)> {
        Some((self.slot_a?, self.slot_b?))
    }

    /// Magnitude in engineering units, scaled by the definition's conversion
    /// factor for integer formats.
    pub fn magnitude(&self, definition: &PhasorDefinition) -> Option<f64> {
        let (a, b) = (self.slot_a?, self.slot_b?);
        let magnitude = match self.format {
            PhasorFormat::IntPolar => a * definition.definition.conversion_factor(),
            PhasorFormat::FloatPolar => a,
            PhasorFormat::IntRect => {
                (a * a + b * b).sqrt() * definition.definition.conversion_factor()
            }
            PhasorFormat::FloatRect => (a * a + b * b).sqrt(),
        };
        Some(magnitude)
    }

    /// Angle in radians.
    pub fn angle(&self) -> Option<f64> {
        let (a, b) = (self.slot_a?, self.slot_b?);
        let angle = match self.format {
            PhasorFormat::IntPolar => b * INT_ANGLE_SCALE,
            PhasorFormat::FloatPolar => b,
            PhasorFormat::IntRect | PhasorFormat::FloatRect => b.atan2(a),
        };
        Some(angle)
    }

    pub fn real(&self, definition: &PhasorDefinition) -> Option<f64> {
        let magnitude = self.magnitude(definition)?;
        let angle = self.angle()?;
        Some(magnitude * angle.cos())
    }

    pub fn imaginary(&self, definition: &PhasorDefinition) -> Option<f64> {
        let magnitude = self.magnitude(definition)?;
        let angle = self.angle()?;
        Some(magnitude * angle.sin())
    }
}

impl BinaryLength for PhasorValue {
    fn binary_length(&self) -> usize {
        self.format.binary_length()
    }
}

impl ChannelValue for PhasorValue {
    fn composite_count(&self) -> usize {
        2
    }
    fn composite(&self, index: usize) -> Option<f64> {
        match index {
            0 => self.slot_a,
            1 => self.slot_b,
            _ => None,
        }
    }
    fn set_composite(&mut self, index: usize, value: f64) {
        match index {
            0 => self.slot_a = Some(value),
            1 => self.slot_b = Some(value),
            _ => {}
        }
    }
    fn is_fixed_format(&self) -> bool {
        self.format.is_fixed()
    }
}

/// The frequency channel pair: slot 0 carries the frequency field, slot 1
/// the rate of change. Fixed format transmits deviation from nominal in mHz
/// and df/dt in 0.01 Hz/s; float format carries both in Hz and Hz/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyValue {
    format: NumericFormat,
    frequency: Option<f64>,
    dfdt: Option<f64>,
}

impl FrequencyValue {
    pub fn empty(format: NumericFormat) -> Self {
        FrequencyValue {
            format,
            frequency: None,
            dfdt: None,
        }
    }

    pub fn from_raw(format: NumericFormat, frequency: f64, dfdt: f64) -> Self {
        FrequencyValue {
            format,
            frequency: Some(frequency),
            dfdt: Some(dfdt),
        }
    }

    pub fn format(&self) -> NumericFormat {
        self.format
    }

    pub fn raw(&self) -> Option<(f64, f64)> {
        Some((self.frequency?, self.dfdt?))
    }

    /// Absolute frequency in Hz.
    pub fn frequency_hz(&self, nominal: NominalFrequency) -> Option<f64> {
        let raw = self.frequency?;
        let hz = match self.format {
            NumericFormat::Fixed => nominal.hertz() + raw / 1000.0,
            NumericFormat::Float => nominal.hertz() + raw,
        };
        Some(hz)
    }

    /// Rate of change of frequency in Hz/s.
    pub fn dfdt_hz_per_second(&self) -> Option<f64> {
        let raw = self.dfdt?;
        let rate = match self.format {
            NumericFormat::Fixed => raw / 100.0,
            NumericFormat::Float => raw,
        };
        Some(rate)
    }
}

impl BinaryLength for FrequencyValue {
    fn binary_length(&self) -> usize {
        2 * self.format.binary_length()
    }
}

impl ChannelValue for FrequencyValue {
    fn composite_count(&self) -> usize {
        2
    }
    fn composite(&self, index: usize) -> Option<f64> {
        match index {
            0 => self.frequency,
            1 => self.dfdt,
            _ => None,
        }
    }
    fn set_composite(&mut self, index: usize, value: f64) {
        match index {
            0 => self.frequency = Some(value),
            1 => self.dfdt = Some(value),
            _ => {}
        }
    }
    fn is_fixed_format(&self) -> bool {
        self.format.is_fixed()
    }
}

/// One analog channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalogValue {
    format: NumericFormat,
    value: Option<f64>,
}

impl AnalogValue {
    pub fn empty(format: NumericFormat) -> Self {
        AnalogValue {
            format,
            value: None,
        }
    }

    pub fn from_raw(format: NumericFormat, value: f64) -> Self {
        AnalogValue {
            format,
            value: Some(value),
        }
    }

    pub fn format(&self) -> NumericFormat {
        self.format
    }

    pub fn raw(&self) -> Option<f64> {
        self.value
    }

    /// Engineering value: integer samples pass through the user-defined
    /// scale and offset, floats are transmitted already converted.
    pub fn scaled_value(&self, definition: &AnalogDefinition) -> Option<f64> {
        let raw = self.value?;
        let value = match self.format {
            NumericFormat::Fixed => {
                raw * definition.conversion_factor() + definition.definition.offset()
            }
            NumericFormat::Float => raw,
        };
        Some(value)
    }
}

impl BinaryLength for AnalogValue {
    fn binary_length(&self) -> usize {
        self.format.binary_length()
    }
}

impl ChannelValue for AnalogValue {
    fn composite_count(&self) -> usize {
        1
    }
    fn composite(&self, index: usize) -> Option<f64> {
        match index {
            0 => self.value,
            _ => None,
        }
    }
    fn set_composite(&mut self, index: usize, value: f64) {
        if index == 0 {
            self.value = Some(value);
        }
    }
    fn is_fixed_format(&self) -> bool {
        self.format.is_fixed()
    }
}

/// One 16-bit digital status word.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DigitalValue {
    word: Option<u16>,
}

impl DigitalValue {
    pub fn empty() -> Self {
        DigitalValue { word: None }
    }

    pub fn from_word(word: u16) -> Self {
        DigitalValue { word: Some(word) }
    }

    pub fn word(&self) -> Option<u16> {
        self.word
    }

    /// State of one input bit.
    pub fn bit(&self, index: usize) -> Option<bool> {
        let word = self.word?;
        if index >= 16 {
            return None;
        }
        Some(word & (1 << index) != 0)
    }
}

impl BinaryLength for DigitalValue {
    fn binary_length(&self) -> usize {
        2
    }
}

impl ChannelValue for DigitalValue {
    fn composite_count(&self) -> usize {
        1
    }
    fn composite(&self, index: usize) -> Option<f64> {
        match index {
            0 => self.word.map(|w| w as f64),
            _ => None,
        }
    }
    fn set_composite(&mut self, index: usize, value: f64) {
        if index == 0 {
            self.word = Some(value as u16);
        }
    }
    fn is_fixed_format(&self) -> bool {
        true
    }
}

/// A labeled engineering value, the protocol-blind row handed to downstream
/// measurement consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub label: String,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::definition::{PhasorKind, DEFAULT_LABEL_LENGTH};
    use std::f64::consts::PI;

    fn voltage_definition(scaling: u32) -> PhasorDefinition {
        let mut definition =
            PhasorDefinition::new("VA", PhasorKind::Voltage, DEFAULT_LABEL_LENGTH).unwrap();
        definition.definition.set_scaling(scaling).unwrap();
        definition
    }

    #[test]
    fn test_empty_tracking() {
        let mut value = PhasorValue::empty(PhasorFormat::IntRect);
        assert!(value.is_empty());
        value.set_composite(0, 100.0);
        // One assigned slot is still empty
        assert!(value.is_empty());
        value.set_composite(1, 50.0);
        assert!(!value.is_empty());
        assert_eq!(value.raw(), Some((100.0, 50.0)));
    }

    #[test]
    fn test_int_rect_scaling() {
        // The IEEE example: raw 14635 with factor 915527 gives ~134 kV
        let definition = voltage_definition(915_527);
        let value = PhasorValue::from_raw(PhasorFormat::IntRect, 14_635.0, 0.0);
        let magnitude = value.magnitude(&definition).unwrap();
        assert!(
            (magnitude - 134_000.0).abs() < 1_000.0,
            "Expected ~134 kV but got {}",
            magnitude
        );
        assert_eq!(value.angle(), Some(0.0));
    }

    #[test]
    fn test_int_polar_angle_scale() {
        let definition = voltage_definition(1_000);
        let value = PhasorValue::from_raw(PhasorFormat::IntPolar, 500.0, 7_854.0);
        // 500 * 1000 * 1e-5 = 5.0
        assert!((value.magnitude(&definition).unwrap() - 5.0).abs() < 1e-9);
        assert!((value.angle().unwrap() - PI / 4.0).abs() < 1e-3);
    }

    #[test]
    fn test_float_polar_passthrough() {
        let definition = voltage_definition(1);
        let value = PhasorValue::from_raw(PhasorFormat::FloatPolar, 1.0, PI / 4.0);
        assert_eq!(value.magnitude(&definition), Some(1.0));
        let real = value.real(&definition).unwrap();
        let imag = value.imaginary(&definition).unwrap();
        assert!((real - 0.7071).abs() < 1e-3);
        assert!((imag - 0.7071).abs() < 1e-3);
    }

    #[test]
    fn test_frequency_conversion() {
        let fixed = FrequencyValue::from_raw(NumericFormat::Fixed, -12.0, 5.0);
        let hz = fixed.frequency_hz(NominalFrequency::Hz60).unwrap();
        assert!((hz - 59.988).abs() < 1e-9);
        assert!((fixed.dfdt_hz_per_second().unwrap() - 0.05).abs() < 1e-9);

        let float = FrequencyValue::from_raw(NumericFormat::Float, 0.02, -0.1);
        let hz = float.frequency_hz(NominalFrequency::Hz50).unwrap();
        assert!((hz - 50.02).abs() < 1e-9);
    }

    #[test]
    fn test_binary_lengths_by_format() {
        assert_eq!(PhasorValue::empty(PhasorFormat::IntRect).binary_length(), 4);
        assert_eq!(PhasorValue::empty(PhasorFormat::FloatPolar).binary_length(), 8);
        assert_eq!(FrequencyValue::empty(NumericFormat::Fixed).binary_length(), 4);
        assert_eq!(FrequencyValue::empty(NumericFormat::Float).binary_length(), 8);
        assert_eq!(AnalogValue::empty(NumericFormat::Fixed).binary_length(), 2);
        assert_eq!(DigitalValue::empty().binary_length(), 2);
    }

    #[test]
    fn test_digital_bits() {
        let value = DigitalValue::from_word(0b1010_0000_0000_0001);
        assert_eq!(value.bit(0), Some(true));
        assert_eq!(value.bit(1), Some(false));
        assert_eq!(value.bit(15), Some(true));
        assert_eq!(value.bit(16), None);
    }
}
