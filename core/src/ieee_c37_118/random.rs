//! Random frame generation: builds representative configuration frames and
//! matching data frames for tests, benchmarks and sample captures.

use super::config::NAME_LENGTH;
use crate::channel::cell::{ConfigurationCell, DataCell, DataFormat, StatusFlags};
use crate::channel::common::ChannelError;
use crate::channel::definition::{
    AnalogDefinition, AnalogKind, DigitalDefinition, NominalFrequency, PhasorDefinition,
    PhasorKind,
};
use crate::channel::frame::{ConfigurationFrame, DataFrame};
use crate::channel::value::{
    AnalogValue, DigitalValue, FrequencyValue, NumericFormat, PhasorFormat, PhasorValue,
};
use crate::utils::Ticks;
use rand::Rng;
use std::sync::Arc;

fn random_cell(
    rng: &mut impl Rng,
    station_index: usize,
    use_float: bool,
) -> Result<ConfigurationCell, ChannelError> {
    let mut cell = ConfigurationCell::new((1000 + station_index) as u16);
    cell.set_station_name(&format!("STATION{:02}", station_index))?;
    cell.format = if use_float {
        DataFormat {
            phasor: PhasorFormat::FloatRect,
            frequency: NumericFormat::Float,
            analog: NumericFormat::Float,
        }
    } else {
        DataFormat::default()
    };

    let phasor_count = rng.random_range(1..4);
    let analog_count = rng.random_range(0..3);
    let digital_count = rng.random_range(0..2);

    for i in 0..phasor_count {
        let kind = if i == 0 {
            PhasorKind::Voltage
        } else if rng.random_bool(0.5) {
            PhasorKind::Voltage
        } else {
            PhasorKind::Current
        };
        let mut definition =
            PhasorDefinition::new(&format!("PH {:02}", i), kind, NAME_LENGTH)?;
        definition
            .definition
            .set_scaling(rng.random_range(1..1_000_000))?;
        cell.phasor_definitions.push(definition)?;
    }
    for i in 0..analog_count {
        let mut definition =
            AnalogDefinition::new(&format!("AN {:02}", i), AnalogKind::Rms, NAME_LENGTH)?;
        definition.definition.set_scaling(rng.random_range(1..1000))?;
        cell.analog_definitions.push(definition)?;
    }
    for i in 0..digital_count {
        cell.digital_definitions
            .push(DigitalDefinition::new(&format!("DG {:02}", i), NAME_LENGTH)?)?;
    }
    cell.revision_count = rng.random_range(0..10);
    Ok(cell)
}

/// Builds a random but well-formed configuration frame. Each PMU gets one
/// to three phasors and a coin-flipped fixed or floating data format.
pub fn random_configuration(
    rng: &mut impl Rng,
    id_code: u16,
    cell_count: usize,
) -> Result<ConfigurationFrame, ChannelError> {
    let mut frame = ConfigurationFrame::new(id_code, 30);
    frame.time_base = 1_000_000;
    frame.ticks = Ticks::now();
    for station_index in 0..cell_count {
        let use_float = rng.random_bool(0.5);
        frame.cells.push(random_cell(rng, station_index, use_float)?)?;
    }
    Ok(frame)
}

/// Builds one random data frame shaped by the given configuration, with
/// every slot assigned and values within their wire ranges.
pub fn random_data(
    rng: &mut impl Rng,
    configuration: &Arc<ConfigurationFrame>,
) -> Result<DataFrame, ChannelError> {
    let mut frame = DataFrame::new(configuration.clone());
    frame.ticks = Ticks::now();

    for configuration_cell in configuration.cells.iter() {
        let format = configuration_cell.format;
        let mut cell = DataCell::new(configuration_cell)?;
        cell.status = StatusFlags::from_raw(rng.random::<u16>());

        for index in 0..cell.phasor_values.len() {
            let value = match format.phasor {
                PhasorFormat::IntRect => PhasorValue::from_raw(
                    format.phasor,
                    rng.random_range(-32_768..32_768) as f64,
                    rng.random_range(-32_768..32_768) as f64,
                ),
                PhasorFormat::IntPolar => PhasorValue::from_raw(
                    format.phasor,
                    rng.random_range(0..65_536) as f64,
                    rng.random_range(-31_416..31_416) as f64,
                ),
                PhasorFormat::FloatRect | PhasorFormat::FloatPolar => PhasorValue::from_raw(
                    format.phasor,
                    rng.random_range(-150_000.0..150_000.0f32) as f64,
                    rng.random_range(-150_000.0..150_000.0f32) as f64,
                ),
            };
            if let Some(slot) = cell.phasor_values.get_mut(index) {
                *slot = value;
            }
        }

        cell.frequency_value = match format.frequency {
            NumericFormat::Fixed => FrequencyValue::from_raw(
                format.frequency,
                rng.random_range(-500..500) as f64,
                rng.random_range(-100..100) as f64,
            ),
            NumericFormat::Float => FrequencyValue::from_raw(
                format.frequency,
                rng.random_range(-0.5..0.5f32) as f64,
                rng.random_range(-1.0..1.0f32) as f64,
            ),
        };

        for index in 0..cell.analog_values.len() {
            let value = match format.analog {
                NumericFormat::Fixed => {
                    AnalogValue::from_raw(format.analog, rng.random_range(-32_768..32_768) as f64)
                }
                NumericFormat::Float => {
                    AnalogValue::from_raw(format.analog, rng.random_range(-1_000.0..1_000.0f32) as f64)
                }
            };
            if let Some(slot) = cell.analog_values.get_mut(index) {
                *slot = value;
            }
        }

        for index in 0..cell.digital_values.len() {
            let value = DigitalValue::from_word(rng.random::<u16>());
            if let Some(slot) = cell.digital_values.get_mut(index) {
                *slot = value;
            }
        }

        frame.cells.push(cell)?;
    }
    Ok(frame)
}
