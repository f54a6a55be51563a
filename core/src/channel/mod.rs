//! Protocol-independent channel framework: the binary-image contract,
//! entity model, bounded collections, frame envelope and streaming parser
//! that the per-protocol codecs build on.

pub mod cell;
pub mod checksum;
pub mod collection;
pub mod common;
pub mod definition;
pub mod frame;
pub mod image;
pub mod parser;
pub mod state;
pub mod value;

pub use cell::{ConfigurationCell, DataCell, DataFormat, StatusFlags};
pub use checksum::ChecksumKind;
pub use collection::{Aligned, CellCollection, ChannelCollection, DefinitionCollection, ValueCollection};
pub use common::{ChannelError, ParseError, StreamError, UserTag};
pub use definition::{
    AnalogDefinition, AnalogKind, ChannelDefinition, DigitalDefinition, FrequencyDefinition,
    Indexed, NominalFrequency, PhasorDefinition, PhasorKind,
};
pub use frame::{
    CommandFrame, ConfigurationFrame, DataFrame, DeviceCommand, HeaderFrame, ParsedFrame,
};
pub use image::{BinaryImage, BinaryLength, ParseBinaryImage};
pub use parser::{ParserOptions, ProtocolCodec, StreamChannels, StreamParser};
pub use state::{CellParseState, FrameParseState};
pub use value::{
    AnalogValue, ChannelValue, DigitalValue, FrequencyValue, Measurement, NumericFormat,
    PhasorFormat, PhasorValue,
};
