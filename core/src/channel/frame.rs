//! The frame layer: the four transmission units and their shared envelope
//! behavior (id code, timestamp, cell collection, checksum trailer).

use super::cell::{ConfigurationCellCollection, DataCellCollection};
use super::collection::{Aligned, CellCollection};
use super::common::{ChannelError, UserTag, CHECKSUM_LENGTH};
use super::definition::NominalFrequency;
use super::image::BinaryLength;
use crate::utils::{Ticks, TICKS_PER_SECOND};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Highest cell index a frame may carry.
pub const MAXIMUM_CELL_INDEX: usize = u16::MAX as usize;

/// Describes one device configuration transmission: frame rate, time base
/// and one configuration cell per monitored device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigurationFrame {
    id_code: u16,
    pub ticks: Ticks,
    frame_rate: i16,
    pub time_base: u32,
    pub cells: ConfigurationCellCollection,
    published: bool,
    parsed_binary_length: Option<usize>,
    #[serde(skip)]
    tag: Option<UserTag>,
}

impl ConfigurationFrame {
    pub fn new(id_code: u16, frame_rate: i16) -> Self {
        ConfigurationFrame {
            id_code,
            ticks: Ticks::default(),
            frame_rate,
            time_base: 1_000_000,
            cells: CellCollection::new(MAXIMUM_CELL_INDEX, false),
            published: false,
            parsed_binary_length: None,
            tag: None,
        }
    }

    pub fn id_code(&self) -> u16 {
        self.id_code
    }

    pub fn set_id_code(&mut self, id_code: u16) {
        self.id_code = id_code;
    }

    /// Frames per second when positive; seconds per frame when negative.
    pub fn frame_rate(&self) -> i16 {
        self.frame_rate
    }

    pub fn set_frame_rate(&mut self, frame_rate: i16) {
        self.frame_rate = frame_rate;
    }

    /// Expected tick spacing between consecutive data frames. A zero rate
    /// is treated as one frame per second.
    pub fn ticks_per_frame(&self) -> f64 {
        if self.frame_rate > 0 {
            TICKS_PER_SECOND as f64 / self.frame_rate as f64
        } else if self.frame_rate < 0 {
            TICKS_PER_SECOND as f64 * -(self.frame_rate as f64)
        } else {
            TICKS_PER_SECOND as f64
        }
    }

    /// Propagates a 50/60 Hz designation to every contained cell.
    pub fn set_nominal_frequency(&mut self, nominal: NominalFrequency) {
        for cell in self.cells.iter_mut() {
            cell.set_nominal_frequency(nominal);
        }
    }

    pub fn published(&self) -> bool {
        self.published
    }

    pub fn set_published(&mut self, published: bool) {
        self.published = published;
    }

    pub fn parsed_binary_length(&self) -> Option<usize> {
        self.parsed_binary_length
    }

    /// Records the frame length the wire declared; once recorded it is
    /// reported verbatim instead of the recomputed sum, since a declared
    /// length may legitimately include padding or vendor extensions.
    pub fn record_parsed_length(&mut self, length: usize) {
        self.parsed_binary_length = Some(length);
    }

    pub fn tag(&self) -> Option<&UserTag> {
        self.tag.as_ref()
    }

    pub fn set_tag(&mut self, tag: UserTag) {
        self.tag = Some(tag);
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Structural equality, for reconfiguration detection: timestamps, the
/// published flag and tags are delivery state, not configuration.
impl PartialEq for ConfigurationFrame {
    fn eq(&self, other: &Self) -> bool {
        self.id_code == other.id_code
            && self.frame_rate == other.frame_rate
            && self.time_base == other.time_base
            && self.cells == other.cells
    }
}

impl BinaryLength for ConfigurationFrame {
    fn binary_length(&self) -> usize {
        match self.parsed_binary_length {
            Some(length) => length,
            None => self.cells.binary_length() + CHECKSUM_LENGTH,
        }
    }
}

/// One measurement transmission. Its identity is borrowed from the
/// configuration frame that shapes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub configuration: Arc<ConfigurationFrame>,
    pub ticks: Ticks,
    pub cells: DataCellCollection,
    published: bool,
    parsed_binary_length: Option<usize>,
    #[serde(skip)]
    tag: Option<UserTag>,
}

impl DataFrame {
    pub fn new(configuration: Arc<ConfigurationFrame>) -> Self {
        DataFrame {
            configuration,
            ticks: Ticks::default(),
            cells: CellCollection::new(MAXIMUM_CELL_INDEX, false),
            published: false,
            parsed_binary_length: None,
            tag: None,
        }
    }

    /// Mirrors the associated configuration frame's id code.
    pub fn id_code(&self) -> u16 {
        self.configuration.id_code()
    }

    /// Always fails: a data frame's id code is read-only by design. Change
    /// the associated configuration frame instead.
    pub fn set_id_code(&mut self, _id_code: u16) -> Result<(), ChannelError> {
        Err(ChannelError::ReadOnlyIdCode)
    }

    pub fn published(&self) -> bool {
        self.published
    }

    pub fn set_published(&mut self, published: bool) {
        self.published = published;
    }

    pub fn parsed_binary_length(&self) -> Option<usize> {
        self.parsed_binary_length
    }

    pub fn record_parsed_length(&mut self, length: usize) {
        self.parsed_binary_length = Some(length);
    }

    pub fn tag(&self) -> Option<&UserTag> {
        self.tag.as_ref()
    }

    pub fn set_tag(&mut self, tag: UserTag) {
        self.tag = Some(tag);
    }
}

impl BinaryLength for DataFrame {
    fn binary_length(&self) -> usize {
        match self.parsed_binary_length {
            Some(length) => length,
            None => self.cells.binary_length() + CHECKSUM_LENGTH,
        }
    }
}

/// One character of a header frame's free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderCell(pub u8);

impl BinaryLength for HeaderCell {
    fn binary_length(&self) -> usize {
        1
    }
}

impl Aligned for HeaderCell {
    fn align_on_dword_boundary(&self) -> bool {
        false
    }
    fn set_align_on_dword_boundary(&mut self, _align: bool) {}
}

/// Free-text device description, stored one cell per character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderFrame {
    id_code: u16,
    pub ticks: Ticks,
    pub cells: CellCollection<HeaderCell>,
    published: bool,
    #[serde(skip)]
    tag: Option<UserTag>,
}

impl HeaderFrame {
    pub fn new(id_code: u16) -> Self {
        HeaderFrame {
            id_code,
            ticks: Ticks::default(),
            cells: CellCollection::new(MAXIMUM_CELL_INDEX, false),
            published: false,
            tag: None,
        }
    }

    pub fn id_code(&self) -> u16 {
        self.id_code
    }

    pub fn set_id_code(&mut self, id_code: u16) {
        self.id_code = id_code;
    }

    /// The text reassembled from the per-character cells.
    pub fn header_data(&self) -> String {
        self.cells.iter().map(|cell| cell.0 as char).collect()
    }

    /// Replaces the text, one cell per byte.
    pub fn set_header_data(&mut self, text: &str) -> Result<(), ChannelError> {
        self.cells.clear();
        for &byte in text.as_bytes() {
            self.cells.push(HeaderCell(byte))?;
        }
        Ok(())
    }

    pub fn published(&self) -> bool {
        self.published
    }

    pub fn set_published(&mut self, published: bool) {
        self.published = published;
    }

    pub fn tag(&self) -> Option<&UserTag> {
        self.tag.as_ref()
    }

    pub fn set_tag(&mut self, tag: UserTag) {
        self.tag = Some(tag);
    }
}

impl BinaryLength for HeaderFrame {
    fn binary_length(&self) -> usize {
        self.cells.binary_length() + CHECKSUM_LENGTH
    }
}

/// The outbound device command vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceCommand {
    DisableRealTimeData = 1,
    EnableRealTimeData = 2,
    SendHeaderFrame = 3,
    SendConfigurationFrame1 = 4,
    SendConfigurationFrame2 = 5,
    ReceiveExtendedFrame = 8,
}

impl DeviceCommand {
    pub fn code(&self) -> u16 {
        *self as u16
    }

    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            1 => Some(DeviceCommand::DisableRealTimeData),
            2 => Some(DeviceCommand::EnableRealTimeData),
            3 => Some(DeviceCommand::SendHeaderFrame),
            4 => Some(DeviceCommand::SendConfigurationFrame1),
            5 => Some(DeviceCommand::SendConfigurationFrame2),
            8 => Some(DeviceCommand::ReceiveExtendedFrame),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DeviceCommand::DisableRealTimeData => {
                write!(f, "Turn OFF real-time data transmission")
            }
            DeviceCommand::EnableRealTimeData => write!(f, "Turn ON real-time data transmission"),
            DeviceCommand::SendHeaderFrame => write!(f, "Send header frame"),
            DeviceCommand::SendConfigurationFrame1 => write!(f, "Send configuration frame 1"),
            DeviceCommand::SendConfigurationFrame2 => write!(f, "Send configuration frame 2"),
            DeviceCommand::ReceiveExtendedFrame => write!(f, "Receive extended frame"),
        }
    }
}

/// One byte of a command frame's extended data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandCell(pub u8);

impl BinaryLength for CommandCell {
    fn binary_length(&self) -> usize {
        1
    }
}

impl Aligned for CommandCell {
    fn align_on_dword_boundary(&self) -> bool {
        false
    }
    fn set_align_on_dword_boundary(&mut self, _align: bool) {}
}

/// An outbound control instruction, optionally with extended data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandFrame {
    id_code: u16,
    pub ticks: Ticks,
    pub command: DeviceCommand,
    cells: CellCollection<CommandCell>,
    published: bool,
    #[serde(skip)]
    tag: Option<UserTag>,
}

impl CommandFrame {
    pub fn new(id_code: u16, command: DeviceCommand) -> Self {
        CommandFrame {
            id_code,
            ticks: Ticks::default(),
            command,
            cells: CellCollection::new(MAXIMUM_CELL_INDEX, false),
            published: false,
            tag: None,
        }
    }

    pub fn id_code(&self) -> u16 {
        self.id_code
    }

    pub fn set_id_code(&mut self, id_code: u16) {
        self.id_code = id_code;
    }

    pub fn extended_data(&self) -> Vec<u8> {
        self.cells.iter().map(|cell| cell.0).collect()
    }

    /// Replaces the extended data, clearing and re-filling the cell
    /// collection from the supplied bytes.
    pub fn set_extended_data(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.cells.clear();
        for &byte in data {
            self.cells.push(CommandCell(byte))?;
        }
        Ok(())
    }

    pub fn published(&self) -> bool {
        self.published
    }

    pub fn set_published(&mut self, published: bool) {
        self.published = published;
    }

    pub fn tag(&self) -> Option<&UserTag> {
        self.tag.as_ref()
    }

    pub fn set_tag(&mut self, tag: UserTag) {
        self.tag = Some(tag);
    }
}

impl BinaryLength for CommandFrame {
    fn binary_length(&self) -> usize {
        // Command word, extended data, checksum trailer
        2 + self.cells.binary_length() + CHECKSUM_LENGTH
    }
}

/// Any frame a protocol codec can produce, plus the fallback for byte runs
/// that validated but could not be classified.
#[derive(Debug, Clone)]
pub enum ParsedFrame {
    Configuration(Arc<ConfigurationFrame>),
    Data(DataFrame),
    Header(HeaderFrame),
    Command(CommandFrame),
    Undetermined(Vec<u8>),
}

impl ParsedFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            ParsedFrame::Configuration(_) => "configuration",
            ParsedFrame::Data(_) => "data",
            ParsedFrame::Header(_) => "header",
            ParsedFrame::Command(_) => "command",
            ParsedFrame::Undetermined(_) => "undetermined",
        }
    }
}
