//! The C37.118 protocol codec driven by the streaming parser.

use super::command::{parse_command, parse_header};
use super::common::{FrameKind, Version, PREFIX_LENGTH};
use super::config::parse_configuration;
use super::data::parse_data;
use crate::channel::checksum::{validate_frame, ChecksumKind};
use crate::channel::common::{ParseError, CHECKSUM_LENGTH};
use crate::channel::frame::{ConfigurationFrame, ParsedFrame};
use crate::channel::parser::ProtocolCodec;
use std::sync::Arc;

/// Parses one C37.118 frame at a time, holding the latest configuration
/// frame so subsequent data frames can be shaped.
pub struct C37Codec {
    version: Version,
    configuration: Option<Arc<ConfigurationFrame>>,
}

impl C37Codec {
    pub fn new(version: Version) -> Self {
        C37Codec {
            version,
            configuration: None,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }
}

impl Default for C37Codec {
    fn default() -> Self {
        C37Codec::new(Version::default())
    }
}

impl ProtocolCodec for C37Codec {
    fn name(&self) -> &'static str {
        "IEEE C37.118"
    }

    fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        self.configuration.clone()
    }

    fn set_configuration(&mut self, configuration: Arc<ConfigurationFrame>) {
        self.configuration = Some(configuration);
    }

    fn parse_frame(&mut self, buffer: &[u8]) -> Result<Option<(ParsedFrame, usize)>, ParseError> {
        // SYNC and FRAMESIZE are enough to know how much we need
        if buffer.len() < 4 {
            return Ok(None);
        }
        let sync = u16::from_be_bytes([buffer[0], buffer[1]]);
        let kind = FrameKind::from_sync(sync)?;
        let framesize = u16::from_be_bytes([buffer[2], buffer[3]]) as usize;
        if framesize < PREFIX_LENGTH + CHECKSUM_LENGTH {
            return Err(ParseError::InvalidLength {
                message: format!("declared frame size {} below minimum", framesize),
            });
        }
        if buffer.len() < framesize {
            return Ok(None);
        }
        let frame_bytes = &buffer[..framesize];

        let frame = match kind {
            FrameKind::Config1 | FrameKind::Config2 => {
                let configuration = Arc::new(parse_configuration(frame_bytes)?);
                self.configuration = Some(configuration.clone());
                ParsedFrame::Configuration(configuration)
            }
            FrameKind::Data => match &self.configuration {
                Some(configuration) => {
                    ParsedFrame::Data(parse_data(frame_bytes, configuration)?)
                }
                None => {
                    // A data frame before any configuration cannot be
                    // shaped; validate its envelope and surface it raw.
                    validate_frame(ChecksumKind::CrcCcitt, frame_bytes)?;
                    ParsedFrame::Undetermined(frame_bytes.to_vec())
                }
            },
            FrameKind::Header => ParsedFrame::Header(parse_header(frame_bytes)?),
            FrameKind::Command => ParsedFrame::Command(parse_command(frame_bytes)?),
        };
        Ok(Some((frame, framesize)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::command::{encode_command, new_enable_real_time_data};
    use crate::ieee_c37_118::config::sample_frame;
    use crate::ieee_c37_118::config::encode_configuration;
    use crate::utils::Ticks;

    #[test]
    fn test_codec_needs_config_before_data() {
        let mut codec = C37Codec::default();
        let configuration = sample_frame();
        let config_bytes =
            encode_configuration(&configuration, Version::V2011, FrameKind::Config2).unwrap();

        // Partial prefix: not enough to determine anything
        assert!(codec.parse_frame(&config_bytes[..3]).unwrap().is_none());
        // Complete prefix but truncated frame: still waiting
        assert!(codec
            .parse_frame(&config_bytes[..config_bytes.len() - 1])
            .unwrap()
            .is_none());

        let (frame, consumed) = codec.parse_frame(&config_bytes).unwrap().unwrap();
        assert_eq!(consumed, config_bytes.len());
        assert!(matches!(frame, ParsedFrame::Configuration(_)));
        assert!(codec.configuration().is_some());
    }

    #[test]
    fn test_command_frames_classified() {
        let mut codec = C37Codec::default();
        let command = new_enable_real_time_data(7, Some(Ticks(0)));
        let bytes = encode_command(&command, Version::V2011);
        let (frame, consumed) = codec.parse_frame(&bytes).unwrap().unwrap();
        assert_eq!(consumed, bytes.len());
        assert!(matches!(frame, ParsedFrame::Command(_)));
    }

    #[test]
    fn test_bad_sync_is_error() {
        let mut codec = C37Codec::default();
        let result = codec.parse_frame(&[0x55, 0x01, 0x00, 0x10]);
        assert!(matches!(result, Err(ParseError::InvalidFrameType { .. })));
    }
}
