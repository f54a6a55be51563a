//! The streaming frame parser: adapts an arbitrarily-chunked byte stream
//! into discrete frame-parse calls, independent of how the bytes arrive.
//!
//! A write may contain zero, one or many frames, or a fragment of one; the
//! parser aligns to the codec's synchronization byte once at stream start,
//! carries unconsumed tails between writes, and delivers parsed frames over
//! per-kind channels. Data errors never propagate out of `write`: a faulted
//! buffer is dropped, reported on the error channel, and the parser keeps
//! accepting bytes.

use super::checksum::ChecksumKind;
use super::common::{ParseError, StreamError, SYNC_BYTE};
use super::frame::{CommandFrame, ConfigurationFrame, DataFrame, HeaderFrame, ParsedFrame};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A protocol-specific single-frame parser driven by [`StreamParser`].
///
/// `parse_frame` attempts to parse exactly one frame at the start of the
/// buffer. Returning `Ok(None)` means "not enough bytes yet" and is never an
/// error; returning a frame with zero consumed bytes is permitted only when
/// the call made progress through internal codec state (a codec must not
/// return the same frame with zero consumption twice in a row).
pub trait ProtocolCodec: Send {
    fn name(&self) -> &'static str;

    /// Byte used to locate the start of the first frame in an unaligned
    /// stream, or `None` for protocols that carry no marker.
    fn sync_byte(&self) -> Option<u8> {
        Some(SYNC_BYTE)
    }

    fn checksum_kind(&self) -> ChecksumKind {
        ChecksumKind::CrcCcitt
    }

    /// The configuration frame currently shaping data-frame parses.
    fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        None
    }

    /// Replaces the held configuration wholesale.
    fn set_configuration(&mut self, _configuration: Arc<ConfigurationFrame>) {}

    fn parse_frame(&mut self, buffer: &[u8]) -> Result<Option<(ParsedFrame, usize)>, ParseError>;
}

/// Receiving ends of the parser's delivery channels, one per frame kind
/// plus reconfiguration notices, stream errors and the optional raw echo.
pub struct StreamChannels {
    pub configuration_frames: Receiver<Arc<ConfigurationFrame>>,
    pub data_frames: Receiver<DataFrame>,
    pub header_frames: Receiver<HeaderFrame>,
    pub command_frames: Receiver<CommandFrame>,
    pub undetermined_frames: Receiver<Vec<u8>>,
    pub configuration_changes: Receiver<Arc<ConfigurationFrame>>,
    pub stream_errors: Receiver<StreamError>,
    pub received_buffers: Option<Receiver<Vec<u8>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct ParserOptions {
    /// Hand buffers to a dedicated worker instead of parsing on the calling
    /// thread. Frees the I/O thread at the cost of latency and queue memory.
    pub parse_on_separate_thread: bool,
    /// Echo every received buffer on a diagnostics channel.
    pub echo_received_buffers: bool,
    /// Bound of the worker queue when parsing on a separate thread.
    pub queue_capacity: usize,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            parse_on_separate_thread: false,
            echo_received_buffers: false,
            queue_capacity: 128,
        }
    }
}

struct Dispatch {
    configuration_tx: Sender<Arc<ConfigurationFrame>>,
    data_tx: Sender<DataFrame>,
    header_tx: Sender<HeaderFrame>,
    command_tx: Sender<CommandFrame>,
    undetermined_tx: Sender<Vec<u8>>,
    configuration_change_tx: Sender<Arc<ConfigurationFrame>>,
    error_tx: Sender<StreamError>,
    echo_tx: Option<Sender<Vec<u8>>>,
    current_configuration: Arc<Mutex<Option<Arc<ConfigurationFrame>>>>,
}

impl Dispatch {
    fn send_error(&self, context: &str, error: ParseError) {
        log::warn!("{}: {}", context, error);
        let _ = self.error_tx.send(StreamError {
            context: context.to_string(),
            error,
        });
    }
}

/// The reassembly state machine. Lives on the calling thread in inline
/// mode, or inside the worker when parsing on a separate thread.
struct ParserCore {
    codec: Box<dyn ProtocolCodec>,
    dispatch: Dispatch,
    carryover: Vec<u8>,
    initialized: bool,
}

impl ParserCore {
    fn write(&mut self, bytes: &[u8]) {
        if let Some(echo_tx) = &self.dispatch.echo_tx {
            let _ = echo_tx.send(bytes.to_vec());
        }

        let mut working = std::mem::take(&mut self.carryover);
        working.extend_from_slice(bytes);

        // Align to the first frame boundary once; bytes before the first
        // sync byte are discarded (the stream may begin mid-frame).
        if !self.initialized {
            match self.codec.sync_byte() {
                Some(sync) => match working.iter().position(|&byte| byte == sync) {
                    Some(position) => {
                        if position > 0 {
                            working.drain(..position);
                        }
                        self.initialized = true;
                    }
                    None => return,
                },
                None => self.initialized = true,
            }
        }

        let mut offset = 0;
        loop {
            match self.codec.parse_frame(&working[offset..]) {
                Ok(Some((frame, consumed))) => {
                    offset += consumed;
                    self.dispatch_frame(frame);
                }
                Ok(None) => break,
                Err(error) => {
                    // Drop the faulted buffer rather than re-parsing a
                    // corrupt prefix on every subsequent write; the stream
                    // re-aligns on the next sync byte.
                    self.initialized = false;
                    self.dispatch.send_error("parsing data stream", error);
                    return;
                }
            }
        }
        self.carryover = working.split_off(offset);
    }

    fn set_configuration(&mut self, configuration: Arc<ConfigurationFrame>) {
        if let Ok(mut slot) = self.dispatch.current_configuration.lock() {
            *slot = Some(configuration.clone());
        }
        self.codec.set_configuration(configuration);
    }

    fn dispatch_frame(&mut self, frame: ParsedFrame) {
        match frame {
            ParsedFrame::Configuration(configuration) => {
                let changed = {
                    match self.dispatch.current_configuration.lock() {
                        Ok(mut slot) => {
                            let changed = match slot.as_ref() {
                                Some(previous) => **previous != *configuration,
                                None => false,
                            };
                            // Replaced wholesale: holders of the previous
                            // reference keep seeing a consistent frame.
                            *slot = Some(configuration.clone());
                            changed
                        }
                        Err(_) => false,
                    }
                };
                self.codec.set_configuration(configuration.clone());
                if changed {
                    let _ = self
                        .dispatch
                        .configuration_change_tx
                        .send(configuration.clone());
                }
                let _ = self.dispatch.configuration_tx.send(configuration);
            }
            ParsedFrame::Data(mut frame) => {
                frame.set_published(true);
                let _ = self.dispatch.data_tx.send(frame);
            }
            ParsedFrame::Header(mut frame) => {
                frame.set_published(true);
                let _ = self.dispatch.header_tx.send(frame);
            }
            ParsedFrame::Command(mut frame) => {
                frame.set_published(true);
                let _ = self.dispatch.command_tx.send(frame);
            }
            ParsedFrame::Undetermined(bytes) => {
                let _ = self.dispatch.undetermined_tx.send(bytes);
            }
        }
    }
}

enum WorkItem {
    Buffer(Vec<u8>),
    SetConfiguration(Arc<ConfigurationFrame>),
}

enum Engine {
    Inline(ParserCore),
    Threaded {
        tx: SyncSender<WorkItem>,
        handle: JoinHandle<()>,
    },
}

/// A write-only sink that reassembles a protocol's frames from a chunked
/// byte stream and delivers them over [`StreamChannels`].
pub struct StreamParser {
    engine: Option<Engine>,
    codec_name: &'static str,
    sync_byte: Option<u8>,
    checksum_kind: ChecksumKind,
    current_configuration: Arc<Mutex<Option<Arc<ConfigurationFrame>>>>,
    queue_depth: Arc<AtomicUsize>,
    parse_on_separate_thread: bool,
}

impl StreamParser {
    pub fn new(codec: Box<dyn ProtocolCodec>) -> (Self, StreamChannels) {
        Self::with_options(codec, ParserOptions::default())
    }

    pub fn with_options(
        codec: Box<dyn ProtocolCodec>,
        options: ParserOptions,
    ) -> (Self, StreamChannels) {
        let (configuration_tx, configuration_frames) = mpsc::channel();
        let (data_tx, data_frames) = mpsc::channel();
        let (header_tx, header_frames) = mpsc::channel();
        let (command_tx, command_frames) = mpsc::channel();
        let (undetermined_tx, undetermined_frames) = mpsc::channel();
        let (configuration_change_tx, configuration_changes) = mpsc::channel();
        let (error_tx, stream_errors) = mpsc::channel();
        let (echo_tx, received_buffers) = if options.echo_received_buffers {
            let (tx, rx) = mpsc::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let current_configuration = Arc::new(Mutex::new(None));
        let codec_name = codec.name();
        let sync_byte = codec.sync_byte();
        let checksum_kind = codec.checksum_kind();

        let dispatch = Dispatch {
            configuration_tx,
            data_tx,
            header_tx,
            command_tx,
            undetermined_tx,
            configuration_change_tx,
            error_tx,
            echo_tx,
            current_configuration: current_configuration.clone(),
        };

        let core = ParserCore {
            codec,
            dispatch,
            carryover: Vec::new(),
            initialized: false,
        };

        let queue_depth = Arc::new(AtomicUsize::new(0));
        let engine = if options.parse_on_separate_thread {
            let (tx, rx) = mpsc::sync_channel::<WorkItem>(options.queue_capacity.max(1));
            let depth = queue_depth.clone();
            let mut core = core;
            let handle = thread::spawn(move || {
                while let Ok(item) = rx.recv() {
                    let mut buffer = match item {
                        WorkItem::Buffer(buffer) => {
                            depth.fetch_sub(1, Ordering::SeqCst);
                            buffer
                        }
                        WorkItem::SetConfiguration(configuration) => {
                            core.set_configuration(configuration);
                            continue;
                        }
                    };
                    // Buffers that piled up while we were busy are parsed
                    // together in one pass.
                    loop {
                        match rx.try_recv() {
                            Ok(WorkItem::Buffer(more)) => {
                                depth.fetch_sub(1, Ordering::SeqCst);
                                buffer.extend_from_slice(&more);
                            }
                            Ok(WorkItem::SetConfiguration(configuration)) => {
                                core.set_configuration(configuration);
                            }
                            Err(_) => break,
                        }
                    }
                    core.write(&buffer);
                }
            });
            Engine::Threaded { tx, handle }
        } else {
            Engine::Inline(core)
        };

        let parser = StreamParser {
            engine: Some(engine),
            codec_name,
            sync_byte,
            checksum_kind,
            current_configuration,
            queue_depth,
            parse_on_separate_thread: options.parse_on_separate_thread,
        };

        let channels = StreamChannels {
            configuration_frames,
            data_frames,
            header_frames,
            command_frames,
            undetermined_frames,
            configuration_changes,
            stream_errors,
            received_buffers,
        };

        (parser, channels)
    }

    /// Accepts the next run of stream bytes. Never fails on data errors;
    /// those surface on the stream-error channel.
    pub fn write(&mut self, buffer: &[u8]) {
        match self.engine.as_mut() {
            Some(Engine::Inline(core)) => core.write(buffer),
            Some(Engine::Threaded { tx, .. }) => {
                self.queue_depth.fetch_add(1, Ordering::SeqCst);
                if tx.send(WorkItem::Buffer(buffer.to_vec())).is_err() {
                    self.queue_depth.fetch_sub(1, Ordering::SeqCst);
                    log::warn!("Parse worker unavailable; dropping buffer");
                }
            }
            None => log::warn!("Write after stop ignored"),
        }
    }

    /// Seeds the parser with an externally obtained configuration frame.
    pub fn set_configuration(&mut self, configuration: Arc<ConfigurationFrame>) {
        match self.engine.as_mut() {
            Some(Engine::Inline(core)) => core.set_configuration(configuration),
            Some(Engine::Threaded { tx, .. }) => {
                let _ = tx.send(WorkItem::SetConfiguration(configuration));
            }
            None => {}
        }
    }

    /// The configuration frame shaping the current stream, if one has been
    /// received or set.
    pub fn configuration(&self) -> Option<Arc<ConfigurationFrame>> {
        self.current_configuration
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
    }

    pub fn is_active(&self) -> bool {
        self.engine.is_some()
    }

    /// Pending buffers when parsing on a separate thread.
    pub fn queued_buffers(&self) -> usize {
        self.queue_depth.load(Ordering::SeqCst)
    }

    /// Stops the parser: the worker queue (if any) is drained and joined,
    /// and any partial carryover is released unparsed.
    pub fn stop(&mut self) {
        match self.engine.take() {
            Some(Engine::Inline(core)) => drop(core),
            Some(Engine::Threaded { tx, handle }) => {
                drop(tx);
                let _ = handle.join();
            }
            None => {}
        }
    }

    /// Human-readable parser diagnostics.
    pub fn status(&self) -> String {
        let mut status = String::new();
        status.push_str(&format!("Stream codec:         {}\n", self.codec_name));
        status.push_str(&format!(
            "Parser state:         {}\n",
            if self.is_active() { "active" } else { "stopped" }
        ));
        match self.sync_byte {
            Some(sync) => status.push_str(&format!("Sync byte:            0x{:02X}\n", sync)),
            None => status.push_str("Sync byte:            none\n"),
        }
        status.push_str(&format!("Frame checksum:       {}\n", self.checksum_kind));
        match self.configuration() {
            Some(configuration) => {
                status.push_str(&format!(
                    "Configuration frame:  received ({} cells)\n",
                    configuration.cells.len()
                ));
                for cell in configuration.cells.iter() {
                    status.push_str(&format!(
                        "                        {} ({})\n",
                        cell.station_name(),
                        cell.id_code()
                    ));
                }
                status.push_str(&format!(
                    "Frame rate:           {} frames/sec\n",
                    configuration.frame_rate()
                ));
            }
            None => status.push_str("Configuration frame:  not received\n"),
        }
        if self.parse_on_separate_thread {
            status.push_str(&format!(
                "Parse thread:         separate (queued buffers: {})\n",
                self.queued_buffers()
            ));
        } else {
            status.push_str("Parse thread:         inline\n");
        }
        status
    }
}

impl Drop for StreamParser {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A toy codec for exercising the reassembly loop: each frame is
    /// `[0xAA, total_length, payload...]`.
    struct ByteCodec;

    impl ProtocolCodec for ByteCodec {
        fn name(&self) -> &'static str {
            "byte codec"
        }

        fn parse_frame(
            &mut self,
            buffer: &[u8],
        ) -> Result<Option<(ParsedFrame, usize)>, ParseError> {
            if buffer.len() < 2 {
                return Ok(None);
            }
            if buffer[0] != 0xAA {
                return Err(ParseError::InvalidFrameType {
                    message: format!("expected sync 0xAA, got 0x{:02X}", buffer[0]),
                });
            }
            let length = buffer[1] as usize;
            if length < 2 {
                return Err(ParseError::InvalidLength {
                    message: format!("frame length {} too small", length),
                });
            }
            if buffer.len() < length {
                return Ok(None);
            }
            Ok(Some((
                ParsedFrame::Undetermined(buffer[2..length].to_vec()),
                length,
            )))
        }
    }

    fn frame(payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0xAA, (payload.len() + 2) as u8];
        bytes.extend_from_slice(payload);
        bytes
    }

    fn drain(receiver: &Receiver<Vec<u8>>) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        while let Ok(frame) = receiver.try_recv() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_single_write_many_frames() {
        let (mut parser, channels) = StreamParser::new(Box::new(ByteCodec));
        let mut stream = Vec::new();
        stream.extend_from_slice(&frame(&[1]));
        stream.extend_from_slice(&frame(&[2, 2]));
        stream.extend_from_slice(&frame(&[3, 3, 3]));
        parser.write(&stream);

        let frames = drain(&channels.undetermined_frames);
        assert_eq!(frames, vec![vec![1], vec![2, 2], vec![3, 3, 3]]);
    }

    #[test]
    fn test_chunked_writes_reassemble_identically() {
        let mut stream = Vec::new();
        for payload in [&[1u8, 1][..], &[2], &[3, 3, 3], &[4]] {
            stream.extend_from_slice(&frame(payload));
        }

        // One shot
        let (mut parser, channels) = StreamParser::new(Box::new(ByteCodec));
        parser.write(&stream);
        let whole = drain(&channels.undetermined_frames);

        // Byte-at-a-time
        let (mut parser, channels) = StreamParser::new(Box::new(ByteCodec));
        for byte in &stream {
            parser.write(std::slice::from_ref(byte));
        }
        assert_eq!(drain(&channels.undetermined_frames), whole);

        // Odd chunk sizes
        let (mut parser, channels) = StreamParser::new(Box::new(ByteCodec));
        for chunk in stream.chunks(3) {
            parser.write(chunk);
        }
        assert_eq!(drain(&channels.undetermined_frames), whole);
    }

    #[test]
    fn test_sync_recovery_discards_exact_garbage_prefix() {
        let (mut parser, channels) = StreamParser::new(Box::new(ByteCodec));
        let mut stream = vec![0x01, 0x02, 0x03, 0x7F]; // no byte matches 0xAA
        stream.extend_from_slice(&frame(&[42]));
        stream.extend_from_slice(&frame(&[43]));
        parser.write(&stream);

        let frames = drain(&channels.undetermined_frames);
        assert_eq!(frames, vec![vec![42], vec![43]]);
        assert!(channels.stream_errors.try_recv().is_err());
    }

    #[test]
    fn test_garbage_only_writes_stay_uninitialized() {
        let (mut parser, channels) = StreamParser::new(Box::new(ByteCodec));
        parser.write(&[0x01, 0x02]);
        parser.write(&[0x03]);
        parser.write(&frame(&[7]));
        assert_eq!(drain(&channels.undetermined_frames), vec![vec![7]]);
    }

    #[test]
    fn test_parse_error_reported_and_stream_recovers() {
        let (mut parser, channels) = StreamParser::new(Box::new(ByteCodec));
        parser.write(&frame(&[1]));
        // A sync byte followed by a bad length faults the buffer
        parser.write(&[0xAA, 0x00]);
        let error = channels
            .stream_errors
            .recv_timeout(Duration::from_secs(1))
            .unwrap();
        assert!(matches!(error.error, ParseError::InvalidLength { .. }));

        // Subsequent writes still parse
        parser.write(&frame(&[8, 9]));
        assert_eq!(drain(&channels.undetermined_frames), vec![vec![1], vec![8, 9]]);
    }

    #[test]
    fn test_threaded_parsing_preserves_order() {
        let options = ParserOptions {
            parse_on_separate_thread: true,
            ..ParserOptions::default()
        };
        let (mut parser, channels) = StreamParser::with_options(Box::new(ByteCodec), options);
        for i in 0u8..50 {
            parser.write(&frame(&[i]));
        }

        let mut received = Vec::new();
        for _ in 0..50 {
            received.push(
                channels
                    .undetermined_frames
                    .recv_timeout(Duration::from_secs(5))
                    .unwrap(),
            );
        }
        let expected: Vec<Vec<u8>> = (0u8..50).map(|i| vec![i]).collect();
        assert_eq!(received, expected);

        parser.stop();
        assert!(!parser.is_active());
        assert_eq!(parser.queued_buffers(), 0);
    }

    #[test]
    fn test_echo_channel() {
        let options = ParserOptions {
            echo_received_buffers: true,
            ..ParserOptions::default()
        };
        let (mut parser, channels) = StreamParser::with_options(Box::new(ByteCodec), options);
        let bytes = frame(&[1, 2, 3]);
        parser.write(&bytes);
        let echo = channels.received_buffers.as_ref().unwrap();
        assert_eq!(echo.try_recv().unwrap(), bytes);
    }

    #[test]
    fn test_status_reports_state() {
        let (mut parser, _channels) = StreamParser::new(Box::new(ByteCodec));
        let status = parser.status();
        assert!(status.contains("byte codec"));
        assert!(status.contains("active"));
        assert!(status.contains("0xAA"));
        assert!(status.contains("not received"));

        parser.stop();
        assert!(parser.status().contains("stopped"));
    }
}
