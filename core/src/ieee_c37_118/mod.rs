//! IEEE C37.118 codec: sync-word handling, the 14-byte prefix, and the
//! configuration, data, header and command frame layouts of the 2005 and
//! 2011 revisions.

pub mod codec;
pub mod command;
pub mod common;
pub mod config;
pub mod data;
pub mod random;

pub use codec::C37Codec;
pub use common::{FrameKind, Prefix, Version, PREFIX_LENGTH};
