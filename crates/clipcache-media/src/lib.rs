//! ClipCache Media - decoding frames for the clip cache
//!
//! This crate handles:
//! - The [`FrameDecoder`] interface the clip cache decodes through
//! - Numbered image sequences on disk, including proxy frames
//! - File name parsing and sequence length probing

pub mod decoder;
pub mod sequence;

pub use decoder::{DecodeRequest, FrameDecoder, ImageSequenceDecoder, ProxySize};
pub use sequence::{probe_sequence_length, SequencePattern};
