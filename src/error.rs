//! Error taxonomy shared by every decoder stage.
//!
//! A [`Fault`] says *what* went wrong; a [`PsdError`] adds *where*: the
//! section being decoded and the absolute byte offset of the read that
//! failed.  Leaf decoders of additional-info blocks only produce faults,
//! which the dispatcher either records next to the retained raw payload or
//! escalates, depending on [`DecodeOptions::strict_blocks`].
//!
//! [`DecodeOptions::strict_blocks`]: crate::document::DecodeOptions

use std::fmt;
use std::io;
use thiserror::Error;

use crate::tag::Tag;

// ── Section ──────────────────────────────────────────────────────────────────

/// Region of the document a fault was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Header,
    ColorModeData,
    ImageResources,
    LayerAndMask,
    LayerInfo,
    LayerRecord,
    ChannelData,
    GlobalLayerMask,
    AdditionalInfo(Tag),
    ImageData,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Section::Header             => f.write_str("header"),
            Section::ColorModeData      => f.write_str("color mode data"),
            Section::ImageResources     => f.write_str("image resources"),
            Section::LayerAndMask       => f.write_str("layer and mask info"),
            Section::LayerInfo          => f.write_str("layer info"),
            Section::LayerRecord        => f.write_str("layer record"),
            Section::ChannelData        => f.write_str("channel data"),
            Section::GlobalLayerMask    => f.write_str("global layer mask"),
            Section::AdditionalInfo(k)  => write!(f, "additional info '{}'", k),
            Section::ImageData          => f.write_str("image data"),
        }
    }
}

// ── Fault ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    /// Magic, signature or enumerant mismatch.
    #[error("invalid {what}: expected {expected}, found {found}")]
    Format { what: &'static str, expected: String, found: String },

    #[error("unsupported {what} version {found}")]
    Version { what: &'static str, found: i64 },

    /// Declared size or count outside the allowed set for its field.
    #[error("{what} {found} is not an allowed value")]
    Size { what: &'static str, found: u64 },

    /// Declared length exceeds what the enclosing region holds, or
    /// contradicts the dimensions it must describe.
    #[error("declared length {declared} does not fit the {available} bytes available")]
    Bounds { declared: u64, available: u64 },

    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: u64, remaining: u64 },

    #[error("unsupported feature: {0}")]
    Unsupported(String),

    /// A PackBits scanline did not decode to exactly its declared width.
    #[error("corrupt run-length data: {0}")]
    Corrupt(String),

    #[error("decode cancelled")]
    Cancelled,
}

// ── PsdError ─────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum PsdError {
    #[error("{section} at offset {offset}: {fault}")]
    Decode { section: Section, offset: u64, fault: Fault },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PsdError {
    pub fn new(section: Section, offset: u64, fault: Fault) -> Self {
        PsdError::Decode { section, offset, fault }
    }

    /// The underlying fault, if this error came from the decoder.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            PsdError::Decode { fault, .. } => Some(fault),
            PsdError::Io(_)                => None,
        }
    }

    pub fn section(&self) -> Option<Section> {
        match self {
            PsdError::Decode { section, .. } => Some(*section),
            PsdError::Io(_)                  => None,
        }
    }

    pub fn offset(&self) -> Option<u64> {
        match self {
            PsdError::Decode { offset, .. } => Some(*offset),
            PsdError::Io(_)                 => None,
        }
    }
}

/// Convenience alias used across the decoder.
pub type Result<T, E = PsdError> = std::result::Result<T, E>;
