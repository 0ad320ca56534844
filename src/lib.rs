pub mod tag;
pub mod error;
pub mod io_stream;
pub mod codec;
pub mod header;
pub mod resources;
pub mod descriptor;
pub mod additional;
pub mod layer;
pub mod document;
pub mod manifest;

pub use tag::Tag;
pub use error::{Fault, PsdError, Section};
pub use header::{ColorMode, Header};
pub use codec::{Compression, get_codec};
pub use descriptor::{Descriptor, Item};
pub use additional::{AdditionalInfo, Block};
pub use layer::{Channel, Layer, PlaneData, Rect};
pub use document::{DecodeOptions, Document, ImageData, LayerRaster};
pub use manifest::Manifest;
