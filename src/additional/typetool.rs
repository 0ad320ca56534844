use crate::descriptor::Descriptor;
use crate::error::{Fault, PsdError, Result};
use crate::io_stream::Reader;

use super::Block;

/// 2×3 affine transform of a text layer.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transform {
    pub xx: f64,
    pub xy: f64,
    pub yx: f64,
    pub yy: f64,
    pub tx: f64,
    pub ty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextBounds {
    pub left:   i32,
    pub top:    i32,
    pub right:  i32,
    pub bottom: i32,
}

/// `TySh`.  The text descriptor carries the `EngineData` raw item, which is
/// left for an engine-data parser to interpret.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeTool {
    pub transform: Transform,
    pub text:      Descriptor,
    pub warp:      Descriptor,
    pub bounds:    TextBounds,
}

fn expect_version(r: &mut Reader<'_>, what: &'static str, expected: i16) -> Result<()> {
    let start = r.position();
    let found = r.read_i16()?;
    if found != expected {
        return Err(PsdError::new(r.section(), start, Fault::Version { what, found: found as i64 }));
    }
    Ok(())
}

pub(super) fn type_tool(r: &mut Reader<'_>) -> Result<Block> {
    expect_version(r, "type tool", 1)?;
    let transform = Transform {
        xx: r.read_f64()?,
        xy: r.read_f64()?,
        yx: r.read_f64()?,
        yy: r.read_f64()?,
        tx: r.read_f64()?,
        ty: r.read_f64()?,
    };
    expect_version(r, "text data", 50)?;
    let text = Descriptor::read_versioned(r)?;
    expect_version(r, "warp data", 1)?;
    let warp = Descriptor::read_versioned(r)?;
    let bounds = TextBounds {
        left:   r.read_i32()?,
        top:    r.read_i32()?,
        right:  r.read_i32()?,
        bottom: r.read_i32()?,
    };
    Ok(Block::TypeTool(TypeTool { transform, text, warp, bounds }))
}
