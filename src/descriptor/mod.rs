//! Action descriptors: the self-describing object notation embedded in many
//! additional-info blocks.
//!
//! # Layout
//! ```text
//! descriptor := name:unicode  class_id:dynamic  count:u32  (key:dynamic item){count}
//! item       := type:tag  payload
//! ```
//!
//! Parsing is plain recursive descent driven by the item type tags; there is
//! no lookahead and no backtracking.  An unknown type tag cannot be skipped
//! (item payloads carry no length), so it ends the parse with
//! [`Fault::Unsupported`].
//!
//! # Dynamic strings
//! Class ids, enum types/values and item keys are dynamic strings: a zero
//! length announces a bare four-character code.  On write, any four-byte
//! string is emitted in that short form, which reads back identically.

mod reference;

pub use reference::Reference;

use byteorder::{BigEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::error::{Fault, PsdError, Result};
use crate::io_stream::{write_dynamic_string, write_tag, write_unicode_string, Reader};
use crate::tag::Tag;

/// Version field that precedes every embedded descriptor.
pub const DESCRIPTOR_VERSION: u32 = 16;

/// Nesting limit for objects and lists.
pub const MAX_DEPTH: usize = 64;

/// Class reference: display name plus class id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassRef {
    pub name: String,
    pub id:   String,
}

impl ClassRef {
    fn read(r: &mut Reader<'_>) -> Result<Self> {
        let name = r.read_unicode_string()?;
        let id = r.read_dynamic_string()?;
        Ok(Self { name, id })
    }

    fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_unicode_string(w, &self.name)?;
        write_dynamic_string(w, &self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `Objc` / `GlbO` / `Glb0`
    Descriptor(Descriptor),
    /// `VlLs`
    List(Vec<Item>),
    /// `doub`
    Double(f64),
    /// `UntF`: unit code such as `#Pxl` or `#Ang`.
    UnitFloat { unit: Tag, value: f64 },
    /// `TEXT`
    Text(String),
    /// `enum`
    Enum { type_id: String, value: String },
    /// `long`
    Integer(i32),
    /// `comp`
    LargeInteger(i64),
    /// `bool`
    Boolean(bool),
    /// `type` / `GlbC`
    Class(ClassRef),
    /// `alis`
    Alias(Vec<u8>),
    /// `tdta`: engine data, passed through uninterpreted.
    RawData(Vec<u8>),
    /// `obj `
    Reference(Vec<Reference>),
}

impl Item {
    pub fn type_tag(&self) -> Tag {
        match self {
            Item::Descriptor(_)     => Tag(*b"Objc"),
            Item::List(_)           => Tag(*b"VlLs"),
            Item::Double(_)         => Tag(*b"doub"),
            Item::UnitFloat { .. }  => Tag(*b"UntF"),
            Item::Text(_)           => Tag(*b"TEXT"),
            Item::Enum { .. }       => Tag(*b"enum"),
            Item::Integer(_)        => Tag(*b"long"),
            Item::LargeInteger(_)   => Tag(*b"comp"),
            Item::Boolean(_)        => Tag(*b"bool"),
            Item::Class(_)          => Tag(*b"type"),
            Item::Alias(_)          => Tag(*b"alis"),
            Item::RawData(_)        => Tag(*b"tdta"),
            Item::Reference(_)      => Tag(*b"obj "),
        }
    }

    /// Numeric value of a `doub`, `UntF`, `long` or `comp` item.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Item::Double(v)                => Some(*v),
            Item::UnitFloat { value, .. }  => Some(*value),
            Item::Integer(v)               => Some(*v as f64),
            Item::LargeInteger(v)          => Some(*v as f64),
            _                              => None,
        }
    }

    fn read(r: &mut Reader<'_>, depth: usize) -> Result<Self> {
        let start = r.position();
        let tag = r.read_tag()?;
        let item = match &tag.0 {
            b"Objc" | b"GlbO" | b"Glb0" => Item::Descriptor(Descriptor::read_nested(r, depth + 1)?),
            b"VlLs" => {
                if depth + 1 > MAX_DEPTH {
                    return Err(too_deep(r, start));
                }
                let count = r.read_u32()?;
                let mut items = Vec::new();
                for _ in 0..count {
                    items.push(Item::read(r, depth + 1)?);
                }
                Item::List(items)
            }
            b"doub" => Item::Double(r.read_f64()?),
            b"UntF" => {
                let unit = r.read_tag()?;
                let value = r.read_f64()?;
                Item::UnitFloat { unit, value }
            }
            b"TEXT" => Item::Text(r.read_unicode_string()?),
            b"enum" => {
                let type_id = r.read_dynamic_string()?;
                let value = r.read_dynamic_string()?;
                Item::Enum { type_id, value }
            }
            b"long" => Item::Integer(r.read_i32()?),
            b"comp" => Item::LargeInteger(r.read_i64()?),
            b"bool" => Item::Boolean(r.read_u8()? != 0),
            b"type" | b"GlbC" => Item::Class(ClassRef::read(r)?),
            b"alis" => {
                let len = r.read_u32()? as u64;
                Item::Alias(r.bytes_u64(len)?.to_vec())
            }
            b"tdta" => {
                let len = r.read_u32()? as u64;
                Item::RawData(r.bytes_u64(len)?.to_vec())
            }
            b"obj " => {
                let count = r.read_u32()?;
                let mut refs = Vec::new();
                for _ in 0..count {
                    refs.push(Reference::read(r)?);
                }
                Item::Reference(refs)
            }
            _ => {
                return Err(PsdError::new(
                    r.section(),
                    start,
                    Fault::Unsupported(format!("descriptor item type '{}'", tag)),
                ))
            }
        };
        Ok(item)
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_tag(w, self.type_tag())?;
        match self {
            Item::Descriptor(d) => d.write(w),
            Item::List(items) => {
                w.write_u32::<BigEndian>(items.len() as u32)?;
                items.iter().try_for_each(|item| item.write(w))
            }
            Item::Double(v) => w.write_f64::<BigEndian>(*v),
            Item::UnitFloat { unit, value } => {
                write_tag(w, *unit)?;
                w.write_f64::<BigEndian>(*value)
            }
            Item::Text(s) => write_unicode_string(w, s),
            Item::Enum { type_id, value } => {
                write_dynamic_string(w, type_id)?;
                write_dynamic_string(w, value)
            }
            Item::Integer(v) => w.write_i32::<BigEndian>(*v),
            Item::LargeInteger(v) => w.write_i64::<BigEndian>(*v),
            Item::Boolean(b) => w.write_u8(*b as u8),
            Item::Class(class) => class.write(w),
            Item::Alias(raw) | Item::RawData(raw) => {
                w.write_u32::<BigEndian>(raw.len() as u32)?;
                w.write_all(raw)
            }
            Item::Reference(refs) => {
                w.write_u32::<BigEndian>(refs.len() as u32)?;
                refs.iter().try_for_each(|r| r.write(w))
            }
        }
    }
}

fn too_deep(r: &Reader<'_>, at: u64) -> PsdError {
    PsdError::new(
        r.section(),
        at,
        Fault::Unsupported(format!("descriptor nesting deeper than {} levels", MAX_DEPTH)),
    )
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Descriptor {
    pub name:     String,
    pub class_id: String,
    /// Keys are unique; a repeated key keeps the last value read.
    pub items:    BTreeMap<String, Item>,
}

impl Descriptor {
    pub fn new(name: impl Into<String>, class_id: impl Into<String>) -> Self {
        Self { name: name.into(), class_id: class_id.into(), items: BTreeMap::new() }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, item: Item) -> Self {
        self.items.insert(key.into(), item);
        self
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Self::read_nested(r, 0)
    }

    /// Read the u32 version (which must be 16) that prefixes an embedded
    /// descriptor, then the descriptor itself.
    pub fn read_versioned(r: &mut Reader<'_>) -> Result<Self> {
        let start = r.position();
        let version = r.read_u32()?;
        if version != DESCRIPTOR_VERSION {
            return Err(PsdError::new(
                r.section(),
                start,
                Fault::Version { what: "descriptor", found: version as i64 },
            ));
        }
        Self::read(r)
    }

    fn read_nested(r: &mut Reader<'_>, depth: usize) -> Result<Self> {
        if depth > MAX_DEPTH {
            return Err(too_deep(r, r.position()));
        }
        let name = r.read_unicode_string()?;
        let class_id = r.read_dynamic_string()?;
        let count = r.read_u32()?;
        let mut items = BTreeMap::new();
        for _ in 0..count {
            let key = r.read_dynamic_string()?;
            let item = Item::read(r, depth)?;
            items.insert(key, item);
        }
        Ok(Self { name, class_id, items })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_unicode_string(w, &self.name)?;
        write_dynamic_string(w, &self.class_id)?;
        w.write_u32::<BigEndian>(self.items.len() as u32)?;
        for (key, item) in &self.items {
            write_dynamic_string(w, key)?;
            item.write(w)?;
        }
        Ok(())
    }

    pub fn write_versioned<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(DESCRIPTOR_VERSION)?;
        self.write(w)
    }

    // ── Lookups ─────────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&Item> {
        self.items.get(key)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Item::as_f64)
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        match self.get(key)? {
            Item::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Item::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.get(key)? {
            Item::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_descriptor(&self, key: &str) -> Option<&Descriptor> {
        match self.get(key)? {
            Item::Descriptor(d) => Some(d),
            _ => None,
        }
    }
}
