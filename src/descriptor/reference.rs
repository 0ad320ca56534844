//! Items of a reference list (`obj `).  Each entry carries its own
//! second-level type tag.

use byteorder::{BigEndian, WriteBytesExt};
use std::io::{self, Write};

use crate::error::{Fault, PsdError, Result};
use crate::io_stream::{write_dynamic_string, write_tag, write_unicode_string, Reader};
use crate::tag::Tag;

use super::ClassRef;

#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    /// `prop`
    Property { class: ClassRef, key: String },
    /// `Clss`
    Class(ClassRef),
    /// `Enmr`
    Enum { class: ClassRef, type_id: String, value: String },
    /// `rele`
    Offset { class: ClassRef, value: i32 },
    /// `Idnt`
    Identifier(i32),
    /// `indx`
    Index(i32),
    /// `name`
    Name(String),
}

impl Reference {
    pub fn type_tag(&self) -> Tag {
        match self {
            Reference::Property { .. } => Tag(*b"prop"),
            Reference::Class(_)        => Tag(*b"Clss"),
            Reference::Enum { .. }     => Tag(*b"Enmr"),
            Reference::Offset { .. }   => Tag(*b"rele"),
            Reference::Identifier(_)   => Tag(*b"Idnt"),
            Reference::Index(_)        => Tag(*b"indx"),
            Reference::Name(_)         => Tag(*b"name"),
        }
    }

    pub(crate) fn read(r: &mut Reader<'_>) -> Result<Self> {
        let start = r.position();
        let tag = r.read_tag()?;
        Ok(match &tag.0 {
            b"prop" => {
                let class = ClassRef::read(r)?;
                let key = r.read_dynamic_string()?;
                Reference::Property { class, key }
            }
            b"Clss" => Reference::Class(ClassRef::read(r)?),
            b"Enmr" => {
                let class = ClassRef::read(r)?;
                let type_id = r.read_dynamic_string()?;
                let value = r.read_dynamic_string()?;
                Reference::Enum { class, type_id, value }
            }
            b"rele" => {
                let class = ClassRef::read(r)?;
                let value = r.read_i32()?;
                Reference::Offset { class, value }
            }
            b"Idnt" => Reference::Identifier(r.read_i32()?),
            b"indx" => Reference::Index(r.read_i32()?),
            b"name" => Reference::Name(r.read_unicode_string()?),
            _ => {
                return Err(PsdError::new(
                    r.section(),
                    start,
                    Fault::Unsupported(format!("reference item type '{}'", tag)),
                ))
            }
        })
    }

    pub(crate) fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write_tag(w, self.type_tag())?;
        match self {
            Reference::Property { class, key } => {
                class.write(w)?;
                write_dynamic_string(w, key)
            }
            Reference::Class(class) => class.write(w),
            Reference::Enum { class, type_id, value } => {
                class.write(w)?;
                write_dynamic_string(w, type_id)?;
                write_dynamic_string(w, value)
            }
            Reference::Offset { class, value } => {
                class.write(w)?;
                w.write_i32::<BigEndian>(*value)
            }
            Reference::Identifier(v) | Reference::Index(v) => w.write_i32::<BigEndian>(*v),
            Reference::Name(name) => write_unicode_string(w, name),
        }
    }
}
