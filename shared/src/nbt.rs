//! Tagged compound-tree codec used by the world file format.
//!
//! A stream is a root compound: the compound tag id, a name, then a sequence
//! of named tags terminated by an end tag. All numbers are big-endian and
//! integer payloads are handed out unsigned.
//!
//! Writing is a flat sequence of [`Emit`] actions. The encoder does not track
//! nesting, so every [`Emit::Compound`] must be closed by an [`Emit::End`] from
//! the caller. [`write_root`] lowers a whole [`Compound`] into such a sequence.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use thiserror::Error;

/// Compounds nested deeper than this are rejected while decoding.
pub const MAX_DEPTH: usize = 512;

/// Tag discriminator byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TagKind {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl TagKind {
    pub fn from_id(id: u8) -> Option<Self> {
        let kind = match id {
            0 => TagKind::End,
            1 => TagKind::Byte,
            2 => TagKind::Short,
            3 => TagKind::Int,
            4 => TagKind::Long,
            5 => TagKind::Float,
            6 => TagKind::Double,
            7 => TagKind::ByteArray,
            8 => TagKind::String,
            9 => TagKind::List,
            10 => TagKind::Compound,
            11 => TagKind::IntArray,
            12 => TagKind::LongArray,
            _ => return None,
        };
        Some(kind)
    }

    pub fn id(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Error)]
pub enum NbtError {
    #[error("wrong tag id: expected {expected}, got {actual}")]
    WrongTagId { expected: u8, actual: u8 },

    #[error("invalid tag id {0}")]
    InvalidTagKind(u8),

    #[error("invalid length {0}")]
    InvalidLength(i64),

    #[error("compounds nested deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("{0:?} tags are not supported")]
    Unsupported(TagKind),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, NbtError>;

/// Named tags of a compound. Names are unique, order carries no meaning.
pub type Compound = HashMap<String, Tag>;

/// A decoded tag payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    Byte(u8),
    Short(u16),
    Int(u32),
    Long(u64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    Compound(Compound),
}

impl Tag {
    pub fn kind(&self) -> TagKind {
        match self {
            Tag::Byte(_) => TagKind::Byte,
            Tag::Short(_) => TagKind::Short,
            Tag::Int(_) => TagKind::Int,
            Tag::Long(_) => TagKind::Long,
            Tag::Float(_) => TagKind::Float,
            Tag::Double(_) => TagKind::Double,
            Tag::ByteArray(_) => TagKind::ByteArray,
            Tag::String(_) => TagKind::String,
            Tag::Compound(_) => TagKind::Compound,
        }
    }

    pub fn as_byte(&self) -> Option<u8> {
        match self {
            Tag::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_short(&self) -> Option<u16> {
        match self {
            Tag::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tag::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_byte_array(&self) -> Option<&[u8]> {
        match self {
            Tag::ByteArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&Compound> {
        match self {
            Tag::Compound(v) => Some(v),
            _ => None,
        }
    }

    /// Moves the byte array out, used for large block arrays.
    pub fn into_byte_array(self) -> Option<Vec<u8>> {
        match self {
            Tag::ByteArray(v) => Some(v),
            _ => None,
        }
    }
}

/// Reads a root compound, returning it together with its name.
pub fn decode<R: Read>(reader: &mut R) -> Result<(Compound, String)> {
    let id = read_u8(reader)?;
    if id != TagKind::Compound.id() {
        return Err(NbtError::WrongTagId {
            expected: TagKind::Compound.id(),
            actual: id,
        });
    }
    let name = read_name(reader)?;
    let root = read_compound(reader, 0)?;
    Ok((root, name))
}

fn read_compound<R: Read>(reader: &mut R, depth: usize) -> Result<Compound> {
    if depth >= MAX_DEPTH {
        return Err(NbtError::TooDeep);
    }

    let mut out = Compound::new();
    loop {
        let id = read_u8(reader)?;
        let kind = TagKind::from_id(id).ok_or(NbtError::InvalidTagKind(id))?;
        // end tags have no name
        if kind == TagKind::End {
            return Ok(out);
        }
        let name = read_name(reader)?;
        let tag = read_payload(reader, kind, depth)?;
        out.insert(name, tag);
    }
}

fn read_payload<R: Read>(reader: &mut R, kind: TagKind, depth: usize) -> Result<Tag> {
    let tag = match kind {
        TagKind::End => return Err(NbtError::InvalidTagKind(kind.id())),
        TagKind::Byte => Tag::Byte(read_u8(reader)?),
        TagKind::Short => Tag::Short(u16::from_be_bytes(read_array(reader)?)),
        TagKind::Int => Tag::Int(u32::from_be_bytes(read_array(reader)?)),
        TagKind::Long => Tag::Long(u64::from_be_bytes(read_array(reader)?)),
        TagKind::Float => Tag::Float(f32::from_be_bytes(read_array(reader)?)),
        TagKind::Double => Tag::Double(f64::from_be_bytes(read_array(reader)?)),
        TagKind::ByteArray => {
            let length = i32::from_be_bytes(read_array(reader)?);
            if length < 0 {
                return Err(NbtError::InvalidLength(length as i64));
            }
            Tag::ByteArray(read_bytes(reader, length as usize)?)
        }
        TagKind::String => {
            let length = i16::from_be_bytes(read_array(reader)?);
            if length < 0 {
                return Err(NbtError::InvalidLength(length as i64));
            }
            let raw = read_bytes(reader, length as usize)?;
            Tag::String(String::from_utf8_lossy(&raw).into_owned())
        }
        TagKind::Compound => Tag::Compound(read_compound(reader, depth + 1)?),
        TagKind::List | TagKind::IntArray | TagKind::LongArray => {
            return Err(NbtError::Unsupported(kind))
        }
    };
    Ok(tag)
}

fn read_name<R: Read>(reader: &mut R) -> Result<String> {
    let length = u16::from_be_bytes(read_array(reader)?);
    let raw = read_bytes(reader, length as usize)?;
    Ok(String::from_utf8_lossy(&raw).into_owned())
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let [b] = read_array::<R, 1>(reader)?;
    Ok(b)
}

fn read_array<R: Read, const N: usize>(reader: &mut R) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

// Grows with the data actually present, so a bogus length in a corrupt file
// cannot force a huge allocation up front.
fn read_bytes<R: Read>(reader: &mut R, length: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.by_ref().take(length as u64).read_to_end(&mut buf)?;
    if buf.len() != length {
        return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
    }
    Ok(buf)
}

/// One write step of an encoding pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Emit<'a> {
    /// Closes the innermost open compound.
    End,
    Byte(&'a str, u8),
    Short(&'a str, u16),
    Int(&'a str, u32),
    Long(&'a str, u64),
    Float(&'a str, f32),
    Double(&'a str, f64),
    ByteArray(&'a str, &'a [u8]),
    String(&'a str, &'a str),
    /// Opens a compound; must be balanced by a later [`Emit::End`].
    Compound(&'a str),
}

impl Emit<'_> {
    fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        match *self {
            Emit::End => writer.write_all(&[TagKind::End.id()])?,
            Emit::Byte(name, v) => {
                write_header(writer, TagKind::Byte, name)?;
                writer.write_all(&[v])?;
            }
            Emit::Short(name, v) => {
                write_header(writer, TagKind::Short, name)?;
                writer.write_all(&v.to_be_bytes())?;
            }
            Emit::Int(name, v) => {
                write_header(writer, TagKind::Int, name)?;
                writer.write_all(&v.to_be_bytes())?;
            }
            Emit::Long(name, v) => {
                write_header(writer, TagKind::Long, name)?;
                writer.write_all(&v.to_be_bytes())?;
            }
            Emit::Float(name, v) => {
                write_header(writer, TagKind::Float, name)?;
                writer.write_all(&v.to_be_bytes())?;
            }
            Emit::Double(name, v) => {
                write_header(writer, TagKind::Double, name)?;
                writer.write_all(&v.to_be_bytes())?;
            }
            Emit::ByteArray(name, v) => {
                let length =
                    i32::try_from(v.len()).map_err(|_| NbtError::InvalidLength(v.len() as i64))?;
                write_header(writer, TagKind::ByteArray, name)?;
                writer.write_all(&length.to_be_bytes())?;
                writer.write_all(v)?;
            }
            Emit::String(name, v) => {
                let length =
                    i16::try_from(v.len()).map_err(|_| NbtError::InvalidLength(v.len() as i64))?;
                write_header(writer, TagKind::String, name)?;
                writer.write_all(&length.to_be_bytes())?;
                writer.write_all(v.as_bytes())?;
            }
            Emit::Compound(name) => write_header(writer, TagKind::Compound, name)?,
        }
        Ok(())
    }
}

fn write_header<W: Write>(writer: &mut W, kind: TagKind, name: &str) -> Result<()> {
    let length =
        u16::try_from(name.len()).map_err(|_| NbtError::InvalidLength(name.len() as i64))?;
    writer.write_all(&[kind.id()])?;
    writer.write_all(&length.to_be_bytes())?;
    writer.write_all(name.as_bytes())?;
    Ok(())
}

/// Runs the actions in order, stopping at the first failure.
pub fn encode<W: Write>(writer: &mut W, actions: &[Emit<'_>]) -> Result<()> {
    for action in actions {
        action.write(writer)?;
    }
    Ok(())
}

/// Encodes `root` as a named root compound.
pub fn write_root<W: Write>(writer: &mut W, name: &str, root: &Compound) -> Result<()> {
    let mut actions = vec![Emit::Compound(name)];
    lower(root, &mut actions);
    encode(writer, &actions)
}

fn lower<'a>(compound: &'a Compound, out: &mut Vec<Emit<'a>>) {
    for (name, tag) in compound {
        let name = name.as_str();
        match tag {
            Tag::Byte(v) => out.push(Emit::Byte(name, *v)),
            Tag::Short(v) => out.push(Emit::Short(name, *v)),
            Tag::Int(v) => out.push(Emit::Int(name, *v)),
            Tag::Long(v) => out.push(Emit::Long(name, *v)),
            Tag::Float(v) => out.push(Emit::Float(name, *v)),
            Tag::Double(v) => out.push(Emit::Double(name, *v)),
            Tag::ByteArray(v) => out.push(Emit::ByteArray(name, v)),
            Tag::String(v) => out.push(Emit::String(name, v)),
            Tag::Compound(inner) => {
                out.push(Emit::Compound(name));
                lower(inner, out);
            }
        }
    }
    out.push(Emit::End);
}
