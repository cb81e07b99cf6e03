//! Container kinds, item types and item values.

use std::fmt;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::CodecError;
use crate::protocol::codes::code_table;
use crate::protocol::wire::{read_fixed_str, write_fixed_str};

code_table! {
    /// How a capability packages its value(s) (TWON_*).
    pub enum ContainerKind: u16 {
        Array = 3 => "TWON_ARRAY",
        Enumeration = 4 => "TWON_ENUMERATION",
        OneValue = 5 => "TWON_ONEVALUE",
        Range = 6 => "TWON_RANGE",
    }
}

code_table! {
    /// Primitive item type of a container (TWTY_*).
    pub enum ItemType: u16 {
        Int8 = 0x0000 => "TWTY_INT8",
        Int16 = 0x0001 => "TWTY_INT16",
        Int32 = 0x0002 => "TWTY_INT32",
        UInt8 = 0x0003 => "TWTY_UINT8",
        UInt16 = 0x0004 => "TWTY_UINT16",
        UInt32 = 0x0005 => "TWTY_UINT32",
        Bool = 0x0006 => "TWTY_BOOL",
        Fix32 = 0x0007 => "TWTY_FIX32",
        Frame = 0x0008 => "TWTY_FRAME",
        Str32 = 0x0009 => "TWTY_STR32",
        Str64 = 0x000a => "TWTY_STR64",
        Str128 = 0x000b => "TWTY_STR128",
        Str255 = 0x000c => "TWTY_STR255",
    }
}

impl ItemType {
    /// Native width of one item in bytes.
    pub const fn width(self) -> usize {
        match self {
            ItemType::Int8 | ItemType::UInt8 => 1,
            ItemType::Int16 | ItemType::UInt16 | ItemType::Bool => 2,
            ItemType::Int32 | ItemType::UInt32 | ItemType::Fix32 => 4,
            ItemType::Frame => 16,
            ItemType::Str32 => 34,
            ItemType::Str64 => 66,
            ItemType::Str128 => 130,
            ItemType::Str255 => 256,
        }
    }

    /// Whether the type fits in the 32-bit slots of a range.
    pub const fn is_rangeable(self) -> bool {
        self.width() <= 4
    }

    /// Longest text a string type can carry.
    pub const fn max_text_len(self) -> Option<usize> {
        match self {
            ItemType::Str32 => Some(32),
            ItemType::Str64 => Some(64),
            ItemType::Str128 => Some(128),
            ItemType::Str255 => Some(255),
            _ => None,
        }
    }

    /// Number of comma-separated text fields one item occupies.
    pub const fn text_fields(self) -> usize {
        match self {
            ItemType::Frame => 4,
            _ => 1,
        }
    }
}

/// Signed 16.16 fixed-point number. The value is `whole + frac / 65536`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Fix32 {
    pub whole: i16,
    pub frac: u16,
}

impl Fix32 {
    pub const fn new(whole: i16, frac: u16) -> Self {
        Self { whole, frac }
    }

    /// Nearest fixed-point value, `None` if outside the representable range.
    pub fn from_f64(value: f64) -> Option<Self> {
        let scaled = (value * 65536.0).round();
        if !scaled.is_finite() || scaled < f64::from(i32::MIN) || scaled > f64::from(i32::MAX) {
            return None;
        }
        Some(Self::from_bits(scaled as i32 as u32))
    }

    pub fn to_f64(self) -> f64 {
        f64::from(self.whole) + f64::from(self.frac) / 65536.0
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self {
            whole: (bits >> 16) as u16 as i16,
            frac: bits as u16,
        }
    }

    pub const fn to_bits(self) -> u32 {
        ((self.whole as u16 as u32) << 16) | self.frac as u32
    }

    fn parse(text: &str) -> Option<Self> {
        text.trim().parse::<f64>().ok().and_then(Self::from_f64)
    }
}

impl From<i16> for Fix32 {
    fn from(whole: i16) -> Self {
        Self::new(whole, 0)
    }
}

impl fmt::Display for Fix32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_f64().to_string();
        if text.contains('.') {
            f.write_str(&text)
        } else {
            write!(f, "{text}.0")
        }
    }
}

/// Four-corner frame of fixed-point coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Frame {
    pub left: Fix32,
    pub top: Fix32,
    pub right: Fix32,
    pub bottom: Fix32,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.left, self.top, self.right, self.bottom)
    }
}

/// One container item.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Int8(i8),
    Int16(i16),
    Int32(i32),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    Bool(bool),
    Fix32(Fix32),
    Frame(Frame),
    Str32(String),
    Str64(String),
    Str128(String),
    Str255(String),
}

impl Item {
    pub fn item_type(&self) -> ItemType {
        match self {
            Item::Int8(_) => ItemType::Int8,
            Item::Int16(_) => ItemType::Int16,
            Item::Int32(_) => ItemType::Int32,
            Item::UInt8(_) => ItemType::UInt8,
            Item::UInt16(_) => ItemType::UInt16,
            Item::UInt32(_) => ItemType::UInt32,
            Item::Bool(_) => ItemType::Bool,
            Item::Fix32(_) => ItemType::Fix32,
            Item::Frame(_) => ItemType::Frame,
            Item::Str32(_) => ItemType::Str32,
            Item::Str64(_) => ItemType::Str64,
            Item::Str128(_) => ItemType::Str128,
            Item::Str255(_) => ItemType::Str255,
        }
    }

    /// Value as it sits in a 32-bit slot (signed values sign-extended).
    pub fn to_bits(&self) -> Option<u32> {
        Some(match *self {
            Item::Int8(v) => i32::from(v) as u32,
            Item::Int16(v) => i32::from(v) as u32,
            Item::Int32(v) => v as u32,
            Item::UInt8(v) => u32::from(v),
            Item::UInt16(v) => u32::from(v),
            Item::UInt32(v) => v,
            Item::Bool(v) => u32::from(v),
            Item::Fix32(v) => v.to_bits(),
            _ => return None,
        })
    }

    /// Inverse of [`Item::to_bits`].
    pub fn from_bits(item_type: ItemType, bits: u32) -> Option<Item> {
        Some(match item_type {
            ItemType::Int8 => Item::Int8(bits as i8),
            ItemType::Int16 => Item::Int16(bits as i16),
            ItemType::Int32 => Item::Int32(bits as i32),
            ItemType::UInt8 => Item::UInt8(bits as u8),
            ItemType::UInt16 => Item::UInt16(bits as u16),
            ItemType::UInt32 => Item::UInt32(bits),
            ItemType::Bool => Item::Bool(bits != 0),
            ItemType::Fix32 => Item::Fix32(Fix32::from_bits(bits)),
            _ => return None,
        })
    }

    /// Check string lengths against the type's width.
    pub fn validate(&self) -> Result<(), CodecError> {
        if let Some(text) = self.as_str() {
            let item_type = self.item_type();
            let max = item_type.max_text_len().unwrap_or(0);
            if text.len() > max {
                return Err(CodecError::StringTooLong {
                    item_type,
                    len: text.len(),
                    max,
                });
            }
        }
        Ok(())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Item::Str32(s) | Item::Str64(s) | Item::Str128(s) | Item::Str255(s) => Some(s),
            _ => None,
        }
    }

    /// Write the item at its native width.
    pub(crate) fn write_to<W: Write>(&self, w: &mut W) -> Result<(), CodecError> {
        match self {
            Item::Int8(v) => w.write_i8(*v)?,
            Item::Int16(v) => w.write_i16::<LittleEndian>(*v)?,
            Item::Int32(v) => w.write_i32::<LittleEndian>(*v)?,
            Item::UInt8(v) => w.write_u8(*v)?,
            Item::UInt16(v) => w.write_u16::<LittleEndian>(*v)?,
            Item::UInt32(v) => w.write_u32::<LittleEndian>(*v)?,
            Item::Bool(v) => w.write_u16::<LittleEndian>(u16::from(*v))?,
            Item::Fix32(v) => write_fix32(w, *v)?,
            Item::Frame(frame) => {
                for corner in [frame.left, frame.top, frame.right, frame.bottom] {
                    write_fix32(w, corner)?;
                }
            }
            Item::Str32(s) | Item::Str64(s) | Item::Str128(s) | Item::Str255(s) => {
                self.validate()?;
                write_fixed_str(w, s, self.item_type().width())?;
            }
        }
        Ok(())
    }

    /// Read one item of `item_type` at its native width.
    pub(crate) fn read_from<R: Read>(item_type: ItemType, r: &mut R) -> Result<Item, CodecError> {
        Ok(match item_type {
            ItemType::Int8 => Item::Int8(r.read_i8()?),
            ItemType::Int16 => Item::Int16(r.read_i16::<LittleEndian>()?),
            ItemType::Int32 => Item::Int32(r.read_i32::<LittleEndian>()?),
            ItemType::UInt8 => Item::UInt8(r.read_u8()?),
            ItemType::UInt16 => Item::UInt16(r.read_u16::<LittleEndian>()?),
            ItemType::UInt32 => Item::UInt32(r.read_u32::<LittleEndian>()?),
            ItemType::Bool => Item::Bool(r.read_u16::<LittleEndian>()? != 0),
            ItemType::Fix32 => Item::Fix32(read_fix32(r)?),
            ItemType::Frame => Item::Frame(Frame {
                left: read_fix32(r)?,
                top: read_fix32(r)?,
                right: read_fix32(r)?,
                bottom: read_fix32(r)?,
            }),
            ItemType::Str32 => Item::Str32(read_fixed_str(r, item_type.width())?),
            ItemType::Str64 => Item::Str64(read_fixed_str(r, item_type.width())?),
            ItemType::Str128 => Item::Str128(read_fixed_str(r, item_type.width())?),
            ItemType::Str255 => Item::Str255(read_fixed_str(r, item_type.width())?),
        })
    }

    /// Canonical text form of the item.
    pub fn to_text(&self) -> String {
        match self {
            Item::Int8(v) => v.to_string(),
            Item::Int16(v) => v.to_string(),
            Item::Int32(v) => v.to_string(),
            Item::UInt8(v) => v.to_string(),
            Item::UInt16(v) => v.to_string(),
            Item::UInt32(v) => v.to_string(),
            Item::Bool(true) => "TRUE".to_string(),
            Item::Bool(false) => "FALSE".to_string(),
            Item::Fix32(v) => v.to_string(),
            Item::Frame(v) => v.to_string(),
            Item::Str32(s) | Item::Str64(s) | Item::Str128(s) | Item::Str255(s) => s.clone(),
        }
    }

    /// Parse an item of `item_type` from its text fields.
    ///
    /// `fields` holds exactly [`ItemType::text_fields`] entries; a frame may
    /// also arrive as a single field with its four corners comma-joined.
    pub fn parse(item_type: ItemType, fields: &[&str]) -> Result<Item, CodecError> {
        let invalid = || CodecError::InvalidValue {
            item_type,
            text: fields.join(","),
        };
        let single = || fields.first().copied().unwrap_or_default();

        let item = match item_type {
            ItemType::Int8 => Item::Int8(parse_int(single()).ok_or_else(invalid)?),
            ItemType::Int16 => Item::Int16(parse_int(single()).ok_or_else(invalid)?),
            ItemType::Int32 => Item::Int32(parse_int(single()).ok_or_else(invalid)?),
            ItemType::UInt8 => Item::UInt8(parse_int(single()).ok_or_else(invalid)?),
            ItemType::UInt16 => Item::UInt16(parse_int(single()).ok_or_else(invalid)?),
            ItemType::UInt32 => Item::UInt32(parse_int(single()).ok_or_else(invalid)?),
            ItemType::Bool => Item::Bool(parse_bool(single()).ok_or_else(invalid)?),
            ItemType::Fix32 => Item::Fix32(Fix32::parse(single()).ok_or_else(invalid)?),
            ItemType::Frame => {
                let corners: Vec<&str> = match fields {
                    [joined] => joined.split(',').collect(),
                    _ => fields.to_vec(),
                };
                let [left, top, right, bottom] = corners.as_slice() else {
                    return Err(invalid());
                };
                Item::Frame(Frame {
                    left: Fix32::parse(left).ok_or_else(invalid)?,
                    top: Fix32::parse(top).ok_or_else(invalid)?,
                    right: Fix32::parse(right).ok_or_else(invalid)?,
                    bottom: Fix32::parse(bottom).ok_or_else(invalid)?,
                })
            }
            ItemType::Str32 => Item::Str32(single().to_string()),
            ItemType::Str64 => Item::Str64(single().to_string()),
            ItemType::Str128 => Item::Str128(single().to_string()),
            ItemType::Str255 => Item::Str255(single().to_string()),
        };
        item.validate()?;
        Ok(item)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn write_fix32<W: Write>(w: &mut W, value: Fix32) -> std::io::Result<()> {
    w.write_i16::<LittleEndian>(value.whole)?;
    w.write_u16::<LittleEndian>(value.frac)
}

fn read_fix32<R: Read>(r: &mut R) -> std::io::Result<Fix32> {
    Ok(Fix32 {
        whole: r.read_i16::<LittleEndian>()?,
        frac: r.read_u16::<LittleEndian>()?,
    })
}

/// Decimal (optionally signed) or `0x` hex integer.
pub(crate) fn parse_int<T: TryFrom<i64>>(text: &str) -> Option<T> {
    let text = text.trim();
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => text.parse::<i64>().ok()?,
    };
    T::try_from(value).ok()
}

fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        parse_int::<u16>(text).map(|v| v != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_widths() {
        let widths: Vec<usize> = ItemType::ALL.iter().map(|t| t.width()).collect();
        assert_eq!(widths, vec![1, 2, 4, 1, 2, 4, 2, 4, 16, 34, 66, 130, 256]);
    }

    #[test]
    fn test_fix32_conversion() {
        let half = Fix32::from_f64(-1.5).unwrap();
        assert_eq!(half, Fix32::new(-2, 0x8000));
        assert_eq!(half.to_f64(), -1.5);
        assert_eq!(Fix32::from_bits(half.to_bits()), half);
        assert_eq!(Fix32::from_f64(40000.0), None);
    }

    #[test]
    fn test_fix32_text() {
        assert_eq!(Fix32::from(100).to_string(), "100.0");
        assert_eq!(Fix32::new(8, 0x8000).to_string(), "8.5");

        let odd = Fix32::new(3, 7);
        assert_eq!(Fix32::parse(&odd.to_string()), Some(odd));
    }

    #[test]
    fn test_bits_sign_extension() {
        let item = Item::Int16(-5);
        assert_eq!(item.to_bits(), Some(0xFFFF_FFFB));
        assert_eq!(Item::from_bits(ItemType::Int16, 0xFFFF_FFFB), Some(item));
        assert_eq!(Item::Str32("x".into()).to_bits(), None);
    }

    #[test]
    fn test_parse_items() {
        assert_eq!(Item::parse(ItemType::UInt16, &["300"]).unwrap(), Item::UInt16(300));
        assert_eq!(Item::parse(ItemType::UInt32, &["0x10"]).unwrap(), Item::UInt32(16));
        assert_eq!(Item::parse(ItemType::Bool, &["true"]).unwrap(), Item::Bool(true));
        assert_eq!(Item::parse(ItemType::Bool, &["0"]).unwrap(), Item::Bool(false));
        assert!(Item::parse(ItemType::UInt8, &["256"]).is_err());
        assert!(Item::parse(ItemType::Int8, &["abc"]).is_err());
    }

    #[test]
    fn test_parse_frame_forms() {
        let expected = Item::Frame(Frame {
            left: Fix32::from(0),
            top: Fix32::from(0),
            right: Fix32::new(8, 0x8000),
            bottom: Fix32::from(11),
        });
        assert_eq!(Item::parse(ItemType::Frame, &["0", "0", "8.5", "11"]).unwrap(), expected);
        assert_eq!(Item::parse(ItemType::Frame, &["0,0,8.5,11"]).unwrap(), expected);
        assert!(Item::parse(ItemType::Frame, &["0,0,8.5"]).is_err());
    }

    #[test]
    fn test_string_limit() {
        let err = Item::parse(ItemType::Str32, &["a".repeat(33).as_str()]).unwrap_err();
        assert!(matches!(err, CodecError::StringTooLong { max: 32, .. }));
        assert!(Item::parse(ItemType::Str255, &["a".repeat(255).as_str()]).is_ok());
    }
}
