//! Typed containers and their native binary layout.
//!
//! Layout (little endian, packed):
//!
//! | Kind | Fields |
//! |---|---|
//! | OneValue | `type u16`, item in a slot of at least 4 bytes |
//! | Array | `type u16`, `count u32`, items |
//! | Enumeration | `type u16`, `count u32`, `current u32`, `default u32`, items |
//! | Range | `type u16`, `min u32`, `max u32`, `step u32`, `default u32`, `current u32` |
//!
//! A capability record prefixes the container with `cap u16` and `kind u16`.

use std::io::{Cursor, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::CodecError;
use super::names::CapabilityId;
use super::types::{ContainerKind, Item, ItemType};

const TYPE_SIZE: usize = 2;
const ONE_VALUE_SLOT: usize = 4;
const ARRAY_HEADER: usize = TYPE_SIZE + 4;
const ENUMERATION_HEADER: usize = TYPE_SIZE + 12;
const RANGE_SIZE: usize = TYPE_SIZE + 20;
const CAPABILITY_HEADER: usize = 4;

/// Bounded range of a numeric capability.
#[derive(Debug, Clone, PartialEq)]
pub struct Range {
    pub item_type: ItemType,
    pub min: Item,
    pub max: Item,
    pub step: Item,
    pub default: Item,
    pub current: Item,
}

impl Range {
    /// Build a range, checking that all five values share a rangeable type.
    pub fn new(
        item_type: ItemType,
        min: Item,
        max: Item,
        step: Item,
        default: Item,
        current: Item,
    ) -> Result<Self, CodecError> {
        let range = Self {
            item_type,
            min,
            max,
            step,
            default,
            current,
        };
        range.validate()?;
        Ok(range)
    }

    fn values(&self) -> [&Item; 5] {
        [&self.min, &self.max, &self.step, &self.default, &self.current]
    }

    fn validate(&self) -> Result<(), CodecError> {
        if !self.item_type.is_rangeable() {
            return Err(CodecError::NotRangeable(self.item_type));
        }
        check_items(self.item_type, self.values())
    }
}

/// Value of a capability in one of the four container shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    OneValue(Item),
    Array {
        item_type: ItemType,
        items: Vec<Item>,
    },
    Enumeration {
        item_type: ItemType,
        current_index: u32,
        default_index: u32,
        items: Vec<Item>,
    },
    Range(Range),
}

impl Container {
    pub fn kind(&self) -> ContainerKind {
        match self {
            Container::OneValue(_) => ContainerKind::OneValue,
            Container::Array { .. } => ContainerKind::Array,
            Container::Enumeration { .. } => ContainerKind::Enumeration,
            Container::Range(_) => ContainerKind::Range,
        }
    }

    pub fn item_type(&self) -> ItemType {
        match self {
            Container::OneValue(item) => item.item_type(),
            Container::Array { item_type, .. } | Container::Enumeration { item_type, .. } => {
                *item_type
            }
            Container::Range(range) => range.item_type,
        }
    }

    /// Items carried by the container (none for a range).
    pub fn items(&self) -> &[Item] {
        match self {
            Container::OneValue(item) => std::slice::from_ref(item),
            Container::Array { items, .. } | Container::Enumeration { items, .. } => items,
            Container::Range(_) => &[],
        }
    }

    /// Current value: the single item, the selected enumeration entry or the
    /// range's current value. Arrays have none.
    pub fn current(&self) -> Option<&Item> {
        match self {
            Container::OneValue(item) => Some(item),
            Container::Array { .. } => None,
            Container::Enumeration {
                current_index,
                items,
                ..
            } => items.get(*current_index as usize),
            Container::Range(range) => Some(&range.current),
        }
    }

    /// Check that every item matches the declared type and indexes are in bounds.
    pub fn validate(&self) -> Result<(), CodecError> {
        match self {
            Container::OneValue(item) => item.validate(),
            Container::Array { item_type, items } => check_items(*item_type, items),
            Container::Enumeration {
                item_type,
                current_index,
                default_index,
                items,
            } => {
                check_items(*item_type, items)?;
                if !items.is_empty() {
                    for index in [*current_index, *default_index] {
                        if index as usize >= items.len() {
                            return Err(CodecError::IndexOutOfRange {
                                index,
                                count: items.len(),
                            });
                        }
                    }
                }
                Ok(())
            }
            Container::Range(range) => range.validate(),
        }
    }

    /// Size of the native container, fixed by kind, item type and item count.
    pub fn byte_len(&self) -> usize {
        let width = self.item_type().width();
        match self {
            Container::OneValue(_) => TYPE_SIZE + width.max(ONE_VALUE_SLOT),
            Container::Array { items, .. } => ARRAY_HEADER + items.len() * width,
            Container::Enumeration { items, .. } => ENUMERATION_HEADER + items.len() * width,
            Container::Range(_) => RANGE_SIZE,
        }
    }

    /// Serialize into the native layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        self.validate()?;

        let mut buf = Vec::with_capacity(self.byte_len());
        buf.write_u16::<LittleEndian>(self.item_type().code())?;
        match self {
            Container::OneValue(item) => {
                item.write_to(&mut buf)?;
                buf.resize(self.byte_len(), 0);
            }
            Container::Array { items, .. } => {
                buf.write_u32::<LittleEndian>(count_u32(items))?;
                write_items(&mut buf, items)?;
            }
            Container::Enumeration {
                current_index,
                default_index,
                items,
                ..
            } => {
                buf.write_u32::<LittleEndian>(count_u32(items))?;
                buf.write_u32::<LittleEndian>(*current_index)?;
                buf.write_u32::<LittleEndian>(*default_index)?;
                write_items(&mut buf, items)?;
            }
            Container::Range(range) => {
                for value in range.values() {
                    let bits = value
                        .to_bits()
                        .ok_or(CodecError::NotRangeable(value.item_type()))?;
                    buf.write_u32::<LittleEndian>(bits)?;
                }
            }
        }
        Ok(buf)
    }

    /// Parse a native container of the given kind.
    pub fn from_bytes(kind: ContainerKind, data: &[u8]) -> Result<Self, CodecError> {
        ensure_len(data, TYPE_SIZE)?;
        let mut cursor = Cursor::new(data);
        let code = cursor.read_u16::<LittleEndian>()?;
        let item_type = ItemType::from_code(code)
            .ok_or_else(|| CodecError::UnknownItemType(format!("0x{code:04X}")))?;
        let width = item_type.width();

        let container = match kind {
            ContainerKind::OneValue => {
                ensure_len(data, TYPE_SIZE + width.max(ONE_VALUE_SLOT))?;
                Container::OneValue(Item::read_from(item_type, &mut cursor)?)
            }
            ContainerKind::Array => {
                ensure_len(data, ARRAY_HEADER)?;
                let count = cursor.read_u32::<LittleEndian>()? as usize;
                ensure_items(data, ARRAY_HEADER, count, width)?;
                Container::Array {
                    item_type,
                    items: read_items(&mut cursor, item_type, count)?,
                }
            }
            ContainerKind::Enumeration => {
                ensure_len(data, ENUMERATION_HEADER)?;
                let count = cursor.read_u32::<LittleEndian>()? as usize;
                let current_index = cursor.read_u32::<LittleEndian>()?;
                let default_index = cursor.read_u32::<LittleEndian>()?;
                ensure_items(data, ENUMERATION_HEADER, count, width)?;
                Container::Enumeration {
                    item_type,
                    current_index,
                    default_index,
                    items: read_items(&mut cursor, item_type, count)?,
                }
            }
            ContainerKind::Range => {
                if !item_type.is_rangeable() {
                    return Err(CodecError::NotRangeable(item_type));
                }
                ensure_len(data, RANGE_SIZE)?;
                let mut values = Vec::with_capacity(5);
                for _ in 0..5 {
                    let bits = cursor.read_u32::<LittleEndian>()?;
                    values.push(
                        Item::from_bits(item_type, bits)
                            .ok_or(CodecError::NotRangeable(item_type))?,
                    );
                }
                let [min, max, step, default, current]: [Item; 5] = values
                    .try_into()
                    .map_err(|_| CodecError::NotRangeable(item_type))?;
                Container::Range(Range::new(item_type, min, max, step, default, current)?)
            }
        };
        container.validate()?;
        Ok(container)
    }
}

/// A capability id together with its container.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub id: CapabilityId,
    pub container: Container,
}

impl Capability {
    /// Build a capability, validating the container.
    pub fn new(id: CapabilityId, container: Container) -> Result<Self, CodecError> {
        container.validate()?;
        Ok(Self { id, container })
    }

    pub fn one_value(id: CapabilityId, item: Item) -> Result<Self, CodecError> {
        Self::new(id, Container::OneValue(item))
    }

    /// Serialize as `cap u16, kind u16, container`.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let container = self.container.to_bytes()?;
        let mut buf = Vec::with_capacity(CAPABILITY_HEADER + container.len());
        buf.write_u16::<LittleEndian>(self.id.0)?;
        buf.write_u16::<LittleEndian>(self.container.kind().code())?;
        buf.write_all(&container)?;
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, CodecError> {
        ensure_len(data, CAPABILITY_HEADER)?;
        let mut cursor = Cursor::new(data);
        let id = CapabilityId(cursor.read_u16::<LittleEndian>()?);
        let code = cursor.read_u16::<LittleEndian>()?;
        let kind = ContainerKind::from_code(code)
            .ok_or_else(|| CodecError::UnknownContainer(format!("0x{code:04X}")))?;
        let container = Container::from_bytes(kind, &data[CAPABILITY_HEADER..])?;
        Ok(Self { id, container })
    }
}

fn check_items<'a>(
    item_type: ItemType,
    items: impl IntoIterator<Item = &'a Item>,
) -> Result<(), CodecError> {
    for item in items {
        if item.item_type() != item_type {
            return Err(CodecError::ItemTypeMismatch {
                expected: item_type,
                actual: item.item_type(),
            });
        }
        item.validate()?;
    }
    Ok(())
}

fn count_u32(items: &[Item]) -> u32 {
    u32::try_from(items.len()).unwrap_or(u32::MAX)
}

fn write_items(buf: &mut Vec<u8>, items: &[Item]) -> Result<(), CodecError> {
    for item in items {
        item.write_to(buf)?;
    }
    Ok(())
}

fn read_items(
    cursor: &mut Cursor<&[u8]>,
    item_type: ItemType,
    count: usize,
) -> Result<Vec<Item>, CodecError> {
    (0..count)
        .map(|_| Item::read_from(item_type, cursor))
        .collect()
}

fn ensure_len(data: &[u8], expected: usize) -> Result<(), CodecError> {
    if data.len() < expected {
        return Err(CodecError::BufferTooSmall {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn ensure_items(data: &[u8], header: usize, count: usize, width: usize) -> Result<(), CodecError> {
    let expected = count
        .checked_mul(width)
        .and_then(|body| body.checked_add(header))
        .unwrap_or(usize::MAX);
    ensure_len(data, expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::types::{Fix32, Frame};

    fn resolution_enum() -> Container {
        Container::Enumeration {
            item_type: ItemType::UInt16,
            current_index: 1,
            default_index: 0,
            items: vec![Item::UInt16(100), Item::UInt16(200), Item::UInt16(300)],
        }
    }

    #[test]
    fn test_one_value_layout() {
        let container = Container::OneValue(Item::UInt16(200));
        let bytes = container.to_bytes().unwrap();
        assert_eq!(bytes, vec![0x04, 0x00, 200, 0, 0, 0]);
        assert_eq!(Container::from_bytes(ContainerKind::OneValue, &bytes).unwrap(), container);
    }

    #[test]
    fn test_one_value_wide_item() {
        let container = Container::OneValue(Item::Str32("Acme".into()));
        let bytes = container.to_bytes().unwrap();
        assert_eq!(bytes.len(), 2 + 34);
        assert_eq!(container.byte_len(), bytes.len());
    }

    #[test]
    fn test_enumeration_layout() {
        let container = resolution_enum();
        let bytes = container.to_bytes().unwrap();
        assert_eq!(bytes.len(), 14 + 3 * 2);
        assert_eq!(&bytes[2..6], &3u32.to_le_bytes());
        assert_eq!(&bytes[6..10], &1u32.to_le_bytes());
        assert_eq!(Container::from_bytes(ContainerKind::Enumeration, &bytes).unwrap(), container);
        assert_eq!(container.current(), Some(&Item::UInt16(200)));
    }

    #[test]
    fn test_range_layout_with_fix32() {
        let fix = |v: i16| Item::Fix32(Fix32::from(v));
        let range = Range::new(ItemType::Fix32, fix(-100), fix(100), fix(1), fix(0), fix(10)).unwrap();
        let container = Container::Range(range);
        let bytes = container.to_bytes().unwrap();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[2..6], &Fix32::from(-100).to_bits().to_le_bytes());
        assert_eq!(Container::from_bytes(ContainerKind::Range, &bytes).unwrap(), container);
    }

    #[test]
    fn test_range_rejects_wide_types() {
        let s = || Item::Str32(String::new());
        let err = Range::new(ItemType::Str32, s(), s(), s(), s(), s()).unwrap_err();
        assert!(matches!(err, CodecError::NotRangeable(ItemType::Str32)));
    }

    #[test]
    fn test_mismatched_item_rejected() {
        let container = Container::Array {
            item_type: ItemType::UInt16,
            items: vec![Item::UInt16(1), Item::UInt32(2)],
        };
        assert!(matches!(
            container.to_bytes(),
            Err(CodecError::ItemTypeMismatch { expected: ItemType::UInt16, actual: ItemType::UInt32 })
        ));
    }

    #[test]
    fn test_enumeration_index_checked() {
        let container = Container::Enumeration {
            item_type: ItemType::UInt16,
            current_index: 5,
            default_index: 0,
            items: vec![Item::UInt16(1)],
        };
        assert!(matches!(
            container.validate(),
            Err(CodecError::IndexOutOfRange { index: 5, count: 1 })
        ));
    }

    #[test]
    fn test_truncated_array_rejected() {
        let container = Container::Array {
            item_type: ItemType::Frame,
            items: vec![Item::Frame(Frame::default()); 2],
        };
        let bytes = container.to_bytes().unwrap();
        let err = Container::from_bytes(ContainerKind::Array, &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::BufferTooSmall { expected: 38, .. }));
    }

    #[test]
    fn test_capability_record() {
        let cap = Capability::new(CapabilityId::XRESOLUTION, resolution_enum()).unwrap();
        let bytes = cap.to_bytes().unwrap();
        assert_eq!(&bytes[..4], &[0x18, 0x11, 0x04, 0x00]);
        assert_eq!(Capability::from_bytes(&bytes).unwrap(), cap);
    }
}
