//! Flat comma-separated text form of a capability.
//!
//! ```text
//! ICAP_XRESOLUTION,TWON_ONEVALUE,TWTY_UINT32,200
//! ICAP_PIXELTYPE,TWON_ARRAY,TWTY_UINT16,2,0,2
//! ICAP_XRESOLUTION,TWON_ENUMERATION,TWTY_UINT16,3,1,0,100,200,300
//! ICAP_BRIGHTNESS,TWON_RANGE,TWTY_FIX32,-1000.0,1000.0,1.0,0.0,0.0
//! ```
//!
//! Enumerations carry `count,current,default` before their items, arrays just
//! `count`. A frame item spans four fields (or one quoted field). Strings that
//! contain commas or quotes are double-quoted with `""` escaping.
//!
//! A range has no count field: its five values follow the header directly.
//! Records written with a leading count in front of the range values decode
//! with every value shifted by one; the surplus trailing field is dropped
//! with a warning rather than rejected.

use tracing::warn;

use super::CodecError;
use super::container::{Capability, Container, Range};
use super::names::CapabilityId;
use super::types::{ContainerKind, Item, ItemType, parse_int};

const HEADER_FIELDS: usize = 3;
const RANGE_VALUES: usize = 5;

/// Conversion between capabilities and a textual record.
pub trait CapabilityCodec: Send + Sync {
    fn encode(&self, capability: &Capability) -> Result<String, CodecError>;
    fn decode(&self, text: &str) -> Result<Capability, CodecError>;
}

/// The comma-separated codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextCodec;

impl CapabilityCodec for TextCodec {
    fn encode(&self, capability: &Capability) -> Result<String, CodecError> {
        encode(capability)
    }

    fn decode(&self, text: &str) -> Result<Capability, CodecError> {
        decode(text)
    }
}

/// Encode a capability using symbolic names for the id, kind and type.
pub fn encode(capability: &Capability) -> Result<String, CodecError> {
    let container = &capability.container;
    container.validate()?;

    let mut fields = vec![
        capability.id.to_string(),
        container.kind().name().to_string(),
        container.item_type().name().to_string(),
    ];
    match container {
        Container::OneValue(item) => push_item(&mut fields, item),
        Container::Array { items, .. } => {
            fields.push(items.len().to_string());
            items.iter().for_each(|item| push_item(&mut fields, item));
        }
        Container::Enumeration {
            current_index,
            default_index,
            items,
            ..
        } => {
            fields.push(items.len().to_string());
            fields.push(current_index.to_string());
            fields.push(default_index.to_string());
            items.iter().for_each(|item| push_item(&mut fields, item));
        }
        Container::Range(range) => {
            for value in [&range.min, &range.max, &range.step, &range.default, &range.current] {
                push_item(&mut fields, value);
            }
        }
    }
    Ok(fields.join(","))
}

/// Decode a textual record. Ids, kinds and types may be symbolic or numeric.
pub fn decode(text: &str) -> Result<Capability, CodecError> {
    if text.trim().is_empty() {
        return Err(CodecError::Empty);
    }
    let owned = split_fields(text)?;
    let fields: Vec<&str> = owned.iter().map(String::as_str).collect();
    if fields.len() < HEADER_FIELDS {
        return Err(CodecError::ShortRecord {
            expected: HEADER_FIELDS,
            actual: fields.len(),
        });
    }

    let id = CapabilityId::parse(fields[0])?;
    let kind = parse_kind(fields[1])?;
    let item_type = parse_item_type(fields[2])?;
    let mut reader = FieldReader {
        fields: &fields,
        pos: HEADER_FIELDS,
        kind,
    };

    let container = match kind {
        ContainerKind::OneValue => {
            reader.require(HEADER_FIELDS + item_type.text_fields())?;
            Container::OneValue(reader.item(item_type)?)
        }
        ContainerKind::Array => {
            reader.require(HEADER_FIELDS + 1)?;
            let count = reader.number("item count")?;
            // Quoted frames take one field each, so `count` is the floor.
            reader.require(HEADER_FIELDS + 1 + count as usize)?;
            Container::Array {
                item_type,
                items: reader.items(item_type, count)?,
            }
        }
        ContainerKind::Enumeration => {
            reader.require(HEADER_FIELDS + 3)?;
            let count = reader.number("item count")?;
            let current_index = reader.number("current index")?;
            let default_index = reader.number("default index")?;
            reader.require(HEADER_FIELDS + 3 + count as usize)?;
            Container::Enumeration {
                item_type,
                current_index,
                default_index,
                items: reader.items(item_type, count)?,
            }
        }
        ContainerKind::Range => {
            if !item_type.is_rangeable() {
                return Err(CodecError::NotRangeable(item_type));
            }
            reader.require(HEADER_FIELDS + RANGE_VALUES)?;
            let min = reader.item(item_type)?;
            let max = reader.item(item_type)?;
            let step = reader.item(item_type)?;
            let default = reader.item(item_type)?;
            let current = reader.item(item_type)?;
            if reader.remaining() > 0 {
                warn!(
                    extra = reader.remaining(),
                    id = %id,
                    "Dropping trailing range fields; a range has no count field"
                );
                reader.pos = fields.len();
            }
            Container::Range(Range::new(item_type, min, max, step, default, current)?)
        }
    };

    if reader.remaining() > 0 {
        return Err(CodecError::TrailingFields {
            kind,
            expected: reader.pos,
            actual: fields.len(),
        });
    }
    Capability::new(id, container)
}

struct FieldReader<'a> {
    fields: &'a [&'a str],
    pos: usize,
    kind: ContainerKind,
}

impl FieldReader<'_> {
    fn remaining(&self) -> usize {
        self.fields.len().saturating_sub(self.pos)
    }

    fn require(&self, expected: usize) -> Result<(), CodecError> {
        if self.fields.len() < expected {
            return Err(CodecError::MissingFields {
                kind: self.kind,
                expected,
                actual: self.fields.len(),
            });
        }
        Ok(())
    }

    fn number(&mut self, field: &'static str) -> Result<u32, CodecError> {
        let text = self.fields[self.pos];
        self.pos += 1;
        parse_int(text).ok_or_else(|| CodecError::InvalidField {
            field,
            text: text.to_string(),
        })
    }

    fn item(&mut self, item_type: ItemType) -> Result<Item, CodecError> {
        // A quoted frame arrives as one field holding all four corners.
        let width = match item_type {
            ItemType::Frame if self.fields.get(self.pos).is_some_and(|f| f.contains(',')) => 1,
            _ => item_type.text_fields(),
        };
        let end = self.pos + width;
        if end > self.fields.len() {
            return Err(CodecError::MissingFields {
                kind: self.kind,
                expected: end,
                actual: self.fields.len(),
            });
        }
        let item = Item::parse(item_type, &self.fields[self.pos..end])?;
        self.pos = end;
        Ok(item)
    }

    fn items(&mut self, item_type: ItemType, count: u32) -> Result<Vec<Item>, CodecError> {
        (0..count).map(|_| self.item(item_type)).collect()
    }
}

fn parse_kind(text: &str) -> Result<ContainerKind, CodecError> {
    ContainerKind::from_name(text.trim())
        .or_else(|| parse_int(text).and_then(ContainerKind::from_code))
        .ok_or_else(|| CodecError::UnknownContainer(text.to_string()))
}

fn parse_item_type(text: &str) -> Result<ItemType, CodecError> {
    ItemType::from_name(text.trim())
        .or_else(|| parse_int(text).and_then(ItemType::from_code))
        .ok_or_else(|| CodecError::UnknownItemType(text.to_string()))
}

fn push_item(fields: &mut Vec<String>, item: &Item) {
    match item {
        Item::Frame(frame) => {
            for corner in [frame.left, frame.top, frame.right, frame.bottom] {
                fields.push(corner.to_string());
            }
        }
        Item::Str32(s) | Item::Str64(s) | Item::Str128(s) | Item::Str255(s) => {
            fields.push(quote(s));
        }
        _ => fields.push(item.to_text()),
    }
}

fn quote(text: &str) -> String {
    let needs_quotes = text.contains([',', '"'])
        || text.starts_with(char::is_whitespace)
        || text.ends_with(char::is_whitespace);
    if needs_quotes {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

/// Split a record on commas, honouring double quotes.
fn split_fields(text: &str) -> Result<Vec<String>, CodecError> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut was_quoted = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if quoted {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => quoted = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.trim().is_empty() && !was_quoted => {
                field.clear();
                quoted = true;
                was_quoted = true;
            }
            ',' => {
                fields.push(finish_field(std::mem::take(&mut field), was_quoted));
                was_quoted = false;
            }
            _ => field.push(c),
        }
    }
    if quoted {
        return Err(CodecError::UnterminatedQuote);
    }
    fields.push(finish_field(field, was_quoted));
    Ok(fields)
}

fn finish_field(field: String, was_quoted: bool) -> String {
    if was_quoted {
        field
    } else {
        field.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::types::{Fix32, Frame};

    #[test]
    fn test_decode_one_value() {
        let cap = decode("CAP_XRESOLUTION,TWON_ONEVALUE,TWTY_UINT32,200").unwrap();
        assert_eq!(cap.id, CapabilityId::XRESOLUTION);
        assert_eq!(cap.container, Container::OneValue(Item::UInt32(200)));
        assert_eq!(
            encode(&cap).unwrap(),
            "ICAP_XRESOLUTION,TWON_ONEVALUE,TWTY_UINT32,200"
        );
    }

    #[test]
    fn test_decode_fix32_range() {
        let cap = decode("CAP_BRIGHTNESS,TWON_RANGE,TWTY_FIX32,0,100,200,5,50,50").unwrap();
        assert_eq!(cap.id, CapabilityId::BRIGHTNESS);
        let Container::Range(range) = &cap.container else {
            panic!("expected a range, got {:?}", cap.container);
        };
        let value = |item: &Item| match item {
            Item::Fix32(v) => *v,
            other => panic!("expected fix32, got {other:?}"),
        };
        assert_eq!(value(&range.min).to_f64(), 0.0);
        assert_eq!(value(&range.max).to_f64(), 100.0);
        assert_eq!(value(&range.step).to_f64(), 200.0);
        assert_eq!(range.step.to_bits(), Some(200 << 16));
        assert_eq!(value(&range.default).to_f64(), 5.0);
        assert_eq!(value(&range.current).to_f64(), 50.0);
    }

    #[test]
    fn test_decode_enumeration() {
        let cap = decode("ICAP_XRESOLUTION,TWON_ENUMERATION,TWTY_UINT16,3,2,0,100,200,300").unwrap();
        assert_eq!(cap.container.current(), Some(&Item::UInt16(300)));
        assert_eq!(cap.container.items().len(), 3);
    }

    #[test]
    fn test_numeric_header_forms() {
        let cap = decode("0x1118,5,4,300").unwrap();
        assert_eq!(cap.container, Container::OneValue(Item::UInt16(300)));
        assert_eq!(encode(&cap).unwrap(), "ICAP_XRESOLUTION,TWON_ONEVALUE,TWTY_UINT16,300");

        let custom = decode("0x8001,TWON_ONEVALUE,TWTY_BOOL,TRUE").unwrap();
        assert_eq!(encode(&custom).unwrap(), "0x8001,TWON_ONEVALUE,TWTY_BOOL,TRUE");
    }

    #[test]
    fn test_round_trip_each_item_type() {
        let samples = vec![
            Item::Int8(-8),
            Item::Int16(-1600),
            Item::Int32(-320000),
            Item::UInt8(250),
            Item::UInt16(65000),
            Item::UInt32(4_000_000_000),
            Item::Bool(true),
            Item::Fix32(Fix32::new(-3, 0x4000)),
            Item::Frame(Frame {
                left: Fix32::from(0),
                top: Fix32::from(0),
                right: Fix32::new(8, 0x8000),
                bottom: Fix32::from(11),
            }),
            Item::Str32("plain".into()),
            Item::Str64("with, comma".into()),
            Item::Str128("say \"cheese\"".into()),
            Item::Str255(" padded ".into()),
        ];

        for item in samples {
            let item_type = item.item_type();
            let mut containers = vec![
                Container::OneValue(item.clone()),
                Container::Array {
                    item_type,
                    items: vec![item.clone(), item.clone()],
                },
                Container::Enumeration {
                    item_type,
                    current_index: 1,
                    default_index: 0,
                    items: vec![item.clone(), item.clone()],
                },
            ];
            if item_type.is_rangeable() {
                let range = Range::new(
                    item_type,
                    item.clone(),
                    item.clone(),
                    item.clone(),
                    item.clone(),
                    item.clone(),
                )
                .unwrap();
                containers.push(Container::Range(range));
            }

            for container in containers {
                let cap = Capability::new(CapabilityId(0x8001), container).unwrap();
                let text = encode(&cap).unwrap();
                assert_eq!(decode(&text).unwrap(), cap, "text was {text}");
            }
        }
    }

    #[test]
    fn test_quoted_frame() {
        let cap = decode("ICAP_FRAMES,TWON_ARRAY,TWTY_FRAME,2,\"0,0,8.5,11\",1,1,2,2").unwrap();
        assert_eq!(cap.container.items().len(), 2);
        assert_eq!(
            encode(&cap).unwrap(),
            "ICAP_FRAMES,TWON_ARRAY,TWTY_FRAME,2,0.0,0.0,8.5,11.0,1.0,1.0,2.0,2.0"
        );
    }

    #[test]
    fn test_range_with_count_field_shifts_values() {
        let cap = decode("CAP_XRESOLUTION,TWON_RANGE,TWTY_UINT16,4,100,600,1,300,300").unwrap();
        let Container::Range(range) = &cap.container else {
            panic!("expected a range, got {:?}", cap.container);
        };
        assert_eq!(range.min, Item::UInt16(4));
        assert_eq!(range.current, Item::UInt16(300));
        // The sixth value does not survive.
        assert_eq!(
            encode(&cap).unwrap(),
            "ICAP_XRESOLUTION,TWON_RANGE,TWTY_UINT16,4,100,600,1,300"
        );
    }

    #[test]
    fn test_missing_fields_are_descriptive() {
        let err = decode("ICAP_XRESOLUTION,TWON_ENUMERATION,TWTY_UINT16,3,0,0,100,200").unwrap_err();
        assert!(matches!(
            err,
            CodecError::MissingFields { kind: ContainerKind::Enumeration, expected: 9, actual: 8 }
        ));
        assert!(err.to_string().contains("TWON_ENUMERATION"));

        let err = decode("ICAP_BRIGHTNESS,TWON_RANGE,TWTY_FIX32,0,100").unwrap_err();
        assert!(matches!(err, CodecError::MissingFields { kind: ContainerKind::Range, .. }));

        let err = decode("ICAP_BRIGHTNESS,TWON_ONEVALUE").unwrap_err();
        assert!(matches!(err, CodecError::ShortRecord { expected: 3, actual: 2 }));
    }

    #[test]
    fn test_extra_items_rejected() {
        let err = decode("ICAP_PIXELTYPE,TWON_ARRAY,TWTY_UINT16,1,0,2").unwrap_err();
        assert!(matches!(err, CodecError::TrailingFields { expected: 5, actual: 6, .. }));
    }

    #[test]
    fn test_bad_header_values() {
        assert!(matches!(decode("NOPE,TWON_ONEVALUE,TWTY_UINT16,1"), Err(CodecError::UnknownCapability(_))));
        assert!(matches!(decode("0x1118,TWON_BOX,TWTY_UINT16,1"), Err(CodecError::UnknownContainer(_))));
        assert!(matches!(decode("0x1118,TWON_ONEVALUE,TWTY_HANDLE,1"), Err(CodecError::UnknownItemType(_))));
        assert!(matches!(decode("0x1118,TWON_RANGE,TWTY_STR32,a,b,c,d,e"), Err(CodecError::NotRangeable(_))));
        assert!(matches!(decode("0x1118,TWON_ARRAY,TWTY_UINT16,x"), Err(CodecError::InvalidField { .. })));
        assert!(matches!(decode("0x1118,TWON_ONEVALUE,TWTY_STR32,\"open"), Err(CodecError::UnterminatedQuote)));
        assert!(matches!(decode("   "), Err(CodecError::Empty)));
    }

    #[test]
    fn test_codec_trait_object() {
        let codec: Box<dyn CapabilityCodec> = Box::new(TextCodec);
        let cap = codec.decode("CAP_XFERCOUNT,TWON_ONEVALUE,TWTY_INT16,-1").unwrap();
        assert_eq!(codec.encode(&cap).unwrap(), "CAP_XFERCOUNT,TWON_ONEVALUE,TWTY_INT16,-1");
    }
}
