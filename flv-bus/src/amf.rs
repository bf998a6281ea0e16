//! AMF0 values as found in FLV script-data tags.

use std::io::Cursor;

use amf::{Pair, amf0};
use serde::{Serialize, Serializer, ser::SerializeMap};

use crate::error::{FlvError, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum AmfValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(Vec<(String, AmfValue)>),
    Null,
    Undefined,
    EcmaArray(Vec<(String, AmfValue)>),
    StrictArray(Vec<AmfValue>),
    /// Milliseconds since the epoch; the timezone field is reserved and dropped.
    Date(f64),
}

impl AmfValue {
    /// Property lookup on objects and ECMA arrays.
    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        match self {
            AmfValue::Object(props) | AmfValue::EcmaArray(props) => {
                props.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for AmfValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            AmfValue::Number(n) | AmfValue::Date(n) => serializer.serialize_f64(*n),
            AmfValue::Boolean(b) => serializer.serialize_bool(*b),
            AmfValue::String(s) => serializer.serialize_str(s),
            AmfValue::Null | AmfValue::Undefined => serializer.serialize_unit(),
            AmfValue::Object(props) | AmfValue::EcmaArray(props) => {
                let mut map = serializer.serialize_map(Some(props.len()))?;
                for (k, v) in props {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            AmfValue::StrictArray(items) => items.serialize(serializer),
        }
    }
}

/// Decodes one AMF value from `buf` starting at `*cursor`, leaving the
/// cursor just past it.
pub trait AmfDecoder: Send + Sync {
    fn decode(&self, buf: &[u8], cursor: &mut usize) -> Result<AmfValue>;
}

/// AMF0 decoding backed by the `amf` crate. Reference markers are resolved
/// against the values of the same top-level call.
#[derive(Debug, Default, Clone, Copy)]
pub struct Amf0Decoder;

impl AmfDecoder for Amf0Decoder {
    fn decode(&self, buf: &[u8], cursor: &mut usize) -> Result<AmfValue> {
        let mut reader = Cursor::new(buf);
        reader.set_position(*cursor as u64);

        let value = amf0::Value::read_from(&mut reader).map_err(|e| {
            FlvError::format(format!("invalid AMF0 value at offset {}: {}", *cursor, e))
        })?;
        *cursor = reader.position() as usize;
        AmfValue::try_from(value)
    }
}

fn convert_pairs(entries: Vec<Pair<String, amf0::Value>>) -> Result<Vec<(String, AmfValue)>> {
    entries
        .into_iter()
        .map(|pair| Ok((pair.key, AmfValue::try_from(pair.value)?)))
        .collect()
}

impl TryFrom<amf0::Value> for AmfValue {
    type Error = FlvError;

    fn try_from(value: amf0::Value) -> Result<Self> {
        Ok(match value {
            amf0::Value::Number(n) => AmfValue::Number(n),
            amf0::Value::Boolean(b) => AmfValue::Boolean(b),
            amf0::Value::String(s) | amf0::Value::XmlDocument(s) => AmfValue::String(s),
            amf0::Value::Null => AmfValue::Null,
            amf0::Value::Undefined => AmfValue::Undefined,
            amf0::Value::Object {
                class_name,
                entries,
            } => {
                if let Some(class_name) = class_name {
                    log::debug!("AMF typed object {:?} decoded as plain object", class_name);
                }
                AmfValue::Object(convert_pairs(entries)?)
            }
            amf0::Value::EcmaArray { entries } => AmfValue::EcmaArray(convert_pairs(entries)?),
            amf0::Value::Array { entries } => AmfValue::StrictArray(
                entries
                    .into_iter()
                    .map(AmfValue::try_from)
                    .collect::<Result<_>>()?,
            ),
            amf0::Value::Date { unix_time, .. } => AmfValue::Date(unix_time.as_millis() as f64),
            other => {
                return Err(FlvError::format(format!(
                    "unsupported AMF0 value: {:?}",
                    other
                )));
            }
        })
    }
}
