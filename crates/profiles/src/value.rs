use crate::ordered::OrderedMap;
use crate::{ProfileError, Result};
use log::debug;
use rfplayer_protocol::value_to_string;
use serde::Deserialize;
use serde_json::Value;
use serde_json_path::JsonPath;

/// Returned by value maps for codes they do not list.
pub const UNDEFINED_VALUE: &str = "undefined";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawJsonValueConfig {
    value_path: String,
    #[serde(default)]
    unit_path: Option<String>,
    #[serde(default)]
    bit_mask: Option<i64>,
    #[serde(default)]
    bit_offset: Option<u32>,
    #[serde(default)]
    map: Option<OrderedMap<String>>,
    #[serde(default)]
    factor: Option<f64>,
}

/// Extracts one value from a JSON event frame.
///
/// The first node matched by `value_path` is stringified, then converted in
/// order: bit mask, bit shift, code map, multiplication factor.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawJsonValueConfig")]
pub struct JsonValueConfig {
    value_path: CompiledPath,
    unit_path: Option<CompiledPath>,
    bit_mask: Option<i64>,
    bit_offset: Option<u32>,
    map: Option<OrderedMap<String>>,
    factor: Option<f64>,
}

#[derive(Debug, Clone)]
struct CompiledPath {
    source: String,
    path: JsonPath,
}

impl CompiledPath {
    fn parse(source: &str) -> Result<Self> {
        let path = JsonPath::parse(source).map_err(|err| ProfileError::InvalidJsonPath {
            path: source.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            path,
        })
    }

    fn first<'a>(&self, event: &'a Value) -> Option<&'a Value> {
        self.path.query(event).all().into_iter().next()
    }
}

impl TryFrom<RawJsonValueConfig> for JsonValueConfig {
    type Error = ProfileError;

    fn try_from(raw: RawJsonValueConfig) -> Result<Self> {
        if let Some(offset) = raw.bit_offset.filter(|offset| *offset >= i64::BITS) {
            return Err(ProfileError::InvalidBitOffset(offset));
        }
        Ok(Self {
            value_path: CompiledPath::parse(&raw.value_path)?,
            unit_path: raw.unit_path.as_deref().map(CompiledPath::parse).transpose()?,
            // Zero or empty options behave as if they were not set.
            bit_mask: raw.bit_mask.filter(|mask| *mask != 0),
            bit_offset: raw.bit_offset.filter(|offset| *offset != 0),
            map: raw.map.filter(|map| !map.is_empty()),
            factor: raw.factor.filter(|factor| *factor != 0.0),
        })
    }
}

impl JsonValueConfig {
    pub fn new(value_path: &str) -> Result<Self> {
        Ok(Self {
            value_path: CompiledPath::parse(value_path)?,
            unit_path: None,
            bit_mask: None,
            bit_offset: None,
            map: None,
            factor: None,
        })
    }

    pub fn value_path(&self) -> &str {
        &self.value_path.source
    }

    pub fn unit_path(&self) -> Option<&str> {
        self.unit_path.as_ref().map(|p| p.source.as_str())
    }

    pub fn get_value(&self, event: &Value) -> Option<String> {
        self.find_value(event, &self.value_path)
    }

    pub fn get_unit(&self, event: &Value) -> Option<String> {
        let path = self.unit_path.as_ref()?;
        path.first(event).and_then(value_to_string)
    }

    fn find_value(&self, event: &Value, path: &CompiledPath) -> Option<String> {
        let raw = path.first(event).and_then(value_to_string)?;
        let converted = self.convert(&raw);
        if converted.is_none() {
            debug!("cannot convert {raw:?} extracted by {}", path.source);
        }
        converted
    }

    fn convert(&self, value: &str) -> Option<String> {
        let mut result = value.to_string();
        if let Some(mask) = self.bit_mask {
            result = (parse_int(&result)? & mask).to_string();
        }
        if let Some(offset) = self.bit_offset {
            result = parse_int(&result)?.checked_shr(offset)?.to_string();
        }
        if let Some(map) = &self.map {
            result = map
                .get(&result)
                .cloned()
                .unwrap_or_else(|| UNDEFINED_VALUE.to_string());
        }
        if let Some(factor) = self.factor {
            result = format_float(parse_float(&result)? * factor);
        }
        Some(result)
    }
}

fn parse_int(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

fn parse_float(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}

/// Shortest round-trip representation, always with a fractional part
/// (`100.0`, `21.5`).
pub fn format_float(value: f64) -> String {
    format!("{value:?}")
}
