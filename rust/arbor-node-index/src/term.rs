//! Typed term keys.
//!
//! A term is a datatype tag, an optional attribute scope and the encoded
//! value bytes. Numeric values use order-preserving big-endian encodings, so
//! that a byte-wise range scan over the term dictionary is a numeric range.

use std::fmt;
use std::str::FromStr;

use arbor_common::{Result, error::Error};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Datatype {
    String,
    Long,
    Double,
    Boolean,
    /// Attribute label terms, one per JSON object entry, carrying the key.
    Attribute,
}

impl Datatype {
    pub const fn name(&self) -> &'static str {
        match self {
            Datatype::String => "string",
            Datatype::Long => "long",
            Datatype::Double => "double",
            Datatype::Boolean => "boolean",
            Datatype::Attribute => "attribute",
        }
    }
}

impl FromStr for Datatype {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "string" => Ok(Datatype::String),
            "long" => Ok(Datatype::Long),
            "double" => Ok(Datatype::Double),
            "boolean" => Ok(Datatype::Boolean),
            "attribute" => Ok(Datatype::Attribute),
            _ => Err(Error::unsupported_configuration(
                "datatype",
                format!("unknown datatype '{name}'"),
            )),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dictionary key of a term.
///
/// Ordered by `(datatype, attribute, value)`: all unscoped terms of a datatype
/// come first, followed by the scoped terms grouped by attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TermKey {
    pub datatype: Datatype,
    pub attribute: Option<String>,
    pub value: Vec<u8>,
}

impl TermKey {
    pub fn new(datatype: Datatype, attribute: Option<String>, value: Vec<u8>) -> TermKey {
        TermKey {
            datatype,
            attribute,
            value,
        }
    }

    pub fn string(value: &str) -> TermKey {
        TermKey::new(Datatype::String, None, value.as_bytes().to_vec())
    }

    pub fn long(value: i64) -> TermKey {
        TermKey::new(Datatype::Long, None, encode_long(value).to_vec())
    }

    pub fn double(value: f64) -> TermKey {
        TermKey::new(Datatype::Double, None, encode_double(value).to_vec())
    }

    pub fn boolean(value: bool) -> TermKey {
        TermKey::new(Datatype::Boolean, None, vec![value as u8])
    }

    /// The label term of an object entry with key `name`.
    pub fn attribute_label(name: &str) -> TermKey {
        TermKey::new(Datatype::Attribute, None, name.as_bytes().to_vec())
    }

    /// Returns the same term scoped to `attribute`.
    pub fn scoped(mut self, attribute: impl Into<String>) -> TermKey {
        self.attribute = Some(attribute.into());
        self
    }

    pub fn unscoped(mut self) -> TermKey {
        self.attribute = None;
        self
    }

    /// Smallest key of `datatype` within `attribute`, for range scans.
    pub fn lowest(datatype: Datatype, attribute: Option<String>) -> TermKey {
        TermKey::new(datatype, attribute, Vec::new())
    }

    /// Decodes the value back into a displayable form.
    pub fn display_value(&self) -> String {
        match self.datatype {
            Datatype::String | Datatype::Attribute => {
                String::from_utf8_lossy(&self.value).into_owned()
            }
            Datatype::Long => <[u8; 8]>::try_from(self.value.as_slice())
                .map(|bytes| decode_long(bytes).to_string())
                .unwrap_or_else(|_| format!("{:?}", self.value)),
            Datatype::Double => <[u8; 8]>::try_from(self.value.as_slice())
                .map(|bytes| decode_double(bytes).to_string())
                .unwrap_or_else(|_| format!("{:?}", self.value)),
            Datatype::Boolean => match self.value.as_slice() {
                [0] => "false".to_string(),
                [1] => "true".to_string(),
                other => format!("{other:?}"),
            },
        }
    }
}

impl fmt::Display for TermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attribute {
            Some(attribute) => write!(f, "{}:{attribute}:{}", self.datatype, self.display_value()),
            None => write!(f, "{}:{}", self.datatype, self.display_value()),
        }
    }
}

/// Sign-flipped big-endian `i64`.
pub fn encode_long(value: i64) -> [u8; 8] {
    ((value as u64) ^ (1 << 63)).to_be_bytes()
}

pub fn decode_long(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ (1 << 63)) as i64
}

/// IEEE-754 bits rearranged so that unsigned byte order matches numeric order:
/// negative values have all bits flipped, non-negative values the sign bit only.
pub fn encode_double(value: f64) -> [u8; 8] {
    let bits = value.to_bits();
    let sortable = if bits >> 63 == 1 {
        !bits
    } else {
        bits ^ (1 << 63)
    };
    sortable.to_be_bytes()
}

pub fn decode_double(bytes: [u8; 8]) -> f64 {
    let sortable = u64::from_be_bytes(bytes);
    let bits = if sortable >> 63 == 1 {
        sortable ^ (1 << 63)
    } else {
        !sortable
    };
    f64::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_names() {
        for datatype in [
            Datatype::String,
            Datatype::Long,
            Datatype::Double,
            Datatype::Boolean,
            Datatype::Attribute,
        ] {
            assert_eq!(datatype.name().parse::<Datatype>().unwrap(), datatype);
        }
        let err = "date".parse::<Datatype>().unwrap_err();
        assert!(err.is_unsupported_configuration());
    }

    #[test]
    fn test_long_encoding_preserves_order() {
        let values = [i64::MIN, -1_000_000, -1, 0, 1, 42, i64::MAX];
        for pair in values.windows(2) {
            assert!(encode_long(pair[0]) < encode_long(pair[1]));
        }
        for value in values {
            assert_eq!(decode_long(encode_long(value)), value);
        }
    }

    #[test]
    fn test_double_encoding_preserves_order() {
        let values = [
            f64::NEG_INFINITY,
            -1e300,
            -2.5,
            -0.0,
            0.0,
            1e-300,
            2.5,
            1e300,
            f64::INFINITY,
        ];
        for pair in values.windows(2) {
            assert!(encode_double(pair[0]) <= encode_double(pair[1]));
        }
        for value in values {
            assert_eq!(decode_double(encode_double(value)), value);
        }
    }

    #[test]
    fn test_term_key_order_and_display() {
        let plain = TermKey::string("x");
        let scoped = TermKey::string("a").scoped("b");
        assert!(plain < scoped);
        assert!(TermKey::long(5) < TermKey::long(6));
        assert_eq!(scoped.to_string(), "string:b:a");
        assert_eq!(TermKey::long(-3).to_string(), "long:-3");
        assert_eq!(TermKey::boolean(true).to_string(), "boolean:true");
        assert_eq!(scoped.unscoped(), TermKey::string("a"));
    }
}
