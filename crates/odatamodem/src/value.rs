//! Scalar value kinds and the materialized value model.
//!
//! This module defines [`PrimitiveKind`], the closed set of primitive value
//! kinds a payload property can declare, and [`ScalarValue`] / [`Value`], the
//! materialized representations produced by the reader and accepted by the
//! writer. It also provides the JSON string-escaping helpers shared by the
//! writer and the text channels.

use core::fmt;
use std::str::FromStr;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bigdecimal::BigDecimal;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// The primitive kind of a property value, as declared by the schema or
/// requested for a stream.
///
/// `Untyped` marks a value with no usable declaration; readers and writers
/// treat it permissively (either channel flavor, any scalar shape).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveKind {
    /// A UTF-8 string value.
    String,
    /// A `true` / `false` value.
    Boolean,
    /// A 32-bit signed integer.
    Int32,
    /// A 64-bit signed integer.
    Int64,
    /// An arbitrary-precision decimal.
    Decimal,
    /// An IEEE 754 double.
    Double,
    /// A byte sequence, base64-encoded on the wire.
    Binary,
    /// A date-time with offset, RFC 3339 on the wire.
    DateTimeOffset,
    /// An enumeration member, carried as its string representation.
    Enumeration,
    /// A dynamic value with no declared kind.
    Untyped,
}

impl PrimitiveKind {
    /// Whether a streamed value of this kind may be drained through a text
    /// channel. Everything except raw binary reads as characters.
    #[must_use]
    pub fn accepts_text_channel(self) -> bool {
        !matches!(self, Self::Binary)
    }

    /// Whether a streamed value of this kind may be drained through a byte
    /// channel (base64 at the wire boundary).
    #[must_use]
    pub fn accepts_binary_channel(self) -> bool {
        matches!(self, Self::Binary | Self::Untyped)
    }
}

/// A materialized scalar payload value.
///
/// The wire shape of each variant follows the OData JSON conventions: binary
/// values are base64 strings, date-times are RFC 3339 strings, non-finite
/// doubles are the quoted literals `"INF"`, `"-INF"` and `"NaN"`.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// A string value.
    String(String),
    /// A boolean value.
    Boolean(bool),
    /// A 32-bit integer value.
    Int32(i32),
    /// A 64-bit integer value.
    Int64(i64),
    /// An arbitrary-precision decimal value.
    Decimal(BigDecimal),
    /// A double value.
    Double(f64),
    /// A binary value, decoded from its base64 wire form.
    Binary(Vec<u8>),
    /// A date-time-with-offset value.
    DateTimeOffset(OffsetDateTime),
    /// An enumeration member name.
    Enumeration(String),
}

impl ScalarValue {
    /// The [`PrimitiveKind`] this value materializes.
    #[must_use]
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::String(_) => PrimitiveKind::String,
            Self::Boolean(_) => PrimitiveKind::Boolean,
            Self::Int32(_) => PrimitiveKind::Int32,
            Self::Int64(_) => PrimitiveKind::Int64,
            Self::Decimal(_) => PrimitiveKind::Decimal,
            Self::Double(_) => PrimitiveKind::Double,
            Self::Binary(_) => PrimitiveKind::Binary,
            Self::DateTimeOffset(_) => PrimitiveKind::DateTimeOffset,
            Self::Enumeration(_) => PrimitiveKind::Enumeration,
        }
    }

    /// Returns the string content if this value is [`String`].
    ///
    /// [`String`]: ScalarValue::String
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        if let Self::String(s) = self {
            Some(s)
        } else {
            None
        }
    }

    /// Whether this value satisfies a declaration of `declared` kind.
    ///
    /// Integer widening (`Int32` into `Int64`, integers into `Decimal` or
    /// `Double`) and string-backed enumeration members are accepted;
    /// everything else must match exactly. `Untyped` accepts any value.
    #[must_use]
    pub fn conforms_to(&self, declared: PrimitiveKind) -> bool {
        use PrimitiveKind as K;
        match declared {
            K::Untyped => true,
            K::String => matches!(self, Self::String(_)),
            K::Boolean => matches!(self, Self::Boolean(_)),
            K::Int32 => matches!(self, Self::Int32(_)),
            K::Int64 => matches!(self, Self::Int64(_) | Self::Int32(_)),
            K::Decimal => matches!(self, Self::Decimal(_) | Self::Int32(_) | Self::Int64(_)),
            K::Double => matches!(self, Self::Double(_) | Self::Int32(_) | Self::Int64(_)),
            K::Binary => matches!(self, Self::Binary(_)),
            K::DateTimeOffset => matches!(self, Self::DateTimeOffset(_)),
            K::Enumeration => matches!(self, Self::Enumeration(_) | Self::String(_)),
        }
    }

    /// The canonical wire text of this value, without surrounding quotes.
    ///
    /// This is the character sequence a text channel yields when the value is
    /// streamed instead of materialized (binary values are their base64
    /// form).
    #[must_use]
    pub fn wire_text(&self) -> String {
        match self {
            Self::String(s) | Self::Enumeration(s) => s.clone(),
            Self::Boolean(b) => if *b { "true" } else { "false" }.to_string(),
            Self::Int32(n) => n.to_string(),
            Self::Int64(n) => n.to_string(),
            Self::Decimal(d) => d.to_string(),
            Self::Double(d) => double_wire_text(*d),
            Self::Binary(bytes) => BASE64.encode(bytes),
            Self::DateTimeOffset(odt) => odt.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

impl From<&str> for ScalarValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for ScalarValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i32> for ScalarValue {
    fn from(n: i32) -> Self {
        Self::Int32(n)
    }
}

impl From<i64> for ScalarValue {
    fn from(n: i64) -> Self {
        Self::Int64(n)
    }
}

impl From<f64> for ScalarValue {
    fn from(n: f64) -> Self {
        Self::Double(n)
    }
}

/// A materialized property value: a nullable primitive or a collection.
///
/// Structured (resource) values never appear here; they are traversed
/// item-by-item through the reader and writer state machines instead.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A scalar value; `None` is the JSON `null`.
    Primitive(Option<ScalarValue>),
    /// An ordered collection of values.
    Collection(Vec<Value>),
}

impl Value {
    /// The JSON `null` value.
    #[must_use]
    pub fn null() -> Self {
        Self::Primitive(None)
    }

    /// Returns `true` if this is a null primitive.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Primitive(None))
    }

    /// Returns the scalar if this is a non-null primitive.
    #[must_use]
    pub fn as_primitive(&self) -> Option<&ScalarValue> {
        if let Self::Primitive(Some(v)) = self {
            Some(v)
        } else {
            None
        }
    }

    /// Returns the elements if this is a collection.
    #[must_use]
    pub fn as_collection(&self) -> Option<&[Value]> {
        if let Self::Collection(items) = self {
            Some(items)
        } else {
            None
        }
    }
}

impl From<ScalarValue> for Value {
    fn from(v: ScalarValue) -> Self {
        Self::Primitive(Some(v))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Primitive(Some(s.into()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Primitive(Some(s.into()))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Primitive(Some(b.into()))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Primitive(Some(n.into()))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Primitive(Some(n.into()))
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Primitive(Some(n.into()))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(None) => f.write_str("null"),
            Self::Primitive(Some(v)) => write_scalar(v, f),
            Self::Collection(items) => {
                f.write_str("[")?;
                let mut first = true;
                for item in items {
                    if !first {
                        f.write_str(",")?;
                    }
                    first = false;
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_scalar(self, f)
    }
}

/// Wire text of a double, using the quoted spellings for non-finite values.
fn double_wire_text(d: f64) -> String {
    if d == f64::INFINITY {
        "INF".to_string()
    } else if d == f64::NEG_INFINITY {
        "-INF".to_string()
    } else if d.is_nan() {
        "NaN".to_string()
    } else {
        let mut s = d.to_string();
        // Keep doubles round-trippable as doubles on the wire.
        if !s.contains(['.', 'e', 'E']) {
            s.push_str(".0");
        }
        s
    }
}

/// Parses the quoted non-finite double spellings.
pub(crate) fn non_finite_double(s: &str) -> Option<f64> {
    match s {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => None,
    }
}

/// Parses a decimal wire representation.
pub(crate) fn parse_decimal(s: &str) -> Option<BigDecimal> {
    BigDecimal::from_str(s).ok()
}

/// Writes one scalar in its JSON wire form.
pub(crate) fn write_scalar<W: fmt::Write>(value: &ScalarValue, out: &mut W) -> fmt::Result {
    match value {
        ScalarValue::String(s) | ScalarValue::Enumeration(s) => write_quoted(s, out),
        ScalarValue::Boolean(b) => out.write_str(if *b { "true" } else { "false" }),
        ScalarValue::Int32(n) => write!(out, "{n}"),
        ScalarValue::Int64(n) => write!(out, "{n}"),
        ScalarValue::Decimal(d) => write!(out, "{d}"),
        ScalarValue::Double(d) => {
            if d.is_finite() {
                out.write_str(&double_wire_text(*d))
            } else {
                write_quoted(&double_wire_text(*d), out)
            }
        }
        ScalarValue::Binary(bytes) => write_quoted(&BASE64.encode(bytes), out),
        ScalarValue::DateTimeOffset(odt) => {
            let text = odt.format(&Rfc3339).map_err(|_| fmt::Error)?;
            write_quoted(&text, out)
        }
    }
}

/// Writes `src` as a quoted JSON string literal.
pub(crate) fn write_quoted<W: fmt::Write>(src: &str, out: &mut W) -> fmt::Result {
    out.write_char('"')?;
    write_escaped(src, out)?;
    out.write_char('"')
}

/// Escapes `src` for inclusion inside a JSON string literal.
///
/// Quotes, backslashes and control characters are escaped; the common control
/// characters use their two-character short forms.
pub(crate) fn write_escaped<W: fmt::Write>(src: &str, out: &mut W) -> fmt::Result {
    for c in src.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\u{0008}' => out.write_str("\\b")?,
            '\u{000C}' => out.write_str("\\f")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04X}", c as u32)?,
            _ => out.write_char(c)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn rendered(v: &ScalarValue) -> String {
        let mut s = String::new();
        write_scalar(v, &mut s).unwrap();
        s
    }

    #[test]
    fn scalar_wire_forms() {
        assert_eq!(rendered(&ScalarValue::from("a\"b")), r#""a\"b""#);
        assert_eq!(rendered(&ScalarValue::from(true)), "true");
        assert_eq!(rendered(&ScalarValue::from(37)), "37");
        assert_eq!(rendered(&ScalarValue::from(1.5)), "1.5");
        assert_eq!(rendered(&ScalarValue::from(2.0)), "2.0");
        assert_eq!(rendered(&ScalarValue::Binary(vec![1, 2, 3])), "\"AQID\"");
    }

    #[test]
    fn non_finite_doubles_are_quoted() {
        assert_eq!(rendered(&ScalarValue::Double(f64::INFINITY)), "\"INF\"");
        assert_eq!(rendered(&ScalarValue::Double(f64::NEG_INFINITY)), "\"-INF\"");
        assert_eq!(rendered(&ScalarValue::Double(f64::NAN)), "\"NaN\"");
        assert_eq!(non_finite_double("INF"), Some(f64::INFINITY));
    }

    #[test]
    fn datetime_offset_renders_rfc3339() {
        let v = ScalarValue::DateTimeOffset(datetime!(2024-05-01 12:30:00 UTC));
        assert_eq!(rendered(&v), "\"2024-05-01T12:30:00Z\"");
    }

    #[test]
    fn control_characters_escape() {
        assert_eq!(rendered(&ScalarValue::from("a\nb\u{0001}")), "\"a\\nb\\u0001\"");
    }

    #[test]
    fn integer_widening_conformance() {
        assert!(ScalarValue::Int32(1).conforms_to(PrimitiveKind::Int64));
        assert!(ScalarValue::Int64(1).conforms_to(PrimitiveKind::Decimal));
        assert!(!ScalarValue::Int64(1).conforms_to(PrimitiveKind::Int32));
        assert!(!ScalarValue::from("x").conforms_to(PrimitiveKind::Int32));
        assert!(ScalarValue::from("x").conforms_to(PrimitiveKind::Untyped));
    }

    #[test]
    fn collection_display() {
        let v = Value::Collection(vec![Value::from("one"), Value::null()]);
        assert_eq!(v.to_string(), r#"["one",null]"#);
    }
}
