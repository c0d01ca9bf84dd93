//! Typed scalar values attached to trace events.
//!
//! A [`DataProperty`] is a named [`PropertyValue`]. Each value carries exactly
//! one payload, identified by its [`PropertyTag`]. The typed `as_*` accessors
//! only succeed for the matching tag: an integer is never handed out as a
//! string, a timestamp never as an integer.
//!
//! [`PropertyValue::Opaque`] is the fallback for value shapes a capture adapter
//! did not recognise. It keeps only a textual rendering and never compares
//! equal to anything, including another opaque value with the same text.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Discriminant of a [`PropertyValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyTag {
    Null,
    String,
    Integer,
    Boolean,
    Enum,
    SeverityLevel,
    Double,
    Timestamp,
    TimestampWithOffset,
    Uuid,
    Opaque,
}

impl PropertyTag {
    /// Return the stable wire name of the tag.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Enum => "enum",
            Self::SeverityLevel => "severity_level",
            Self::Double => "double",
            Self::Timestamp => "timestamp",
            Self::TimestampWithOffset => "timestamp_with_offset",
            Self::Uuid => "uuid",
            Self::Opaque => "opaque",
        }
    }
}

impl FromStr for PropertyTag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(Self::Null),
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "boolean" => Ok(Self::Boolean),
            "enum" => Ok(Self::Enum),
            "severity_level" => Ok(Self::SeverityLevel),
            "double" => Ok(Self::Double),
            "timestamp" => Ok(Self::Timestamp),
            "timestamp_with_offset" => Ok(Self::TimestampWithOffset),
            "uuid" => Ok(Self::Uuid),
            "opaque" => Ok(Self::Opaque),
            other => Err(CoreError::UnknownTag(other.to_owned())),
        }
    }
}

impl fmt::Display for PropertyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a log event, ordered from least to most severe.
///
/// `None` sorts last and marks an event that should never be emitted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Severity {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
    None,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
            Self::None => "None",
        }
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Trace" => Ok(Self::Trace),
            "Debug" => Ok(Self::Debug),
            "Information" => Ok(Self::Information),
            "Warning" => Ok(Self::Warning),
            "Error" => Ok(Self::Error),
            "Critical" => Ok(Self::Critical),
            "None" => Ok(Self::None),
            other => Err(CoreError::InvalidValue {
                tag: "severity_level",
                value: other.to_owned(),
            }),
        }
    }
}

/// A value of a named enumeration, kept symbolically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnumValue {
    /// Name of the enumeration type (may be empty).
    pub type_name: String,
    /// Name of the variant.
    pub variant: String,
}

impl EnumValue {
    /// Variant `variant` of enumeration `type_name`.
    pub fn new(type_name: impl Into<String>, variant: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            variant: variant.into(),
        }
    }

    /// Lossless text form: `Type.Variant`, or `Variant` when untyped.
    /// Dots and backslashes inside either part are escaped with `\`.
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.type_name.len() + self.variant.len() + 1);
        if !self.type_name.is_empty() {
            escape_into(&self.type_name, &mut out);
            out.push('.');
        }
        escape_into(&self.variant, &mut out);
        out
    }

    /// Inverse of [`EnumValue::to_text`]. At most one unescaped dot is allowed.
    pub fn parse_text(text: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidValue {
            tag: PropertyTag::Enum.as_str(),
            value: text.to_owned(),
        };
        let mut parts = vec![String::new()];
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let escaped = chars.next().ok_or_else(invalid)?;
                    parts.last_mut().ok_or_else(invalid)?.push(escaped);
                }
                '.' if parts.len() == 1 => parts.push(String::new()),
                '.' => return Err(invalid()),
                other => parts.last_mut().ok_or_else(invalid)?.push(other),
            }
        }
        let variant = parts.pop().ok_or_else(invalid)?;
        let type_name = parts.pop().unwrap_or_default();
        Ok(Self { type_name, variant })
    }
}

fn escape_into(part: &str, out: &mut String) {
    for c in part.chars() {
        if matches!(c, '.' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl fmt::Display for EnumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.type_name.is_empty() {
            f.write_str(&self.variant)
        } else {
            write!(f, "{}.{}", self.type_name, self.variant)
        }
    }
}

/// Tagged scalar payload of a [`DataProperty`].
///
/// Equality is structural on `(tag, payload)` with two exceptions:
/// `Double` compares the IEEE bit pattern (so `NaN == NaN` and `0.0 != -0.0`),
/// and `Opaque` is never equal to anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropertyValue {
    Null,
    String(String),
    Integer(i64),
    Boolean(bool),
    Enum(EnumValue),
    Severity(Severity),
    Double(f64),
    Timestamp(DateTime<Utc>),
    TimestampWithOffset(DateTime<FixedOffset>),
    Uuid(Uuid),
    Opaque(String),
}

impl PropertyValue {
    /// Return the tag of this value.
    #[must_use]
    pub fn tag(&self) -> PropertyTag {
        match self {
            Self::Null => PropertyTag::Null,
            Self::String(_) => PropertyTag::String,
            Self::Integer(_) => PropertyTag::Integer,
            Self::Boolean(_) => PropertyTag::Boolean,
            Self::Enum(_) => PropertyTag::Enum,
            Self::Severity(_) => PropertyTag::SeverityLevel,
            Self::Double(_) => PropertyTag::Double,
            Self::Timestamp(_) => PropertyTag::Timestamp,
            Self::TimestampWithOffset(_) => PropertyTag::TimestampWithOffset,
            Self::Uuid(_) => PropertyTag::Uuid,
            Self::Opaque(_) => PropertyTag::Opaque,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_severity(&self) -> Option<Severity> {
        match self {
            Self::Severity(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_timestamp_with_offset(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::TimestampWithOffset(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(u) => Some(*u),
            _ => None,
        }
    }

    /// Textual rendering of an opaque value.
    pub fn as_opaque(&self) -> Option<&str> {
        match self {
            Self::Opaque(s) => Some(s),
            _ => None,
        }
    }

    /// Render the payload as text, without the tag.
    ///
    /// [`PropertyValue::parse`] with the same tag restores an equal value for
    /// every tag except `Opaque`, which restores an opaque value with the
    /// same text.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::String(s) | Self::Opaque(s) => s.clone(),
            Self::Integer(n) => n.to_string(),
            Self::Boolean(b) => b.to_string(),
            Self::Enum(e) => e.to_text(),
            Self::Severity(s) => s.as_str().to_owned(),
            Self::Double(f) => f.to_string(),
            Self::Timestamp(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Self::TimestampWithOffset(t) => t.to_rfc3339_opts(SecondsFormat::AutoSi, false),
            Self::Uuid(u) => u.hyphenated().to_string(),
        }
    }

    /// Parse a textual payload for the given tag.
    pub fn parse(tag: PropertyTag, text: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidValue {
            tag: tag.as_str(),
            value: text.to_owned(),
        };
        let value = match tag {
            PropertyTag::Null => Self::Null,
            PropertyTag::String => Self::String(text.to_owned()),
            PropertyTag::Integer => Self::Integer(text.parse().map_err(|_| invalid())?),
            PropertyTag::Boolean => Self::Boolean(text.parse().map_err(|_| invalid())?),
            PropertyTag::Enum => Self::Enum(EnumValue::parse_text(text)?),
            PropertyTag::SeverityLevel => Self::Severity(text.parse()?),
            PropertyTag::Double => Self::Double(text.parse().map_err(|_| invalid())?),
            PropertyTag::Timestamp => Self::Timestamp(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|_| invalid())?
                    .with_timezone(&Utc),
            ),
            PropertyTag::TimestampWithOffset => Self::TimestampWithOffset(
                DateTime::parse_from_rfc3339(text).map_err(|_| invalid())?,
            ),
            PropertyTag::Uuid => Self::Uuid(Uuid::parse_str(text).map_err(|_| invalid())?),
            PropertyTag::Opaque => Self::Opaque(text.to_owned()),
        };
        Ok(value)
    }
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Severity(a), Self::Severity(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::Timestamp(a), Self::Timestamp(b)) => a == b,
            // `DateTime` equality ignores the offset; the payload does not.
            (Self::TimestampWithOffset(a), Self::TimestampWithOffset(b)) => {
                a == b && a.offset() == b.offset()
            }
            (Self::Uuid(a), Self::Uuid(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for PropertyValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tag().hash(state);
        match self {
            Self::Null => {}
            Self::String(s) | Self::Opaque(s) => s.hash(state),
            Self::Integer(n) => n.hash(state),
            Self::Boolean(b) => b.hash(state),
            Self::Enum(e) => e.hash(state),
            Self::Severity(s) => s.hash(state),
            Self::Double(f) => f.to_bits().hash(state),
            Self::Timestamp(t) => t.hash(state),
            Self::TimestampWithOffset(t) => {
                t.timestamp().hash(state);
                t.timestamp_subsec_nanos().hash(state);
                t.offset().local_minus_utc().hash(state);
            }
            Self::Uuid(u) => u.hash(state),
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Opaque(s) => write!(f, "opaque({s})"),
            Self::Enum(e) => fmt::Display::fmt(e, f),
            other => f.write_str(&other.to_text()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<Severity> for PropertyValue {
    fn from(value: Severity) -> Self {
        Self::Severity(value)
    }
}

impl From<EnumValue> for PropertyValue {
    fn from(value: EnumValue) -> Self {
        Self::Enum(value)
    }
}

impl From<Uuid> for PropertyValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<DateTime<FixedOffset>> for PropertyValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::TimestampWithOffset(value)
    }
}

/// A named, typed value captured on a trace event.
#[derive(Debug, Clone, PartialEq, Hash, Serialize, Deserialize)]
pub struct DataProperty {
    /// Property name. Names are not required to be unique within a record.
    pub name: String,
    /// The typed payload.
    pub value: PropertyValue,
}

impl DataProperty {
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn null(name: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::Null)
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::String(value.into()))
    }

    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Self::new(name, PropertyValue::Integer(value))
    }

    pub fn boolean(name: impl Into<String>, value: bool) -> Self {
        Self::new(name, PropertyValue::Boolean(value))
    }

    pub fn enumeration(
        name: impl Into<String>,
        type_name: impl Into<String>,
        variant: impl Into<String>,
    ) -> Self {
        Self::new(name, PropertyValue::Enum(EnumValue::new(type_name, variant)))
    }

    pub fn severity(name: impl Into<String>, value: Severity) -> Self {
        Self::new(name, PropertyValue::Severity(value))
    }

    pub fn double(name: impl Into<String>, value: f64) -> Self {
        Self::new(name, PropertyValue::Double(value))
    }

    pub fn timestamp(name: impl Into<String>, value: DateTime<Utc>) -> Self {
        Self::new(name, PropertyValue::Timestamp(value))
    }

    pub fn timestamp_with_offset(name: impl Into<String>, value: DateTime<FixedOffset>) -> Self {
        Self::new(name, PropertyValue::TimestampWithOffset(value))
    }

    pub fn uuid(name: impl Into<String>, value: Uuid) -> Self {
        Self::new(name, PropertyValue::Uuid(value))
    }

    /// Fallback for values of unrecognised shape; keeps only `rendering`.
    pub fn opaque(name: impl Into<String>, rendering: impl Into<String>) -> Self {
        Self::new(name, PropertyValue::Opaque(rendering.into()))
    }

    pub fn tag(&self) -> PropertyTag {
        self.value.tag()
    }

    pub fn value(&self) -> &PropertyValue {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn sample_values() -> Vec<PropertyValue> {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        vec![
            PropertyValue::Null,
            PropertyValue::String("hello".into()),
            PropertyValue::Integer(-42),
            PropertyValue::Boolean(true),
            PropertyValue::Enum(EnumValue::new("Color", "Red")),
            PropertyValue::Enum(EnumValue::new("", "a.b")),
            PropertyValue::Enum(EnumValue::new("", "Plain")),
            PropertyValue::Enum(EnumValue::new("io.Kind", "v1.2")),
            PropertyValue::Enum(EnumValue::new("Path", "C:\\dir\\")),
            PropertyValue::Severity(Severity::Warning),
            PropertyValue::Double(1.5),
            PropertyValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            PropertyValue::TimestampWithOffset(
                offset.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap(),
            ),
            PropertyValue::Uuid(Uuid::from_u128(0x1234_5678)),
        ]
    }

    fn accessor_hits(value: &PropertyValue) -> Vec<PropertyTag> {
        let mut hits = Vec::new();
        if value.is_null() {
            hits.push(PropertyTag::Null);
        }
        if value.as_str().is_some() {
            hits.push(PropertyTag::String);
        }
        if value.as_integer().is_some() {
            hits.push(PropertyTag::Integer);
        }
        if value.as_boolean().is_some() {
            hits.push(PropertyTag::Boolean);
        }
        if value.as_enum().is_some() {
            hits.push(PropertyTag::Enum);
        }
        if value.as_severity().is_some() {
            hits.push(PropertyTag::SeverityLevel);
        }
        if value.as_double().is_some() {
            hits.push(PropertyTag::Double);
        }
        if value.as_timestamp().is_some() {
            hits.push(PropertyTag::Timestamp);
        }
        if value.as_timestamp_with_offset().is_some() {
            hits.push(PropertyTag::TimestampWithOffset);
        }
        if value.as_uuid().is_some() {
            hits.push(PropertyTag::Uuid);
        }
        if value.as_opaque().is_some() {
            hits.push(PropertyTag::Opaque);
        }
        hits
    }

    #[test]
    fn only_the_matching_accessor_succeeds() {
        let mut values = sample_values();
        values.push(PropertyValue::Opaque("{x: 1}".into()));
        for value in &values {
            assert_eq!(accessor_hits(value), vec![value.tag()], "value {value:?}");
        }
    }

    #[test]
    fn accessors_return_constructed_payload() {
        let id = Uuid::new_v4();
        assert_eq!(DataProperty::string("a", "x").value.as_str(), Some("x"));
        assert_eq!(DataProperty::integer("a", 7).value.as_integer(), Some(7));
        assert_eq!(DataProperty::boolean("a", false).value.as_boolean(), Some(false));
        assert_eq!(DataProperty::double("a", 2.25).value.as_double(), Some(2.25));
        assert_eq!(DataProperty::uuid("a", id).value.as_uuid(), Some(id));
        assert_eq!(
            DataProperty::severity("a", Severity::Error).value.as_severity(),
            Some(Severity::Error)
        );
        assert_eq!(
            DataProperty::enumeration("a", "Kind", "Fast").value.as_enum(),
            Some(&EnumValue::new("Kind", "Fast"))
        );
    }

    #[test]
    fn integer_is_not_coerced_to_string_or_double() {
        let value = PropertyValue::Integer(1);
        assert!(value.as_str().is_none());
        assert!(value.as_double().is_none());
        assert!(value.as_boolean().is_none());
        assert_ne!(value, PropertyValue::Double(1.0));
        assert_ne!(value, PropertyValue::String("1".into()));
    }

    #[test]
    fn opaque_never_equals_anything() {
        let a = PropertyValue::Opaque("same".into());
        let b = PropertyValue::Opaque("same".into());
        assert_ne!(a, b);
        assert_ne!(a, a.clone());
        assert_ne!(a, PropertyValue::String("same".into()));
    }

    #[test]
    fn double_equality_is_bitwise() {
        assert_eq!(PropertyValue::Double(f64::NAN), PropertyValue::Double(f64::NAN));
        assert_ne!(PropertyValue::Double(0.0), PropertyValue::Double(-0.0));
    }

    #[test]
    fn offset_is_part_of_the_payload() {
        let plus_two = FixedOffset::east_opt(7200).unwrap();
        let utc = FixedOffset::east_opt(0).unwrap();
        let a = plus_two.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        let b = utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(a, b, "same instant");
        assert_ne!(
            PropertyValue::TimestampWithOffset(a),
            PropertyValue::TimestampWithOffset(b)
        );
    }

    #[test]
    fn text_round_trip_for_every_tag() {
        for value in sample_values() {
            let text = value.to_text();
            let back = PropertyValue::parse(value.tag(), &text).unwrap();
            assert_eq!(back, value, "text {text:?}");
        }
    }

    #[test]
    fn enum_text_escapes_dots() {
        assert_eq!(EnumValue::new("Color", "Red").to_text(), "Color.Red");
        assert_eq!(EnumValue::new("", "a.b").to_text(), "a\\.b");
        assert_eq!(
            EnumValue::parse_text("a\\.b").unwrap(),
            EnumValue::new("", "a.b")
        );
        assert!(EnumValue::parse_text("a.b.c").is_err());
        assert!(EnumValue::parse_text("dangling\\").is_err());
    }

    #[test]
    fn opaque_round_trips_to_opaque_with_same_text() {
        let value = PropertyValue::Opaque("<object>".into());
        let back = PropertyValue::parse(PropertyTag::Opaque, &value.to_text()).unwrap();
        assert_eq!(back.as_opaque(), Some("<object>"));
    }

    #[test]
    fn parse_rejects_bad_payloads() {
        assert!(PropertyValue::parse(PropertyTag::Integer, "1.5").is_err());
        assert!(PropertyValue::parse(PropertyTag::Boolean, "yes").is_err());
        assert!(PropertyValue::parse(PropertyTag::Uuid, "nope").is_err());
        assert!(PropertyValue::parse(PropertyTag::SeverityLevel, "Loud").is_err());
    }

    #[test]
    fn tag_names_round_trip() {
        for value in sample_values() {
            let tag = value.tag();
            assert_eq!(tag.as_str().parse::<PropertyTag>().unwrap(), tag);
        }
        assert!("blob".parse::<PropertyTag>().is_err());
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Trace < Severity::Warning);
        assert!(Severity::Critical < Severity::None);
    }
}
