//! Triple-shaped wire rendering of trace events.
//!
//! Each property renders as a JSON array `[name, tag, text]`. A record
//! renders as an object carrying its identity, an RFC 3339 timestamp and the
//! property triples in order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value as JsonValue, json};

use crate::error::CoreError;
use crate::property::{DataProperty, PropertyTag, PropertyValue};
use crate::record::DataRecord;

impl DataProperty {
    /// Render as `[name, tag, text]`.
    pub fn to_wire(&self) -> JsonValue {
        json!([self.name, self.tag().as_str(), self.value.to_text()])
    }

    /// Parse a `[name, tag, text]` triple.
    pub fn from_wire(wire: &JsonValue) -> Result<Self, CoreError> {
        let items = wire
            .as_array()
            .ok_or_else(|| CoreError::MalformedWire(format!("expected array, got {wire}")))?;
        let [name, tag, text] = items.as_slice() else {
            return Err(CoreError::MalformedWire(format!(
                "expected 3 elements, got {}",
                items.len()
            )));
        };
        let field = |v: &JsonValue, what: &str| {
            v.as_str()
                .map(str::to_owned)
                .ok_or_else(|| CoreError::MalformedWire(format!("{what} must be a string")))
        };
        let name = field(name, "name")?;
        let tag: PropertyTag = field(tag, "tag")?.parse()?;
        let value = PropertyValue::parse(tag, &field(text, "value")?)?;
        Ok(Self { name, value })
    }
}

impl DataRecord {
    /// Render the record with its properties as wire triples.
    pub fn to_wire(&self) -> JsonValue {
        let properties: Vec<JsonValue> = self.properties.iter().map(DataProperty::to_wire).collect();
        json!({
            "provider": self.provider,
            "scope": self.scope,
            "message": self.message,
            "timestamp": self.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            "properties": properties,
        })
    }

    /// Parse a record produced by [`DataRecord::to_wire`].
    pub fn from_wire(wire: &JsonValue) -> Result<Self, CoreError> {
        let text = |key: &str| {
            wire.get(key)
                .and_then(JsonValue::as_str)
                .map(str::to_owned)
                .ok_or_else(|| CoreError::MalformedWire(format!("missing string field '{key}'")))
        };
        let timestamp = DateTime::parse_from_rfc3339(&text("timestamp")?)
            .map_err(|e| CoreError::MalformedWire(format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        let properties = wire
            .get("properties")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| CoreError::MalformedWire("missing 'properties' array".into()))?
            .iter()
            .map(DataProperty::from_wire)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            provider: text("provider")?,
            scope: text("scope")?,
            message: text("message")?,
            timestamp,
            properties,
        })
    }
}
