// Row domain model - the record every pipeline stage exchanges
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

use super::stream::StreamId;

/// Column order used for CSV headers and positional SQL parameters.
pub const ROW_FIELDS: [RowField; 5] = [
    RowField::Node,
    RowField::Sensor,
    RowField::Unit,
    RowField::Timestamp,
    RowField::Value,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub node: String,
    pub sensor: String,
    pub unit: String,
    /// Unix seconds
    pub timestamp: f64,
    pub value: f64,
}

impl Row {
    pub fn new(
        node: impl Into<String>,
        sensor: impl Into<String>,
        unit: impl Into<String>,
        timestamp: f64,
        value: f64,
    ) -> Self {
        Self {
            node: node.into(),
            sensor: sensor.into(),
            unit: unit.into(),
            timestamp,
            value,
        }
    }

    /// Build a row carrying the identity of `stream`.
    pub fn for_stream(stream: &StreamId, timestamp: f64, value: f64) -> Self {
        Self::new(
            stream.node.clone(),
            stream.sensor.clone(),
            stream.unit.clone(),
            timestamp,
            value,
        )
    }

    pub fn stream_id(&self) -> StreamId {
        StreamId::new(&self.node, &self.sensor, &self.unit)
    }

    pub fn uid(&self) -> String {
        self.stream_id().uid()
    }

    /// Textual view of a single field, used by selectors and value mappers.
    pub fn field_text(&self, field: RowField) -> Cow<'_, str> {
        match field {
            RowField::Node => Cow::Borrowed(&self.node),
            RowField::Sensor => Cow::Borrowed(&self.sensor),
            RowField::Unit => Cow::Borrowed(&self.unit),
            RowField::Timestamp => Cow::Owned(self.timestamp.to_string()),
            RowField::Value => Cow::Owned(self.value.to_string()),
        }
    }

    /// Replace a textual field. Returns `false` for numeric fields.
    pub fn set_text_field(&mut self, field: RowField, text: String) -> bool {
        match field {
            RowField::Node => self.node = text,
            RowField::Sensor => self.sensor = text,
            RowField::Unit => self.unit = text,
            RowField::Timestamp | RowField::Value => return false,
        }
        true
    }

    /// A row is well-formed when its identity fields are present and both
    /// numbers are finite.
    pub fn is_well_formed(&self) -> bool {
        !self.node.trim().is_empty()
            && !self.sensor.trim().is_empty()
            && !self.unit.trim().is_empty()
            && self.timestamp.is_finite()
            && self.value.is_finite()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RowField {
    Node,
    Sensor,
    Unit,
    Timestamp,
    Value,
}

impl RowField {
    pub fn as_str(self) -> &'static str {
        match self {
            RowField::Node => "node",
            RowField::Sensor => "sensor",
            RowField::Unit => "unit",
            RowField::Timestamp => "timestamp",
            RowField::Value => "value",
        }
    }

    pub fn is_textual(self) -> bool {
        matches!(self, RowField::Node | RowField::Sensor | RowField::Unit)
    }
}

impl fmt::Display for RowField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
