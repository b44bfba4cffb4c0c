// Stream identity - normalisation and the derived keys used for all per-stream state
use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between identity fields inside a uid.
pub const UID_DELIMITER: char = '|';

const GENERATOR_ID_VERSION: &str = "v1";

/// Lower-case a field and collapse inner whitespace runs into single hyphens.
pub fn normalize(field: &str) -> String {
    field
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// The `(node, sensor, unit)` triple identifying a logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId {
    pub node: String,
    pub sensor: String,
    pub unit: String,
}

impl StreamId {
    pub fn new(node: &str, sensor: &str, unit: &str) -> Self {
        Self {
            node: normalize(node),
            sensor: normalize(sensor),
            unit: normalize(unit),
        }
    }

    pub fn uid(&self) -> String {
        format!(
            "{}{d}{}{d}{}",
            self.node,
            self.sensor,
            self.unit,
            d = UID_DELIMITER
        )
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uid())
    }
}

/// Key of a calculated-row generator's persisted partial groups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeneratorId(String);

impl GeneratorId {
    pub fn for_target(target: &StreamId) -> Self {
        Self(format!(
            "{}{}{}",
            GENERATOR_ID_VERSION,
            UID_DELIMITER,
            target.uid()
        ))
    }
}

impl fmt::Display for GeneratorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable textual key for an exact timestamp.
pub fn timestamp_id(timestamp: f64) -> String {
    format!("{:?}", timestamp)
}

pub fn parse_timestamp_id(id: &str) -> Option<f64> {
    id.parse::<f64>().ok().filter(|t| t.is_finite())
}
