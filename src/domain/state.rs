// Persisted pipeline state - carried between runs of a project
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::partial::PartialSet;
use super::stream::GeneratorId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    /// Keyed by configured source name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, SourceState>,
    #[serde(
        default,
        rename = "calculated-row",
        skip_serializing_if = "CalculatedRowState::is_empty"
    )]
    pub calculated_row: CalculatedRowState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceState {
    #[serde(default)]
    pub nonce: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub buff: BTreeMap<String, Vec<f64>>,
    /// Last operator `start-from` reset that has been applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_applied: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalculatedRowState {
    #[serde(default)]
    pub partials: BTreeMap<GeneratorId, PartialSet>,
}

impl CalculatedRowState {
    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    pub fn take(&mut self, id: &GeneratorId) -> PartialSet {
        self.partials.remove(id).unwrap_or_default()
    }

    /// Replace a generator's partial set; empty sets are dropped entirely.
    pub fn replace(&mut self, id: GeneratorId, partials: PartialSet) {
        if partials.is_empty() {
            self.partials.remove(&id);
        } else {
            self.partials.insert(id, partials);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::partial::PartialGroup;
    use crate::domain::stream::StreamId;

    #[test]
    fn test_state_document_shape() {
        let mut state = PipelineState::default();
        let source = state.sources.entry("webctrl".to_string()).or_default();
        source.nonce.insert("n|s|u".to_string(), 1_699_920_000.0);
        source.buff.insert("n|s|u".to_string(), vec![1.5, 2.25]);

        let mut set = PartialSet::new();
        let mut group = PartialGroup::default();
        group.add.insert("n|a|kw".to_string(), 4.0);
        set.insert("100.0".to_string(), group);
        let id = GeneratorId::for_target(&StreamId::new("bldg1", "total-power", "kw"));
        state.calculated_row.replace(id.clone(), set);

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["sources"]["webctrl"]["nonce"]["n|s|u"], 1_699_920_000.0);
        assert_eq!(
            json["calculated-row"]["partials"][id.to_string().as_str()]["100.0"]["add"]["n|a|kw"],
            4.0
        );
        assert!(json["sources"]["webctrl"].get("reset-applied").is_none());

        let back: PipelineState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_replace_with_empty_set_removes_generator() {
        let mut state = CalculatedRowState::default();
        let id = GeneratorId::for_target(&StreamId::new("a", "b", "c"));
        let mut set = PartialSet::new();
        set.insert("1.0".to_string(), PartialGroup::default());
        state.replace(id.clone(), set);
        assert!(!state.is_empty());
        state.replace(id.clone(), PartialSet::new());
        assert!(state.is_empty());
    }
}
