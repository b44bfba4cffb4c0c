// Reshaping step - post-acquisition row transforms
use crate::domain::row::{Row, RowField};
use crate::infrastructure::config::ValueMapConfig;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct ReshapeOutcome {
    pub rows: Vec<Row>,
    /// Rows that could not be reshaped; archived as `fmterr`.
    pub rejected: Vec<Row>,
    pub ignored: usize,
}

pub trait Reshaper: Send + Sync {
    fn reshape(&self, rows: Vec<Row>) -> ReshapeOutcome;
}

/// Remaps the values of one textual field. Unknown values are rejected
/// unless listed in `ignores`, in which case the row is dropped.
pub struct ValueMapper {
    field: RowField,
    map: HashMap<String, String>,
    ignores: HashSet<String>,
}

impl ValueMapper {
    pub fn new(config: &ValueMapConfig) -> Self {
        Self {
            field: config.field,
            map: config
                .map
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect(),
            ignores: config.ignores.iter().map(|i| i.to_lowercase()).collect(),
        }
    }
}

impl Reshaper for ValueMapper {
    fn reshape(&self, rows: Vec<Row>) -> ReshapeOutcome {
        let mut outcome = ReshapeOutcome::default();
        for mut row in rows {
            let current = row.field_text(self.field).to_lowercase();
            if let Some(mapped) = self.map.get(&current) {
                row.set_text_field(self.field, mapped.clone());
                outcome.rows.push(row);
            } else if self.ignores.contains(&current) {
                outcome.ignored += 1;
            } else {
                outcome.rejected.push(row);
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_map_splits_rows() {
        let config: ValueMapConfig = serde_json::from_str(
            r#"{"field": "sensor", "map": {"Main Power": "kw-main"}, "ignores": ["debug"]}"#,
        )
        .unwrap();
        let mapper = ValueMapper::new(&config);
        let outcome = mapper.reshape(vec![
            Row::new("n", "main power", "kw", 1.0, 1.0),
            Row::new("n", "DEBUG", "kw", 1.0, 1.0),
            Row::new("n", "mystery", "kw", 1.0, 1.0),
        ]);

        assert_eq!(outcome.rows, vec![Row::new("n", "kw-main", "kw", 1.0, 1.0)]);
        assert_eq!(outcome.ignored, 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rows.len() + outcome.ignored + outcome.rejected.len(), 3);
    }
}
