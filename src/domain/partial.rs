// Partial aggregation groups for calculated rows
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Contributions seen so far for one timestamp, keyed by source stream uid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialGroup {
    #[serde(default)]
    pub add: BTreeMap<String, f64>,
    #[serde(default)]
    pub sub: BTreeMap<String, f64>,
}

/// Number of distinct contributors a group needs before it can be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expectation {
    pub add_count: usize,
    pub sub_count: usize,
}

/// `timestamp_id -> group` for one generator.
pub type PartialSet = BTreeMap<String, PartialGroup>;

impl PartialGroup {
    /// Fold in contributions carried from an earlier run. Values observed in
    /// the current run win over carried ones for the same source.
    pub fn absorb(&mut self, carried: PartialGroup) {
        for (uid, value) in carried.add {
            self.add.entry(uid).or_insert(value);
        }
        for (uid, value) in carried.sub {
            self.sub.entry(uid).or_insert(value);
        }
    }

    pub fn is_complete(&self, expect: Expectation) -> bool {
        self.add.len() == expect.add_count && self.sub.len() == expect.sub_count
    }

    /// `sum(add) - sum(sub)`, optionally rounded to `precision` decimals.
    pub fn value(&self, precision: Option<u32>) -> f64 {
        let raw = self.add.values().sum::<f64>() - self.sub.values().sum::<f64>();
        match precision {
            Some(digits) => round_to(raw, digits),
            None => raw,
        }
    }
}

pub fn round_to(value: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(add: &[(&str, f64)], sub: &[(&str, f64)]) -> PartialGroup {
        PartialGroup {
            add: add.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            sub: sub.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }

    #[test]
    fn test_completion_requires_exact_counts() {
        let expect = Expectation {
            add_count: 2,
            sub_count: 1,
        };
        assert!(!group(&[("a", 5.0)], &[("c", 2.0)]).is_complete(expect));
        assert!(group(&[("a", 5.0), ("b", 3.0)], &[("c", 2.0)]).is_complete(expect));
    }

    #[test]
    fn test_absorb_keeps_all_sources() {
        let mut current = group(&[("b", 3.0)], &[("c", 2.0)]);
        current.absorb(group(&[("a", 5.0)], &[]));
        assert_eq!(current.value(None), 6.0);
    }

    #[test]
    fn test_rounding() {
        let g = group(&[("a", 0.1), ("b", 0.2)], &[]);
        assert_eq!(g.value(Some(2)), 0.3);
        assert_ne!(g.value(None), 0.3);
        assert_eq!(round_to(2.345, 1), 2.3);
    }
}
