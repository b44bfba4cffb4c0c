// Rolling duplicate-detection buffers for sources that redeliver points
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
pub struct DedupBuffers {
    span: f64,
    seen: BTreeMap<String, Vec<f64>>,
}

impl DedupBuffers {
    /// `span` is the retained history in seconds, measured back from the
    /// freshest timestamp of each stream.
    pub fn new(span: f64, persisted: BTreeMap<String, Vec<f64>>) -> Self {
        let mut buffers = Self {
            span,
            seen: BTreeMap::new(),
        };
        for (uid, mut stamps) in persisted {
            stamps.retain(|t| t.is_finite());
            stamps.sort_by(f64::total_cmp);
            stamps.dedup();
            buffers.seen.insert(uid.clone(), stamps);
            buffers.prune(&uid);
        }
        buffers
    }

    pub fn contains(&self, uid: &str, timestamp: f64) -> bool {
        self.seen
            .get(uid)
            .map(|s| s.binary_search_by(|t| t.total_cmp(&timestamp)).is_ok())
            .unwrap_or(false)
    }

    /// Drop items whose `(uid, timestamp)` was already seen, then record the
    /// survivors and prune every touched stream.
    pub fn filter_new<T>(&mut self, items: Vec<T>, key: impl Fn(&T) -> (String, f64)) -> Vec<T> {
        let mut touched = BTreeSet::new();
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            let (uid, timestamp) = key(&item);
            if self.contains(&uid, timestamp) {
                tracing::debug!("dropping redelivered point {} @ {}", uid, timestamp);
                continue;
            }
            self.insert(&uid, timestamp);
            touched.insert(uid);
            kept.push(item);
        }
        for uid in &touched {
            self.prune(uid);
        }
        kept
    }

    fn insert(&mut self, uid: &str, timestamp: f64) {
        let stamps = self.seen.entry(uid.to_string()).or_default();
        if let Err(pos) = stamps.binary_search_by(|t| t.total_cmp(&timestamp)) {
            stamps.insert(pos, timestamp);
        }
    }

    fn prune(&mut self, uid: &str) {
        if let Some(stamps) = self.seen.get_mut(uid) {
            if let Some(&freshest) = stamps.last() {
                let cutoff = freshest - self.span;
                stamps.retain(|t| *t >= cutoff);
            }
        }
    }

    pub fn materialize(&self) -> BTreeMap<String, Vec<f64>> {
        self.seen.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffers(span: f64, uid: &str, stamps: &[f64]) -> DedupBuffers {
        let mut persisted = BTreeMap::new();
        persisted.insert(uid.to_string(), stamps.to_vec());
        DedupBuffers::new(span, persisted)
    }

    #[test]
    fn test_redelivered_points_are_rejected() {
        let mut buf = buffers(1000.0, "y", &[100.0, 200.0]);
        let kept = buf.filter_new(vec![100.0, 300.0], |t| ("y".to_string(), *t));
        assert_eq!(kept, vec![300.0]);
        assert_eq!(buf.materialize()["y"], vec![100.0, 200.0, 300.0]);
    }

    #[test]
    fn test_duplicates_within_one_batch() {
        let mut buf = DedupBuffers::new(1000.0, BTreeMap::new());
        let kept = buf.filter_new(vec![5.0, 5.0, 6.0], |t| ("y".to_string(), *t));
        assert_eq!(kept, vec![5.0, 6.0]);
    }

    #[test]
    fn test_buffer_is_pruned_to_span() {
        let mut buf = buffers(150.0, "y", &[100.0, 200.0]);
        buf.filter_new(vec![300.0], |t| ("y".to_string(), *t));
        let stamps = &buf.materialize()["y"];
        assert_eq!(stamps, &vec![200.0, 300.0]);
        assert!(stamps.last().unwrap() - stamps.first().unwrap() <= 150.0);
    }

    #[test]
    fn test_streams_are_independent() {
        let mut buf = buffers(1000.0, "a", &[100.0]);
        let kept = buf.filter_new(
            vec![("a", 100.0), ("b", 100.0)],
            |(uid, t)| (uid.to_string(), *t),
        );
        assert_eq!(kept, vec![("b", 100.0)]);
    }

    #[test]
    fn test_persisted_history_is_normalised() {
        let buf = buffers(50.0, "y", &[300.0, 100.0, 300.0, 280.0]);
        assert_eq!(buf.materialize()["y"], vec![280.0, 300.0]);
    }
}
