// Watermark (nonce) tracking and query window computation
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_LOOKBACK_SECS: f64 = 86_400.0;
pub const DEFAULT_STEP_SECS: f64 = 31_536_000.0;

/// How missing or reset watermarks are resolved for one source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkPolicy {
    /// Start used for streams with no stored watermark.
    pub default_start: f64,
    /// Operator reset applied to every stream this run, if any.
    pub reset_to: Option<f64>,
}

impl WatermarkPolicy {
    pub fn new(now: f64, init_time: Option<f64>, reset_to: Option<f64>) -> Self {
        Self {
            default_start: init_time.unwrap_or(now - DEFAULT_LOOKBACK_SECS),
            reset_to,
        }
    }
}

/// Per-stream last-ingested timestamps for a single source.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    marks: BTreeMap<String, f64>,
    policy: WatermarkPolicy,
    written: HashSet<String>,
}

impl WatermarkStore {
    pub fn new(marks: BTreeMap<String, f64>, policy: WatermarkPolicy) -> Self {
        Self {
            marks,
            policy,
            written: HashSet::new(),
        }
    }

    /// Stored watermark, or the policy default. A pending reset wins over
    /// stored values until the stream is written this run.
    pub fn get(&self, uid: &str) -> f64 {
        if !self.written.contains(uid) {
            if let Some(reset) = self.policy.reset_to {
                return reset;
            }
        }
        self.marks
            .get(uid)
            .copied()
            .unwrap_or(self.policy.default_start)
    }

    /// Watermark carried from an earlier fetch of `uid`, if any. `None` when
    /// the stream is new or a pending reset overrides it.
    pub fn stored(&self, uid: &str) -> Option<f64> {
        if self.policy.reset_to.is_some() && !self.written.contains(uid) {
            return None;
        }
        self.marks.get(uid).copied()
    }

    /// Unconditional overwrite.
    pub fn set(&mut self, uid: &str, timestamp: f64) {
        self.written.insert(uid.to_string());
        self.marks.insert(uid.to_string(), timestamp);
    }

    /// Persist a pending operator reset for a stream that could not be
    /// fetched, so the reset is not lost once it is marked as applied.
    pub fn commit_pending_reset(&mut self, uid: &str) {
        if let Some(reset) = self.policy.reset_to {
            if !self.written.contains(uid) {
                self.set(uid, reset);
            }
        }
    }

    pub fn materialize(&self) -> BTreeMap<String, f64> {
        self.marks.clone()
    }
}

/// Half-open `[start, stop)` query range, in unix seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub stop: f64,
}

impl TimeWindow {
    /// `start` is clamped to `now` so that `start <= stop <= now` holds even
    /// for a watermark in the future.
    pub fn compute(watermark: f64, step: f64, now: f64) -> Self {
        let start = watermark.min(now);
        let stop = (start + step).min(now);
        Self { start, stop }
    }

    /// Window reaching up to `now`, for sources that only accept a lower bound.
    pub fn since(watermark: f64, now: f64) -> Self {
        let start = watermark.min(now);
        Self { start, stop: now }
    }
}
