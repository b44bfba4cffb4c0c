// Calculated-row reconciler - sums/differences across streams with partials carried between runs
use crate::domain::partial::{Expectation, PartialGroup, PartialSet};
use crate::domain::row::Row;
use crate::domain::state::CalculatedRowState;
use crate::domain::stream::{GeneratorId, StreamId, parse_timestamp_id, timestamp_id};
use crate::infrastructure::config::{CalculatedRowConfig, GeneratorConfig};
use std::collections::{BTreeMap, BTreeSet};

/// Run every active generator in configuration order. Rows produced by one
/// generator are appended to `data` before the next one runs.
pub fn run_generators(
    generators: &[GeneratorConfig],
    state: &mut CalculatedRowState,
    data: &mut Vec<Row>,
    now: f64,
) -> usize {
    let mut generated = 0;
    for generator in generators {
        if !generator.is_active() {
            tracing::info!("skipping {} generator (inactive)", generator.kind());
            continue;
        }
        let rows = match generator {
            GeneratorConfig::CalculatedRow(config) => {
                CalculatedRowReconciler::new(config).generate(state, data, now)
            }
        };
        tracing::info!(
            "{} data points generated of type: {}",
            rows.len(),
            generator.kind()
        );
        generated += rows.len();
        data.extend(rows);
    }
    generated
}

pub struct CalculatedRowReconciler<'a> {
    config: &'a CalculatedRowConfig,
    target: StreamId,
}

impl<'a> CalculatedRowReconciler<'a> {
    pub fn new(config: &'a CalculatedRowConfig) -> Self {
        let dp = &config.data_point;
        Self {
            config,
            target: StreamId::new(&dp.node, &dp.sensor, &dp.unit),
        }
    }

    pub fn id(&self) -> GeneratorId {
        GeneratorId::for_target(&self.target)
    }

    /// Emit a row for every timestamp whose group is complete; everything
    /// else (carried or new) is written back as this generator's partials.
    pub fn generate(&self, state: &mut CalculatedRowState, data: &[Row], now: f64) -> Vec<Row> {
        let id = self.id();
        let carried = state.take(&id);

        let add_rows = self.config.add.select(data);
        if add_rows.is_empty() {
            tracing::debug!("no contributing rows for {}", self.target);
            state.replace(id, self.evict_stale(carried, now));
            return Vec::new();
        }
        let sub_rows = self
            .config
            .sub
            .as_ref()
            .map(|s| s.select(data))
            .unwrap_or_default();

        let mut groups: BTreeMap<String, PartialGroup> = BTreeMap::new();
        for row in &add_rows {
            groups
                .entry(timestamp_id(row.timestamp))
                .or_default()
                .add
                .insert(row.uid(), row.value);
        }
        for row in &sub_rows {
            groups
                .entry(timestamp_id(row.timestamp))
                .or_default()
                .sub
                .insert(row.uid(), row.value);
        }
        let observed: BTreeSet<String> = groups.keys().cloned().collect();

        for (ts, group) in carried {
            groups.entry(ts).or_default().absorb(group);
        }

        let expect = self.expectation(&groups, &observed);

        let mut emitted = Vec::new();
        let mut remaining = PartialSet::new();
        for (ts, group) in groups {
            let Some(timestamp) = parse_timestamp_id(&ts) else {
                tracing::warn!("discarding partial with invalid timestamp key {:?}", ts);
                continue;
            };
            if group.is_complete(expect) {
                let value = group.value(self.config.modify.round);
                emitted.push(Row::for_stream(&self.target, timestamp, value));
            } else {
                remaining.insert(ts, group);
            }
        }
        emitted.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));

        state.replace(id, self.evict_stale(remaining, now));
        emitted
    }

    fn expectation(
        &self,
        groups: &BTreeMap<String, PartialGroup>,
        observed: &BTreeSet<String>,
    ) -> Expectation {
        let max_of = |count: fn(&PartialGroup) -> usize| {
            observed
                .iter()
                .filter_map(|ts| groups.get(ts))
                .map(count)
                .max()
                .unwrap_or(0)
        };
        let declared = &self.config.expect;
        if declared.add_count.is_none() || declared.sub_count.is_none() {
            tracing::warn!(
                "expected contributor counts for {} not fully declared; inferring from observed data",
                self.target
            );
        }
        Expectation {
            add_count: declared.add_count.unwrap_or_else(|| max_of(|g| g.add.len())),
            sub_count: declared.sub_count.unwrap_or_else(|| max_of(|g| g.sub.len())),
        }
    }

    fn evict_stale(&self, mut partials: PartialSet, now: f64) -> PartialSet {
        let Some(max_age) = self.config.max_partial_age else {
            return partials;
        };
        let cutoff = now - max_age;
        partials.retain(|ts, group| {
            let keep = parse_timestamp_id(ts).map(|t| t >= cutoff).unwrap_or(false);
            if !keep {
                tracing::warn!(
                    "evicting abandoned partial for {} at {} ({} add, {} sub)",
                    self.target,
                    ts,
                    group.add.len(),
                    group.sub.len()
                );
            }
            keep
        });
        partials
    }
}
