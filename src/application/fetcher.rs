// Windowed fetcher - incremental acquisition driven by per-stream watermarks
use crate::application::remote_source::{QueryShape, RawPoint, Reading, RemoteSource, StreamDescriptor};
use crate::domain::dedup::DedupBuffers;
use crate::domain::row::Row;
use crate::domain::watermark::{TimeWindow, WatermarkStore};

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub rows: Vec<Row>,
    /// Uids of streams whose query failed this run.
    pub failed: Vec<String>,
}

pub struct WindowedFetcher<'a> {
    source: &'a dyn RemoteSource,
    step: f64,
}

impl<'a> WindowedFetcher<'a> {
    pub fn new(source: &'a dyn RemoteSource, step: f64) -> Self {
        Self { source, step }
    }

    pub fn window_for(&self, watermark: f64, now: f64) -> TimeWindow {
        match self.source.shape() {
            QueryShape::Windowed => TimeWindow::compute(watermark, self.step, now),
            QueryShape::Since => TimeWindow::since(watermark, now),
        }
    }

    /// Fetch every stream in order. A failing stream is logged and skipped
    /// with its watermark untouched; the rest of the batch continues.
    pub async fn fetch_all(
        &self,
        streams: &[StreamDescriptor],
        watermarks: &mut WatermarkStore,
        mut buffers: Option<&mut DedupBuffers>,
        now: f64,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        for stream in streams {
            let uid = stream.uid();
            let mark = watermarks.get(&uid);
            let floor = watermarks.stored(&uid);
            let window = self.window_for(mark, now);

            tracing::info!("querying {} [{} .. {}]", stream.locator, window.start, window.stop);
            let points = match self.source.query(stream, window).await {
                Ok(points) => points,
                Err(e) => {
                    tracing::warn!("query failed for {} ({}): {:#}", stream.locator, uid, e);
                    watermarks.commit_pending_reset(&uid);
                    outcome.failed.push(uid);
                    continue;
                }
            };

            let rows = to_rows(stream, points, floor, buffers.as_deref_mut());

            // An empty fetch keeps the current watermark so the same window is
            // retried next run; `start` may have been clamped to `now`.
            let next = rows.iter().map(|r| r.timestamp).fold(mark, f64::max);
            watermarks.set(&uid, next);

            tracing::debug!("{} rows from {}, watermark now {}", rows.len(), uid, next);
            outcome.rows.extend(rows);
        }

        outcome
    }
}

/// Points at or before `floor` were ingested by an earlier fetch; sources
/// with coarse query bounds hand them back again.
fn to_rows(
    stream: &StreamDescriptor,
    points: Vec<RawPoint>,
    floor: Option<f64>,
    buffers: Option<&mut DedupBuffers>,
) -> Vec<Row> {
    let total = points.len();
    let valid: Vec<(RawPoint, f64)> = points
        .into_iter()
        .filter(|p| floor.map_or(true, |f| p.timestamp > f))
        .filter_map(|p| match p.reading {
            Reading::Value(v) if v.is_finite() && p.timestamp.is_finite() => Some((p, v)),
            _ => None,
        })
        .collect();
    if valid.len() < total {
        tracing::debug!(
            "{} of {} points from {} were stale or missing",
            total - valid.len(),
            total,
            stream.locator
        );
    }

    let fresh = match buffers {
        Some(buf) => buf.filter_new(valid, |(p, _)| (p.identity(stream).uid(), p.timestamp)),
        None => valid,
    };

    fresh
        .into_iter()
        .map(|(p, v)| Row::for_stream(&p.identity(stream), p.timestamp, v))
        .collect()
}
