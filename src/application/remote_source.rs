// Remote time-series source trait - the narrow interface acquisition adapters implement
use crate::domain::stream::StreamId;
use crate::domain::watermark::TimeWindow;
use crate::infrastructure::config::WindowSettings;
use async_trait::async_trait;

/// How a source wants its window expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryShape {
    /// Bounded `[start, stop]` query, stop limited by the step size.
    Windowed,
    /// Only a lower bound; the source returns whatever arrived after it.
    Since,
}

/// One configured stream to fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Identity given to rows, and the key of the stream's watermark.
    pub identity: StreamId,
    /// Source-specific address (point path, gauge id, ...).
    pub locator: String,
}

impl StreamDescriptor {
    pub fn new(identity: StreamId, locator: impl Into<String>) -> Self {
        Self {
            identity,
            locator: locator.into(),
        }
    }

    pub fn uid(&self) -> String {
        self.identity.uid()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Value(f64),
    /// Source-specific "no reading" sentinel.
    Missing,
}

/// Sub-stream of a multi-channel descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub sensor: String,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    /// Unix seconds
    pub timestamp: f64,
    pub reading: Reading,
    pub channel: Option<Channel>,
}

impl RawPoint {
    pub fn new(timestamp: f64, reading: Reading) -> Self {
        Self {
            timestamp,
            reading,
            channel: None,
        }
    }

    pub fn on_channel(mut self, sensor: impl Into<String>, unit: impl Into<String>) -> Self {
        self.channel = Some(Channel {
            sensor: sensor.into(),
            unit: unit.into(),
        });
        self
    }

    /// Identity of the row this point becomes.
    pub fn identity(&self, stream: &StreamDescriptor) -> StreamId {
        match &self.channel {
            Some(ch) => StreamId::new(&stream.identity.node, &ch.sensor, &ch.unit),
            None => stream.identity.clone(),
        }
    }
}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    fn shape(&self) -> QueryShape;

    /// Fetch raw points for one stream. For [`QueryShape::Since`] sources only
    /// `window.start` is meaningful.
    async fn query(
        &self,
        stream: &StreamDescriptor,
        window: TimeWindow,
    ) -> anyhow::Result<Vec<RawPoint>>;
}

/// A configured remote source ready to fetch.
pub struct RemotePlan {
    pub source: Box<dyn RemoteSource>,
    pub streams: Vec<StreamDescriptor>,
    pub window: WindowSettings,
}
