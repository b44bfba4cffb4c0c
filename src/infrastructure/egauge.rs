// eGauge source - per-gauge CSV exports of everything since a timestamp
use crate::application::remote_source::{
    QueryShape, RawPoint, Reading, RemoteSource, StreamDescriptor,
};
use crate::domain::stream::StreamId;
use crate::domain::watermark::TimeWindow;
use crate::infrastructure::config::{EgaugeConfig, EgaugeSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;

const TIME_COLUMN: &str = "Date & Time";

pub struct EgaugeSource {
    client: reqwest::Client,
    url_template: String,
}

impl EgaugeSource {
    pub fn new(settings: &EgaugeSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.window.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url_template: settings.url_template.clone(),
        })
    }

    fn url_for(&self, gauge: &str) -> String {
        self.url_template
            .replace("{gauge}", &urlencoding::encode(gauge))
    }
}

/// One stream per gauge. Channels are discovered from the response, so the
/// descriptor identity only carries the node and keys the gauge watermark.
pub fn descriptors(config: &EgaugeConfig) -> Vec<StreamDescriptor> {
    config
        .nodes
        .iter()
        .filter(|(_, entry)| entry.is_active())
        .map(|(node, entry)| {
            StreamDescriptor::new(StreamId::new(node, "gauge", "undefined"), entry.gauge())
        })
        .collect()
}

/// `Grid [kW]` -> (`grid`, `kW`); anything else -> (lowercased, `undefined`).
pub fn parse_channel(header: &str) -> (String, String) {
    match header.split_once(" [") {
        Some((name, rest)) if rest.ends_with(']') => {
            let unit: String = rest
                .trim_end_matches(']')
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect();
            (name.to_lowercase(), unit)
        }
        _ => (header.to_lowercase(), "undefined".to_string()),
    }
}

pub fn parse_export(body: &str) -> Result<Vec<RawPoint>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(body.as_bytes());
    let headers = reader.headers().context("eGauge export has no header")?.clone();
    if headers.is_empty() {
        return Ok(Vec::new());
    }
    let time_index = headers
        .iter()
        .position(|h| h == TIME_COLUMN)
        .with_context(|| format!("eGauge export has no `{}` column", TIME_COLUMN))?;
    let channels: Vec<(usize, (String, String))> = headers
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != time_index)
        .map(|(i, h)| (i, parse_channel(h)))
        .collect();

    let mut points = Vec::new();
    for record in reader.records() {
        let record = record.context("Malformed eGauge export")?;
        let stamp = record.get(time_index).unwrap_or_default();
        let timestamp: f64 = stamp
            .parse()
            .with_context(|| format!("Bad eGauge timestamp `{}`", stamp))?;
        for (index, (sensor, unit)) in &channels {
            let reading = record
                .get(*index)
                .and_then(|cell| cell.parse().ok())
                .map_or(Reading::Missing, Reading::Value);
            points.push(RawPoint::new(timestamp, reading).on_channel(sensor.as_str(), unit.as_str()));
        }
    }
    Ok(points)
}

#[async_trait]
impl RemoteSource for EgaugeSource {
    fn shape(&self) -> QueryShape {
        QueryShape::Since
    }

    async fn query(&self, stream: &StreamDescriptor, window: TimeWindow) -> Result<Vec<RawPoint>> {
        let url = self.url_for(&stream.locator);
        tracing::debug!("egauge query {} since {}", url, window.start);

        let response = self
            .client
            .get(&url)
            .query(&[("w", window.start as i64)])
            .send()
            .await
            .context("Failed to send request to eGauge")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("eGauge query failed with status {}: {}", status, body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read eGauge response")?;
        parse_export(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::config::DEFAULT_EGAUGE_URL;

    #[test]
    fn test_parse_channel_headers() {
        assert_eq!(parse_channel("Grid [kW]"), ("grid".to_string(), "kW".to_string()));
        assert_eq!(
            parse_channel("Solar+ [k W]"),
            ("solar+".to_string(), "kW".to_string())
        );
        assert_eq!(
            parse_channel("Usage"),
            ("usage".to_string(), "undefined".to_string())
        );
    }

    #[test]
    fn test_parse_export_splits_channels() {
        let body = "\"Date & Time\",\"Grid [kW]\",\"Solar [kW]\"\n1500000060,1.5,-0.25\n1500000000,1.25,nan?\n";

        let points = parse_export(body).unwrap();

        assert_eq!(points.len(), 4);
        assert_eq!(
            points[0],
            RawPoint::new(1_500_000_060.0, Reading::Value(1.5)).on_channel("grid", "kW")
        );
        assert_eq!(
            points[3],
            RawPoint::new(1_500_000_000.0, Reading::Missing).on_channel("solar", "kW")
        );
    }

    #[test]
    fn test_parse_export_edge_cases() {
        assert!(parse_export("").unwrap().is_empty());
        assert!(parse_export("a,b\n1,2\n").is_err());
        assert!(parse_export("Date & Time,Grid [kW]\nnoon,1\n").is_err());
    }

    #[test]
    fn test_descriptors_skip_inactive_gauges() {
        let config: EgaugeConfig = serde_json::from_value(serde_json::json!({
            "nodes": {
                "Main Hall": "4242",
                "Annex": {"gauge": "4243", "is-active": false}
            }
        }))
        .unwrap();

        let streams = descriptors(&config);

        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].uid(), "main-hall|gauge|undefined");
        assert_eq!(streams[0].locator, "4242");
    }

    #[test]
    fn test_url_for_gauge() {
        let source = EgaugeSource::new(&EgaugeSettings::default()).unwrap();
        assert_eq!(
            source.url_for("4242"),
            DEFAULT_EGAUGE_URL.replace("{gauge}", "4242")
        );
    }
}
