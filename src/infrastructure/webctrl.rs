// WebCTRL trend source - per-point windowed queries over HTTP
use crate::application::remote_source::{
    QueryShape, RawPoint, Reading, RemoteSource, StreamDescriptor,
};
use crate::domain::stream::StreamId;
use crate::domain::watermark::TimeWindow;
use crate::infrastructure::config::{WebctrlConfig, WebctrlSettings};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;

/// WebCTRL marks samples with no reading as `"?"`.
const MISSING: &str = "?";

#[derive(Debug, Deserialize)]
struct TrendSeries {
    s: Vec<TrendSample>,
}

#[derive(Debug, Deserialize)]
struct TrendSample {
    /// Milliseconds since the epoch
    t: f64,
    a: serde_json::Value,
}

pub struct WebctrlSource {
    client: reqwest::Client,
    server: String,
    user: String,
    pass: String,
}

impl WebctrlSource {
    pub fn new(settings: &WebctrlSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.window.timeout())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            server: settings.server.clone(),
            user: settings.login.name.clone(),
            pass: settings.login.pass.clone(),
        })
    }
}

/// One stream per active sensor; `node` falls back to the project name.
pub fn descriptors(config: &WebctrlConfig, project: &str) -> Vec<StreamDescriptor> {
    config
        .sensor
        .iter()
        .filter(|s| s.is_active)
        .map(|s| {
            let node = s.node.as_deref().unwrap_or(project);
            StreamDescriptor::new(StreamId::new(node, &s.name, &s.unit), s.path.as_str())
        })
        .collect()
}

/// Query dates are whole UTC days.
fn query_date(timestamp: f64) -> String {
    DateTime::from_timestamp(timestamp as i64, 0)
        .unwrap_or_default()
        .format("%Y-%m-%d")
        .to_string()
}

pub fn parse_trend(body: &str) -> Result<Vec<RawPoint>> {
    let series: Vec<TrendSeries> =
        serde_json::from_str(body).context("Failed to parse WebCTRL response")?;
    let first = series
        .into_iter()
        .next()
        .context("WebCTRL response contained no series")?;

    Ok(first
        .s
        .into_iter()
        .map(|sample| {
            let reading = match &sample.a {
                serde_json::Value::Number(n) => n.as_f64().map_or(Reading::Missing, Reading::Value),
                serde_json::Value::String(s) if s != MISSING => {
                    s.trim().parse().map_or(Reading::Missing, Reading::Value)
                }
                _ => Reading::Missing,
            };
            RawPoint::new((sample.t / 1000.0).floor(), reading)
        })
        .collect())
}

#[async_trait]
impl RemoteSource for WebctrlSource {
    fn shape(&self) -> QueryShape {
        QueryShape::Windowed
    }

    async fn query(&self, stream: &StreamDescriptor, window: TimeWindow) -> Result<Vec<RawPoint>> {
        let start = query_date(window.start);
        let end = query_date(window.stop);
        tracing::debug!("webctrl query {} from {} to {}", stream.locator, start, end);

        let response = self
            .client
            .post(&self.server)
            .query(&[
                ("id", stream.locator.as_str()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("format", "json"),
            ])
            .basic_auth(&self.user, Some(&self.pass))
            .send()
            .await
            .context("Failed to send request to WebCTRL")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("WebCTRL query failed with status {}: {}", status, body);
        }

        let body = response
            .text()
            .await
            .context("Failed to read WebCTRL response")?;
        parse_trend(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trend_floors_millis_and_flags_missing() {
        let body = r#"[{"s": [
            {"t": 1500000000999, "a": 71.5},
            {"t": 1500000060000, "a": "?"},
            {"t": 1500000120000, "a": "72.25"}
        ]}]"#;

        let points = parse_trend(body).unwrap();

        assert_eq!(
            points,
            vec![
                RawPoint::new(1_500_000_000.0, Reading::Value(71.5)),
                RawPoint::new(1_500_000_060.0, Reading::Missing),
                RawPoint::new(1_500_000_120.0, Reading::Value(72.25)),
            ]
        );
    }

    #[test]
    fn test_parse_trend_rejects_empty_or_garbage() {
        assert!(parse_trend("[]").is_err());
        assert!(parse_trend("<html>login</html>").is_err());
    }

    #[test]
    fn test_query_date_is_utc_day() {
        assert_eq!(query_date(1_500_000_000.0), "2017-07-14");
        assert_eq!(query_date(0.0), "1970-01-01");
    }

    #[test]
    fn test_descriptors_skip_inactive_and_default_node() {
        let config: WebctrlConfig = serde_json::from_value(serde_json::json!({
            "settings": {
                "server": "https://webctrl.example/trend",
                "login": {"name": "u", "pass": "p"}
            },
            "sensor": [
                {"name": "Chiller kW", "path": "#chiller/kw"},
                {"name": "Old", "path": "#old", "is-active": false},
                {"name": "Temp", "path": "#ahu/temp", "node": "AHU 1", "unit": "F"}
            ]
        }))
        .unwrap();

        let streams = descriptors(&config, "campus");

        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].uid(), "campus|chiller-kw|undefined");
        assert_eq!(streams[0].locator, "#chiller/kw");
        assert_eq!(streams[1].uid(), "ahu-1|temp|f");
    }
}
