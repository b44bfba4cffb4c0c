// Static file parsers - simple row CSVs and HOBO logger exports
use crate::application::error::ParseError;
use crate::application::static_source::FileParser;
use crate::domain::row::{ROW_FIELDS, Row};
use crate::domain::stream::normalize;
use chrono::{FixedOffset, NaiveDateTime, TimeZone};
use std::path::Path;

const HOBO_TIME_FORMAT: &str = "%m/%d/%y %I:%M:%S %p";

fn open_reader(path: &Path, has_headers: bool) -> Result<csv::Reader<std::fs::File>, ParseError> {
    let file = std::fs::File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(!has_headers)
        .trim(csv::Trim::All)
        .from_reader(file))
}

/// Reads files already in `node,sensor,unit,timestamp,value` form, such as
/// the output of the csv exporter.
pub struct SimpleCsvParser;

impl FileParser for SimpleCsvParser {
    fn parse(&self, path: &Path) -> Result<Vec<Row>, ParseError> {
        let mut reader = open_reader(path, true)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.to_lowercase())
            .collect();
        let expected: Vec<&str> = ROW_FIELDS.iter().map(|f| f.as_str()).collect();
        if headers != expected {
            return Err(ParseError::Header(headers.join(",")));
        }

        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record?.deserialize::<Row>(None)?);
        }
        Ok(rows)
    }
}

/// HOBO data logger export: a title row ending in the logger serial, a
/// header row of `Name, unit (...)` columns, then numbered readings.
pub struct HoboCsvParser;

impl FileParser for HoboCsvParser {
    fn parse(&self, path: &Path) -> Result<Vec<Row>, ParseError> {
        let mut records = open_reader(path, false)?.into_records();
        let mut next_record = |what: &str| -> Result<csv::StringRecord, ParseError> {
            match records.next() {
                Some(record) => Ok(record?),
                None => Err(ParseError::Header(format!("missing {} row", what))),
            }
        };

        let title = next_record("title")?;
        let logger_id = title
            .get(0)
            .and_then(|t| t.split_whitespace().last())
            .ok_or_else(|| ParseError::Header("title row has no logger id".to_string()))?;
        let node = format!("hobo-{}", normalize(logger_id));

        let header = next_record("header")?;
        let offset = parse_time_header(header.get(1).unwrap_or_default())?;
        let channels: Vec<(String, String)> = header
            .iter()
            .skip(2)
            .map(parse_channel_header)
            .collect::<Result<_, _>>()?;

        let mut rows = Vec::new();
        for (index, record) in records.enumerate() {
            let record = record?;
            let line = index + 3;
            let stamp = record.get(1).unwrap_or_default();
            let timestamp = parse_hobo_time(stamp, offset).ok_or_else(|| ParseError::Record {
                line,
                message: format!("bad timestamp `{}`", stamp),
            })?;

            for ((sensor, unit), cell) in channels.iter().zip(record.iter().skip(2)) {
                if cell.is_empty() {
                    continue;
                }
                let value: f64 = cell.parse().map_err(|_| ParseError::Record {
                    line,
                    message: format!("bad value `{}` for {}", cell, sensor),
                })?;
                rows.push(Row::new(node.as_str(), sensor.as_str(), unit.as_str(), timestamp, value));
            }
        }
        Ok(rows)
    }
}

/// `Date Time, GMT-07:00` -> UTC offset of the logged times.
fn parse_time_header(header: &str) -> Result<FixedOffset, ParseError> {
    let bad = || ParseError::Header(format!("bad time column `{}`", header));
    let (name, zone) = header.split_once(", ").ok_or_else(bad)?;
    if normalize(name) != "date-time" {
        return Err(bad());
    }
    let zone = zone.trim().to_lowercase().replace("gmt", "").replace(':', "");
    if zone.is_empty() {
        return FixedOffset::east_opt(0).ok_or_else(bad);
    }
    let (sign, digits) = match zone.split_at(1) {
        ("+", d) => (1, d),
        ("-", d) => (-1, d),
        _ => return Err(bad()),
    };
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(bad());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| bad())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| bad())?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

/// `Temp, °F (LGR S/N: ...)` -> (`temp`, `°F`)
fn parse_channel_header(header: &str) -> Result<(String, String), ParseError> {
    let (name, rest) = header
        .split_once(", ")
        .ok_or_else(|| ParseError::Header(format!("no unit in column `{}`", header)))?;
    let unit = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| ParseError::Header(format!("no unit in column `{}`", header)))?;
    Ok((normalize(name), unit.to_string()))
}

fn parse_hobo_time(text: &str, offset: FixedOffset) -> Option<f64> {
    let naive = NaiveDateTime::parse_from_str(text, HOBO_TIME_FORMAT).ok()?;
    let stamp = offset.from_local_datetime(&naive).single()?;
    Some(stamp.timestamp() as f64)
}
