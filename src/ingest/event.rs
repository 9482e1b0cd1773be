use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::domain::{DemandReading, TemperatureReading};

/// Event id carrying household grid demand.
pub const GRID_DEMAND_ID: &str = "griddemand";

/// A reading decoded from one stream line.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Demand(DemandReading),
    Temperature(TemperatureReading),
}

/// Why a line was dropped. Never fatal.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("no JSON object in line")]
    NoJson,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("event has no 'id'")]
    MissingId,
    #[error("event '{id}' has no '{field}'")]
    MissingField { id: String, field: &'static str },
    #[error("event '{id}': cannot read '{value}' as a number")]
    BadNumber { id: String, value: String },
}

/// Decodes one line of the event stream.
///
/// `Ok(None)` means the line is valid but not for us: keep-alive blank lines
/// and ids that are neither grid demand nor a configured room.
pub fn parse_line(
    line: &str,
    is_room: impl Fn(&str) -> bool,
) -> Result<Option<StreamEvent>, EventError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    // Framing such as `data: ` precedes the object
    let start = line.find('{').ok_or(EventError::NoJson)?;
    let data: Value = serde_json::from_str(&line[start..])?;

    let id = data
        .get("id")
        .and_then(Value::as_str)
        .ok_or(EventError::MissingId)?;

    if id == GRID_DEMAND_ID {
        let value = data.get("value").ok_or_else(|| EventError::MissingField {
            id: id.to_string(),
            field: "value",
        })?;
        let kw = number(id, value)?;
        let title = data.get("title").and_then(Value::as_str);
        return Ok(Some(StreamEvent::Demand(DemandReading::from_event(kw, title))));
    }

    if !is_room(id) {
        debug!(id, "unknown event id, skipping");
        return Ok(None);
    }

    let raw = data
        .get("temperature")
        .ok_or_else(|| EventError::MissingField {
            id: id.to_string(),
            field: "temperature",
        })?;
    let degrees = temperature(id, raw)?;
    Ok(Some(StreamEvent::Temperature(TemperatureReading {
        room: id.to_string(),
        degrees,
    })))
}

fn bad_number(id: &str, value: &Value) -> EventError {
    EventError::BadNumber {
        id: id.to_string(),
        value: match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        },
    }
}

fn number(id: &str, value: &Value) -> Result<f64, EventError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| bad_number(id, value))
}

/// Whole degrees, with the unit suffix (`21°`, `21C`) stripped.
fn temperature(id: &str, value: &Value) -> Result<i32, EventError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| bad_number(id, value)),
        Value::String(s) => s
            .trim()
            .trim_end_matches(|c: char| !c.is_ascii_digit())
            .parse::<i32>()
            .map_err(|_| bad_number(id, value)),
        _ => Err(bad_number(id, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    fn rooms(id: &str) -> bool {
        matches!(id, "masterbed" | "girlsbed")
    }

    #[test]
    fn test_blank_line_is_keep_alive() {
        assert!(parse_line("", rooms).unwrap().is_none());
        assert!(parse_line("   \r", rooms).unwrap().is_none());
    }

    #[test]
    fn test_selling_demand_is_negative() {
        let line = r#"data: {"id":"griddemand","value":"2.1","title":"Selling","updatedAt":1400000000}"#;
        let event = parse_line(line, rooms).unwrap().unwrap();
        assert_eq!(event, StreamEvent::Demand(DemandReading::new(-2.1)));
    }

    #[test]
    fn test_buying_demand_numeric_value() {
        let line = r#"{"id":"griddemand","value":0.75,"title":"Buying"}"#;
        let event = parse_line(line, rooms).unwrap().unwrap();
        assert_eq!(event, StreamEvent::Demand(DemandReading::new(0.75)));
    }

    #[test]
    fn test_room_temperature_with_unit() {
        let line = "data: {\"id\":\"masterbed\",\"temperature\":\"21\u{b0}\"}";
        let event = parse_line(line, rooms).unwrap().unwrap();
        assert_eq!(
            event,
            StreamEvent::Temperature(TemperatureReading {
                room: "masterbed".to_string(),
                degrees: 21,
            })
        );
    }

    #[test]
    fn test_room_temperature_variants() {
        let parse = |raw: &str| match parse_line(
            &format!(r#"{{"id":"girlsbed","temperature":{raw}}}"#),
            rooms,
        ) {
            Ok(Some(StreamEvent::Temperature(t))) => Ok(t.degrees),
            Ok(other) => panic!("unexpected {other:?}"),
            Err(e) => Err(e),
        };
        assert_eq!(parse("\"18C\"").unwrap(), 18);
        assert_eq!(parse("\"-3\u{b0}C\"").unwrap(), -3);
        assert_eq!(parse("19").unwrap(), 19);
        assert!(matches!(parse("\"warm\""), Err(EventError::BadNumber { .. })));
        assert!(matches!(parse("\"18.5C\""), Err(EventError::BadNumber { .. })));
        assert!(matches!(parse("null"), Err(EventError::BadNumber { .. })));
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_unknown_id_skipped_and_logged() {
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();

        let line = r#"{"id":"kitchen","temperature":"22C"}"#;
        let parsed = tracing::subscriber::with_default(subscriber, || parse_line(line, rooms));
        assert!(parsed.unwrap().is_none());

        let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("unknown event id, skipping"), "{output}");
        assert!(output.contains("kitchen"), "{output}");
    }

    #[test]
    fn test_malformed_lines() {
        assert!(matches!(parse_line("event: ping", rooms), Err(EventError::NoJson)));
        assert!(matches!(parse_line("data: {\"id\":", rooms), Err(EventError::Json(_))));
        assert!(matches!(
            parse_line(r#"{"value":"1.0"}"#, rooms),
            Err(EventError::MissingId)
        ));
        assert!(matches!(
            parse_line(r#"{"id":42}"#, rooms),
            Err(EventError::MissingId)
        ));
        assert!(matches!(
            parse_line(r#"{"id":"masterbed"}"#, rooms),
            Err(EventError::MissingField { field: "temperature", .. })
        ));
        assert!(matches!(
            parse_line(r#"{"id":"griddemand","title":"Selling"}"#, rooms),
            Err(EventError::MissingField { field: "value", .. })
        ));
    }
}
