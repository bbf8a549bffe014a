//! Line parser for the tagged-log telemetry format.
//!
//! The simulation writes records of the form
//! `[LOGD:<source>::<method>] CSV=<json-object>` interleaved with ordinary
//! log output. Only `Spacecraft`/`Sim` sources and the two `export_to_csv_*`
//! methods are valid; anything else inside a matching line is a hard error,
//! while lines that do not match the pattern at all are skipped.

use std::io::BufRead;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::{Dataset, Record, Source, TelemetryError};

const LINE_PATTERN: &str = r"^\[LOGD:(.+)::(.+)\] CSV=(\{.+\})$";

/// Both datasets produced by one ingestion pass.
#[derive(Clone, Debug)]
pub struct TelemetryLog {
    pub spacecraft: Dataset,
    pub sim: Dataset,
}

impl TelemetryLog {
    pub fn new() -> Self {
        Self {
            spacecraft: Dataset::new(Source::Spacecraft),
            sim: Dataset::new(Source::Sim),
        }
    }

    fn dataset_mut(&mut self, source: Source) -> &mut Dataset {
        match source {
            Source::Spacecraft => &mut self.spacecraft,
            Source::Sim => &mut self.sim,
        }
    }
}

impl Default for TelemetryLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Consume a line stream to end-of-stream, routing every recognized record.
pub fn ingest_lines<R: BufRead>(reader: R) -> Result<TelemetryLog, TelemetryError> {
    let pattern = Regex::new(LINE_PATTERN).expect("line pattern is valid");
    let mut log = TelemetryLog::new();
    let mut skipped = 0usize;

    for line in reader.lines() {
        let line = line?;
        match parse_line(&pattern, line.trim())? {
            Some((source, record)) => log.dataset_mut(source).push(record)?,
            None => skipped += 1,
        }
    }

    debug!(
        spacecraft = log.spacecraft.samples(),
        sim = log.sim.samples(),
        skipped, "ingestion finished"
    );
    Ok(log)
}

/// Match one line against the tagged-log pattern.
///
/// Returns `Ok(None)` for lines that are not telemetry records at all.
/// A matching line with an unrecognized source or method tag is an error.
pub fn parse_line(
    pattern: &Regex,
    line: &str,
) -> Result<Option<(Source, Record)>, TelemetryError> {
    let captures = match pattern.captures(line) {
        Some(captures) => captures,
        None => return Ok(None),
    };

    let source = match &captures[1] {
        "Spacecraft" => Source::Spacecraft,
        "Sim" => Source::Sim,
        other => return Err(TelemetryError::UnknownSource(other.to_string())),
    };

    let record = match &captures[2] {
        "export_to_csv_cur" => Record::Sample(parse_sample(&captures[3])?),
        "export_to_csv_conf" => Record::Config(parse_config(&captures[3])?),
        other => return Err(TelemetryError::UnknownMethod(other.to_string())),
    };

    Ok(Some((source, record)))
}

fn parse_object(payload: &str) -> Result<serde_json::Map<String, Value>, TelemetryError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|e| TelemetryError::Payload(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(TelemetryError::Payload(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn numeric(key: &str, value: &Value) -> Result<f64, TelemetryError> {
    value
        .as_f64()
        .ok_or_else(|| TelemetryError::Payload(format!("field {key:?} is not a number")))
}

/// Flatten a sample payload, one level of nesting at most.
///
/// A nested object `{"pos": {"x": 1, "y": 2}}` becomes the channels
/// `pos_x` and `pos_y`; this naming is load-bearing for the chart layer
/// and must not change.
fn parse_sample(payload: &str) -> Result<Vec<(String, f64)>, TelemetryError> {
    let map = parse_object(payload)?;
    let mut fields = Vec::with_capacity(map.len());
    for (outer, value) in &map {
        match value {
            Value::Object(inner) => {
                for (key, value) in inner {
                    let channel = format!("{outer}_{key}");
                    fields.push((channel.clone(), numeric(&channel, value)?));
                }
            }
            other => fields.push((outer.clone(), numeric(outer, other)?)),
        }
    }
    Ok(fields)
}

fn parse_config(
    payload: &str,
) -> Result<std::collections::BTreeMap<String, f64>, TelemetryError> {
    let map = parse_object(payload)?;
    let mut params = std::collections::BTreeMap::new();
    for (key, value) in &map {
        params.insert(key.clone(), numeric(key, value)?);
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn pattern() -> Regex {
        Regex::new(LINE_PATTERN).unwrap()
    }

    #[test]
    fn non_telemetry_lines_are_skipped() {
        let pattern = pattern();
        assert!(parse_line(&pattern, "").unwrap().is_none());
        assert!(parse_line(&pattern, "sim step 42 converged").unwrap().is_none());
        assert!(parse_line(&pattern, "[LOGI:Spacecraft] housekeeping")
            .unwrap()
            .is_none());
    }

    #[test]
    fn sample_record_parses_and_flattens() {
        let pattern = pattern();
        let line = r#"[LOGD:Spacecraft::export_to_csv_cur] CSV={"t": 1.5, "pos": {"x": 10.0, "y": -3.0}}"#;
        let (source, record) = parse_line(&pattern, line).unwrap().unwrap();
        assert_eq!(source, Source::Spacecraft);
        match record {
            Record::Sample(fields) => {
                assert!(fields.contains(&("t".to_string(), 1.5)));
                assert!(fields.contains(&("pos_x".to_string(), 10.0)));
                assert!(fields.contains(&("pos_y".to_string(), -3.0)));
            }
            other => panic!("expected sample, got {other:?}"),
        }
    }

    #[test]
    fn config_record_parses_flat_parameters() {
        let pattern = pattern();
        let line = r#"[LOGD:Sim::export_to_csv_conf] CSV={"sc_dry_mass": 1200.0, "ctr_eng_gimbal_pos_max": 0.07}"#;
        let (source, record) = parse_line(&pattern, line).unwrap().unwrap();
        assert_eq!(source, Source::Sim);
        match record {
            Record::Config(params) => {
                assert_eq!(params["sc_dry_mass"], 1200.0);
                assert_eq!(params["ctr_eng_gimbal_pos_max"], 0.07);
            }
            other => panic!("expected config, got {other:?}"),
        }
    }

    #[test]
    fn unknown_source_is_fatal() {
        let pattern = pattern();
        let line = r#"[LOGD:Rover::export_to_csv_cur] CSV={"t": 0.0}"#;
        let err = parse_line(&pattern, line).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownSource(tag) if tag == "Rover"));
    }

    #[test]
    fn unknown_method_is_fatal() {
        let pattern = pattern();
        let line = r#"[LOGD:Sim::export_to_csv_all] CSV={"t": 0.0}"#;
        let err = parse_line(&pattern, line).unwrap_err();
        assert!(matches!(err, TelemetryError::UnknownMethod(tag) if tag == "export_to_csv_all"));
    }

    #[test]
    fn non_numeric_field_is_fatal() {
        let pattern = pattern();
        let line = r#"[LOGD:Sim::export_to_csv_cur] CSV={"t": "soon"}"#;
        assert!(matches!(
            parse_line(&pattern, line),
            Err(TelemetryError::Payload(_))
        ));
    }

    #[test]
    fn round_trip_preserves_count_and_order() {
        let mut input = String::new();
        input.push_str(
            "[LOGD:Spacecraft::export_to_csv_conf] CSV={\"sc_dry_mass\": 1000.0}\n",
        );
        input.push_str("[LOGD:Sim::export_to_csv_conf] CSV={\"sc_dry_mass\": 1000.0}\n");
        for i in 0..32 {
            input.push_str(&format!(
                "[LOGD:Spacecraft::export_to_csv_cur] CSV={{\"t\": {i}.0, \"fuel_mass\": {}.0}}\n",
                500 - i
            ));
            input.push_str("noise line between records\n");
            input.push_str(&format!(
                "[LOGD:Sim::export_to_csv_cur] CSV={{\"t\": {i}.0, \"fuel_mass\": {}.0}}\n",
                500 - i
            ));
        }

        let log = ingest_lines(Cursor::new(input)).unwrap();
        assert_eq!(log.spacecraft.samples(), 32);
        assert_eq!(log.sim.samples(), 32);
        let t = log.spacecraft.channel("t").unwrap();
        assert_eq!(t.len(), 32);
        assert!(t.windows(2).all(|w| w[1] == w[0] + 1.0));
        log.spacecraft.validate().unwrap();
        log.sim.validate().unwrap();
    }

    #[test]
    fn duplicate_config_aborts_ingestion() {
        let input = "[LOGD:Sim::export_to_csv_conf] CSV={\"sc_dry_mass\": 1.0}\n\
                     [LOGD:Sim::export_to_csv_conf] CSV={\"sc_dry_mass\": 2.0}\n";
        let err = ingest_lines(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, TelemetryError::DuplicateConfig(Source::Sim)));
    }
}
