//! Telemetry ingestion and chart layout for the lander guidance simulation.
//!
//! The simulation emits two interleaved record streams on its log output:
//! the onboard "Spacecraft" estimator and the "Sim" ground truth. This
//! library reshapes those records into per-channel sample series, computes
//! the handful of derived channels the comparison charts need, and provides
//! the pure layout math (value ranges, twin-axis zero alignment) consumed
//! by the renderer in `lander_plot_cli`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod derive;
pub mod ingest;
pub mod layout;

pub use derive::rad2deg;
pub use ingest::{ingest_lines, parse_line, TelemetryLog};
pub use layout::{align_zero, padded_range, CurvePair, FigureSpec, Panel, TwinAxis};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown telemetry source tag: {0:?}")]
    UnknownSource(String),
    #[error("unknown export method tag: {0:?}")]
    UnknownMethod(String),
    #[error("malformed record payload: {0}")]
    Payload(String),
    #[error("duplicate configuration record for {0}")]
    DuplicateConfig(Source),
    #[error("no configuration record received for {0}")]
    MissingConfig(Source),
    #[error("configuration parameter {0:?} is missing")]
    MissingConfigParam(String),
    #[error("channel {0:?} is missing")]
    MissingChannel(String),
    #[error("channel {channel:?} has {actual} samples, expected {expected}")]
    LengthMismatch {
        channel: String,
        expected: usize,
        actual: usize,
    },
    #[error("invalid panel specification: {0}")]
    Panel(String),
}

/// Which half of the comparison a record belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Spacecraft,
    Sim,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Spacecraft => write!(f, "Spacecraft"),
            Source::Sim => write!(f, "Sim"),
        }
    }
}

/// One parsed telemetry record, already flattened to scalar fields.
#[derive(Clone, Debug, PartialEq)]
pub enum Record {
    /// Static scenario parameters, emitted once per source.
    Config(BTreeMap<String, f64>),
    /// One time step worth of channel samples.
    Sample(Vec<(String, f64)>),
}

/// Static scalar parameters from the configuration record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config(BTreeMap<String, f64>);

impl Config {
    pub fn new(params: BTreeMap<String, f64>) -> Self {
        Config(params)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn param(&self, name: &str) -> Result<f64, TelemetryError> {
        self.get(name)
            .ok_or_else(|| TelemetryError::MissingConfigParam(name.to_string()))
    }
}

/// Per-source accumulation of channel series, kept in lock-step.
///
/// Samples append in arrival order and are never reordered or deduplicated;
/// every channel of a valid dataset has exactly `samples()` entries.
#[derive(Clone, Debug)]
pub struct Dataset {
    source: Source,
    config: Option<Config>,
    channels: BTreeMap<String, Vec<f64>>,
    derived: BTreeMap<String, Vec<f64>>,
    samples: usize,
}

impl Dataset {
    pub fn new(source: Source) -> Self {
        Self {
            source,
            config: None,
            channels: BTreeMap::new(),
            derived: BTreeMap::new(),
            samples: 0,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Number of sample records routed to this dataset so far.
    pub fn samples(&self) -> usize {
        self.samples
    }

    pub fn push(&mut self, record: Record) -> Result<(), TelemetryError> {
        match record {
            Record::Config(params) => {
                if self.config.is_some() {
                    return Err(TelemetryError::DuplicateConfig(self.source));
                }
                self.config = Some(Config::new(params));
            }
            Record::Sample(fields) => {
                for (name, value) in fields {
                    self.channels.entry(name).or_default().push(value);
                }
                self.samples += 1;
            }
        }
        Ok(())
    }

    pub fn config(&self) -> Result<&Config, TelemetryError> {
        self.config
            .as_ref()
            .ok_or(TelemetryError::MissingConfig(self.source))
    }

    /// Raw channel as ingested from the log.
    pub fn channel(&self, name: &str) -> Result<&[f64], TelemetryError> {
        self.channels
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| TelemetryError::MissingChannel(name.to_string()))
    }

    /// Channel computed by [`derive::process`].
    pub fn derived(&self, name: &str) -> Result<&[f64], TelemetryError> {
        self.derived
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| TelemetryError::MissingChannel(name.to_string()))
    }

    pub(crate) fn insert_derived(&mut self, name: &str, series: Vec<f64>) {
        self.derived.insert(name.to_string(), series);
    }

    /// Check that every channel stayed in lock-step with the record count.
    pub fn validate(&self) -> Result<(), TelemetryError> {
        let pairs = self.channels.iter().chain(self.derived.iter());
        for (name, series) in pairs {
            if series.len() != self.samples {
                return Err(TelemetryError::LengthMismatch {
                    channel: name.clone(),
                    expected: self.samples,
                    actual: series.len(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(fields: &[(&str, f64)]) -> Record {
        Record::Sample(
            fields
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect(),
        )
    }

    #[test]
    fn samples_accumulate_in_order() {
        let mut data = Dataset::new(Source::Spacecraft);
        for i in 0..5 {
            data.push(sample(&[("t", i as f64), ("fuel_mass", 100.0 - i as f64)]))
                .unwrap();
        }
        assert_eq!(data.samples(), 5);
        assert_eq!(data.channel("t").unwrap(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
        assert_eq!(
            data.channel("fuel_mass").unwrap(),
            &[100.0, 99.0, 98.0, 97.0, 96.0]
        );
        data.validate().unwrap();
    }

    #[test]
    fn second_config_record_is_rejected() {
        let mut data = Dataset::new(Source::Sim);
        let conf = BTreeMap::from([("sc_dry_mass".to_string(), 1000.0)]);
        data.push(Record::Config(conf.clone())).unwrap();
        let err = data.push(Record::Config(conf)).unwrap_err();
        assert!(matches!(err, TelemetryError::DuplicateConfig(Source::Sim)));
    }

    #[test]
    fn missing_channel_and_config_are_reported() {
        let data = Dataset::new(Source::Spacecraft);
        assert!(matches!(
            data.channel("eng_throttle"),
            Err(TelemetryError::MissingChannel(_))
        ));
        assert!(matches!(
            data.config(),
            Err(TelemetryError::MissingConfig(Source::Spacecraft))
        ));
    }

    #[test]
    fn validate_catches_ragged_channels() {
        let mut data = Dataset::new(Source::Spacecraft);
        data.push(sample(&[("t", 0.0), ("fuel_mass", 10.0)])).unwrap();
        // A record missing a field leaves that channel short.
        data.push(sample(&[("t", 1.0)])).unwrap();
        let err = data.validate().unwrap_err();
        match err {
            TelemetryError::LengthMismatch {
                channel,
                expected,
                actual,
            } => {
                assert_eq!(channel, "fuel_mass");
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
