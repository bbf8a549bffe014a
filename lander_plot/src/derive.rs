//! Secondary channels computed once after ingestion.
//!
//! Each derived series is a pure function of the raw channels plus the
//! configuration record, so recomputing is idempotent. Lengths always match
//! the source channels; `Dataset::validate` re-checks this before plotting.

use std::f64::consts::PI;

use crate::{Dataset, TelemetryError};

/// Total mass channel, dry mass offset by remaining propellant.
pub const MASS: &str = "mass";
/// Gimbal deflection in radians, scaled to actuator travel when configured.
pub const ENG_GIMBAL: &str = "eng_gimbal";
/// Per-sample first difference of the gimbal deflection.
pub const ENG_GIMBAL_VEL: &str = "eng_gimbal_vel";

/// Compute all derived channels for one dataset.
///
/// Requires the configuration record (for `sc_dry_mass`); the gimbal travel
/// parameter is optional and the raw channel is used unscaled without it.
pub fn process(data: &mut Dataset) -> Result<(), TelemetryError> {
    let dry_mass = data.config()?.param("sc_dry_mass")?;
    let gimbal_travel = data.config()?.get("ctr_eng_gimbal_pos_max");

    let mass: Vec<f64> = data
        .channel("fuel_mass")?
        .iter()
        .map(|fuel| dry_mass + fuel)
        .collect();

    let raw_gimbal = data.channel(ENG_GIMBAL)?;
    let gimbal: Vec<f64> = match gimbal_travel {
        Some(travel) => raw_gimbal.iter().map(|g| travel * g).collect(),
        None => raw_gimbal.to_vec(),
    };
    let gimbal_vel = first_difference(&gimbal);

    data.insert_derived(MASS, mass);
    data.insert_derived(ENG_GIMBAL, gimbal);
    data.insert_derived(ENG_GIMBAL_VEL, gimbal_vel);
    Ok(())
}

/// Discrete derivative with a zero first sample, matching the input length.
///
/// Units are per sample step; the time axis spacing is uniform for the
/// format this tool ingests, which is what makes that acceptable.
pub fn first_difference(series: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(series.len());
    if series.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(series.windows(2).map(|w| w[1] - w[0]));
    out
}

/// Elapsed-time axis for a dataset.
///
/// Resolution order: a literal `t` channel; a countdown `tgo` channel
/// rebased as `tgo[0] - tgo[i]`; an evenly spaced grid from 0 to the
/// configured initial `tgo` when no per-sample time channel exists at all.
pub fn time_axis(data: &Dataset) -> Result<Vec<f64>, TelemetryError> {
    if let Ok(t) = data.channel("t") {
        return Ok(t.to_vec());
    }
    if let Ok(tgo) = data.channel("tgo") {
        let start = tgo.first().copied().unwrap_or(0.0);
        return Ok(tgo.iter().map(|v| start - v).collect());
    }
    if let Some(initial_tgo) = data.config().ok().and_then(|c| c.get("tgo")) {
        let n = data.samples();
        if n <= 1 {
            return Ok(vec![0.0; n]);
        }
        let step = initial_tgo / (n - 1) as f64;
        return Ok((0..n).map(|i| step * i as f64).collect());
    }
    Err(TelemetryError::MissingChannel("t".to_string()))
}

/// Radians to degrees, sample-wise.
pub fn rad2deg(series: &[f64]) -> Vec<f64> {
    series.iter().map(|r| r * 180.0 / PI).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Record, Source};
    use std::collections::BTreeMap;

    fn dataset_with(conf: &[(&str, f64)], samples: &[&[(&str, f64)]]) -> Dataset {
        let mut data = Dataset::new(Source::Spacecraft);
        if !conf.is_empty() {
            let params: BTreeMap<String, f64> = conf
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect();
            data.push(Record::Config(params)).unwrap();
        }
        for fields in samples {
            let fields = fields
                .iter()
                .map(|(name, value)| (name.to_string(), *value))
                .collect();
            data.push(Record::Sample(fields)).unwrap();
        }
        data
    }

    #[test]
    fn mass_is_dry_mass_plus_fuel() {
        let mut data = dataset_with(
            &[("sc_dry_mass", 1000.0), ("ctr_eng_gimbal_pos_max", 0.1)],
            &[
                &[("fuel_mass", 500.0), ("eng_gimbal", 0.0)],
                &[("fuel_mass", 499.5), ("eng_gimbal", 0.2)],
                &[("fuel_mass", 498.0), ("eng_gimbal", -0.4)],
            ],
        );
        process(&mut data).unwrap();
        assert_eq!(data.derived(MASS).unwrap(), &[1500.0, 1499.5, 1498.0]);
        data.validate().unwrap();
    }

    #[test]
    fn gimbal_scales_by_actuator_travel() {
        let mut data = dataset_with(
            &[("sc_dry_mass", 1.0), ("ctr_eng_gimbal_pos_max", 0.5)],
            &[
                &[("fuel_mass", 0.0), ("eng_gimbal", 1.0)],
                &[("fuel_mass", 0.0), ("eng_gimbal", -1.0)],
            ],
        );
        process(&mut data).unwrap();
        assert_eq!(data.derived(ENG_GIMBAL).unwrap(), &[0.5, -0.5]);
    }

    #[test]
    fn gimbal_unscaled_without_travel_parameter() {
        let mut data = dataset_with(
            &[("sc_dry_mass", 1.0)],
            &[&[("fuel_mass", 0.0), ("eng_gimbal", 0.3)]],
        );
        process(&mut data).unwrap();
        assert_eq!(data.derived(ENG_GIMBAL).unwrap(), &[0.3]);
    }

    #[test]
    fn gimbal_vel_is_first_difference_with_zero_head() {
        let mut data = dataset_with(
            &[("sc_dry_mass", 1.0), ("ctr_eng_gimbal_pos_max", 1.0)],
            &[
                &[("fuel_mass", 0.0), ("eng_gimbal", 0.0)],
                &[("fuel_mass", 0.0), ("eng_gimbal", 0.25)],
                &[("fuel_mass", 0.0), ("eng_gimbal", 0.15)],
                &[("fuel_mass", 0.0), ("eng_gimbal", 0.15)],
            ],
        );
        process(&mut data).unwrap();
        let vel = data.derived(ENG_GIMBAL_VEL).unwrap();
        assert_eq!(vel[0], 0.0);
        assert_eq!(vel[1], 0.25);
        assert!((vel[2] + 0.1).abs() < 1e-12);
        assert_eq!(vel[3], 0.0);
    }

    #[test]
    fn process_requires_configuration() {
        let mut data = dataset_with(&[], &[&[("fuel_mass", 0.0), ("eng_gimbal", 0.0)]]);
        assert!(matches!(
            process(&mut data),
            Err(TelemetryError::MissingConfig(Source::Spacecraft))
        ));
    }

    #[test]
    fn time_axis_prefers_literal_channel() {
        let data = dataset_with(&[], &[&[("t", 0.0)], &[("t", 2.0)], &[("t", 4.0)]]);
        assert_eq!(time_axis(&data).unwrap(), &[0.0, 2.0, 4.0]);
    }

    #[test]
    fn time_axis_rebases_countdown() {
        let data = dataset_with(&[], &[&[("tgo", 60.0)], &[("tgo", 58.0)], &[("tgo", 55.0)]]);
        assert_eq!(time_axis(&data).unwrap(), &[0.0, 2.0, 5.0]);
    }

    #[test]
    fn time_axis_synthesizes_grid_from_config() {
        let data = dataset_with(
            &[("tgo", 30.0)],
            &[&[("fuel_mass", 1.0)], &[("fuel_mass", 1.0)], &[("fuel_mass", 1.0)], &[("fuel_mass", 1.0)]],
        );
        assert_eq!(time_axis(&data).unwrap(), &[0.0, 10.0, 20.0, 30.0]);
    }

    #[test]
    fn time_axis_missing_everywhere_is_fatal() {
        let data = dataset_with(&[], &[&[("fuel_mass", 1.0)]]);
        assert!(matches!(
            time_axis(&data),
            Err(TelemetryError::MissingChannel(_))
        ));
    }

    #[test]
    fn rad2deg_converts_pi() {
        let deg = rad2deg(&[0.0, PI / 2.0, PI]);
        assert!((deg[1] - 90.0).abs() < 1e-12);
        assert!((deg[2] - 180.0).abs() < 1e-12);
    }
}
