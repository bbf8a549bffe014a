//! Declarative figure specifications and the pure layout math behind them.
//!
//! A [`FigureSpec`] describes one multi-panel figure: each panel holds one
//! or more estimate/truth curve pairs, either on a shared vertical axis or
//! on twinned left/right axes. The renderer in `lander_plot_cli` consumes a
//! spec exactly once; everything here is data plus pure functions so the
//! range logic stays unit-testable away from any drawing backend.

use crate::TelemetryError;

/// Fraction of the data span added on each side of a vertical axis.
const RANGE_MARGIN: f64 = 0.05;

/// Spacecraft-estimate and ground-truth samples for one logical quantity.
#[derive(Clone, Debug)]
pub struct CurvePair {
    pub estimate: Vec<f64>,
    pub truth: Vec<f64>,
}

impl CurvePair {
    pub fn new(estimate: Vec<f64>, truth: Vec<f64>) -> Self {
        Self { estimate, truth }
    }
}

/// One vertical axis of a twin-axis panel.
#[derive(Clone, Debug)]
pub struct TwinAxis {
    pub label: String,
    pub pair: CurvePair,
    /// Horizontal reference line drawn across the panel at this value.
    pub hline: Option<f64>,
}

#[derive(Clone, Debug)]
pub enum Panel {
    /// Several quantities sharing one vertical axis, colored by order.
    SingleAxis(Vec<(String, CurvePair)>),
    /// One or two quantities, each on its own vertical axis.
    TwinAxis {
        axes: Vec<TwinAxis>,
        /// Rescale both axes so that zero sits at the same height.
        align_zero: bool,
    },
}

#[derive(Clone, Debug)]
pub struct FigureSpec {
    pub title: String,
    pub panels: Vec<Panel>,
}

impl Panel {
    /// Check every curve against the shared time axis length.
    pub fn check_lengths(&self, samples: usize) -> Result<(), TelemetryError> {
        let mismatch = |label: &str, actual: usize| TelemetryError::LengthMismatch {
            channel: label.to_string(),
            expected: samples,
            actual,
        };
        match self {
            Panel::SingleAxis(curves) => {
                for (label, pair) in curves {
                    if pair.estimate.len() != samples {
                        return Err(mismatch(label, pair.estimate.len()));
                    }
                    if pair.truth.len() != samples {
                        return Err(mismatch(label, pair.truth.len()));
                    }
                }
            }
            Panel::TwinAxis { axes, .. } => {
                if axes.is_empty() || axes.len() > 2 {
                    return Err(TelemetryError::Panel(format!(
                        "twin-axis panel needs 1 or 2 axes, got {}",
                        axes.len()
                    )));
                }
                for axis in axes {
                    if axis.pair.estimate.len() != samples {
                        return Err(mismatch(&axis.label, axis.pair.estimate.len()));
                    }
                    if axis.pair.truth.len() != samples {
                        return Err(mismatch(&axis.label, axis.pair.truth.len()));
                    }
                }
            }
        }
        Ok(())
    }
}

impl FigureSpec {
    pub fn check_lengths(&self, samples: usize) -> Result<(), TelemetryError> {
        for panel in &self.panels {
            panel.check_lengths(samples)?;
        }
        Ok(())
    }
}

/// Vertical range covering all given series plus an optional reference
/// value, with a small margin on both sides. Degenerate spans widen to a
/// unit interval so the chart always has height.
pub fn padded_range(series: &[&[f64]], include: Option<f64>) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for values in series {
        for &v in *values {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
    }
    if let Some(v) = include {
        lo = lo.min(v);
        hi = hi.max(v);
    }
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    if hi - lo < f64::EPSILON {
        lo -= 0.5;
        hi += 0.5;
    }
    let margin = (hi - lo) * RANGE_MARGIN;
    (lo - margin, hi + margin)
}

/// Rescale two vertical ranges so zero maps to the same screen height.
///
/// Each range is first clipped to contain zero, then normalized by its own
/// span; the union of the normalized ranges maps back through each span.
/// Data-to-pixel ratios are preserved and the transform is idempotent.
pub fn align_zero(a: (f64, f64), b: (f64, f64)) -> ((f64, f64), (f64, f64)) {
    let clipped = [(a.0.min(0.0), a.1.max(0.0)), (b.0.min(0.0), b.1.max(0.0))];
    let spans = [clipped[0].1 - clipped[0].0, clipped[1].1 - clipped[1].0];
    if spans[0] <= 0.0 || spans[1] <= 0.0 {
        return (clipped[0], clipped[1]);
    }

    let mut norm_lo = f64::INFINITY;
    let mut norm_hi = f64::NEG_INFINITY;
    for i in 0..2 {
        norm_lo = norm_lo.min(clipped[i].0 / spans[i]);
        norm_hi = norm_hi.max(clipped[i].1 / spans[i]);
    }

    (
        (norm_lo * spans[0], norm_hi * spans[0]),
        (norm_lo * spans[1], norm_hi * spans[1]),
    )
}
