// ANTAGONIST QUANTILE-STABILITY ESTIMATOR
// PURE FUNCTIONS OVER SAMPLE SLICES. ZERO I/O, TESTABLE OFFLINE.
//
// PIPELINE: MAD OUTLIER FILTER -> SORT -> QUANTILE (CUNNANE PLOTTING POSITIONS)
// -> DISTRIBUTION-FREE ORDER-STATISTIC WINDOW FROM THE BINOMIAL CDF
// -> CONFIDENCE VARIATION = 100 * (UPPER - LOWER) / QUANTILE.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF};

use crate::error::EstimatorError;

// SAMPLES FURTHER THAN MAD_SCALE * MAD FROM THE MEDIAN ARE DROPPED
pub const MAD_SCALE: f64 = 3.0;

// PLOTTING POSITION CONSTANTS (alpha = beta = 0.4)
const PLOT_ALPHA: f64 = 0.4;
const PLOT_BETA: f64 = 0.4;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBounds {
    pub quantile: f64,
    pub value: f64,
    pub lower: f64,
    pub upper: f64,
    pub variation_pct: f64,
}

impl ConfidenceBounds {
    pub fn overlaps(&self, other: &ConfidenceBounds) -> bool {
        self.upper > other.lower && other.upper > self.lower
    }
}

// MEDIAN OF AN ALREADY SORTED, NON-EMPTY SLICE
fn median_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

// MEDIAN-ABSOLUTE-DEVIATION FILTER. NON-FINITE SAMPLES ARE ALWAYS DROPPED.
// MAD == 0 MEANS MORE THAN HALF THE SAMPLES ARE IDENTICAL: NOTHING CAN BE
// CALLED AN OUTLIER, SO EVERYTHING FINITE IS KEPT. ORDER IS PRESERVED.
pub fn remove_outliers(samples: &[f64]) -> Vec<f64> {
    let finite: Vec<f64> = samples.iter().copied().filter(|x| x.is_finite()).collect();
    if finite.len() < 3 {
        return finite;
    }

    let mut sorted = finite.clone();
    sorted.sort_by(f64::total_cmp);
    let med = median_sorted(&sorted);

    let mut deviations: Vec<f64> = sorted.iter().map(|x| (x - med).abs()).collect();
    deviations.sort_by(f64::total_cmp);
    let mad = median_sorted(&deviations);
    if mad == 0.0 {
        return finite;
    }

    finite
        .into_iter()
        .filter(|x| (x - med).abs() <= MAD_SCALE * mad)
        .collect()
}

// QUANTILE OF A SORTED, NON-EMPTY SLICE. RETURNS (VALUE, LO_IDX, HI_IDX)
// WHERE VALUE INTERPOLATES BETWEEN sorted[LO_IDX] AND sorted[HI_IDX].
fn quantile_bracket(sorted: &[f64], q: f64) -> (f64, usize, usize) {
    let n = sorted.len();
    if n == 1 {
        return (sorted[0], 0, 0);
    }
    let m = PLOT_ALPHA + q * (1.0 - PLOT_ALPHA - PLOT_BETA);
    let aleph = n as f64 * q + m;
    let k = aleph.clamp(1.0, (n - 1) as f64).floor();
    let gamma = (aleph - k).clamp(0.0, 1.0);
    let k = k as usize;
    let value = (1.0 - gamma) * sorted[k - 1] + gamma * sorted[k];
    (value, k - 1, k)
}

pub fn quantile_sorted(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    Some(quantile_bracket(sorted, q).0)
}

// WIDEN [li, ui] AROUND round(q * (n + 1)) ONE INDEX PER SIDE PER STEP UNTIL
// THE BINOMIAL COVERAGE P(li <= X < ui), X ~ Bin(n, q), REACHES `confidence`
// OR THE WINDOW SATURATES [0, n-1]. ROUNDING IS TIES-TO-EVEN.
pub fn order_statistic_window(n: usize, q: f64, confidence: f64) -> (usize, usize) {
    if n <= 1 {
        return (0, 0);
    }
    let last = n as i64 - 1;
    let binom = match Binomial::new(q, n as u64) {
        Ok(b) => b,
        Err(_) => return (0, last as usize),
    };
    let cdf = |k: i64| if k < 0 { 0.0 } else { binom.cdf(k as u64) };

    let middle = (q * (n as f64 + 1.0)).round_ties_even() as i64;
    let mut li = middle;
    let mut ui = middle;
    let mut coverage = 0.0;
    while coverage < confidence {
        if ui < last {
            ui += 1;
        }
        if li > 0 {
            li -= 1;
        }
        coverage = cdf(ui - 1) - cdf(li - 1);
        if ui >= last && li <= 0 {
            break;
        }
    }

    let ui = ui.min(last);
    let li = li.clamp(0, ui);
    (li as usize, ui as usize)
}

pub fn confidence_variation(
    samples: &[f64],
    quantile: f64,
    confidence: f64,
) -> Result<ConfidenceBounds, EstimatorError> {
    if !(quantile > 0.0 && quantile < 1.0) {
        return Err(EstimatorError::Quantile(quantile));
    }
    if !(confidence > 0.5 && confidence < 1.0) {
        return Err(EstimatorError::Confidence(confidence));
    }

    let mut sorted = remove_outliers(samples);
    if sorted.is_empty() {
        return Err(EstimatorError::Empty);
    }
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();

    let (value, lo_idx, hi_idx) = quantile_bracket(&sorted, quantile);
    let (li, ui) = order_statistic_window(n, quantile, confidence);
    // THE WINDOW MUST CONTAIN THE INTERPOLATION BRACKET: lower <= value <= upper
    let li = li.min(lo_idx);
    let ui = ui.max(hi_idx);

    let lower = sorted[li];
    let upper = sorted[ui];
    let range = upper - lower;
    let variation_pct = if value == 0.0 {
        if range == 0.0 { 0.0 } else { f64::INFINITY }
    } else {
        range / value.abs() * 100.0
    };

    Ok(ConfidenceBounds {
        quantile,
        value,
        lower,
        upper,
        variation_pct,
    })
}
