// ANTAGONIST MEASUREMENT STOPPING LOOP
// COLLECT SAMPLES IN FIXED INCREMENTS UNTIL THE TARGET QUANTILE IS STABLE
// (CONFIDENCE VARIATION BELOW THRESHOLD) OR THE SAMPLE CAP IS HIT.
//
// POLICIES:
//   fixed        ALWAYS RUN TO THE CAP. ALWAYS SUCCEEDS.
//   no_decrease  STOP AS SOON AS THE CONFIGURED QUANTILE IS STABLE.
//   optimistic   AS no_decrease, PLUS A DESCENDING QUANTILE LADDER AT THE CAP.
//   pessimistic  QUANTILE LADDER AFTER EVERY INCREMENT.
//
// EVERY CHECK RECOMPUTES FROM ALL SAMPLES COLLECTED SO FAR.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;
use crate::estimator::{confidence_variation, ConfidenceBounds};
use crate::harness::SampleBatch;

// QUANTILE LADDER: 0.95 DOWN TO 0.50 IN STEPS OF 0.01
const LADDER_TOP_PCT: u32 = 95;
const LADDER_BOTTOM_PCT: u32 = 50;

pub fn quantile_ladder() -> impl Iterator<Item = f64> {
    (LADDER_BOTTOM_PCT..=LADDER_TOP_PCT).rev().map(|p| p as f64 / 100.0)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppingPolicy {
    Fixed,
    NoDecrease,
    Optimistic,
    Pessimistic,
}

impl StoppingPolicy {
    pub fn label(self) -> &'static str {
        match self {
            Self::Fixed => "FIXED",
            Self::NoDecrease => "NO_DECREASE",
            Self::Optimistic => "OPTIMISTIC",
            Self::Pessimistic => "PESSIMISTIC",
        }
    }
}

// APPEND-ONLY. TEMPERATURES ARE ONLY PRESENT WHEN THE HARNESS HAS A SENSOR.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSeries {
    samples: Vec<f64>,
    temperatures: Vec<f64>,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, batch: SampleBatch) {
        self.samples.extend(batch.samples);
        self.temperatures.extend(batch.temperatures);
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn temperatures(&self) -> &[f64] {
        &self.temperatures
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeasurementPlan {
    pub quantile: f64,
    pub confidence: f64,
    pub max_variation_pct: f64,
    pub step: usize,
    pub max: usize,
    pub policy: StoppingPolicy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    pub series: SampleSeries,
    pub bounds: ConfidenceBounds,
    pub success: bool,
}

impl MeasurementPlan {
    fn stable(&self, samples: &[f64], q: f64) -> Result<Option<ConfidenceBounds>, EstimatorError> {
        let bounds = confidence_variation(samples, q, self.confidence)?;
        Ok((bounds.variation_pct < self.max_variation_pct).then_some(bounds))
    }

    fn first_stable_on_ladder(&self, samples: &[f64]) -> Result<Option<ConfidenceBounds>, EstimatorError> {
        for q in quantile_ladder() {
            if let Some(bounds) = self.stable(samples, q)? {
                return Ok(Some(bounds));
            }
        }
        Ok(None)
    }

    // EARLY-EXIT CHECK AFTER ONE INCREMENT. Some(bounds) MEANS STOP NOW.
    pub fn check(&self, samples: &[f64]) -> Result<Option<ConfidenceBounds>, EstimatorError> {
        match self.policy {
            StoppingPolicy::Fixed => Ok(None),
            StoppingPolicy::NoDecrease | StoppingPolicy::Optimistic => {
                self.stable(samples, self.quantile)
            }
            StoppingPolicy::Pessimistic => self.first_stable_on_ladder(samples),
        }
    }

    // VERDICT ONCE THE SAMPLE CAP IS REACHED: (BOUNDS, SUCCESS)
    pub fn conclude(&self, samples: &[f64]) -> Result<(ConfidenceBounds, bool), EstimatorError> {
        if self.policy == StoppingPolicy::Optimistic {
            if let Some(bounds) = self.first_stable_on_ladder(samples)? {
                return Ok((bounds, true));
            }
        }
        let bounds = confidence_variation(samples, self.quantile, self.confidence)?;
        let success = self.policy == StoppingPolicy::Fixed
            || bounds.variation_pct < self.max_variation_pct;
        Ok((bounds, success))
    }

    // DRIVE ONE MEASUREMENT. `collect(n)` MUST RETURN n FRESH SAMPLES.
    pub fn measure<F>(&self, mut collect: F) -> Result<Measurement>
    where
        F: FnMut(usize) -> Result<SampleBatch>,
    {
        if self.step == 0 || self.max == 0 {
            bail!("measurement step and max must both be positive");
        }

        let mut series = SampleSeries::new();
        while series.len() < self.max {
            let batch = collect(self.step)?;
            if batch.samples.is_empty() {
                bail!("harness returned an empty batch");
            }
            series.append(batch);
            log::debug!("COLLECTED {}/{} SAMPLES", series.len(), self.max);

            if let Some(bounds) = self.check(series.samples())? {
                log::debug!(
                    "STABLE AT Q{:.2}: VARIATION {:.2}% AFTER {} SAMPLES",
                    bounds.quantile, bounds.variation_pct, series.len()
                );
                return Ok(Measurement { series, bounds, success: true });
            }
        }

        let (bounds, success) = self.conclude(series.samples())?;
        if !success {
            log::warn!(
                "QUANTILE {:.2} DID NOT STABILIZE: VARIATION {:.2}% AFTER {} SAMPLES",
                self.quantile, bounds.variation_pct, series.len()
            );
        }
        Ok(Measurement { series, bounds, success })
    }
}
