// ANTAGONIST OBJECTIVE FUNCTION
// SCORE(CONFIG) = STABLE QUANTILE OF THE SUT LATENCY UNDER THAT CONFIG.
//
// EACH CALL: DRIVE THE MEASUREMENT PLAN THROUGH THE HARNESS, FREEZE THE
// OUTCOME INTO AN IMMUTABLE EvaluationResult, UPDATE THE RUNNING BEST
// (STRICTLY GREATER WINS), APPEND ONE PROGRESS ROW.
//
// SINGLE OWNER, STRICTLY SEQUENTIAL. ROW k SEES EVALUATIONS 1..k.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use crate::enemy::EnemyConfiguration;
use crate::estimator::ConfidenceBounds;
use crate::harness::Harness;
use crate::progress::{ProgressLog, ProgressRow};
use crate::stopping::{MeasurementPlan, SampleSeries};

#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationResult {
    pub configuration: EnemyConfiguration,
    pub series: SampleSeries,
    pub bounds: ConfidenceBounds,
    pub success: bool,
    pub elapsed: Duration,
}

impl EvaluationResult {
    pub fn score(&self) -> f64 {
        self.bounds.value
    }
}

// WHAT A SEARCH STRATEGY SEES: CONFIGURATION IN, SCALAR OUT
pub trait Objective {
    fn score(&mut self, config: &EnemyConfiguration) -> Result<f64>;
}

pub struct ObjectiveFunction<H: Harness> {
    harness: H,
    plan: MeasurementPlan,
    log: ProgressLog,
    started: Instant,
    evaluations: usize,
    best: Option<Arc<EvaluationResult>>,
}

impl<H: Harness> ObjectiveFunction<H> {
    pub fn new(harness: H, plan: MeasurementPlan, log: ProgressLog) -> Self {
        Self {
            harness,
            plan,
            log,
            started: Instant::now(),
            evaluations: 0,
            best: None,
        }
    }

    pub fn evaluate(&mut self, config: &EnemyConfiguration) -> Result<Arc<EvaluationResult>> {
        let t0 = Instant::now();
        let harness = &mut self.harness;
        let measurement = self
            .plan
            .measure(|n| harness.run(config, n).map_err(anyhow::Error::from))?;

        let result = Arc::new(EvaluationResult {
            configuration: config.clone(),
            series: measurement.series,
            bounds: measurement.bounds,
            success: measurement.success,
            elapsed: t0.elapsed(),
        });
        self.evaluations += 1;

        let improved = self
            .best
            .as_ref()
            .map_or(true, |b| result.score() > b.score());
        if improved {
            self.best = Some(Arc::clone(&result));
        }
        let best = self.best.as_ref().map_or(result.score(), |b| b.score());

        log::info!(
            "EVAL {:>4}: {:.3} (Q{:.2}, +/-{:.1}%{}) BEST {:.3}",
            self.evaluations,
            result.score(),
            result.bounds.quantile,
            result.bounds.variation_pct,
            if result.success { "" } else { ", UNSTABLE" },
            best
        );

        self.log.record(ProgressRow {
            iteration: self.evaluations,
            elapsed_s: self.started.elapsed().as_secs_f64(),
            best,
            current: result.score(),
            success: result.success,
            description: config.to_string(),
        })?;
        Ok(result)
    }

    pub fn best(&self) -> Option<&Arc<EvaluationResult>> {
        self.best.as_ref()
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn log(&self) -> &ProgressLog {
        &self.log
    }

    pub fn plan(&self) -> &MeasurementPlan {
        &self.plan
    }

    pub fn harness_mut(&mut self) -> &mut H {
        &mut self.harness
    }

    pub fn into_log(self) -> ProgressLog {
        self.log
    }
}

impl<H: Harness> Objective for ObjectiveFunction<H> {
    fn score(&mut self, config: &EnemyConfiguration) -> Result<f64> {
        Ok(self.evaluate(config)?.score())
    }
}

impl<F> Objective for F
where
    F: FnMut(&EnemyConfiguration) -> Result<f64>,
{
    fn score(&mut self, config: &EnemyConfiguration) -> Result<f64> {
        self(config)
    }
}
