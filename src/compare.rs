// ANTAGONIST BASELINE COMPARISON
// MEASURE THE SUT ALONE AND UNDER THE BEST CONFIGURATION FOUND, WITH THE SAME
// MEASUREMENT PLAN. THE SLOWDOWN IS ONLY MEANINGFUL WHEN THE TWO CONFIDENCE
// INTERVALS DO NOT OVERLAP.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::enemy::EnemyConfiguration;
use crate::estimator::ConfidenceBounds;
use crate::harness::Harness;
use crate::stopping::MeasurementPlan;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Side {
    pub configuration: String,
    pub samples: usize,
    pub bounds: ConfidenceBounds,
    pub success: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub experiment: String,
    pub baseline: Side,
    pub enemy: Side,
    // ENEMY / BASELINE AT THE CONFIGURED QUANTILE
    pub slowdown: f64,
    pub overlap: bool,
}

impl Comparison {
    pub fn significant(&self) -> bool {
        !self.overlap
    }
}

fn side<H: Harness>(plan: &MeasurementPlan, harness: &mut H, config: &EnemyConfiguration) -> Result<Side> {
    let m = plan
        .measure(|n| harness.run(config, n).map_err(anyhow::Error::from))
        .with_context(|| format!("measuring {}", config))?;
    Ok(Side {
        configuration: config.to_string(),
        samples: m.series.len(),
        bounds: m.bounds,
        success: m.success,
    })
}

pub fn compare<H: Harness>(
    experiment: &str,
    plan: &MeasurementPlan,
    harness: &mut H,
    best: &EnemyConfiguration,
) -> Result<Comparison> {
    let baseline = side(plan, harness, &EnemyConfiguration::baseline())?;
    let enemy = side(plan, harness, best)?;
    let slowdown = if baseline.bounds.value == 0.0 {
        f64::INFINITY
    } else {
        enemy.bounds.value / baseline.bounds.value
    };
    let overlap = baseline.bounds.overlaps(&enemy.bounds);
    log::info!(
        "{}: BASELINE {:.3} ENEMY {:.3} SLOWDOWN {:.2}x{}",
        experiment,
        baseline.bounds.value,
        enemy.bounds.value,
        slowdown,
        if overlap { " (INTERVALS OVERLAP)" } else { "" }
    );
    Ok(Comparison {
        experiment: experiment.to_string(),
        baseline,
        enemy,
        slowdown,
        overlap,
    })
}

pub fn report(c: &Comparison) {
    println!("{}", "=".repeat(50));
    println!("ANTAGONIST MEASUREMENT: {}", c.experiment);
    println!("{}", "=".repeat(50));
    for (label, s) in [("BASELINE", &c.baseline), ("ENEMY", &c.enemy)] {
        println!(
            "  {:<9} Q{:.2} = {:.3}  [{:.3}, {:.3}]  +/-{:.1}%  N={}{}",
            label,
            s.bounds.quantile,
            s.bounds.value,
            s.bounds.lower,
            s.bounds.upper,
            s.bounds.variation_pct,
            s.samples,
            if s.success { "" } else { "  UNSTABLE" }
        );
    }
    println!("  SLOWDOWN  {:.2}x", c.slowdown);
    println!(
        "  VERDICT   {}",
        if c.significant() { "SIGNIFICANT" } else { "NOT SIGNIFICANT (INTERVALS OVERLAP)" }
    );
}
