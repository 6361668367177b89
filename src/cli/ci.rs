use std::path::Path;

use anyhow::{Context, Result};

use antagonist::estimator::{confidence_variation, remove_outliers};

pub fn run_ci(path: &Path, quantile: f64, confidence: f64) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let samples = text
        .split_whitespace()
        .map(|tok| {
            tok.parse::<f64>()
                .with_context(|| format!("{}: not a number: '{}'", path.display(), tok))
        })
        .collect::<Result<Vec<f64>>>()?;

    let kept = remove_outliers(&samples).len();
    let bounds = confidence_variation(&samples, quantile, confidence)?;

    println!("{}", "=".repeat(50));
    println!("ANTAGONIST CONFIDENCE REPORT");
    println!("{}", "=".repeat(50));
    println!("  SAMPLES:           {} ({} AFTER OUTLIER FILTER)", samples.len(), kept);
    println!("  QUANTILE:          Q{:.2} = {:.3}", bounds.quantile, bounds.value);
    println!("  CONFIDENCE:        {:.0}%", confidence * 100.0);
    println!("  INTERVAL:          [{:.3}, {:.3}]", bounds.lower, bounds.upper);
    println!("  VARIATION:         {:.2}%", bounds.variation_pct);
    Ok(())
}
