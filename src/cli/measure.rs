use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

use antagonist::compare::{compare, report, Comparison};
use antagonist::progress::Summary;

pub fn run_measure(
    path: &Path,
    output: &Path,
    only: Option<&str>,
    shutdown: &'static AtomicBool,
) -> Result<()> {
    let experiments = super::select(path, only)?;
    let mut results: Vec<Comparison> = Vec::new();

    for exp in &experiments {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        if !exp.max_file.exists() {
            log::warn!("{}: NO SUMMARY AT {}, SKIPPED", exp.name, exp.max_file.display());
            continue;
        }
        let summary = Summary::load(&exp.max_file)?;
        let registry = exp
            .load_registry()
            .with_context(|| format!("experiment '{}'", exp.name))?;
        summary
            .best
            .validate(&registry)
            .with_context(|| format!("experiment '{}': stale summary", exp.name))?;
        let mut harness = exp
            .harness(&registry, shutdown)
            .with_context(|| format!("experiment '{}': harness", exp.name))?;

        let c = compare(&exp.name, &exp.plan, &mut harness, &summary.best)?;
        report(&c);
        results.push(c);
    }

    if let Some(dir) = output.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    std::fs::write(output, serde_json::to_string_pretty(&results)?)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("\n{} MEASUREMENTS WRITTEN TO {}", results.len(), output.display());
    Ok(())
}
