use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

pub fn run_tune(
    path: &Path,
    only: Option<&str>,
    dump_log: bool,
    shutdown: &'static AtomicBool,
) -> Result<()> {
    let experiments = super::select(path, only)?;

    println!("ANTAGONIST v0.4.2");
    println!("EXPERIMENTS:     {}", experiments.len());
    println!();

    for exp in &experiments {
        if shutdown.load(Ordering::Relaxed) {
            println!("SHUTDOWN REQUESTED, SKIPPING '{}'", exp.name);
            continue;
        }

        let registry = exp
            .load_registry()
            .with_context(|| format!("experiment '{}'", exp.name))?;
        let harness = exp
            .harness(&registry, shutdown)
            .with_context(|| format!("experiment '{}': harness", exp.name))?;

        println!("{}", "=".repeat(50));
        println!("EXPERIMENT:      {}", exp.name);
        println!("HARNESS:         {}", harness.label());
        println!("METHOD:          {}", exp.method);
        println!("CORES:           {}", exp.cores);
        println!("TEMPLATES:       {}", registry.len());
        println!("STOPPING:        {} (Q{:.2}, +/-{}%)",
            exp.plan.policy.label(), exp.plan.quantile, exp.plan.max_variation_pct);
        println!("{}", "=".repeat(50));

        let mut rng = super::rng(exp.seed);
        let budget = exp.budget(shutdown);
        let (summary, log) = exp.tune(&registry, harness, &mut rng, &budget)?;

        if dump_log {
            log.dump();
        }
        log.summary();
        println!("  BEST CONFIG:       {}", summary.best);
        println!("  STABLE:            {}", if summary.success { "yes" } else { "no" });
        println!("  SUMMARY FILE:      {}", exp.max_file.display());
        println!();
    }

    println!("ANTAGONIST OUT.");
    Ok(())
}
