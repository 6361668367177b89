use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use antagonist::rank::{aggregate, RankedList};

pub fn run_rank(reference: &Path, comparisons: &[PathBuf], output: Option<&Path>) -> Result<()> {
    let mut lists = vec![RankedList::load(reference)?];
    for p in comparisons {
        lists.push(RankedList::load(p)?);
    }
    let agg = aggregate(&lists)?;

    println!("{}", "=".repeat(50));
    println!("ANTAGONIST PARETO RANKING");
    println!("{}", "=".repeat(50));
    let dims: Vec<&str> = lists.iter().map(|l| l.name.as_str()).collect();
    println!("  DIMENSIONS:        {}", dims.join(", "));
    println!("  CANDIDATES:        {}", agg.ranks.len());
    println!("  TIE-BREAK:         {}", if agg.tie_break_applied { "applied" } else { "not needed" });
    println!("  TIE BROKEN:        {}", if agg.tie_broken { "yes" } else { "no" });
    println!("  FRONTIER:");
    for key in &agg.frontier {
        let ranks = agg.ranks.get(key).map(|r| format!("{:?}", r)).unwrap_or_default();
        println!("    {:<30} {}", key, ranks);
    }

    if let Some(out) = output {
        if let Some(dir) = out.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        std::fs::write(out, serde_json::to_string_pretty(&agg)?)
            .with_context(|| format!("writing {}", out.display()))?;
        println!("  WRITTEN TO:        {}", out.display());
    }
    Ok(())
}
