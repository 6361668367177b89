// ANTAGONIST PROGRESS LOG
// ONE ROW PER EVALUATION, STRICT EVALUATION ORDER, NEVER BATCHED.
// ROWS ARE KEPT IN MEMORY FOR THE END-OF-RUN REPORT AND, WHEN A FILE IS
// ATTACHED, APPENDED AND FLUSHED IMMEDIATELY (TAB-SEPARATED, HEADER FIRST).
//
// THE SUMMARY FILE HOLDS THE FINAL BEST CONFIGURATION AS JSON.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::enemy::EnemyConfiguration;

pub const HEADER: &str = "Iterations\tTraining Time\tMax value found\tCurrent value\tParams";

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressRow {
    pub iteration: usize,
    pub elapsed_s: f64,
    pub best: f64,
    pub current: f64,
    pub success: bool,
    pub description: String,
}

#[derive(Debug)]
pub struct ProgressLog {
    rows: Vec<ProgressRow>,
    file: Option<(PathBuf, BufWriter<File>)>,
}

impl ProgressLog {
    pub fn in_memory() -> Self {
        Self {
            rows: Vec::new(),
            file: None,
        }
    }

    // TRUNCATES `path` AND WRITES THE HEADER
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let file = File::create(path)
            .with_context(|| format!("creating progress log {}", path.display()))?;
        let mut out = BufWriter::new(file);
        writeln!(out, "{}", HEADER)?;
        out.flush()?;
        Ok(Self {
            rows: Vec::new(),
            file: Some((path.to_path_buf(), out)),
        })
    }

    pub fn record(&mut self, row: ProgressRow) -> Result<()> {
        if let Some((path, out)) = self.file.as_mut() {
            writeln!(
                out,
                "{}\t{:.0}\t{}\t{}\t{}",
                row.iteration, row.elapsed_s, row.best, row.current, row.description
            )
            .and_then(|_| out.flush())
            .with_context(|| format!("appending to {}", path.display()))?;
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn rows(&self) -> &[ProgressRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    // FULL TIME SERIES
    pub fn dump(&self) {
        if self.rows.is_empty() {
            return;
        }
        println!("\n{:<6} {:<10} {:<14} {:<14} {:<6} CONFIGURATION",
            "ITER", "TIME_S", "BEST", "CURRENT", "STABLE");
        println!("{}", "-".repeat(72));
        for r in &self.rows {
            println!("{:<6} {:<10.1} {:<14.3} {:<14.3} {:<6} {}",
                r.iteration, r.elapsed_s, r.best, r.current,
                if r.success { "yes" } else { "no" }, r.description);
        }
        println!("TOTAL EVALUATIONS: {}", self.rows.len());
    }

    pub fn summary(&self) {
        if self.rows.is_empty() {
            return;
        }
        let unstable = self.rows.iter().filter(|r| !r.success).count();
        let best = self.rows.iter().map(|r| r.best).fold(f64::NEG_INFINITY, f64::max);
        let lowest = self.rows.iter().map(|r| r.current).fold(f64::INFINITY, f64::min);
        // FIRST ROW THAT REACHED THE FINAL BEST
        let reached = self.rows.iter().find(|r| r.best >= best);
        let elapsed = self.rows.last().map(|r| r.elapsed_s).unwrap_or(0.0);

        println!("\n{}", "=".repeat(50));
        println!("ANTAGONIST SEARCH SUMMARY");
        println!("{}", "=".repeat(50));
        println!("  EVALUATIONS:       {}", self.rows.len());
        println!("  UNSTABLE:          {}", unstable);
        println!("  BEST SCORE:        {:.3}", best);
        println!("  LOWEST SCORE:      {:.3}", lowest);
        if let Some(r) = reached {
            println!("  BEST FOUND AT:     ITER {} ({:.1}s)", r.iteration, r.elapsed_s);
        }
        println!("  ELAPSED:           {:.1}s", elapsed);
    }
}

// ---------------------------------------------------------------------------
// SUMMARY FILE
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub experiment: String,
    pub best_score: f64,
    pub best: EnemyConfiguration,
    pub evaluations: usize,
    pub elapsed_s: f64,
    pub success: bool,
}

impl Summary {
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .with_context(|| format!("writing summary {}", path.display()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading summary {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing summary {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(i: usize, best: f64, current: f64) -> ProgressRow {
        ProgressRow {
            iteration: i,
            elapsed_s: i as f64,
            best,
            current,
            success: true,
            description: format!("cfg{}", i),
        }
    }

    #[test]
    fn rows_kept_in_order() {
        let mut log = ProgressLog::in_memory();
        log.record(row(1, 5.0, 5.0)).unwrap();
        log.record(row(2, 7.0, 7.0)).unwrap();
        let iters: Vec<usize> = log.rows().iter().map(|r| r.iteration).collect();
        assert_eq!(iters, vec![1, 2]);
    }

    #[test]
    fn file_has_header_then_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.tsv");
        let mut log = ProgressLog::create(&path).unwrap();
        log.record(row(1, 5.0, 5.0)).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], HEADER);
        assert_eq!(lines[1], "1\t1\t5\t5\tcfg1");
    }

    #[test]
    fn create_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.tsv");
        std::fs::write(&path, "stale\nstale\n").unwrap();
        let _log = ProgressLog::create(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), format!("{}\n", HEADER));
    }

    #[test]
    fn summary_no_panic_empty() {
        let log = ProgressLog::in_memory();
        log.summary();
        log.dump();
    }

    #[test]
    fn summary_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/max.json");
        let s = Summary {
            experiment: "cache".into(),
            best_score: 12.5,
            best: EnemyConfiguration::baseline(),
            evaluations: 3,
            elapsed_s: 1.0,
            success: true,
        };
        s.write(&path).unwrap();
        assert_eq!(Summary::load(&path).unwrap(), s);
    }
}
