pub mod ci;
pub mod measure;
pub mod rank;
pub mod serve;
pub mod tune;

use std::path::Path;

use anyhow::{bail, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use antagonist::experiment::{load_experiments, Experiment};

// ALL EXPERIMENTS IN FILE ORDER, OR THE ONE NAMED BY --only
pub fn select(path: &Path, only: Option<&str>) -> Result<Vec<Experiment>> {
    let mut experiments = load_experiments(path)?;
    if let Some(name) = only {
        experiments.retain(|e| e.name == name);
        if experiments.is_empty() {
            bail!("no experiment named '{}' in {}", name, path.display());
        }
    }
    if experiments.is_empty() {
        bail!("{} describes no experiments", path.display());
    }
    Ok(experiments)
}

pub fn rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}
