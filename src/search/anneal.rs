// SIMULATED ANNEALING
// KIRKPATRICK: ONE PROPOSAL PER TEMPERATURE, T <- cooling_rate * T FROM
// initial_temperature UNTIL T <= 1.
//
// ENERGY = 1 / SCORE (MINIMIZED). IMPROVEMENTS ARE ALWAYS ACCEPTED, A WORSE
// CANDIDATE WITH PROBABILITY exp(-(E_cand - E_cur) / T). ACCEPTED MOVES
// REPLACE CURRENT EVEN WHEN WORSE; BEST IS TRACKED SEPARATELY.

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::enemy::EnemyConfiguration;
use crate::template::TemplateRegistry;

use super::{Budget, Evaluator, SearchOutcome, SearchState};

pub const FINAL_TEMPERATURE: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealSettings {
    pub initial_temperature: f64,
    pub cooling_rate: f64,
}

impl Default for AnnealSettings {
    fn default() -> Self {
        Self {
            initial_temperature: 100.0,
            cooling_rate: 0.9,
        }
    }
}

impl AnnealSettings {
    pub fn is_valid(&self) -> bool {
        self.initial_temperature > FINAL_TEMPERATURE
            && self.cooling_rate > 0.0
            && self.cooling_rate < 1.0
    }
}

pub fn energy(score: f64) -> f64 {
    if score > 0.0 {
        1.0 / score
    } else {
        f64::MAX
    }
}

pub fn acceptance_probability(current: f64, candidate: f64, temperature: f64) -> f64 {
    if candidate > current {
        return 1.0;
    }
    let delta = energy(candidate) - energy(current);
    if delta <= 0.0 {
        return 1.0;
    }
    (-delta / temperature).exp()
}

// THE COOLING SCHEDULE AS A SEQUENCE OF TEMPERATURES
pub struct Schedule {
    t: f64,
    alpha: f64,
}

impl Schedule {
    pub fn new(settings: &AnnealSettings) -> Self {
        Self {
            t: settings.initial_temperature,
            alpha: settings.cooling_rate,
        }
    }
}

impl Iterator for Schedule {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.t <= FINAL_TEMPERATURE {
            return None;
        }
        let t = self.t;
        self.t *= self.alpha;
        Some(t)
    }
}

pub fn search<R: Rng + ?Sized>(
    ev: &mut Evaluator<'_>,
    registry: &TemplateRegistry,
    initial: &EnemyConfiguration,
    settings: &AnnealSettings,
    budget: &Budget<'_>,
    rng: &mut R,
) -> Result<SearchOutcome> {
    let start = ev.evaluations();
    if budget.exhausted(start) {
        return Ok(SearchOutcome::empty());
    }
    let score = ev.score(initial)?;
    let mut state = SearchState::new(initial.clone(), score);

    for t in Schedule::new(settings) {
        if budget.exhausted(ev.evaluations()) {
            break;
        }
        let Some(candidate) = state.current.neighbour_define(registry, rng) else {
            log::debug!("ANNEALING: NO MUTABLE PARAMETER, STOPPING");
            break;
        };
        let score = ev.score(&candidate)?;
        let p = acceptance_probability(state.current_score, score, t);
        let accept = p >= 1.0 || rng.gen::<f64>() < p;
        log::debug!("T={:.2} CANDIDATE {:.3} P={:.3} {}", t, score, p,
            if accept { "ACCEPT" } else { "REJECT" });
        state.offer(candidate, score, accept);
    }
    Ok(state.finish(ev.evaluations() - start))
}
