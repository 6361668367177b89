// BAYESIAN OPTIMIZATION (GP-UCB)
// PARAMETERS OF THE CURRENT TEMPLATES ARE MAPPED TO THE UNIT BOX. AFTER
// init_points RANDOM PROBES, EACH SUGGESTION MAXIMIZES
//   UCB(x) = mu(x) + kappa * sigma(x)
// OVER RANDOM CANDIDATES, WITH mu/sigma FROM AN RBF GAUSSIAN PROCESS FIT TO
// THE STANDARDIZED SCORES SEEN SO FAR.
//
// SHARED PARAMETERS: ONE VECTOR DRIVES EVERY CORE.
// OTHERWISE ONE OPTIMIZER PER CORE, IN CORE ORDER, EACH GIVEN AN EVEN SHARE
// OF THE REMAINING EVALUATIONS AND TIME. CORES NOT BEING TUNED STAY AT THE
// BEST CONFIGURATION FOUND SO FAR.

use std::time::Instant;

use anyhow::Result;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::enemy::EnemyConfiguration;
use crate::template::{ParamSpec, TemplateRegistry};

use super::{Budget, Evaluator, SearchOutcome, SearchState};

const CANDIDATES: usize = 1000;
const LENGTH_SCALE: f64 = 0.2;
const NOISE: f64 = 1e-2;
const JITTER_TRIES: usize = 6;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BayesSettings {
    pub kappa: f64,
    pub init_points: usize,
}

impl Default for BayesSettings {
    fn default() -> Self {
        Self {
            kappa: 2.576,
            init_points: 5,
        }
    }
}

// ASK/TELL INTERFACE OF A BLACK-BOX MAXIMIZER OVER A BOX
pub trait BlackBoxOptimizer {
    fn suggest<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<f64>;
    fn observe(&mut self, x: Vec<f64>, y: f64);
}

// ---------------------------------------------------------------------------
// GAUSSIAN PROCESS
// ---------------------------------------------------------------------------

fn rbf(a: &[f64], b: &[f64]) -> f64 {
    let d2: f64 = a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum();
    (-d2 / (2.0 * LENGTH_SCALE * LENGTH_SCALE)).exp()
}

// K(X, X) + jitter * I
fn kernel(xs: &[Vec<f64>], jitter: f64) -> DMatrix<f64> {
    let n = xs.len();
    DMatrix::from_fn(n, n, |i, j| rbf(&xs[i], &xs[j]) + if i == j { jitter } else { 0.0 })
}

struct GaussianProcess<'a> {
    xs: &'a [Vec<f64>],
    // LOWER CHOLESKY FACTOR OF THE KERNEL MATRIX
    l: DMatrix<f64>,
    alpha: DVector<f64>,
}

impl<'a> GaussianProcess<'a> {
    // ys MUST ALREADY BE STANDARDIZED. JITTER GROWS UNTIL THE KERNEL FACTORS.
    fn fit(xs: &'a [Vec<f64>], ys: &[f64]) -> Option<Self> {
        let y = DVector::from_column_slice(ys);
        let mut jitter = NOISE;
        for _ in 0..JITTER_TRIES {
            if let Some(chol) = Cholesky::new(kernel(xs, jitter)) {
                let alpha = chol.solve(&y);
                return Some(Self { xs, l: chol.l(), alpha });
            }
            jitter *= 10.0;
        }
        None
    }

    // (MEAN, STD) IN STANDARDIZED UNITS
    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let ks = DVector::from_iterator(self.xs.len(), self.xs.iter().map(|xi| rbf(xi, x)));
        let mean = ks.dot(&self.alpha);
        let var = match self.l.solve_lower_triangular(&ks) {
            Some(v) => (1.0 - v.norm_squared()).max(0.0),
            None => 1.0,
        };
        (mean, var.sqrt())
    }
}

// ---------------------------------------------------------------------------
// GP-UCB
// ---------------------------------------------------------------------------

pub struct GpUcb {
    bounds: Vec<(f64, f64)>,
    kappa: f64,
    init_points: usize,
    // UNIT-BOX COORDINATES
    xs: Vec<Vec<f64>>,
    ys: Vec<f64>,
}

impl GpUcb {
    pub fn new(bounds: Vec<(f64, f64)>, settings: &BayesSettings) -> Self {
        Self {
            bounds,
            kappa: settings.kappa,
            init_points: settings.init_points,
            xs: Vec::new(),
            ys: Vec::new(),
        }
    }

    pub fn observations(&self) -> usize {
        self.ys.len()
    }

    fn to_unit(&self, x: &[f64]) -> Vec<f64> {
        x.iter()
            .zip(&self.bounds)
            .map(|(v, (lo, hi))| if hi > lo { ((v - lo) / (hi - lo)).clamp(0.0, 1.0) } else { 0.0 })
            .collect()
    }

    fn from_unit(&self, u: &[f64]) -> Vec<f64> {
        u.iter()
            .zip(&self.bounds)
            .map(|(v, (lo, hi))| lo + v * (hi - lo))
            .collect()
    }

    fn random_unit<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        (0..self.bounds.len()).map(|_| rng.gen::<f64>()).collect()
    }
}

impl BlackBoxOptimizer for GpUcb {
    fn suggest<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<f64> {
        if self.ys.len() < self.init_points.max(1) {
            let u = self.random_unit(rng);
            return self.from_unit(&u);
        }

        let n = self.ys.len() as f64;
        let mean = self.ys.iter().sum::<f64>() / n;
        let std = (self.ys.iter().map(|y| (y - mean).powi(2)).sum::<f64>() / n).sqrt().max(1e-9);
        let ys: Vec<f64> = self.ys.iter().map(|y| (y - mean) / std).collect();

        let Some(gp) = GaussianProcess::fit(&self.xs, &ys) else {
            log::debug!("GP FIT FAILED, FALLING BACK TO A RANDOM PROBE");
            let u = self.random_unit(rng);
            return self.from_unit(&u);
        };

        let mut best_u = self.random_unit(rng);
        let mut best_ucb = f64::NEG_INFINITY;
        for _ in 0..CANDIDATES {
            let u = self.random_unit(rng);
            let (mu, sigma) = gp.predict(&u);
            let ucb = mu + self.kappa * sigma;
            if ucb > best_ucb {
                best_ucb = ucb;
                best_u = u;
            }
        }
        self.from_unit(&best_u)
    }

    fn observe(&mut self, x: Vec<f64>, y: f64) {
        let u = self.to_unit(&x);
        self.xs.push(u);
        self.ys.push(y);
    }
}

// ---------------------------------------------------------------------------
// SEARCH DRIVER
// ---------------------------------------------------------------------------

// ONE INDEPENDENTLY TUNED GROUP: THE CORES IT WRITES AND THE PARAMETERS IT OWNS
struct Group {
    cores: Vec<usize>,
    specs: Vec<ParamSpec>,
}

impl Group {
    fn bounds(&self) -> Vec<(f64, f64)> {
        self.specs.iter().map(ParamSpec::bounds).collect()
    }

    fn read(&self, cfg: &EnemyConfiguration) -> Vec<f64> {
        let params = &cfg.assignments[self.cores[0]].params;
        self.specs
            .iter()
            .map(|s| params.get(&s.name).map_or(s.lo, |v| v.as_f64()))
            .collect()
    }

    fn write(&self, cfg: &EnemyConfiguration, x: &[f64]) -> EnemyConfiguration {
        let mut next = cfg.clone();
        for &core in &self.cores {
            let params = &mut next.assignments[core].params;
            for (spec, v) in self.specs.iter().zip(x) {
                params.insert(spec.name.clone(), spec.coerce(*v));
            }
        }
        next
    }
}

fn groups(cfg: &EnemyConfiguration, registry: &TemplateRegistry) -> Vec<Group> {
    let mutable = |core: usize| -> Vec<ParamSpec> {
        registry
            .get(&cfg.assignments[core].template)
            .map(|t| t.params.iter().filter(|p| p.is_mutable()).cloned().collect())
            .unwrap_or_default()
    };
    let groups: Vec<Group> = if cfg.shared_params {
        match cfg.assignments.first() {
            Some(_) => vec![Group { cores: (0..cfg.cores()).collect(), specs: mutable(0) }],
            None => Vec::new(),
        }
    } else {
        (0..cfg.cores())
            .map(|core| Group { cores: vec![core], specs: mutable(core) })
            .collect()
    };
    groups.into_iter().filter(|g| !g.specs.is_empty()).collect()
}

pub fn search<R: Rng + ?Sized>(
    ev: &mut Evaluator<'_>,
    registry: &TemplateRegistry,
    initial: &EnemyConfiguration,
    settings: &BayesSettings,
    budget: &Budget<'_>,
    rng: &mut R,
) -> Result<SearchOutcome> {
    let start = ev.evaluations();
    if budget.exhausted(start) {
        return Ok(SearchOutcome::empty());
    }
    let score = ev.score(initial)?;
    let mut state = SearchState::new(initial.clone(), score);

    let groups = groups(initial, registry);
    let total = groups.len();
    for (i, group) in groups.iter().enumerate() {
        if budget.exhausted(ev.evaluations()) {
            break;
        }
        // EVEN SHARE OF WHAT IS LEFT ACROSS THE GROUPS STILL TO RUN
        let left = (total - i) as u32;
        let used = ev.evaluations();
        let evals = budget
            .remaining_evaluations(used)
            .map_or(usize::MAX, |r| r / left as usize)
            .max(1);
        let deadline = budget.remaining_time().map(|t| Instant::now() + t / left);
        let share = budget.child_until(used, evals, deadline);
        log::debug!("BAYES GROUP {}/{} (CORES {:?}): {} PARAMS, {} EVALUATIONS",
            i + 1, total, group.cores, group.specs.len(), evals);

        let mut opt = GpUcb::new(group.bounds(), settings);
        // THE INCUMBENT IS A FREE OBSERVATION
        opt.observe(group.read(&state.best), state.best_score);

        while !share.exhausted(ev.evaluations()) {
            let x = opt.suggest(rng);
            let candidate = group.write(&state.best, &x);
            let score = ev.score(&candidate)?;
            opt.observe(x, score);
            let accept = score > state.current_score;
            state.offer(candidate, score, accept);
        }
    }
    Ok(state.finish(ev.evaluations() - start))
}
