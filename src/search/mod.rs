// ANTAGONIST SEARCH ENGINE
// STRATEGIES OVER ENEMY CONFIGURATIONS, ALL DRIVEN THROUGH ONE Evaluator.
//
//   SIMPLE (TEMPLATES FIXED, PARAMETERS TUNED):
//     random         REDRAW PARAMETERS, KEEP THE BEST
//     hill_climbing  neighbour_define(), ADOPT ONLY STRICT IMPROVEMENTS
//     annealing      neighbour_define(), KIRKPATRICK ACCEPTANCE, GEOMETRIC COOLING
//     bayesian       GP-UCB OVER THE PARAMETER BOX
//   BILEVEL:
//     OUTER random | annealing OVER TEMPLATE ASSIGNMENTS, ONE INNER SIMPLE
//     SEARCH PER CANDIDATE ASSIGNMENT.
//
// TERMINATION IS CHECKED AT LOOP BOUNDARIES ONLY: EVALUATION CAP, WALL-CLOCK
// DEADLINE, OR SHUTDOWN. AN IN-FLIGHT EVALUATION IS NEVER CUT SHORT.

pub mod anneal;
pub mod bayesian;
pub mod bilevel;
pub mod hill_climb;
pub mod random;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::enemy::EnemyConfiguration;
use crate::objective::Objective;
use crate::template::TemplateRegistry;

pub use anneal::AnnealSettings;
pub use bayesian::BayesSettings;

// ---------------------------------------------------------------------------
// BUDGET
// ---------------------------------------------------------------------------

// ABSOLUTE LIMITS: max_evaluations COMPARES AGAINST THE EVALUATOR'S RUNNING
// COUNT, SO NESTED SEARCHES SHARE ONE CAP AND ONE DEADLINE.
#[derive(Clone, Copy, Debug, Default)]
pub struct Budget<'a> {
    pub max_evaluations: Option<usize>,
    pub deadline: Option<Instant>,
    pub shutdown: Option<&'a AtomicBool>,
}

impl<'a> Budget<'a> {
    pub fn evaluations(n: usize) -> Self {
        Self { max_evaluations: Some(n), ..Self::default() }
    }

    pub fn until(deadline: Instant) -> Self {
        Self { deadline: Some(deadline), ..Self::default() }
    }

    pub fn with_shutdown(mut self, flag: &'a AtomicBool) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn interrupted(&self) -> bool {
        self.shutdown.map_or(false, |f| f.load(Ordering::Relaxed))
    }

    pub fn exhausted(&self, used: usize) -> bool {
        self.interrupted()
            || self.max_evaluations.map_or(false, |m| used >= m)
            || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    pub fn remaining_evaluations(&self, used: usize) -> Option<usize> {
        self.max_evaluations.map(|m| m.saturating_sub(used))
    }

    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline.map(|d| d.saturating_duration_since(Instant::now()))
    }

    // AT MOST `extra` MORE EVALUATIONS FROM `used`, NEVER PAST THE PARENT
    pub fn child(&self, used: usize, extra: usize) -> Self {
        let cap = used.saturating_add(extra);
        Self {
            max_evaluations: Some(self.max_evaluations.map_or(cap, |m| m.min(cap))),
            deadline: self.deadline,
            shutdown: self.shutdown,
        }
    }

    // SAME, PLUS AN EARLIER DEADLINE
    pub fn child_until(&self, used: usize, extra: usize, deadline: Option<Instant>) -> Self {
        let mut b = self.child(used, extra);
        b.deadline = match (b.deadline, deadline) {
            (Some(a), Some(d)) => Some(a.min(d)),
            (a, d) => a.or(d),
        };
        b
    }
}

// ---------------------------------------------------------------------------
// EVALUATOR
// ---------------------------------------------------------------------------

// COUNTS EVERY OBJECTIVE CALL MADE BY ANY STRATEGY, AT ANY NESTING LEVEL
pub struct Evaluator<'o> {
    objective: &'o mut dyn Objective,
    evaluations: usize,
}

impl<'o> Evaluator<'o> {
    pub fn new(objective: &'o mut dyn Objective) -> Self {
        Self { objective, evaluations: 0 }
    }

    pub fn score(&mut self, config: &EnemyConfiguration) -> Result<f64> {
        self.evaluations += 1;
        self.objective.score(config)
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }
}

// ---------------------------------------------------------------------------
// SEARCH STATE
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Step {
    pub candidate: f64,
    pub current: f64,
    pub best: f64,
    pub accepted: bool,
}

#[derive(Clone, Debug)]
pub struct SearchState {
    pub current: EnemyConfiguration,
    pub current_score: f64,
    pub best: EnemyConfiguration,
    pub best_score: f64,
    pub steps: Vec<Step>,
}

impl SearchState {
    pub fn new(initial: EnemyConfiguration, score: f64) -> Self {
        Self {
            current: initial.clone(),
            current_score: score,
            best: initial,
            best_score: score,
            steps: vec![Step { candidate: score, current: score, best: score, accepted: true }],
        }
    }

    // RECORD ONE PROPOSAL. BEST NEVER REGRESSES, WHATEVER THE ACCEPTANCE.
    pub fn offer(&mut self, candidate: EnemyConfiguration, score: f64, accept: bool) {
        if score > self.best_score {
            self.best = candidate.clone();
            self.best_score = score;
        }
        if accept {
            self.current = candidate;
            self.current_score = score;
        }
        self.steps.push(Step {
            candidate: score,
            current: self.current_score,
            best: self.best_score,
            accepted: accept,
        });
    }

    pub fn finish(self, evaluations: usize) -> SearchOutcome {
        SearchOutcome {
            best: Some(self.best),
            best_score: self.best_score,
            evaluations,
            steps: self.steps,
        }
    }
}

// best IS None ONLY WHEN THE BUDGET WAS GONE BEFORE THE FIRST EVALUATION
#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub best: Option<EnemyConfiguration>,
    pub best_score: f64,
    // EVALUATIONS SPENT BY THIS SEARCH, NESTED ONES INCLUDED
    pub evaluations: usize,
    pub steps: Vec<Step>,
}

impl SearchOutcome {
    pub fn empty() -> Self {
        Self { best: None, best_score: f64::NEG_INFINITY, evaluations: 0, steps: Vec::new() }
    }
}

// ---------------------------------------------------------------------------
// METHOD SELECTION
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InnerMethod {
    #[serde(alias = "fuzz")]
    Random,
    HillClimbing,
    Annealing,
    Bayesian,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OuterMethod {
    Random,
    Annealing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Method {
    Simple(InnerMethod),
    Bilevel { outer: OuterMethod, inner: InnerMethod },
}

impl Method {
    pub fn is_bilevel(&self) -> bool {
        matches!(self, Self::Bilevel { .. })
    }
}

impl fmt::Display for InnerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Random => "random",
            Self::HillClimbing => "hill_climbing",
            Self::Annealing => "annealing",
            Self::Bayesian => "bayesian",
        })
    }
}

impl fmt::Display for OuterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Random => "random",
            Self::Annealing => "annealing",
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(m) => write!(f, "{}", m),
            Self::Bilevel { outer, inner } => write!(f, "{}/{}", outer, inner),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchSettings {
    pub annealing: AnnealSettings,
    pub bayes: BayesSettings,
    // INNER EVALUATIONS PER OUTER CANDIDATE (BILEVEL)
    pub inner_evaluations: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            annealing: AnnealSettings::default(),
            bayes: BayesSettings::default(),
            inner_evaluations: 10,
        }
    }
}

// RUN ONE SIMPLE STRATEGY FROM `initial`
pub fn run_inner<R: Rng + ?Sized>(
    method: InnerMethod,
    ev: &mut Evaluator<'_>,
    registry: &TemplateRegistry,
    initial: &EnemyConfiguration,
    settings: &SearchSettings,
    budget: &Budget<'_>,
    rng: &mut R,
) -> Result<SearchOutcome> {
    match method {
        InnerMethod::Random => random::search(ev, registry, initial, budget, rng),
        InnerMethod::HillClimbing => hill_climb::search(ev, registry, initial, budget, rng),
        InnerMethod::Annealing => {
            anneal::search(ev, registry, initial, &settings.annealing, budget, rng)
        }
        InnerMethod::Bayesian => {
            bayesian::search(ev, registry, initial, &settings.bayes, budget, rng)
        }
    }
}

pub fn run<R: Rng + ?Sized>(
    method: Method,
    ev: &mut Evaluator<'_>,
    registry: &TemplateRegistry,
    initial: &EnemyConfiguration,
    settings: &SearchSettings,
    budget: &Budget<'_>,
    rng: &mut R,
) -> Result<SearchOutcome> {
    log::info!("SEARCH {} FROM {}", method, initial);
    match method {
        Method::Simple(m) => run_inner(m, ev, registry, initial, settings, budget, rng),
        Method::Bilevel { outer, inner } => {
            bilevel::search(outer, inner, ev, registry, initial, settings, budget, rng)
        }
    }
}
