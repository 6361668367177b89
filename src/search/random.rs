// RANDOM SEARCH
// BASELINE AND DIVERSIFICATION: REDRAW EVERY PARAMETER, TEMPLATES UNCHANGED,
// SCORE, KEEP THE BEST. NOTHING IS LEARNED BETWEEN DRAWS.

use anyhow::Result;
use rand::Rng;

use crate::enemy::EnemyConfiguration;
use crate::template::TemplateRegistry;

use super::{Budget, Evaluator, SearchOutcome, SearchState};

pub fn search<R: Rng + ?Sized>(
    ev: &mut Evaluator<'_>,
    registry: &TemplateRegistry,
    initial: &EnemyConfiguration,
    budget: &Budget<'_>,
    rng: &mut R,
) -> Result<SearchOutcome> {
    let start = ev.evaluations();
    if budget.exhausted(start) {
        return Ok(SearchOutcome::empty());
    }
    let score = ev.score(initial)?;
    let mut state = SearchState::new(initial.clone(), score);

    while !budget.exhausted(ev.evaluations()) {
        let candidate = state.current.random_params(registry, rng)?;
        let score = ev.score(&candidate)?;
        // CURRENT FOLLOWS THE DRAW; ONLY THE BEST MATTERS
        state.offer(candidate, score, true);
    }
    Ok(state.finish(ev.evaluations() - start))
}
