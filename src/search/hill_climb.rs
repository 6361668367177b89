// HILL CLIMBING
// ONE neighbour_define() PROPOSAL PER ITERATION, ADOPTED ONLY IF STRICTLY
// BETTER. NO ESCAPE FROM LOCAL OPTIMA. STOPS EARLY WHEN NO PARAMETER CAN MOVE.

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
        let Some(candidate) = state.current.neighbour_define(registry, rng) else {
            log::debug!("HILL CLIMB: NO MUTABLE PARAMETER, STOPPING");
            break;
        };
        let score = ev.score(&candidate)?;
        let accept = score > state.current_score;
        state.offer(candidate, score, accept);
    }
    Ok(state.finish(ev.evaluations() - start))
}
