// BILEVEL SEARCH
// OUTER LOOP OVER TEMPLATE ASSIGNMENTS, INNER SIMPLE SEARCH OVER PARAMETERS.
// A CANDIDATE ASSIGNMENT'S SCORE IS THE BEST SCORE ITS INNER SEARCH REACHED,
// AND THE OUTER STATE CARRIES THE TUNED CONFIGURATION FORWARD.
//
//   random     FRESH TEMPLATES ON EVERY CORE, KEEP IF STRICTLY BETTER
//   annealing  neighbour_template() PROPOSALS UNDER THE ANNEALING SCHEDULE
//
// INNER SEARCHES GET inner_evaluations EACH, CAPPED BY THE SHARED BUDGET.

use anyhow::Result;
use rand::Rng;

use crate::enemy::{EnemyConfiguration, TemplateNeighbours};
use crate::template::TemplateRegistry;

use super::anneal::{acceptance_probability, Schedule};
use super::{run_inner, Budget, Evaluator, InnerMethod, OuterMethod, SearchOutcome, SearchSettings, SearchState};

fn tune<R: Rng + ?Sized>(
    inner: InnerMethod,
    ev: &mut Evaluator<'_>,
    registry: &TemplateRegistry,
    assignment: &EnemyConfiguration,
    settings: &SearchSettings,
    budget: &Budget<'_>,
    rng: &mut R,
) -> Result<SearchOutcome> {
    let share = budget.child(ev.evaluations(), settings.inner_evaluations.max(1));
    let out = run_inner(inner, ev, registry, assignment, settings, &share, rng)?;
    if let Some(best) = &out.best {
        log::info!("ASSIGNMENT {} -> {:.3} ({} EVALUATIONS)", best, out.best_score, out.evaluations);
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
pub fn search<R: Rng + ?Sized>(
    outer: OuterMethod,
    inner: InnerMethod,
    ev: &mut Evaluator<'_>,
    registry: &TemplateRegistry,
    initial: &EnemyConfiguration,
    settings: &SearchSettings,
    budget: &Budget<'_>,
    rng: &mut R,
) -> Result<SearchOutcome> {
    let start = ev.evaluations();
    if budget.exhausted(start) {
        return Ok(SearchOutcome::empty());
    }
    let first = tune(inner, ev, registry, initial, settings, budget, rng)?;
    let Some(best) = first.best else {
        return Ok(first);
    };
    let mut state = SearchState::new(best, first.best_score);

    match outer {
        OuterMethod::Random => {
            while !budget.exhausted(ev.evaluations()) {
                let candidate = state.current.random_set_all(registry, rng);
                let out = tune(inner, ev, registry, &candidate, settings, budget, rng)?;
                let Some(tuned) = out.best else { break };
                let accept = out.best_score > state.current_score;
                state.offer(tuned, out.best_score, accept);
            }
        }
        OuterMethod::Annealing => {
            let mut moves: Option<TemplateNeighbours<'_>> = None;
            for t in Schedule::new(&settings.annealing) {
                if budget.exhausted(ev.evaluations()) {
                    break;
                }
                // FRESH NEIGHBOURHOOD AFTER EVERY ACCEPTED MOVE OR WHEN USED UP
                let next = match moves.as_mut().and_then(Iterator::next) {
                    Some(c) => Some(c),
                    None => {
                        let mut fresh = state.current.neighbour_template(registry, rng);
                        let c = fresh.next();
                        moves = Some(fresh);
                        c
                    }
                };
                let Some(candidate) = next else {
                    log::debug!("OUTER ANNEALING: NO OTHER TEMPLATE TO TRY, STOPPING");
                    break;
                };
                let out = tune(inner, ev, registry, &candidate, settings, budget, rng)?;
                let Some(tuned) = out.best else { break };
                let p = acceptance_probability(state.current_score, out.best_score, t);
                let accept = p >= 1.0 || rng.gen::<f64>() < p;
                if accept {
                    moves = None;
                }
                state.offer(tuned, out.best_score, accept);
            }
        }
    }
    Ok(state.finish(ev.evaluations() - start))
}
