// ANTAGONIST SEARCH ENGINE TESTS
// NEIGHBOURHOODS, BUDGETS, ACCEPTANCE INVARIANTS FOR EVERY STRATEGY
//
// THE OBJECTIVE IS A PLAIN CLOSURE OVER THE CONFIGURATION: NO HARNESS.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Instant;

use antagonist::enemy::EnemyConfiguration;
use antagonist::search::{
    self, AnnealSettings, Budget, Evaluator, InnerMethod, Method, OuterMethod, SearchSettings,
};
use antagonist::template::{ParamKind, ParamSpec, Template, TemplateRegistry};

use rand::rngs::StdRng;
use rand::SeedableRng;

fn template(name: &str, params: &[(&str, ParamKind, f64, f64)]) -> Template {
    Template {
        name: name.to_string(),
        source: PathBuf::from(format!("{}.c", name)),
        params: params
            .iter()
            .map(|&(p, kind, lo, hi)| ParamSpec { name: p.to_string(), kind, lo, hi })
            .collect(),
    }
}

fn registry() -> TemplateRegistry {
    TemplateRegistry::new(vec![
        template("cache", &[("SIZE", ParamKind::Int, 1.0, 64.0), ("STRIDE", ParamKind::Int, 1.0, 8.0)]),
        template("bus", &[("RATE", ParamKind::Float, 0.0, 1.0)]),
        template("mem", &[("PAGES", ParamKind::Int, 1.0, 512.0)]),
        template("branch", &[("DEPTH", ParamKind::Int, 2.0, 10.0)]),
    ])
    .unwrap()
}

// HIGHER PARAMETER VALUES INTERFERE MORE; mem IS THE WORST TEMPLATE
fn interference(c: &EnemyConfiguration) -> f64 {
    c.assignments
        .iter()
        .map(|a| {
            let weight = if a.template == "mem" { 3.0 } else { 1.0 };
            weight * (1.0 + a.params.values().map(|v| v.as_f64()).sum::<f64>())
        })
        .sum()
}

// === NEIGHBOURHOODS ===

#[test]
fn neighbour_define_never_returns_its_input() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(11);
    for shared in [false, true] {
        let mut cfg = EnemyConfiguration::random(&reg, 3, None, shared, &mut rng).unwrap();
        for _ in 0..200 {
            let next = cfg.neighbour_define(&reg, &mut rng).unwrap();
            assert_ne!(next, cfg);
            next.validate(&reg).unwrap();
            cfg = next;
        }
    }
}

#[test]
fn neighbour_template_cycles_every_template_once_per_core() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(12);
    let cfg = EnemyConfiguration::random(&reg, 2, None, false, &mut rng).unwrap();

    let neighbours: Vec<EnemyConfiguration> = cfg.neighbour_template(&reg, &mut rng).collect();
    assert_eq!(neighbours.len(), 2 * (reg.len() - 1));
    for core in 0..2 {
        let seen: BTreeSet<String> = neighbours
            .iter()
            .filter(|n| n.assignments[core].template != cfg.assignments[core].template)
            .map(|n| n.assignments[core].template.clone())
            .collect();
        assert_eq!(seen.len(), reg.len() - 1);
        assert!(!seen.contains(&cfg.assignments[core].template));
    }
    for n in &neighbours {
        assert_ne!(n, &cfg);
        // EXACTLY ONE CORE CHANGED
        let changed = (0..2).filter(|&i| n.assignments[i] != cfg.assignments[i]).count();
        assert_eq!(changed, 1);
    }
}

#[test]
fn neighbour_template_is_restartable() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(13);
    let cfg = EnemyConfiguration::random(&reg, 3, None, false, &mut rng).unwrap();
    let first = cfg.neighbour_template(&reg, &mut rng).count();
    let second = cfg.neighbour_template(&reg, &mut rng).count();
    assert_eq!(first, second);
    assert_eq!(first, 3 * (reg.len() - 1));
}

#[test]
fn fixed_template_has_no_template_neighbours() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(14);
    let cfg = EnemyConfiguration::random(&reg, 3, Some("cache"), false, &mut rng).unwrap();
    assert_eq!(cfg.neighbour_template(&reg, &mut rng).count(), 0);
    assert!(cfg.assignments.iter().all(|a| a.template == "cache"));
}

#[test]
fn shared_template_moves_every_core_together() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(15);
    let cfg = EnemyConfiguration::random(&reg, 3, None, true, &mut rng).unwrap();
    for n in cfg.neighbour_template(&reg, &mut rng) {
        let first = &n.assignments[0];
        assert!(n.assignments.iter().all(|a| a == first));
        assert_ne!(first.template, cfg.assignments[0].template);
    }
}

// === HILL CLIMBING ===

#[test]
fn hill_climb_two_cores_ten_evaluations() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(21);
    let initial = EnemyConfiguration::random(&reg, 2, Some("cache"), false, &mut rng).unwrap();
    let initial_score = interference(&initial);

    let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> { Ok(interference(c)) };
    let mut ev = Evaluator::new(&mut objective);
    let out = search::run(
        Method::Simple(InnerMethod::HillClimbing),
        &mut ev,
        &reg,
        &initial,
        &SearchSettings::default(),
        &Budget::evaluations(10),
        &mut rng,
    )
    .unwrap();

    assert_eq!(ev.evaluations(), 10);
    assert_eq!(out.evaluations, 10);
    assert!(out.best_score >= initial_score);
    assert_eq!(out.steps.len(), 10);
}

#[test]
fn hill_climb_never_accepts_worse() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(22);
    let initial = EnemyConfiguration::random(&reg, 3, Some("mem"), false, &mut rng).unwrap();
    let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> { Ok(interference(c)) };
    let mut ev = Evaluator::new(&mut objective);
    let out = search::run_inner(
        InnerMethod::HillClimbing,
        &mut ev,
        &reg,
        &initial,
        &SearchSettings::default(),
        &Budget::evaluations(60),
        &mut rng,
    )
    .unwrap();

    let mut current = out.steps[0].current;
    for s in &out.steps[1..] {
        if s.accepted {
            assert!(s.candidate >= current);
        }
        assert!(s.current >= current);
        current = s.current;
    }
}

// === ANNEALING ===

#[test]
fn annealing_best_is_monotone() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(31);
    let initial = EnemyConfiguration::random(&reg, 3, Some("cache"), false, &mut rng).unwrap();
    // NOISY OBJECTIVE SO THE CURRENT SCORE REGRESSES NOW AND THEN
    let mut noise = StdRng::seed_from_u64(32);
    let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> {
        use rand::Rng;
        Ok(interference(c) * noise.gen_range(0.5..1.5))
    };
    let mut ev = Evaluator::new(&mut objective);
    let out = search::run_inner(
        InnerMethod::Annealing,
        &mut ev,
        &reg,
        &initial,
        &SearchSettings::default(),
        &Budget::default(),
        &mut rng,
    )
    .unwrap();

    // DEFAULT SCHEDULE: 44 PROPOSALS AFTER THE INITIAL EVALUATION
    assert_eq!(out.evaluations, 45);
    assert!(out.steps.windows(2).all(|w| w[1].best >= w[0].best));
    let max_candidate = out.steps.iter().map(|s| s.candidate).fold(f64::MIN, f64::max);
    assert_eq!(out.best_score, max_candidate);
}

#[test]
fn annealing_respects_evaluation_cap() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(33);
    let initial = EnemyConfiguration::random(&reg, 2, Some("bus"), false, &mut rng).unwrap();
    let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> { Ok(interference(c)) };
    let mut ev = Evaluator::new(&mut objective);
    let settings = SearchSettings {
        annealing: AnnealSettings { initial_temperature: 1000.0, cooling_rate: 0.99 },
        ..SearchSettings::default()
    };
    search::run_inner(InnerMethod::Annealing, &mut ev, &reg, &initial, &settings, &Budget::evaluations(7), &mut rng)
        .unwrap();
    assert_eq!(ev.evaluations(), 7);
}

// === RANDOM AND BAYESIAN ===

#[test]
fn random_search_keeps_templates() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(41);
    let initial = EnemyConfiguration::random(&reg, 3, Some("branch"), false, &mut rng).unwrap();
    let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> {
        assert!(c.assignments.iter().all(|a| a.template == "branch"));
        Ok(interference(c))
    };
    let mut ev = Evaluator::new(&mut objective);
    let out = search::run(
        Method::Simple(InnerMethod::Random),
        &mut ev,
        &reg,
        &initial,
        &SearchSettings::default(),
        &Budget::evaluations(15),
        &mut rng,
    )
    .unwrap();
    assert_eq!(out.evaluations, 15);
    out.best.unwrap().validate(&reg).unwrap();
}

#[test]
fn bayesian_stays_in_bounds_and_improves() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(51);
    let initial = EnemyConfiguration::random(&reg, 2, Some("cache"), false, &mut rng).unwrap();
    let initial_score = interference(&initial);
    let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> {
        c.validate(&registry()).unwrap();
        Ok(interference(c))
    };
    let mut ev = Evaluator::new(&mut objective);
    let out = search::run(
        Method::Simple(InnerMethod::Bayesian),
        &mut ev,
        &reg,
        &initial,
        &SearchSettings::default(),
        &Budget::evaluations(20),
        &mut rng,
    )
    .unwrap();
    assert_eq!(ev.evaluations(), 20);
    assert!(out.best_score >= initial_score);
}

// === BILEVEL ===

#[test]
fn bilevel_shares_one_budget() {
    let reg = registry();
    for outer in [OuterMethod::Random, OuterMethod::Annealing] {
        let mut rng = StdRng::seed_from_u64(61);
        let initial = EnemyConfiguration::random(&reg, 2, None, false, &mut rng).unwrap();
        let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> { Ok(interference(c)) };
        let mut ev = Evaluator::new(&mut objective);
        let settings = SearchSettings { inner_evaluations: 4, ..SearchSettings::default() };
        let out = search::run(
            Method::Bilevel { outer, inner: InnerMethod::HillClimbing },
            &mut ev,
            &reg,
            &initial,
            &settings,
            &Budget::evaluations(30),
            &mut rng,
        )
        .unwrap();
        assert_eq!(ev.evaluations(), 30, "{:?}", outer);
        assert!(out.best_score >= interference(&initial));
        out.best.unwrap().validate(&reg).unwrap();
    }
}

#[test]
fn objective_error_propagates() {
    let reg = registry();
    let mut rng = StdRng::seed_from_u64(71);
    let initial = EnemyConfiguration::random(&reg, 1, Some("cache"), false, &mut rng).unwrap();
    let mut calls = 0;
    let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> {
        calls += 1;
        if calls == 3 {
            anyhow::bail!("harness exploded");
        }
        Ok(interference(c))
    };
    let mut ev = Evaluator::new(&mut objective);
    let r = search::run_inner(
        InnerMethod::HillClimbing,
        &mut ev,
        &reg,
        &initial,
        &SearchSettings::default(),
        &Budget::evaluations(10),
        &mut rng,
    );
    assert!(r.is_err());
    assert_eq!(ev.evaluations(), 3);
}

// === BUDGET ===

#[test]
fn expired_deadline_spends_nothing() {
    let reg = registry();
    let methods = [
        Method::Simple(InnerMethod::Random),
        Method::Simple(InnerMethod::HillClimbing),
        Method::Simple(InnerMethod::Annealing),
        Method::Simple(InnerMethod::Bayesian),
        Method::Bilevel { outer: OuterMethod::Random, inner: InnerMethod::Random },
        Method::Bilevel { outer: OuterMethod::Annealing, inner: InnerMethod::HillClimbing },
    ];
    for method in methods {
        let mut rng = StdRng::seed_from_u64(81);
        let initial = EnemyConfiguration::random(&reg, 2, None, false, &mut rng).unwrap();
        let mut objective = |c: &EnemyConfiguration| -> anyhow::Result<f64> { Ok(interference(c)) };
        let mut ev = Evaluator::new(&mut objective);
        let out = search::run(
            method,
            &mut ev,
            &reg,
            &initial,
            &SearchSettings::default(),
            &Budget::until(Instant::now()),
            &mut rng,
        )
        .unwrap();
        assert_eq!(ev.evaluations(), 0, "{}", method);
        assert_eq!(out.evaluations, 0);
        assert!(out.best.is_none());
        assert!(out.steps.is_empty());
    }
}
