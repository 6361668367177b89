// ANTAGONIST EXPERIMENT PIPELINE TESTS
// JSON EXPERIMENT FILES -> REGISTRY -> SEARCH -> PROGRESS LOG + SUMMARY FILE
//
// THE HARNESS IS SCRIPTED: NO COMPILER, NO ROOT, NO SUT BINARY.

use std::path::Path;
use std::sync::atomic::AtomicBool;

use antagonist::enemy::EnemyConfiguration;
use antagonist::error::{ConfigError, HarnessError};
use antagonist::experiment::load_experiments;
use antagonist::harness::{Harness, SampleBatch};
use antagonist::progress::{Summary, HEADER};
use antagonist::search::Budget;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::json;

// CONSTANT LATENCY PER CONFIGURATION: 100 + SUM OF ALL PARAMETER VALUES
struct Synthetic {
    calls: usize,
    fail_at: Option<usize>,
}

impl Harness for Synthetic {
    fn run(&mut self, config: &EnemyConfiguration, n: usize) -> Result<SampleBatch, HarnessError> {
        self.calls += 1;
        if Some(self.calls) == self.fail_at {
            return Err(HarnessError::Interrupted);
        }
        let v = 100.0
            + config
                .assignments
                .iter()
                .flat_map(|a| a.params.values())
                .map(|v| v.as_f64())
                .sum::<f64>();
        Ok(SampleBatch { samples: vec![v; n], temperatures: vec![] })
    }
}

fn write_json(path: &Path, value: &serde_json::Value) {
    std::fs::write(path, serde_json::to_string_pretty(value).unwrap()).unwrap();
}

fn experiment(method: serde_json::Value, fixed: Option<&str>, tag: &str) -> serde_json::Value {
    let mut e = json!({
        "sut": "sut.out",
        "cores": 2,
        "templates": "templates/templates.json",
        "quantile": 0.9,
        "confidence_interval": 0.9,
        "max_confidence_variation": 5,
        "stopping": "fixed",
        "measurement_iterations_step": 10,
        "measurement_iterations_max": 10,
        "max_temperature": 80,
        "method": method,
        "log_file": format!("out/{}.tsv", tag),
        "max_file": format!("out/{}.json", tag),
        "max_evaluations": 8,
        "seed": 1
    });
    if let Some(t) = fixed {
        e["fixed_template"] = json!(t);
    }
    e
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("templates")).unwrap();
    write_json(
        &dir.path().join("templates/templates.json"),
        &json!({
            "cache": {
                "source": "cache.c",
                "DEFINES": {
                    "SIZE": { "type": "int", "range": [1, 64] },
                    "STRIDE": { "type": "int", "range": [1, 16] }
                }
            },
            "mem": { "source": "mem.c", "parameters": "mem_params.json" }
        }),
    );
    write_json(
        &dir.path().join("templates/mem_params.json"),
        &json!({ "DEFINES": { "RATIO": { "type": "float", "range": [0.0, 4.0] } } }),
    );
    dir
}

// === CONFIGURATION ===

#[test]
fn experiments_load_in_file_order() {
    let dir = workspace();
    let path = dir.path().join("experiments.json");
    write_json(
        &path,
        &json!({
            "zeta": experiment(json!("hill_climbing"), Some("cache"), "zeta"),
            "alpha": experiment(json!({ "outer": "annealing", "inner": "random" }), None, "alpha")
        }),
    );
    let exps = load_experiments(&path).unwrap();
    let names: Vec<&str> = exps.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["zeta", "alpha"]);

    let reg = exps[1].load_registry().unwrap();
    assert_eq!(reg.len(), 2);
    assert_eq!(reg.require("cache").unwrap().source, dir.path().join("templates/cache.c"));
    assert_eq!(reg.require("mem").unwrap().params.len(), 1);
}

#[test]
fn unknown_fixed_template_rejected() {
    let dir = workspace();
    let path = dir.path().join("experiments.json");
    write_json(&path, &json!({ "e": experiment(json!("random"), Some("branch"), "e") }));
    let exps = load_experiments(&path).unwrap();
    assert!(matches!(exps[0].load_registry(), Err(ConfigError::UnknownTemplate(t)) if t == "branch"));
}

#[test]
fn missing_field_aborts_whole_file() {
    let dir = workspace();
    let path = dir.path().join("experiments.json");
    let mut broken = experiment(json!("random"), Some("cache"), "b");
    broken.as_object_mut().unwrap().remove("log_file");
    write_json(
        &path,
        &json!({ "good": experiment(json!("random"), Some("cache"), "g"), "broken": broken }),
    );
    match load_experiments(&path) {
        Err(ConfigError::MissingField { experiment, field }) => {
            assert_eq!(experiment, "broken");
            assert_eq!(field, "log_file");
        }
        other => panic!("unexpected {:?}", other.map(|v| v.len())),
    }
}

#[test]
fn bad_parameter_schema_rejected() {
    let dir = workspace();
    write_json(
        &dir.path().join("templates/templates.json"),
        &json!({ "cache": { "source": "cache.c", "DEFINES": { "SIZE": { "type": "string", "range": [1, 2] } } } }),
    );
    let path = dir.path().join("experiments.json");
    write_json(&path, &json!({ "e": experiment(json!("random"), Some("cache"), "e") }));
    let exps = load_experiments(&path).unwrap();
    assert!(matches!(exps[0].load_registry(), Err(ConfigError::ParamType { .. })));
}

// === END TO END ===

#[test]
fn tune_writes_log_and_summary() {
    let dir = workspace();
    let path = dir.path().join("experiments.json");
    write_json(&path, &json!({ "cache2": experiment(json!("hill_climbing"), Some("cache"), "cache2") }));
    let exp = load_experiments(&path).unwrap().remove(0);
    let reg = exp.load_registry().unwrap();

    let stop = AtomicBool::new(false);
    let mut rng = StdRng::seed_from_u64(9);
    let (summary, log) = exp
        .tune(&reg, Synthetic { calls: 0, fail_at: None }, &mut rng, &exp.budget(&stop))
        .unwrap();

    assert_eq!(summary.experiment, "cache2");
    assert_eq!(summary.evaluations, 8);
    assert!(summary.success);
    assert_eq!(log.len(), 8);
    summary.best.validate(&reg).unwrap();
    assert!(summary.best.assignments.iter().all(|a| a.template == "cache"));

    let text = std::fs::read_to_string(dir.path().join("out/cache2.tsv")).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines[0], HEADER);
    assert_eq!(lines.len(), 9);
    assert!(lines[1].starts_with("1\t"));

    let back = Summary::load(&dir.path().join("out/cache2.json")).unwrap();
    assert_eq!(back, summary);
    let best_row = log.rows().iter().map(|r| r.best).fold(f64::MIN, f64::max);
    assert_eq!(back.best_score, best_row);
}

#[test]
fn bilevel_tune_explores_templates() {
    let dir = workspace();
    let path = dir.path().join("experiments.json");
    let mut e = experiment(json!({ "outer": "random", "inner": "random" }), None, "bi");
    e["max_evaluations"] = json!(12);
    e["inner_evaluations"] = json!(3);
    write_json(&path, &json!({ "bi": e }));
    let exp = load_experiments(&path).unwrap().remove(0);
    let reg = exp.load_registry().unwrap();

    let stop = AtomicBool::new(false);
    let mut rng = StdRng::seed_from_u64(10);
    let (summary, _) = exp
        .tune(&reg, Synthetic { calls: 0, fail_at: None }, &mut rng, &exp.budget(&stop))
        .unwrap();
    assert_eq!(summary.evaluations, 12);
    summary.best.validate(&reg).unwrap();
}

#[test]
fn interrupted_run_keeps_best_so_far() {
    let dir = workspace();
    let path = dir.path().join("experiments.json");
    write_json(&path, &json!({ "int": experiment(json!("annealing"), Some("cache"), "int") }));
    let exp = load_experiments(&path).unwrap().remove(0);
    let reg = exp.load_registry().unwrap();

    let stop = AtomicBool::new(false);
    let mut rng = StdRng::seed_from_u64(11);
    let (summary, log) = exp
        .tune(&reg, Synthetic { calls: 0, fail_at: Some(4) }, &mut rng, &Budget::default().with_shutdown(&stop))
        .unwrap();
    assert_eq!(summary.evaluations, 3);
    assert_eq!(log.len(), 3);
    assert!(dir.path().join("out/int.json").exists());
}

#[test]
fn harness_failure_is_an_error() {
    struct Broken;
    impl Harness for Broken {
        fn run(&mut self, _: &EnemyConfiguration, _: usize) -> Result<SampleBatch, HarnessError> {
            Err(HarnessError::NoMetric)
        }
    }
    let dir = workspace();
    let path = dir.path().join("experiments.json");
    write_json(&path, &json!({ "x": experiment(json!("random"), Some("mem"), "x") }));
    let exp = load_experiments(&path).unwrap().remove(0);
    let reg = exp.load_registry().unwrap();
    let stop = AtomicBool::new(false);
    let mut rng = StdRng::seed_from_u64(12);
    let err = exp.tune(&reg, Broken, &mut rng, &exp.budget(&stop)).unwrap_err();
    assert!(format!("{:#}", err).contains("no timing metric"));
    assert!(!dir.path().join("out/x.json").exists());
}
