// ANTAGONIST EXPERIMENT DESCRIPTIONS
// ONE JSON FILE, TOP-LEVEL OBJECT: EXPERIMENT NAME -> FIELDS. FILE ORDER IS
// RUN ORDER. RELATIVE PATHS RESOLVE AGAINST THE FILE'S DIRECTORY.
//
// EVERY CONFIGURATION ERROR IS FATAL FOR THE WHOLE RUN AND NAMES THE
// EXPERIMENT AND THE OFFENDING FIELD.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::Rng;
use serde::Deserialize;

use crate::enemy::EnemyConfiguration;
use crate::error::{ConfigError, HarnessError};
use crate::harness::local::default_work_dir;
use crate::harness::remote::Hello;
use crate::harness::thermal::ThermalSensor;
use crate::harness::{Backend, Harness, LocalHarness, LocalSettings, RemoteHarness};
use crate::objective::ObjectiveFunction;
use crate::progress::{ProgressLog, Summary};
use crate::search::{self, AnnealSettings, BayesSettings, Budget, Evaluator, Method, SearchSettings};
use crate::stopping::{MeasurementPlan, StoppingPolicy};
use crate::template::TemplateRegistry;

const DEFAULT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_COMPILER: &str = "cc";

#[derive(Deserialize)]
struct RawExperiment {
    sut: Option<String>,
    cores: Option<usize>,
    templates: Option<PathBuf>,
    quantile: Option<f64>,
    confidence_interval: Option<f64>,
    max_confidence_variation: Option<f64>,
    stopping: Option<StoppingPolicy>,
    measurement_iterations_step: Option<usize>,
    measurement_iterations_max: Option<usize>,
    max_temperature: Option<f64>,
    method: Option<Method>,
    log_file: Option<PathBuf>,
    max_file: Option<PathBuf>,
    training_time: Option<f64>,
    max_evaluations: Option<usize>,
    fixed_template: Option<String>,
    #[serde(default)]
    shared_parameters: bool,
    inner_evaluations: Option<usize>,
    kappa: Option<f64>,
    init_points: Option<usize>,
    #[serde(default)]
    annealing: AnnealSettings,
    remote: Option<String>,
    governor: Option<String>,
    #[serde(default)]
    drop_caches: bool,
    cooldown_secs: Option<u64>,
    seed: Option<u64>,
    work_dir: Option<PathBuf>,
    compiler: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Experiment {
    pub name: String,
    // LOCAL PATH, OR THE PEER'S PATH WHEN `remote` IS SET
    pub sut: String,
    pub cores: usize,
    pub templates: PathBuf,
    pub plan: MeasurementPlan,
    pub max_temperature: f64,
    pub method: Method,
    pub log_file: PathBuf,
    pub max_file: PathBuf,
    pub training_time: Option<Duration>,
    pub max_evaluations: Option<usize>,
    pub fixed_template: Option<String>,
    pub shared_parameters: bool,
    pub search: SearchSettings,
    pub remote: Option<String>,
    pub governor: Option<String>,
    pub drop_caches: bool,
    pub cooldown: Duration,
    pub seed: Option<u64>,
    pub work_dir: PathBuf,
    pub compiler: String,
}

fn resolve(base: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        p
    } else {
        base.join(p)
    }
}

impl Experiment {
    pub fn from_value(name: &str, value: serde_json::Value, base: &Path) -> Result<Self, ConfigError> {
        let raw: RawExperiment = serde_json::from_value(value).map_err(|source| {
            ConfigError::Experiment { experiment: name.to_string(), source }
        })?;
        let missing = |field: &'static str| ConfigError::MissingField {
            experiment: name.to_string(),
            field,
        };
        let invalid = |reason: String| ConfigError::Invalid {
            experiment: name.to_string(),
            reason,
        };

        let sut = raw.sut.ok_or_else(|| missing("sut"))?;
        let cores = raw.cores.ok_or_else(|| missing("cores"))?;
        let templates = raw.templates.ok_or_else(|| missing("templates"))?;
        let quantile = raw.quantile.ok_or_else(|| missing("quantile"))?;
        let confidence = raw.confidence_interval.ok_or_else(|| missing("confidence_interval"))?;
        let max_variation = raw
            .max_confidence_variation
            .ok_or_else(|| missing("max_confidence_variation"))?;
        let policy = raw.stopping.ok_or_else(|| missing("stopping"))?;
        let step = raw
            .measurement_iterations_step
            .ok_or_else(|| missing("measurement_iterations_step"))?;
        let max = raw
            .measurement_iterations_max
            .ok_or_else(|| missing("measurement_iterations_max"))?;
        let max_temperature = raw.max_temperature.ok_or_else(|| missing("max_temperature"))?;
        let method = raw.method.ok_or_else(|| missing("method"))?;
        let log_file = raw.log_file.ok_or_else(|| missing("log_file"))?;
        let max_file = raw.max_file.ok_or_else(|| missing("max_file"))?;
        if raw.training_time.is_none() && raw.max_evaluations.is_none() {
            return Err(missing("training_time"));
        }

        if cores == 0 {
            return Err(invalid("cores must be at least 1".to_string()));
        }
        if !(quantile > 0.0 && quantile < 1.0) {
            return Err(invalid(format!("quantile {} outside (0, 1)", quantile)));
        }
        if !(confidence > 0.5 && confidence < 1.0) {
            return Err(invalid(format!("confidence_interval {} outside (0.5, 1)", confidence)));
        }
        if max_variation <= 0.0 || !max_variation.is_finite() {
            return Err(invalid(format!("max_confidence_variation {} must be positive", max_variation)));
        }
        if step == 0 || max < step {
            return Err(invalid(format!(
                "measurement_iterations_step {} / measurement_iterations_max {} must satisfy 0 < step <= max",
                step, max
            )));
        }
        let training_time = match raw.training_time {
            Some(m) if m > 0.0 && m.is_finite() => Some(Duration::from_secs_f64(m * 60.0)),
            Some(m) => return Err(invalid(format!("training_time {} must be positive", m))),
            None => None,
        };
        if raw.max_evaluations == Some(0) {
            return Err(invalid("max_evaluations must be positive".to_string()));
        }
        match (method.is_bilevel(), &raw.fixed_template) {
            (false, None) => {
                return Err(invalid(format!("method '{}' tunes parameters only and needs fixed_template", method)))
            }
            (true, Some(t)) => {
                return Err(invalid(format!("bilevel method '{}' searches templates; fixed_template '{}' contradicts it", method, t)))
            }
            _ => {}
        }
        if !raw.annealing.is_valid() {
            return Err(invalid(format!(
                "annealing needs initial_temperature > 1 and 0 < cooling_rate < 1, got {:?}",
                raw.annealing
            )));
        }
        let inner_evaluations = raw.inner_evaluations.unwrap_or(10);
        if inner_evaluations == 0 {
            return Err(invalid("inner_evaluations must be positive".to_string()));
        }

        let defaults = BayesSettings::default();
        let search = SearchSettings {
            annealing: raw.annealing,
            bayes: BayesSettings {
                kappa: raw.kappa.unwrap_or(defaults.kappa),
                init_points: raw.init_points.unwrap_or(defaults.init_points),
            },
            inner_evaluations,
        };

        // A REMOTE SUT PATH BELONGS TO THE PEER'S FILESYSTEM
        let sut = if raw.remote.is_some() {
            sut
        } else {
            resolve(base, PathBuf::from(sut)).display().to_string()
        };

        Ok(Self {
            name: name.to_string(),
            sut,
            cores,
            templates: resolve(base, templates),
            plan: MeasurementPlan {
                quantile,
                confidence,
                max_variation_pct: max_variation,
                step,
                max,
                policy,
            },
            max_temperature,
            method,
            log_file: resolve(base, log_file),
            max_file: resolve(base, max_file),
            training_time,
            max_evaluations: raw.max_evaluations,
            fixed_template: raw.fixed_template,
            shared_parameters: raw.shared_parameters,
            search,
            remote: raw.remote,
            governor: raw.governor,
            drop_caches: raw.drop_caches,
            cooldown: Duration::from_secs(raw.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS)),
            seed: raw.seed,
            work_dir: raw.work_dir.map_or_else(default_work_dir, |d| resolve(base, d)),
            compiler: raw.compiler.unwrap_or_else(|| DEFAULT_COMPILER.to_string()),
        })
    }

    pub fn load_registry(&self) -> Result<TemplateRegistry, ConfigError> {
        let registry = TemplateRegistry::load(&self.templates)?;
        if let Some(t) = &self.fixed_template {
            registry.require(t)?;
        }
        Ok(registry)
    }

    pub fn budget<'a>(&self, shutdown: &'a AtomicBool) -> Budget<'a> {
        Budget {
            max_evaluations: self.max_evaluations,
            deadline: self.training_time.map(|t| Instant::now() + t),
            shutdown: Some(shutdown),
        }
    }

    pub fn initial_configuration<R: Rng + ?Sized>(
        &self,
        registry: &TemplateRegistry,
        rng: &mut R,
    ) -> Result<EnemyConfiguration, ConfigError> {
        EnemyConfiguration::random(
            registry,
            self.cores,
            self.fixed_template.as_deref(),
            self.shared_parameters,
            rng,
        )
    }

    pub fn local_settings(&self) -> LocalSettings {
        LocalSettings {
            sut: PathBuf::from(&self.sut),
            compiler: self.compiler.clone(),
            work_dir: self.work_dir.join(&self.name),
            max_temperature: self.max_temperature,
            cooldown: self.cooldown,
            drop_caches: self.drop_caches,
            governor: self.governor.clone(),
            sensor: ThermalSensor::default(),
        }
    }

    pub fn hello(&self) -> Hello {
        Hello {
            sut: self.sut.clone(),
            max_temperature: self.max_temperature,
            cooldown_secs: self.cooldown.as_secs(),
            drop_caches: self.drop_caches,
            governor: self.governor.clone(),
        }
    }

    pub fn harness(
        &self,
        registry: &TemplateRegistry,
        shutdown: &'static AtomicBool,
    ) -> Result<Backend, HarnessError> {
        match &self.remote {
            Some(addr) => Ok(Backend::Remote(RemoteHarness::connect(addr.as_str(), self.hello())?)),
            None => Ok(Backend::Local(LocalHarness::new(
                self.local_settings(),
                registry.clone(),
                shutdown,
            )?)),
        }
    }

    // RUN THE CONFIGURED SEARCH, WRITE THE PROGRESS LOG AND THE SUMMARY FILE.
    // AN INTERRUPTED RUN STILL REPORTS THE BEST RESULT SEEN SO FAR.
    pub fn tune<H, R>(
        &self,
        registry: &TemplateRegistry,
        harness: H,
        rng: &mut R,
        budget: &Budget<'_>,
    ) -> Result<(Summary, ProgressLog)>
    where
        H: Harness,
        R: Rng + ?Sized,
    {
        let initial = self.initial_configuration(registry, rng)?;
        let log = ProgressLog::create(&self.log_file)?;
        let mut objective = ObjectiveFunction::new(harness, self.plan.clone(), log);

        let outcome = {
            let mut ev = Evaluator::new(&mut objective);
            search::run(self.method, &mut ev, registry, &initial, &self.search, budget, rng)
        };
        match outcome {
            Ok(out) => log::info!("{}: SEARCH FINISHED AFTER {} EVALUATIONS", self.name, out.evaluations),
            Err(e) if is_interrupt(&e) || budget.interrupted() => {
                log::warn!("{}: INTERRUPTED, KEEPING BEST SO FAR", self.name);
            }
            Err(e) => return Err(e.context(format!("experiment '{}'", self.name))),
        }

        let best = objective
            .best()
            .cloned()
            .with_context(|| format!("experiment '{}' finished without a single evaluation", self.name))?;
        let summary = Summary {
            experiment: self.name.clone(),
            best_score: best.score(),
            best: best.configuration.clone(),
            evaluations: objective.evaluations(),
            elapsed_s: objective.elapsed().as_secs_f64(),
            success: best.success,
        };
        summary.write(&self.max_file)?;
        Ok((summary, objective.into_log()))
    }
}

pub fn is_interrupt(e: &anyhow::Error) -> bool {
    e.chain().any(|c| matches!(c.downcast_ref::<HarnessError>(), Some(HarnessError::Interrupted)))
}

pub fn load_experiments(path: &Path) -> Result<Vec<Experiment>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    raw.into_iter()
        .map(|(name, value)| Experiment::from_value(&name, value, base))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base() -> serde_json::Value {
        json!({
            "sut": "bin/sut",
            "cores": 3,
            "templates": "templates.json",
            "quantile": 0.9,
            "confidence_interval": 0.95,
            "max_confidence_variation": 5,
            "stopping": "optimistic",
            "measurement_iterations_step": 10,
            "measurement_iterations_max": 100,
            "max_temperature": 70,
            "method": "hill_climbing",
            "fixed_template": "cache",
            "log_file": "out/log.tsv",
            "max_file": "out/max.json",
            "max_evaluations": 50
        })
    }

    #[test]
    fn parses_and_resolves_paths() {
        let e = Experiment::from_value("exp", base(), Path::new("/data")).unwrap();
        assert_eq!(e.templates, PathBuf::from("/data/templates.json"));
        assert_eq!(e.sut, "/data/bin/sut");
        assert_eq!(e.plan.policy, StoppingPolicy::Optimistic);
        assert_eq!(e.search.inner_evaluations, 10);
        assert_eq!(e.search.bayes.init_points, 5);
        assert_eq!(e.cooldown, Duration::from_secs(30));
        assert!(e.training_time.is_none());
    }

    #[test]
    fn missing_field_named() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("quantile");
        match Experiment::from_value("exp", v, Path::new(".")) {
            Err(ConfigError::MissingField { experiment, field }) => {
                assert_eq!(experiment, "exp");
                assert_eq!(field, "quantile");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn needs_a_budget() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("max_evaluations");
        assert!(matches!(
            Experiment::from_value("exp", v, Path::new(".")),
            Err(ConfigError::MissingField { field: "training_time", .. })
        ));
    }

    #[test]
    fn simple_method_requires_fixed_template() {
        let mut v = base();
        v.as_object_mut().unwrap().remove("fixed_template");
        assert!(matches!(
            Experiment::from_value("exp", v, Path::new(".")),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn bilevel_rejects_fixed_template() {
        let mut v = base();
        v["method"] = json!({ "outer": "random", "inner": "annealing" });
        assert!(matches!(
            Experiment::from_value("exp", v.clone(), Path::new(".")),
            Err(ConfigError::Invalid { .. })
        ));
        v.as_object_mut().unwrap().remove("fixed_template");
        let e = Experiment::from_value("exp", v, Path::new(".")).unwrap();
        assert!(e.method.is_bilevel());
    }

    #[test]
    fn bad_stopping_policy_rejected() {
        let mut v = base();
        v["stopping"] = json!("eventually");
        assert!(matches!(
            Experiment::from_value("exp", v, Path::new(".")),
            Err(ConfigError::Experiment { .. })
        ));
    }

    #[test]
    fn remote_sut_kept_verbatim() {
        let mut v = base();
        v["remote"] = json!("10.0.0.2:7878");
        let e = Experiment::from_value("exp", v, Path::new("/data")).unwrap();
        assert_eq!(e.sut, "bin/sut");
        assert_eq!(e.hello().sut, "bin/sut");
    }

    #[test]
    fn training_time_in_minutes() {
        let mut v = base();
        v["training_time"] = json!(2);
        let e = Experiment::from_value("exp", v, Path::new(".")).unwrap();
        assert_eq!(e.training_time, Some(Duration::from_secs(120)));
    }
}
