// ANTAGONIST ENEMY CONFIGURATION
// PER-CORE ASSIGNMENT OF { TEMPLATE, PARAMETERS }. CORE 0 BELONGS TO THE SUT,
// assignments[i] RUNS ON CORE i + 1.
//
// VALUE SEMANTICS: EVERY OPERATOR RETURNS A FRESH CONFIGURATION. NOTHING
// HANDED OUT IS EVER MUTATED IN PLACE.
//
// MOVE SETS FOR LOCAL SEARCH:
//   neighbour_define()    REDRAW ONE PARAMETER ON ONE CORE (ALL CORES IF SHARED)
//   neighbour_template()  LAZY SEQUENCE: EACH CORE (SHUFFLED) x EVERY OTHER TEMPLATE
// NEITHER EVER YIELDS A CONFIGURATION EQUAL TO ITS INPUT.

use std::fmt;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::template::{Params, Template, TemplateRegistry};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnemyAssignment {
    pub template: String,
    pub params: Params,
}

impl EnemyAssignment {
    pub fn random<R: Rng + ?Sized>(template: &Template, rng: &mut R) -> Self {
        Self {
            template: template.name.clone(),
            params: template.random_params(rng),
        }
    }
}

impl fmt::Display for EnemyAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.template)?;
        for (i, (k, v)) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, "}}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnemyConfiguration {
    pub assignments: Vec<EnemyAssignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_template: Option<String>,
    #[serde(default)]
    pub shared_params: bool,
}

impl EnemyConfiguration {
    // SUT ALONE, NO ENEMIES
    pub fn baseline() -> Self {
        Self::default()
    }

    pub fn cores(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_baseline(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn random<R: Rng + ?Sized>(
        registry: &TemplateRegistry,
        cores: usize,
        fixed_template: Option<&str>,
        shared_params: bool,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        if let Some(name) = fixed_template {
            registry.require(name)?;
        }
        let shell = Self {
            assignments: Vec::with_capacity(cores),
            fixed_template: fixed_template.map(str::to_string),
            shared_params,
        };
        Ok(shell.random_set_all_with(registry, cores, rng))
    }

    // TEMPLATES (UNLESS FIXED) AND PARAMETERS ALL REDRAWN
    pub fn random_set_all<R: Rng + ?Sized>(&self, registry: &TemplateRegistry, rng: &mut R) -> Self {
        self.random_set_all_with(registry, self.cores(), rng)
    }

    fn random_set_all_with<R: Rng + ?Sized>(
        &self,
        registry: &TemplateRegistry,
        cores: usize,
        rng: &mut R,
    ) -> Self {
        let fixed = self.fixed_template.as_deref().and_then(|n| registry.get(n));
        let assignments = if self.shared_params {
            // SHARED PARAMETERS IMPLY ONE TEMPLATE FOR EVERY CORE
            let template = fixed.unwrap_or_else(|| registry.choose(rng));
            let one = EnemyAssignment::random(template, rng);
            vec![one; cores]
        } else {
            (0..cores)
                .map(|_| {
                    let template = fixed.unwrap_or_else(|| registry.choose(rng));
                    EnemyAssignment::random(template, rng)
                })
                .collect()
        };
        Self {
            assignments,
            fixed_template: self.fixed_template.clone(),
            shared_params: self.shared_params,
        }
    }

    // SAME TEMPLATES, FRESH PARAMETERS
    pub fn random_params<R: Rng + ?Sized>(
        &self,
        registry: &TemplateRegistry,
        rng: &mut R,
    ) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        if self.shared_params {
            if let Some(first) = self.assignments.first() {
                let params = registry.require(&first.template)?.random_params(rng);
                for a in &mut next.assignments {
                    a.params = params.clone();
                }
            }
        } else {
            for a in &mut next.assignments {
                a.params = registry.require(&a.template)?.random_params(rng);
            }
        }
        Ok(next)
    }

    pub fn validate(&self, registry: &TemplateRegistry) -> Result<(), ConfigError> {
        if let Some(name) = &self.fixed_template {
            registry.require(name)?;
        }
        for a in &self.assignments {
            let template = registry.require(&a.template)?;
            template.check_params(&a.params)?;
            if let Some(fixed) = &self.fixed_template {
                if &a.template != fixed {
                    return Err(ConfigError::Invalid {
                        experiment: self.to_string(),
                        reason: format!("core runs '{}' but the template is fixed to '{}'", a.template, fixed),
                    });
                }
            }
        }
        if self.shared_params {
            if let Some(first) = self.assignments.first() {
                if self.assignments.iter().any(|a| a != first) {
                    return Err(ConfigError::Invalid {
                        experiment: self.to_string(),
                        reason: "shared parameters differ between cores".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    // REDRAW ONE MUTABLE PARAMETER. None WHEN NO CORE HAS A MUTABLE PARAMETER.
    pub fn neighbour_define<R: Rng + ?Sized>(
        &self,
        registry: &TemplateRegistry,
        rng: &mut R,
    ) -> Option<Self> {
        let candidates: Vec<usize> = if self.shared_params {
            self.assignments.first().map(|_| vec![0]).unwrap_or_default()
        } else {
            (0..self.cores()).collect()
        };
        let mutable: Vec<(usize, &Template)> = candidates
            .into_iter()
            .filter_map(|i| {
                let t = registry.get(&self.assignments[i].template)?;
                t.is_mutable().then_some((i, t))
            })
            .collect();
        let &(core, template) = mutable.choose(rng)?;

        let specs: Vec<_> = template.params.iter().filter(|p| p.is_mutable()).collect();
        let spec = specs.choose(rng)?;
        let current = self.assignments[core].params.get(&spec.name).copied()?;
        let value = spec.redraw(current, rng)?;

        let mut next = self.clone();
        if self.shared_params {
            for a in &mut next.assignments {
                a.params.insert(spec.name.clone(), value);
            }
        } else {
            next.assignments[core].params.insert(spec.name.clone(), value);
        }
        Some(next)
    }

    // RESTARTABLE: EVERY CALL BUILDS A FRESH SEQUENCE WITH ITS OWN SHUFFLE
    pub fn neighbour_template<'a, R: Rng + ?Sized>(
        &self,
        registry: &'a TemplateRegistry,
        rng: &mut R,
    ) -> TemplateNeighbours<'a> {
        let mut order: Vec<usize> = if self.fixed_template.is_some() || registry.len() < 2 {
            Vec::new()
        } else if self.shared_params {
            self.assignments.first().map(|_| vec![0]).unwrap_or_default()
        } else {
            (0..self.cores()).collect()
        };
        order.shuffle(rng);
        TemplateNeighbours {
            base: self.clone(),
            registry,
            rng: StdRng::seed_from_u64(rng.gen()),
            order,
            core_pos: 0,
            offset: 1,
        }
    }
}

// CANONICAL KEY: "1:cache{N=3} 2:mem{SIZE=0.5}". STABLE ACROSS RUNS.
impl fmt::Display for EnemyConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.assignments.is_empty() {
            return write!(f, "baseline");
        }
        for (i, a) in self.assignments.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}:{}", i + 1, a)?;
        }
        Ok(())
    }
}

pub struct TemplateNeighbours<'a> {
    base: EnemyConfiguration,
    registry: &'a TemplateRegistry,
    rng: StdRng,
    order: Vec<usize>,
    core_pos: usize,
    offset: usize,
}

impl Iterator for TemplateNeighbours<'_> {
    type Item = EnemyConfiguration;

    fn next(&mut self) -> Option<EnemyConfiguration> {
        let n = self.registry.len();
        while self.core_pos < self.order.len() {
            if self.offset >= n {
                self.core_pos += 1;
                self.offset = 1;
                continue;
            }
            let core = self.order[self.core_pos];
            let offset = self.offset;
            self.offset += 1;

            let current = &self.base.assignments[core].template;
            let Some(idx) = self.registry.index_of(current) else {
                // UNKNOWN TEMPLATE: NOTHING TO CYCLE FROM
                self.core_pos += 1;
                self.offset = 1;
                continue;
            };
            let template = self.registry.at(idx + offset);
            let fresh = EnemyAssignment::random(template, &mut self.rng);

            let mut next = self.base.clone();
            if self.base.shared_params {
                for a in &mut next.assignments {
                    *a = fresh.clone();
                }
            } else {
                next.assignments[core] = fresh;
            }
            return Some(next);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{ParamKind, ParamSpec};
    use std::path::PathBuf;

    fn registry() -> TemplateRegistry {
        let t = |name: &str| Template {
            name: name.into(),
            source: PathBuf::from(format!("{}.c", name)),
            params: vec![
                ParamSpec { name: "N".into(), kind: ParamKind::Int, lo: 0.0, hi: 100.0 },
                ParamSpec { name: "F".into(), kind: ParamKind::Float, lo: 0.0, hi: 1.0 },
            ],
        };
        TemplateRegistry::new(vec![t("cache"), t("mem"), t("bus")]).unwrap()
    }

    #[test]
    fn random_fills_every_core() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = EnemyConfiguration::random(&reg, 4, None, false, &mut rng).unwrap();
        assert_eq!(cfg.cores(), 4);
        cfg.validate(&reg).unwrap();
    }

    #[test]
    fn shared_params_replicated() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = EnemyConfiguration::random(&reg, 3, None, true, &mut rng).unwrap();
        assert!(cfg.assignments.iter().all(|a| *a == cfg.assignments[0]));
        let next = cfg.neighbour_define(&reg, &mut rng).unwrap();
        assert_ne!(next, cfg);
        assert!(next.assignments.iter().all(|a| *a == next.assignments[0]));
    }

    #[test]
    fn fixed_template_respected() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(9);
        let cfg = EnemyConfiguration::random(&reg, 3, Some("bus"), false, &mut rng).unwrap();
        assert!(cfg.assignments.iter().all(|a| a.template == "bus"));
        assert_eq!(cfg.neighbour_template(&reg, &mut rng).count(), 0);
        let again = cfg.random_set_all(&reg, &mut rng);
        assert!(again.assignments.iter().all(|a| a.template == "bus"));
    }

    #[test]
    fn unknown_fixed_template_rejected() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(9);
        let r = EnemyConfiguration::random(&reg, 2, Some("nope"), false, &mut rng);
        assert!(matches!(r, Err(ConfigError::UnknownTemplate(_))));
    }

    #[test]
    fn neighbour_define_touches_one_core() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(11);
        let cfg = EnemyConfiguration::random(&reg, 3, None, false, &mut rng).unwrap();
        for _ in 0..100 {
            let next = cfg.neighbour_define(&reg, &mut rng).unwrap();
            let changed = cfg.assignments.iter().zip(&next.assignments).filter(|(a, b)| a != b).count();
            assert_eq!(changed, 1);
        }
    }

    #[test]
    fn neighbour_template_yields_other_templates() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(5);
        let cfg = EnemyConfiguration::random(&reg, 2, None, false, &mut rng).unwrap();
        let all: Vec<_> = cfg.neighbour_template(&reg, &mut rng).collect();
        assert_eq!(all.len(), 2 * (reg.len() - 1));
        for n in &all {
            assert_ne!(*n, cfg);
        }
    }

    #[test]
    fn canonical_key() {
        let mut params = Params::new();
        params.insert("N".into(), crate::template::ParamValue::Int(3));
        let cfg = EnemyConfiguration {
            assignments: vec![EnemyAssignment { template: "cache".into(), params }],
            fixed_template: None,
            shared_params: false,
        };
        assert_eq!(cfg.to_string(), "1:cache{N=3}");
        assert_eq!(EnemyConfiguration::baseline().to_string(), "baseline");
    }
}
