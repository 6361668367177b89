// ANTAGONIST WORKLOAD TEMPLATE REGISTRY
// EACH TEMPLATE IS A PARAMETERIZED ENEMY SOURCE FILE PLUS A SCHEMA:
// PARAM NAME -> { type: int | float, range: [lo, hi] }
//
// REGISTRY FILE:
//   { "cache": { "source": "cache/template_cache.c",
//                "DEFINES": { "CACHE_SIZE": { "type": "int", "range": [1, 64] } } },
//     "mem":   { "source": "mem/template_mem.c", "parameters": "mem/parameters.json" } }
//
// RELATIVE PATHS RESOLVE AGAINST THE REGISTRY FILE'S DIRECTORY.
// TEMPLATE ORDER IS FILE ORDER. neighbour_template() CYCLES IN THAT ORDER.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// REDRAW ATTEMPTS FOR A FLOAT PARAMETER BEFORE GIVING UP ON A DISTINCT VALUE
const FLOAT_REDRAW_TRIES: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamKind {
    Int,
    Float,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
}

impl ParamValue {
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Float(v) => write!(f, "{}", v),
        }
    }
}

// ORDERED BY NAME: CANONICAL KEYS AND COMPILER DEFINES ARE STABLE
pub type Params = BTreeMap<String, ParamValue>;

#[derive(Clone, Debug, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub lo: f64,
    pub hi: f64,
}

impl ParamSpec {
    // INT: DISCRETE UNIFORM OVER [lo, hi). A DEGENERATE RANGE PINS TO lo.
    // FLOAT: CONTINUOUS UNIFORM OVER [lo, hi].
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self.kind {
            ParamKind::Int => {
                let (lo, hi) = (self.lo as i64, self.hi as i64);
                if hi > lo {
                    ParamValue::Int(rng.gen_range(lo..hi))
                } else {
                    ParamValue::Int(lo)
                }
            }
            ParamKind::Float => {
                if self.hi > self.lo {
                    ParamValue::Float(rng.gen_range(self.lo..=self.hi))
                } else {
                    ParamValue::Float(self.lo)
                }
            }
        }
    }

    // AT LEAST TWO DISTINCT VALUES CAN BE DRAWN
    pub fn is_mutable(&self) -> bool {
        match self.kind {
            ParamKind::Int => (self.hi as i64) - (self.lo as i64) >= 2,
            ParamKind::Float => self.hi > self.lo,
        }
    }

    // DRAW A VALUE DIFFERENT FROM `current`. None IF THE RANGE CANNOT PROVIDE ONE.
    pub fn redraw<R: Rng + ?Sized>(&self, current: ParamValue, rng: &mut R) -> Option<ParamValue> {
        if !self.is_mutable() {
            return None;
        }
        match self.kind {
            ParamKind::Int => {
                let (lo, hi) = (self.lo as i64, self.hi as i64);
                let cur = match current {
                    ParamValue::Int(v) => v,
                    ParamValue::Float(v) => v.round() as i64,
                };
                if cur < lo || cur >= hi {
                    return Some(ParamValue::Int(rng.gen_range(lo..hi)));
                }
                // SKIP OVER THE CURRENT VALUE
                let v = rng.gen_range(lo..hi - 1);
                Some(ParamValue::Int(if v >= cur { v + 1 } else { v }))
            }
            ParamKind::Float => {
                let cur = current.as_f64();
                (0..FLOAT_REDRAW_TRIES)
                    .map(|_| rng.gen_range(self.lo..=self.hi))
                    .find(|v| *v != cur)
                    .map(ParamValue::Float)
            }
        }
    }

    // CONTINUOUS SEARCH BOX. INT UPPER BOUND IS THE LARGEST DRAWABLE VALUE.
    pub fn bounds(&self) -> (f64, f64) {
        match self.kind {
            ParamKind::Int => {
                let (lo, hi) = (self.lo as i64, self.hi as i64);
                (lo as f64, (hi - 1).max(lo) as f64)
            }
            ParamKind::Float => (self.lo, self.hi),
        }
    }

    // MAP A CONTINUOUS SUGGESTION BACK INTO THE SCHEMA
    pub fn coerce(&self, x: f64) -> ParamValue {
        let (lo, hi) = self.bounds();
        let x = x.clamp(lo, hi);
        match self.kind {
            ParamKind::Int => ParamValue::Int(x.round() as i64),
            ParamKind::Float => ParamValue::Float(x),
        }
    }

    pub fn contains(&self, v: ParamValue) -> bool {
        match (self.kind, v) {
            (ParamKind::Int, ParamValue::Int(x)) => {
                let (lo, hi) = self.bounds();
                (x as f64) >= lo && (x as f64) <= hi
            }
            (ParamKind::Float, _) => {
                let x = v.as_f64();
                x >= self.lo && x <= self.hi
            }
            (ParamKind::Int, ParamValue::Float(_)) => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Template {
    pub name: String,
    pub source: PathBuf,
    pub params: Vec<ParamSpec>,
}

impl Template {
    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn random_params<R: Rng + ?Sized>(&self, rng: &mut R) -> Params {
        self.params
            .iter()
            .map(|p| (p.name.clone(), p.draw(rng)))
            .collect()
    }

    pub fn is_mutable(&self) -> bool {
        self.params.iter().any(ParamSpec::is_mutable)
    }

    // EVERY SCHEMA PARAM PRESENT, NOTHING EXTRA, EVERY VALUE IN RANGE
    pub fn check_params(&self, params: &Params) -> Result<(), ConfigError> {
        for name in params.keys() {
            if self.param(name).is_none() {
                return Err(ConfigError::UnknownParam {
                    template: self.name.clone(),
                    param: name.clone(),
                });
            }
        }
        for spec in &self.params {
            match params.get(&spec.name) {
                Some(v) if spec.contains(*v) => {}
                _ => {
                    return Err(ConfigError::ParamRange {
                        template: self.name.clone(),
                        param: spec.name.clone(),
                        lo: spec.lo,
                        hi: spec.hi,
                    })
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ON-DISK FORM
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct RawDefine {
    #[serde(rename = "type")]
    kind: String,
    range: [f64; 2],
}

#[derive(Deserialize)]
struct RawDefines {
    #[serde(rename = "DEFINES")]
    defines: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct RawTemplate {
    source: PathBuf,
    #[serde(rename = "DEFINES")]
    defines: Option<serde_json::Map<String, serde_json::Value>>,
    parameters: Option<PathBuf>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_schema(
    template: &str,
    defines: serde_json::Map<String, serde_json::Value>,
) -> Result<Vec<ParamSpec>, ConfigError> {
    let mut params = Vec::with_capacity(defines.len());
    for (name, value) in defines {
        let raw: RawDefine = serde_json::from_value(value).map_err(|e| ConfigError::ParamType {
            template: template.to_string(),
            param: name.clone(),
            kind: e.to_string(),
        })?;
        let kind = match raw.kind.as_str() {
            "int" => ParamKind::Int,
            "float" => ParamKind::Float,
            other => {
                return Err(ConfigError::ParamType {
                    template: template.to_string(),
                    param: name,
                    kind: other.to_string(),
                })
            }
        };
        let [lo, hi] = raw.range;
        let integral = kind == ParamKind::Float || (lo.fract() == 0.0 && hi.fract() == 0.0);
        if !lo.is_finite() || !hi.is_finite() || lo > hi || !integral {
            return Err(ConfigError::ParamRange {
                template: template.to_string(),
                param: name,
                lo,
                hi,
            });
        }
        params.push(ParamSpec { name, kind, lo, hi });
    }
    Ok(params)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
}

impl TemplateRegistry {
    pub fn new(templates: Vec<Template>) -> Result<Self, ConfigError> {
        if templates.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        Ok(Self { templates })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        let raw: serde_json::Map<String, serde_json::Value> = read_json(path)?;

        let mut templates = Vec::with_capacity(raw.len());
        for (name, value) in raw {
            let entry: RawTemplate = serde_json::from_value(value).map_err(|source| {
                ConfigError::Json { path: path.to_path_buf(), source }
            })?;
            let defines = match (entry.defines, entry.parameters) {
                (Some(d), _) => d,
                (None, Some(file)) => read_json::<RawDefines>(&base.join(file))?.defines,
                (None, None) => return Err(ConfigError::NoSchema(name)),
            };
            let params = parse_schema(&name, defines)?;
            log::debug!("TEMPLATE {}: {} PARAMS", name, params.len());
            templates.push(Template {
                source: base.join(entry.source),
                name,
                params,
            });
        }
        Self::new(templates)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn require(&self, name: &str) -> Result<&Template, ConfigError> {
        self.get(name)
            .ok_or_else(|| ConfigError::UnknownTemplate(name.to_string()))
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.templates.iter().position(|t| t.name == name)
    }

    pub fn at(&self, idx: usize) -> &Template {
        &self.templates[idx % self.templates.len()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> &Template {
        &self.templates[rng.gen_range(0..self.templates.len())]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn int(name: &str, lo: f64, hi: f64) -> ParamSpec {
        ParamSpec { name: name.into(), kind: ParamKind::Int, lo, hi }
    }

    #[test]
    fn int_draw_is_closed_open() {
        let spec = int("N", 3.0, 5.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            match spec.draw(&mut rng) {
                ParamValue::Int(v) => assert!(v == 3 || v == 4),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn redraw_never_repeats() {
        let spec = int("N", 0.0, 4.0);
        let mut rng = StdRng::seed_from_u64(1);
        for cur in 0..4 {
            for _ in 0..50 {
                let v = spec.redraw(ParamValue::Int(cur), &mut rng).unwrap();
                assert_ne!(v, ParamValue::Int(cur));
                assert!(spec.contains(v));
            }
        }
    }

    #[test]
    fn degenerate_range_is_immutable() {
        let spec = int("N", 2.0, 3.0);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(!spec.is_mutable());
        assert_eq!(spec.draw(&mut rng), ParamValue::Int(2));
        assert!(spec.redraw(ParamValue::Int(2), &mut rng).is_none());
    }

    #[test]
    fn coerce_rounds_and_clamps() {
        let spec = int("N", 0.0, 10.0);
        assert_eq!(spec.coerce(3.6), ParamValue::Int(4));
        assert_eq!(spec.coerce(42.0), ParamValue::Int(9));
        let f = ParamSpec { name: "F".into(), kind: ParamKind::Float, lo: 0.5, hi: 1.5 };
        assert_eq!(f.coerce(-1.0), ParamValue::Float(0.5));
    }

    #[test]
    fn schema_rejects_unknown_type() {
        let defines = serde_json::json!({ "X": { "type": "string", "range": [0, 1] } });
        let map = defines.as_object().unwrap().clone();
        assert!(matches!(parse_schema("t", map), Err(ConfigError::ParamType { .. })));
    }

    #[test]
    fn schema_rejects_inverted_range() {
        let defines = serde_json::json!({ "X": { "type": "int", "range": [5, 1] } });
        let map = defines.as_object().unwrap().clone();
        assert!(matches!(parse_schema("t", map), Err(ConfigError::ParamRange { .. })));
    }

    #[test]
    fn schema_keeps_file_order() {
        let defines = serde_json::json!({
            "ZETA": { "type": "int", "range": [0, 4] },
            "ALPHA": { "type": "float", "range": [0.0, 1.0] }
        });
        let map = defines.as_object().unwrap().clone();
        let params = parse_schema("t", map).unwrap();
        assert_eq!(params[0].name, "ZETA");
        assert_eq!(params[1].kind, ParamKind::Float);
    }

    #[test]
    fn check_params_flags_out_of_range() {
        let t = Template { name: "t".into(), source: PathBuf::from("t.c"), params: vec![int("N", 0.0, 4.0)] };
        let mut p = Params::new();
        p.insert("N".into(), ParamValue::Int(2));
        assert!(t.check_params(&p).is_ok());
        p.insert("N".into(), ParamValue::Int(4));
        assert!(t.check_params(&p).is_err());
        p.insert("N".into(), ParamValue::Int(1));
        p.insert("M".into(), ParamValue::Int(1));
        assert!(matches!(t.check_params(&p), Err(ConfigError::UnknownParam { .. })));
    }

    #[test]
    fn param_value_json_forms() {
        let v: ParamValue = serde_json::from_str("3").unwrap();
        assert_eq!(v, ParamValue::Int(3));
        let v: ParamValue = serde_json::from_str("0.25").unwrap();
        assert_eq!(v, ParamValue::Float(0.25));
    }
}
