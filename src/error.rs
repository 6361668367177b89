// ANTAGONIST ERROR TAXONOMY
// CONFIGURATION ERRORS ABORT THE RUN. INSTABILITY IS NOT AN ERROR (success=false).
// HARNESS ERRORS BELONG TO THE HARNESS. RANK KEY MISMATCH ABORTS AGGREGATION.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("empty sample series (nothing left after outlier filtering)")]
    Empty,
    #[error("quantile {0} must lie strictly between 0 and 1")]
    Quantile(f64),
    #[error("confidence {0} must lie strictly between 0.5 and 1")]
    Confidence(f64),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("experiment '{experiment}': {source}")]
    Experiment {
        experiment: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("experiment '{experiment}': missing required field '{field}'")]
    MissingField { experiment: String, field: &'static str },
    #[error("experiment '{experiment}': {reason}")]
    Invalid { experiment: String, reason: String },
    #[error("template '{template}': parameter '{param}' has unknown type '{kind}'")]
    ParamType { template: String, param: String, kind: String },
    #[error("template '{template}': parameter '{param}' has invalid range [{lo}, {hi}]")]
    ParamRange { template: String, param: String, lo: f64, hi: f64 },
    #[error("template '{0}': no DEFINES and no parameters file")]
    NoSchema(String),
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),
    #[error("template registry is empty")]
    EmptyRegistry,
    #[error("parameter '{param}' is not defined by template '{template}'")]
    UnknownParam { template: String, param: String },
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("no ranked lists given")]
    NoLists,
    #[error("candidate '{key}' from the reference list is missing in '{list}'")]
    MissingCandidate { key: String, list: String },
    #[error("candidate '{key}' in '{list}' is not in the reference list")]
    UnknownCandidate { key: String, list: String },
    #[error("candidate '{key}' appears twice in '{list}'")]
    DuplicateCandidate { key: String, list: String },
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("compiling {template} for core {core} failed: {detail}")]
    Compile { template: String, core: usize, detail: String },
    #[error("failed to start {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no timing metric found in SUT output")]
    NoMetric,
    #[error("SUT heats the processor by more than {0} degrees")]
    Thermal(f64),
    #[error("remote evaluator: {0}")]
    Protocol(String),
    #[error("interrupted")]
    Interrupted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
