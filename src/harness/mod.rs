// ANTAGONIST EXECUTION HARNESS
// RUNS THE SUT UNDER ONE ENEMY CONFIGURATION AND RETURNS RAW SAMPLES.
// TWO TRANSPORTS BEHIND ONE TRAIT:
//   LOCAL   COMPILE TEMPLATES, PIN ENEMIES, RUN THE SUT ON CORE 0
//   REMOTE  SHIP THE CONFIGURATION TO AN `antagonist serve` PEER
// THE HARNESS OWNS THERMAL RETRIES AND PROCESS CLEANUP. WHAT IT RETURNS IS
// AUTHORITATIVE FOR THE CALLER.

pub mod context;
pub mod local;
pub mod parse;
pub mod remote;
pub mod thermal;

use serde::{Deserialize, Serialize};

use crate::enemy::EnemyConfiguration;
use crate::error::HarnessError;

pub use local::{LocalHarness, LocalSettings};
pub use remote::RemoteHarness;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleBatch {
    pub samples: Vec<f64>,
    #[serde(default)]
    pub temperatures: Vec<f64>,
}

pub trait Harness {
    // EXACTLY `iterations` FRESH SAMPLES FOR `config`, OR AN ERROR
    fn run(&mut self, config: &EnemyConfiguration, iterations: usize) -> Result<SampleBatch, HarnessError>;
}

pub enum Backend {
    Local(LocalHarness),
    Remote(RemoteHarness),
}

impl Backend {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Local(_) => "LOCAL",
            Self::Remote(_) => "REMOTE",
        }
    }
}

impl Harness for Backend {
    fn run(&mut self, config: &EnemyConfiguration, iterations: usize) -> Result<SampleBatch, HarnessError> {
        match self {
            Self::Local(h) => h.run(config, iterations),
            Self::Remote(h) => h.run(config, iterations),
        }
    }
}

impl<H: Harness + ?Sized> Harness for Box<H> {
    fn run(&mut self, config: &EnemyConfiguration, iterations: usize) -> Result<SampleBatch, HarnessError> {
        (**self).run(config, iterations)
    }
}
