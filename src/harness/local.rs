// LOCAL HARNESS
// PER CONFIGURATION: COMPILE EVERY CORE'S TEMPLATE WITH -D DEFINES, START THE
// ENEMIES PINNED TO CORES 1..N, THEN RUN THE SUT ON CORE 0 AT NICE -20 UNTIL
// ENOUGH SAMPLES ARE COLLECTED. ENEMIES ARE STOPPED BETWEEN BATCHES.
//
// THERMAL LADDER (PER CONFIGURATION, CARRIED ACROSS ITS BATCHES):
//   BEFORE EACH SUT RUN: WAIT UNTIL TEMP < max_temperature - delta.
//   AFTER EACH SUT RUN:  TEMP >= max_temperature DISCARDS THE SAMPLE AND
//                        WIDENS delta BY 5. delta > 25 IS A HARNESS FAILURE.
// NO SENSOR: FIXED COOL-DOWN SLEEP BEFORE EACH RUN, NO TEMPERATURES RECORDED.

use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::enemy::EnemyConfiguration;
use crate::error::HarnessError;
use crate::template::TemplateRegistry;

use super::context::{pin_to_core, EnemyBinary, ExecutionContext};
use super::parse::MetricParser;
use super::thermal::{ThermalMargin, ThermalSensor};
use super::{Harness, SampleBatch};

const COOL_POLL: Duration = Duration::from_secs(5);
const SUT_CORE: usize = 0;
const SUT_NICE: i32 = -20;
const CPU_SYSFS: &str = "/sys/devices/system/cpu";
const DROP_CACHES: &str = "/proc/sys/vm/drop_caches";

#[derive(Clone, Debug)]
pub struct LocalSettings {
    pub sut: PathBuf,
    pub compiler: String,
    pub work_dir: PathBuf,
    pub max_temperature: f64,
    pub cooldown: Duration,
    pub drop_caches: bool,
    pub governor: Option<String>,
    pub sensor: ThermalSensor,
}

pub struct LocalHarness {
    settings: LocalSettings,
    registry: TemplateRegistry,
    parser: MetricParser,
    shutdown: &'static AtomicBool,
    // LAST COMPILED CONFIGURATION, REUSED ACROSS BATCHES OF THE SAME EVALUATION
    current: Option<(String, ExecutionContext)>,
    margin: ThermalMargin,
    governor_set: bool,
}

impl LocalHarness {
    pub fn new(
        settings: LocalSettings,
        registry: TemplateRegistry,
        shutdown: &'static AtomicBool,
    ) -> Result<Self, HarnessError> {
        let parser = MetricParser::new()
            .map_err(|e| HarnessError::Protocol(format!("metric pattern: {}", e)))?;
        std::fs::create_dir_all(&settings.work_dir)?;
        Ok(Self {
            settings,
            registry,
            parser,
            shutdown,
            current: None,
            margin: ThermalMargin::new(),
            governor_set: false,
        })
    }

    pub fn settings(&self) -> &LocalSettings {
        &self.settings
    }

    fn check_shutdown(&self) -> Result<(), HarnessError> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(HarnessError::Interrupted);
        }
        Ok(())
    }

    // WRITE THE GOVERNOR TO EVERY cpuN/cpufreq/scaling_governor ONCE
    fn apply_governor(&mut self) {
        if self.governor_set {
            return;
        }
        self.governor_set = true;
        let Some(governor) = self.settings.governor.clone() else {
            return;
        };
        let entries = match std::fs::read_dir(CPU_SYSFS) {
            Ok(e) => e,
            Err(e) => {
                log::warn!("CANNOT LIST {}: {}", CPU_SYSFS, e);
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_cpu = name.strip_prefix("cpu")
                .map(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
                .unwrap_or(false);
            if !is_cpu {
                continue;
            }
            let path = entry.path().join("cpufreq/scaling_governor");
            if let Err(e) = std::fs::write(&path, &governor) {
                log::warn!("GOVERNOR {} -> {}: {}", path.display(), governor, e);
            }
        }
        log::info!("CPUFREQ GOVERNOR: {}", governor);
    }

    fn compile(&self, config: &EnemyConfiguration) -> Result<ExecutionContext, HarnessError> {
        let mut binaries = Vec::with_capacity(config.cores());
        for (i, assignment) in config.assignments.iter().enumerate() {
            let core = i + 1;
            let template = self.registry.get(&assignment.template).ok_or_else(|| {
                HarnessError::Compile {
                    template: assignment.template.clone(),
                    core,
                    detail: "unknown template".to_string(),
                }
            })?;
            let out = self.settings.work_dir.join(format!("{}_enemy.out", core));
            let output = Command::new(&self.settings.compiler)
                .args(["-std=gnu11", "-Wall", "-Wno-unused-variable"])
                .args(assignment.params.iter().map(|(k, v)| format!("-D{}={}", k, v)))
                .arg(&template.source)
                .arg("-lm")
                .arg("-o")
                .arg(&out)
                .output()
                .map_err(|source| HarnessError::Spawn {
                    what: self.settings.compiler.clone(),
                    source,
                })?;
            if !output.status.success() {
                return Err(HarnessError::Compile {
                    template: assignment.template.clone(),
                    core,
                    detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            log::debug!("COMPILED {} FOR CORE {} -> {}", template.name, core, out.display());
            binaries.push(EnemyBinary { core, path: out });
        }
        Ok(ExecutionContext::new(binaries))
    }

    // COMPILE ONLY WHEN THE CONFIGURATION CHANGED SINCE THE LAST BATCH
    fn prepare(&mut self, config: &EnemyConfiguration) -> Result<(), HarnessError> {
        let key = config.to_string();
        if matches!(&self.current, Some((k, _)) if *k == key) {
            return Ok(());
        }
        // OLD BINARIES SHARE FILE NAMES WITH THE NEW ONES: RELEASE FIRST
        self.current = None;
        self.margin = ThermalMargin::new();
        let ctx = self.compile(config)?;
        self.current = Some((key, ctx));
        Ok(())
    }

    fn context(&mut self) -> Result<&mut ExecutionContext, HarnessError> {
        self.current
            .as_mut()
            .map(|(_, ctx)| ctx)
            .ok_or_else(|| HarnessError::Protocol("no compiled configuration".to_string()))
    }

    // BLOCK UNTIL THE CHIP IS BELOW `threshold`. HOT ENEMIES ARE STOPPED WHILE
    // WAITING AND RESTARTED AFTERWARDS.
    fn cool_down(&mut self, threshold: f64) -> Result<(), HarnessError> {
        let Some(mut temp) = self.settings.sensor.read() else {
            log::debug!("NO THERMAL SENSOR: SLEEPING {:?}", self.settings.cooldown);
            std::thread::sleep(self.settings.cooldown);
            return Ok(());
        };
        let mut stopped = false;
        while temp > threshold {
            self.check_shutdown()?;
            log::info!("TEMPERATURE {:.1}C ABOVE {:.1}C: COOLING DOWN", temp, threshold);
            let ctx = self.context()?;
            if ctx.is_running() {
                ctx.stop();
                stopped = true;
            }
            std::thread::sleep(COOL_POLL);
            temp = match self.settings.sensor.read() {
                Some(t) => t,
                None => break,
            };
        }
        if stopped {
            self.context()?.start()?;
        }
        Ok(())
    }

    fn drop_page_cache(&self) {
        if !self.settings.drop_caches {
            return;
        }
        unsafe { libc::sync(); }
        if let Err(e) = std::fs::write(DROP_CACHES, "1") {
            log::warn!("DROP CACHES FAILED: {}", e);
        }
    }

    fn run_sut(&self) -> Result<f64, HarnessError> {
        let mut cmd = Command::new(&self.settings.sut);
        cmd.stdin(Stdio::null());
        pin_to_core(&mut cmd, SUT_CORE);
        unsafe {
            cmd.pre_exec(|| {
                // BEST EFFORT: NEEDS CAP_SYS_NICE
                libc::setpriority(libc::PRIO_PROCESS, 0, SUT_NICE);
                Ok(())
            });
        }
        let output = cmd.output().map_err(|source| HarnessError::Spawn {
            what: self.settings.sut.display().to_string(),
            source,
        })?;
        if !output.status.success() {
            log::warn!("SUT EXITED WITH {}", output.status);
        }
        self.parser.extract_metric(&String::from_utf8_lossy(&output.stdout))
    }
}

impl Harness for LocalHarness {
    fn run(&mut self, config: &EnemyConfiguration, iterations: usize) -> Result<SampleBatch, HarnessError> {
        self.check_shutdown()?;
        self.apply_governor();
        self.prepare(config)?;
        self.context()?.start()?;

        let result = self.collect(iterations);

        // ENEMIES NEVER OUTLIVE A BATCH
        if let Ok(ctx) = self.context() {
            ctx.stop();
        }
        result
    }
}

impl LocalHarness {
    fn collect(&mut self, iterations: usize) -> Result<SampleBatch, HarnessError> {
        let max = self.settings.max_temperature;
        let mut batch = SampleBatch::default();

        while batch.samples.len() < iterations {
            self.check_shutdown()?;
            self.cool_down(self.margin.threshold(max))?;
            self.drop_page_cache();

            let metric = self.run_sut()?;
            match self.settings.sensor.read() {
                Some(t) if t >= max => {
                    let delta = self.margin.widen()?;
                    log::warn!("RUN ENDED AT {:.1}C: DISCARDED, MARGIN NOW {:.0}C", t, delta);
                }
                Some(t) => {
                    batch.samples.push(metric);
                    batch.temperatures.push(t);
                }
                None => batch.samples.push(metric),
            }
        }
        Ok(batch)
    }
}

// DEFAULT BUILD DIRECTORY FOR ENEMY BINARIES
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("antagonist")
}

pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
