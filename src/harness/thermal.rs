// THERMAL SENSOR
// SYSFS REPORTS MILLIDEGREES CELSIUS. A MISSING OR UNPARSEABLE SENSOR IS NOT
// AN ERROR: CALLERS FALL BACK TO A FIXED COOL-DOWN SLEEP.

use std::path::{Path, PathBuf};

use crate::error::HarnessError;

pub const DEFAULT_SENSOR: &str = "/sys/class/thermal/thermal_zone0/temp";

// RETRY LADDER: EVERY HOT RUN WIDENS THE COOL-DOWN MARGIN BY DELTA_STEP
pub const DELTA_START: f64 = 5.0;
pub const DELTA_STEP: f64 = 5.0;
pub const DELTA_LIMIT: f64 = 25.0;

// COOL-DOWN MARGIN BELOW max_temperature. LIVES FOR ONE WHOLE MEASUREMENT OF
// ONE CONFIGURATION: NEVER NARROWS BETWEEN BATCHES.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThermalMargin {
    delta: f64,
}

impl ThermalMargin {
    pub fn new() -> Self {
        Self { delta: DELTA_START }
    }

    pub fn threshold(&self, max_temperature: f64) -> f64 {
        max_temperature - self.delta
    }

    // ONE HOT RUN. PAST DELTA_LIMIT THE CHIP CANNOT BE KEPT COOL ENOUGH.
    pub fn widen(&mut self) -> Result<f64, HarnessError> {
        self.delta += DELTA_STEP;
        if self.delta > DELTA_LIMIT {
            return Err(HarnessError::Thermal(DELTA_LIMIT));
        }
        Ok(self.delta)
    }
}

impl Default for ThermalMargin {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug)]
pub struct ThermalSensor {
    path: PathBuf,
}

impl ThermalSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> Option<f64> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        let milli: f64 = raw.trim().parse().ok()?;
        Some(milli / 1000.0)
    }
}

impl Default for ThermalSensor {
    fn default() -> Self {
        Self::new(DEFAULT_SENSOR)
    }
}
