// SUT OUTPUT PARSING
// THE TIMING METRIC IS THE NUMBER FOLLOWING THE FIRST KNOWN FIELD LABEL
// PRESENT IN STDOUT. A DECIMAL VALUE WINS (FIRST OCCURRENCE); OTHERWISE THE
// LAST INTEGER OCCURRENCE IS TAKEN. RUNS OF SPACES ARE COLLAPSED FIRST.

use regex::Regex;

use crate::error::HarnessError;

// PRIORITY ORDER
pub const METRIC_FIELDS: [&str; 5] = [
    "total time(us): ",
    "Total time (secs): ",
    "Max: ",
    "time(ns)=",
    "time(secs)= ",
];

pub struct MetricParser {
    spaces: Regex,
    fields: Vec<(Regex, Regex)>,
}

impl MetricParser {
    pub fn new() -> Result<Self, regex::Error> {
        let fields = METRIC_FIELDS
            .iter()
            .map(|f| {
                let label = regex::escape(f);
                Ok((
                    Regex::new(&format!(r"{}(\d+\.\d+)", label))?,
                    Regex::new(&format!(r"{}(\d+)", label))?,
                ))
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;
        Ok(Self {
            spaces: Regex::new(" +")?,
            fields,
        })
    }

    pub fn extract_field(&self, stdout: &str, idx: usize) -> Option<f64> {
        let text = self.spaces.replace_all(stdout, " ");
        let (float_re, int_re) = self.fields.get(idx)?;
        if let Some(c) = float_re.captures(&text) {
            return c[1].parse().ok();
        }
        int_re
            .captures_iter(&text)
            .last()
            .and_then(|c| c[1].parse().ok())
    }

    pub fn extract_metric(&self, stdout: &str) -> Result<f64, HarnessError> {
        (0..self.fields.len())
            .find_map(|i| self.extract_field(stdout, i))
            .ok_or(HarnessError::NoMetric)
    }
}
