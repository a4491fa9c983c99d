//! Scenario manifests: register-level test sequences described in TOML.
//!
//! A manifest names a variant (or describes a custom one) and lists steps
//! executed in order against a fresh accelerator. The runner stops at the
//! first failing expectation and reports it.
//!
//! # Example Manifest
//!
//! ```toml
//! [scenario]
//! name = "scalar_mac"
//! variant = "linear"
//!
//! [[step]]
//! op = "write"
//! register = "INPUTS[0]"
//! value = 0x10000
//!
//! [[step]]
//! op = "pulse"
//! start = true
//!
//! [[step]]
//! op = "tick"
//! count = 2
//!
//! [[step]]
//! op = "expect_status"
//! done = true
//! busy = false
//!
//! [[step]]
//! op = "expect_result"
//! value = 0x30000
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;

use crate::config::CustomVariant;
use crate::device::lanes::pack_lanes;
use crate::device::registers_spec::{control, status, CONTROL_ADDR};
use crate::device::{RegisterKind, VariantKind, VariantSpec};
use crate::emu::Accelerator;

/// A scenario file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioManifest {
    pub scenario: ScenarioInfo,
    #[serde(default)]
    pub custom: Option<CustomVariant>,
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// Scenario metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioInfo {
    pub name: String,
    #[serde(default)]
    pub variant: Option<VariantKind>,
    #[serde(default)]
    pub description: String,
}

/// Which operand vector a lane write targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaneTarget {
    Inputs,
    Weights,
}

fn one() -> u64 {
    1
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Bus write to a named register.
    Write { register: String, value: i64 },
    /// Pack signed lane values into the input or weight registers.
    WriteLanes { target: LaneTarget, values: Vec<i32> },
    /// Write CONTROL with the given pulse bits.
    Pulse {
        #[serde(default)]
        start: bool,
        #[serde(default)]
        reset: bool,
    },
    Tick {
        #[serde(default = "one")]
        count: u64,
    },
    /// Check STATUS bits; omitted bits are not checked.
    ExpectStatus {
        #[serde(default)]
        ready: Option<bool>,
        #[serde(default)]
        done: Option<bool>,
        #[serde(default)]
        busy: Option<bool>,
    },
    /// Check RESULT. Negative values are compared sign-extended.
    ExpectResult { value: i64 },
    /// Check the FSM state by name.
    ExpectState { state: String },
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Write { register, value } => {
                write!(f, "write {} = 0x{:X}", register, *value as u32)
            }
            Step::WriteLanes { target, values } => {
                write!(f, "write {:?} lanes {:?}", target, values)
            }
            Step::Pulse { start, reset } => write!(f, "pulse start={} reset={}", start, reset),
            Step::Tick { count } => write!(f, "tick x{}", count),
            Step::ExpectStatus { ready, done, busy } => {
                write!(f, "expect status ready={:?} done={:?} busy={:?}", ready, done, busy)
            }
            Step::ExpectResult { value } => write!(f, "expect result {}", value),
            Step::ExpectState { state } => write!(f, "expect state {}", state),
        }
    }
}

/// The first step whose expectation did not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub index: usize,
    pub step: String,
    pub message: String,
}

/// Result of running a scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    pub name: String,
    pub variant: String,
    pub steps_run: usize,
    pub ticks: u64,
    pub failure: Option<StepFailure>,
}

impl ScenarioReport {
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

impl fmt::Display for ScenarioReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(
                f,
                "PASS {} [{}] ({} steps, {} ticks)",
                self.name, self.variant, self.steps_run, self.ticks
            ),
            Some(fail) => write!(
                f,
                "FAIL {} [{}] step {} ({}): {}",
                self.name, self.variant, fail.index, fail.step, fail.message
            ),
        }
    }
}

fn check_bit(name: &str, expected: Option<bool>, value: u32, bit: u32) -> Option<String> {
    let actual = value & bit != 0;
    match expected {
        Some(want) if want != actual => {
            Some(format!("{} is {}, expected {}", name, actual as u8, want as u8))
        }
        _ => None,
    }
}

impl ScenarioManifest {
    /// Load a manifest from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse manifest {}", path.display()))
    }

    /// Parse a manifest from TOML text.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// The accelerator this scenario runs against.
    pub fn variant_spec(&self) -> anyhow::Result<VariantSpec> {
        match (&self.custom, self.scenario.variant) {
            (Some(custom), _) => {
                Ok(VariantSpec::custom(custom.name.clone(), custom.control, custom.dot)?)
            }
            (None, Some(kind)) => Ok(VariantSpec::builtin(kind)),
            (None, None) => bail!("scenario '{}' names no variant", self.scenario.name),
        }
    }

    /// Run every step against a fresh accelerator.
    ///
    /// Malformed steps (unknown registers, oversized lane vectors) are
    /// errors; failed expectations end the run and are reported.
    pub fn run(&self) -> anyhow::Result<ScenarioReport> {
        let spec = self.variant_spec()?;
        let mut accel = Accelerator::new(spec)?;
        let mut report = ScenarioReport {
            name: self.scenario.name.clone(),
            variant: accel.spec().name.clone(),
            steps_run: 0,
            ticks: 0,
            failure: None,
        };

        for (index, step) in self.steps.iter().enumerate() {
            let outcome = Self::apply(&mut accel, step).with_context(|| {
                format!("scenario '{}' step {} ({})", self.scenario.name, index, step)
            })?;
            report.steps_run += 1;
            if let Some(message) = outcome {
                log::debug!(
                    "scenario '{}' failed at step {}: {}",
                    self.scenario.name, index, message
                );
                report.failure = Some(StepFailure { index, step: step.to_string(), message });
                break;
            }
        }

        report.ticks = accel.cycle();
        Ok(report)
    }

    /// Execute one step. `Ok(Some(msg))` is a failed expectation.
    fn apply(accel: &mut Accelerator, step: &Step) -> anyhow::Result<Option<String>> {
        match step {
            Step::Write { register, value } => {
                let Some(def) = accel.registers().find_by_name(register).copied() else {
                    bail!("no register named '{}'", register);
                };
                accel.write(def.offset, *value as u32);
            }
            Step::WriteLanes { target, values } => {
                let lanes = accel.spec().lanes();
                if values.len() > lanes {
                    bail!("{} values for {} lanes", values.len(), lanes);
                }
                let words = pack_lanes(values, accel.spec().lane_width());
                for (k, word) in words.into_iter().enumerate() {
                    let kind = match target {
                        LaneTarget::Inputs => RegisterKind::Input(k),
                        LaneTarget::Weights => RegisterKind::Weight(k),
                    };
                    if let Some(addr) = accel.registers().address_of(kind) {
                        accel.write(addr, word);
                    }
                }
            }
            Step::Pulse { start, reset } => {
                let mut bits = 0;
                if *start {
                    bits |= control::START;
                }
                if *reset {
                    bits |= control::RESET;
                }
                accel.write(CONTROL_ADDR, bits);
            }
            Step::Tick { count } => accel.run(*count),
            Step::ExpectStatus { ready, done, busy } => {
                let s = accel.status();
                let mismatch = check_bit("READY", *ready, s, status::READY)
                    .or_else(|| check_bit("DONE", *done, s, status::DONE))
                    .or_else(|| check_bit("BUSY", *busy, s, status::BUSY));
                return Ok(mismatch.map(|m| format!("{} (STATUS=0x{:X})", m, s)));
            }
            Step::ExpectResult { value } => {
                let (actual, ok) = if *value < 0 {
                    let signed = accel.result_signed() as i64;
                    (signed, signed == *value)
                } else {
                    let raw = accel.result() as i64;
                    (raw, raw == *value)
                };
                if !ok {
                    return Ok(Some(format!(
                        "RESULT is {} (0x{:X}), expected {}",
                        actual,
                        accel.result(),
                        value
                    )));
                }
            }
            Step::ExpectState { state } => {
                let actual = accel.state().to_string();
                if !actual.eq_ignore_ascii_case(state) {
                    return Ok(Some(format!("state is {}, expected {}", actual, state)));
                }
            }
        }
        Ok(None)
    }
}

/// Find every `*.toml` manifest in a directory, sorted by path.
pub fn discover(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "toml") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Load and run every manifest in a directory.
pub fn run_dir(dir: &Path) -> anyhow::Result<Vec<ScenarioReport>> {
    let mut reports = Vec::new();
    for path in discover(dir)? {
        let report = ScenarioManifest::from_file(&path)?.run()?;
        log::info!("{}", report);
        reports.push(report);
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCALAR: &str = r#"
[scenario]
name = "scalar_mac"
variant = "linear"

[[step]]
op = "write"
register = "INPUTS[0]"
value = 0x10000

[[step]]
op = "write"
register = "WEIGHTS[0]"
value = 0x20000

[[step]]
op = "write"
register = "BIAS"
value = 0x10000

[[step]]
op = "pulse"
start = true

[[step]]
op = "tick"
count = 2

[[step]]
op = "expect_status"
done = true
busy = false

[[step]]
op = "expect_result"
value = 0x30000
"#;

    const VECTOR: &str = r#"
[scenario]
name = "dot4"

[custom]
name = "dot4"
control = "full"

[custom.dot]
lanes = 4
lane_width = 8
bias_width = 8
result_width = 16

[[step]]
op = "write_lanes"
target = "inputs"
values = [1, 2, 3, 4]

[[step]]
op = "write_lanes"
target = "weights"
values = [1, 1, 1, 1]

[[step]]
op = "pulse"
start = true

[[step]]
op = "tick"
count = 2

[[step]]
op = "expect_result"
value = 10
"#;

    const HANDSHAKE: &str = r#"
[scenario]
name = "handshake"
variant = "linear"

[[step]]
op = "pulse"
start = true

[[step]]
op = "tick"

[[step]]
op = "expect_status"
ready = false
done = false
busy = true

[[step]]
op = "tick"

[[step]]
op = "expect_status"
ready = false
done = true
busy = false

[[step]]
op = "tick"

[[step]]
op = "expect_status"
ready = true
done = false
busy = false

[[step]]
op = "expect_state"
state = "idle"
"#;

    #[test]
    fn test_scalar_scenario() {
        let report = ScenarioManifest::parse(SCALAR).unwrap().run().unwrap();
        assert!(report.passed(), "{}", report);
        assert_eq!(report.steps_run, 7);
        assert_eq!(report.ticks, 2);
    }

    #[test]
    fn test_vector_scenario() {
        let manifest = ScenarioManifest::parse(VECTOR).unwrap();
        assert_eq!(manifest.steps.len(), 5);
        let report = manifest.run().unwrap();
        assert!(report.passed(), "{}", report);
        assert_eq!(report.variant, "dot4");
    }

    #[test]
    fn test_handshake_scenario() {
        let report = ScenarioManifest::parse(HANDSHAKE).unwrap().run().unwrap();
        assert!(report.passed(), "{}", report);
        assert_eq!(report.ticks, 3);
    }

    #[test]
    fn test_reports_first_failure() {
        let text = SCALAR.replace("value = 0x30000", "value = 0x40000");
        let report = ScenarioManifest::parse(&text).unwrap().run().unwrap();
        let failure = report.failure.clone().unwrap();
        assert_eq!(failure.index, 6);
        assert!(failure.message.contains("expected 262144"), "{}", failure.message);
        assert!(report.to_string().starts_with("FAIL scalar_mac"));
    }

    #[test]
    fn test_negative_result_expectation() {
        let text = r#"
[scenario]
name = "negative"
variant = "wide-dot"

[[step]]
op = "write_lanes"
target = "inputs"
values = [-3]

[[step]]
op = "write_lanes"
target = "weights"
values = [5]

[[step]]
op = "tick"

[[step]]
op = "expect_result"
value = -15
"#;
        let report = ScenarioManifest::parse(text).unwrap().run().unwrap();
        assert!(report.passed(), "{}", report);
    }

    #[test]
    fn test_unknown_register_is_error() {
        let text = SCALAR.replace("\"BIAS\"", "\"GAIN\"");
        let err = ScenarioManifest::parse(&text).unwrap().run().unwrap_err();
        assert!(format!("{:#}", err).contains("no register named 'GAIN'"));
    }

    #[test]
    fn test_missing_variant_is_error() {
        let text = "[scenario]\nname = \"bare\"\n";
        assert!(ScenarioManifest::parse(text).unwrap().run().is_err());
    }

    #[test]
    fn test_unknown_op_rejected() {
        let text = "[scenario]\nname = \"x\"\nvariant = \"linear\"\n\n[[step]]\nop = \"jump\"\n";
        assert!(ScenarioManifest::parse(text).is_err());
    }

    #[test]
    fn test_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_scalar.toml"), SCALAR).unwrap();
        std::fs::write(dir.path().join("b_vector.toml"), VECTOR).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a manifest").unwrap();

        let reports = run_dir(dir.path()).unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].name, "scalar_mac");
        assert!(reports.iter().all(ScenarioReport::passed));
    }

    #[test]
    fn test_shipped_scenarios_pass() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios");
        let reports = run_dir(&dir).unwrap();
        assert!(reports.len() >= 4);
        for report in &reports {
            assert!(report.passed(), "{}", report);
        }
    }
}
