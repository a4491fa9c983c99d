//! Scenario testing for the emulated accelerators.
//!
//! Scenarios are TOML manifests of register writes, ticks and expectations
//! that run against a fresh accelerator.
//!
//! # Usage
//!
//! ```ignore
//! let reports = mac_accel_emu::testing::run_dir(Path::new("scenarios/"))?;
//! ```

pub mod manifest;

pub use manifest::{discover, run_dir, ScenarioManifest, ScenarioReport, Step, StepFailure};
