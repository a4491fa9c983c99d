//! Configuration management for mac-accel-emu.
//!
//! Configuration is loaded from multiple sources in priority order:
//! 1. Environment variables (`ACCEL_EMU_VARIANT`, `ACCEL_EMU_TIMEOUT_TICKS`)
//! 2. Project-local config file (`./mac-accel-emu.toml`)
//! 3. User config file (`~/.config/mac-accel-emu/config.toml`)
//! 4. Built-in defaults
//!
//! # Config File Format
//!
//! ```toml
//! # mac-accel-emu.toml
//!
//! # One of: linear, packed-logistic, wide-dot, logistic64
//! variant = "packed-logistic"
//!
//! # Tick budget for host-side waits
//! host_timeout_ticks = 500
//! ```
//!
//! A `[custom]` table describes a dot-product variant instead. Whichever of
//! `variant` and `[custom]` comes from the higher-priority source wins.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::device::{ConfigError, ControlKind, DotSpec, VariantKind, VariantSpec};
use crate::emu::host::DEFAULT_TIMEOUT_TICKS;

/// Global cached configuration.
static CONFIG: OnceLock<Config> = OnceLock::new();

const APP_NAME: &str = "mac-accel-emu";

/// A dot-product variant described in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomVariant {
    #[serde(default = "CustomVariant::default_name")]
    pub name: String,
    pub control: ControlKind,
    pub dot: DotSpec,
}

impl CustomVariant {
    fn default_name() -> String {
        "custom".to_string()
    }
}

/// mac-accel-emu configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Built-in variant to emulate.
    pub variant: Option<VariantKind>,

    /// Ticks a host-side wait may take before timing out.
    pub host_timeout_ticks: Option<u64>,

    /// Custom dot-product variant.
    pub custom: Option<CustomVariant>,
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Project-local `mac-accel-emu.toml`
    /// 3. User config `~/.config/mac-accel-emu/config.toml`
    /// 4. Defaults
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(user_config) = Self::load_user_config() {
            config.merge(user_config);
        }

        if let Some(local_config) = Self::load_local_config() {
            config.merge(local_config);
        }

        config.apply_env_overrides();

        config
    }

    /// Get the cached global configuration.
    ///
    /// Loads configuration on first call and caches it.
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(|| {
            let config = Self::load();
            log::debug!("Loaded configuration: {:?}", config);
            config
        })
    }

    /// Host wait budget, with fallback to the default.
    pub fn timeout_ticks(&self) -> u64 {
        self.host_timeout_ticks.unwrap_or(DEFAULT_TIMEOUT_TICKS)
    }

    /// Resolve the configured accelerator.
    ///
    /// A custom table wins over a variant name from the same source; with
    /// nothing configured the scalar `linear` variant is used.
    pub fn variant_spec(&self) -> Result<VariantSpec, ConfigError> {
        match (&self.custom, self.variant) {
            (Some(custom), _) => {
                VariantSpec::custom(custom.name.clone(), custom.control, custom.dot)
            }
            (None, Some(kind)) => Ok(VariantSpec::builtin(kind)),
            (None, None) => Ok(VariantSpec::builtin(VariantKind::Linear)),
        }
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn load_user_config() -> Option<Self> {
        Self::load_from_file(&Self::user_config_path()?)
    }

    fn load_local_config() -> Option<Self> {
        let local_path = Path::new("mac-accel-emu.toml");
        if let Some(config) = Self::load_from_file(local_path) {
            return Some(config);
        }

        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let project_path = Path::new(&manifest_dir).join("mac-accel-emu.toml");
            if let Some(config) = Self::load_from_file(&project_path) {
                return Some(config);
            }
        }

        None
    }

    /// Load a config file if it exists, logging and skipping bad ones.
    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match Self::from_file(path) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                Some(config)
            }
            Err(e) => {
                log::warn!("{:#}", e);
                None
            }
        }
    }

    /// Merge another config into this one.
    /// Only overrides fields that are Some in the other config.
    fn merge(&mut self, other: Self) {
        if other.custom.is_some() {
            self.custom = other.custom;
            self.variant = None;
        } else if other.variant.is_some() {
            self.variant = other.variant;
            self.custom = None;
        }
        if other.host_timeout_ticks.is_some() {
            self.host_timeout_ticks = other.host_timeout_ticks;
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from a variable lookup.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(name) = lookup("ACCEL_EMU_VARIANT") {
            match name.parse::<VariantKind>() {
                Ok(kind) => {
                    log::info!("Using ACCEL_EMU_VARIANT from environment: {}", kind);
                    self.variant = Some(kind);
                    self.custom = None;
                }
                Err(e) => log::warn!("Ignoring ACCEL_EMU_VARIANT: {}", e),
            }
        }
        if let Some(ticks) = lookup("ACCEL_EMU_TIMEOUT_TICKS") {
            match ticks.trim().parse::<u64>() {
                Ok(ticks) => {
                    log::info!("Using ACCEL_EMU_TIMEOUT_TICKS from environment: {}", ticks);
                    self.host_timeout_ticks = Some(ticks);
                }
                Err(e) => log::warn!("Ignoring ACCEL_EMU_TIMEOUT_TICKS='{}': {}", ticks, e),
            }
        }
    }

    /// Get the path to the user config file (for display/creation).
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME).join("config.toml"))
    }

    /// Generate a sample config file content.
    pub fn sample_config() -> String {
        r#"# mac-accel-emu configuration
# Place this file at ~/.config/mac-accel-emu/config.toml or ./mac-accel-emu.toml

# Built-in variant: linear, packed-logistic, wide-dot or logistic64
variant = "linear"

# Tick budget for host-side waits (default 1000)
# host_timeout_ticks = 1000

# A custom dot-product variant replaces `variant` when present.
# [custom]
# name = "dot12"
# control = "full"            # full, minimal or combinational
#
# [custom.dot]
# lanes = 12
# lane_width = 8
# bias_width = 16
# result_width = 16
# output_shift = 2
# odd_lane_policy = "zero-pad"  # or "pass-through"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::OddLanePolicy;
    use crate::device::PipelineSpec;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.timeout_ticks(), DEFAULT_TIMEOUT_TICKS);
        assert_eq!(config.variant_spec().unwrap(), VariantSpec::builtin(VariantKind::Linear));
    }

    #[test]
    fn test_config_merge() {
        let mut base = Config {
            variant: Some(VariantKind::WideDot),
            host_timeout_ticks: Some(50),
            custom: None,
        };

        let overlay = Config {
            variant: Some(VariantKind::Logistic64),
            host_timeout_ticks: None,
            custom: None,
        };

        base.merge(overlay);

        assert_eq!(base.variant, Some(VariantKind::Logistic64));
        assert_eq!(base.host_timeout_ticks, Some(50));
    }

    #[test]
    fn test_merge_custom_replaces_variant() {
        let mut base = Config { variant: Some(VariantKind::WideDot), ..Default::default() };
        let custom: Config = toml::from_str(
            r#"
            [custom]
            control = "minimal"
            [custom.dot]
            lanes = 4
            lane_width = 16
            result_width = 32
            "#,
        )
        .unwrap();

        base.merge(custom);
        assert_eq!(base.variant, None);

        let spec = base.variant_spec().unwrap();
        assert_eq!(spec.name, "custom");
        assert_eq!(spec.control, ControlKind::Minimal);
        assert_eq!(spec.lanes(), 4);

        base.merge(Config { variant: Some(VariantKind::Linear), ..Default::default() });
        assert_eq!(base.custom, None);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            "ACCEL_EMU_VARIANT" => Some("Packed-Logistic".to_string()),
            "ACCEL_EMU_TIMEOUT_TICKS" => Some(" 25 ".to_string()),
            _ => None,
        });
        assert_eq!(config.variant, Some(VariantKind::PackedLogistic));
        assert_eq!(config.timeout_ticks(), 25);
    }

    #[test]
    fn test_bad_env_overrides_ignored() {
        let mut config = Config { variant: Some(VariantKind::WideDot), ..Default::default() };
        config.apply_overrides(|key| match key {
            "ACCEL_EMU_VARIANT" => Some("systolic".to_string()),
            "ACCEL_EMU_TIMEOUT_TICKS" => Some("soon".to_string()),
            _ => None,
        });
        assert_eq!(config.variant, Some(VariantKind::WideDot));
        assert_eq!(config.host_timeout_ticks, None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "variant = \"logistic64\"\nhost_timeout_ticks = 7").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.variant, Some(VariantKind::Logistic64));
        assert_eq!(config.timeout_ticks(), 7);
        assert!(Config::load_from_file(file.path()).is_some());
    }

    #[test]
    fn test_bad_file_is_skipped() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "variant = \"systolic\"").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse"));
        assert!(Config::load_from_file(file.path()).is_none());
        assert!(Config::load_from_file(Path::new("/nonexistent/mac-accel-emu.toml")).is_none());
    }

    #[test]
    fn test_invalid_custom_variant() {
        let config: Config = toml::from_str(
            r#"
            [custom]
            name = "odd"
            control = "full"
            [custom.dot]
            lanes = 6
            lane_width = 8
            result_width = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.variant_spec(), Err(ConfigError::UnbalancedTree { lanes: 6 }));
    }

    #[test]
    fn test_huge_output_shift_is_config_error() {
        let config: Config = toml::from_str(
            r#"
            [custom]
            control = "minimal"
            [custom.dot]
            lanes = 4
            lane_width = 8
            result_width = 16
            output_shift = 4294967295
            "#,
        )
        .unwrap();
        assert!(matches!(
            config.variant_spec(),
            Err(ConfigError::ResultSlice { shift: u32::MAX, .. })
        ));
    }

    #[test]
    fn test_sample_config_parses() {
        let sample = Config::sample_config();
        let config: Config = toml::from_str(&sample).expect("Sample config should parse");
        assert_eq!(config.variant, Some(VariantKind::Linear));

        // The commented custom block is valid once enabled.
        let enabled: String = sample
            .lines()
            .skip_while(|l| !l.starts_with("# [custom]"))
            .map(|l| l.trim_start_matches("# ").split('#').next().unwrap_or("").to_string())
            .collect::<Vec<_>>()
            .join("\n");
        let config: Config = toml::from_str(&enabled).unwrap();
        let spec = config.variant_spec().unwrap();
        assert_eq!(spec.name, "dot12");
        match spec.pipeline {
            PipelineSpec::Dot(dot) => assert_eq!(dot.odd_lane_policy, Some(OddLanePolicy::ZeroPad)),
            PipelineSpec::Scalar => panic!("expected a dot-product variant"),
        }
    }
}
