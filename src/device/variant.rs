//! Accelerator variants and their validation.
//!
//! Four variants ship built in:
//!
//! | Variant | Pipeline | Lanes x width | Bias | Result | Control |
//! |---|---|---|---|---|---|
//! | `linear` | Q16.16 multiply-add | 1 x 32 | 32b | 32b | full |
//! | `packed-logistic` | dot product | 16 x 8 (4 per word) | 8b | bits [4:20] | minimal |
//! | `wide-dot` | dot product | 8 x 32 | none | 32b | combinational |
//! | `logistic64` | dot product | 64 x 32 | 32b | 32b | minimal |
//!
//! Custom dot-product variants are described with a [`DotSpec`] and checked
//! by [`VariantSpec::validate`] before any engine is built.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::lanes::registers_for;
use super::registers::RegisterLayout;
use super::registers_spec::{status, REGISTER_WIDTH};
use crate::compute::tree::{ceil_log2, OddLanePolicy};

/// Largest lane count a variant may configure. With 32-bit lanes the final
/// sum then needs 73 bits, well inside the `i128` the pipelines carry.
pub const MAX_LANES: usize = 256;

/// Variant configuration error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("lane count must be between 1 and {max}, got {lanes}")]
    LaneCount { lanes: usize, max: usize },

    #[error("lane width {0} must divide 32 and lie in 2..=32")]
    LaneWidth(u32),

    #[error("{register} width {width} must lie in 1..=32")]
    RegisterWidth { register: &'static str, width: u32 },

    #[error("result slice [{shift}:{end}] exceeds the {final_width}-bit final sum")]
    ResultSlice { shift: u32, end: u32, final_width: u32 },

    #[error("{lanes} lanes is not a power of two and no odd-lane policy is configured")]
    UnbalancedTree { lanes: usize },

    #[error("unknown accelerator variant '{0}'")]
    UnknownVariant(String),
}

/// Built-in variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VariantKind {
    Linear,
    PackedLogistic,
    WideDot,
    Logistic64,
}

impl VariantKind {
    pub const ALL: [VariantKind; 4] = [
        VariantKind::Linear,
        VariantKind::PackedLogistic,
        VariantKind::WideDot,
        VariantKind::Logistic64,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            VariantKind::Linear => "linear",
            VariantKind::PackedLogistic => "packed-logistic",
            VariantKind::WideDot => "wide-dot",
            VariantKind::Logistic64 => "logistic64",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VariantKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VariantKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConfigError::UnknownVariant(s.to_string()))
    }
}

/// How the engine sequences a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ControlKind {
    /// IDLE -> COMPUTE -> FINISH -> IDLE, with a RESET state.
    Full,
    /// IDLE -> COMPUTE -> IDLE, `done = !processing`.
    Minimal,
    /// No handshake; RESULT follows the operands every tick.
    Combinational,
}

impl ControlKind {
    /// STATUS at power-on.
    pub fn idle_status(&self) -> u32 {
        match self {
            ControlKind::Full => status::READY,
            ControlKind::Minimal | ControlKind::Combinational => status::READY | status::DONE,
        }
    }
}

/// Shape of a dot-product pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotSpec {
    /// Vector length N
    pub lanes: usize,
    /// Signed lane width W; must divide 32
    pub lane_width: u32,
    /// BIAS width B, or no bias register
    #[serde(default)]
    pub bias_width: Option<u32>,
    /// Bits of the final sum committed to RESULT
    pub result_width: u32,
    /// Low bits of the final sum dropped before narrowing
    #[serde(default)]
    pub output_shift: u32,
    /// Required when `lanes` is not a power of two
    #[serde(default)]
    pub odd_lane_policy: Option<OddLanePolicy>,
}

impl DotSpec {
    pub fn product_width(&self) -> u32 {
        2 * self.lane_width
    }

    /// `2W + ceil(log2 N)`.
    pub fn accumulator_width(&self) -> u32 {
        self.product_width() + ceil_log2(self.lanes)
    }

    /// One bit of headroom over the accumulator for the bias term.
    pub fn final_width(&self) -> u32 {
        self.accumulator_width() + 1
    }

    /// The configured policy, or pass-through for balanced trees.
    pub fn policy(&self) -> OddLanePolicy {
        self.odd_lane_policy.unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lanes == 0 || self.lanes > MAX_LANES {
            return Err(ConfigError::LaneCount { lanes: self.lanes, max: MAX_LANES });
        }
        if !(2..=REGISTER_WIDTH).contains(&self.lane_width)
            || REGISTER_WIDTH % self.lane_width != 0
        {
            return Err(ConfigError::LaneWidth(self.lane_width));
        }
        if let Some(width) = self.bias_width {
            check_register_width("BIAS", width)?;
        }
        check_register_width("RESULT", self.result_width)?;

        let final_width = self.final_width();
        match self.output_shift.checked_add(self.result_width) {
            Some(end) if end <= final_width => {}
            end => {
                return Err(ConfigError::ResultSlice {
                    shift: self.output_shift,
                    end: end.unwrap_or(u32::MAX),
                    final_width,
                });
            }
        }
        if !self.lanes.is_power_of_two() && self.odd_lane_policy.is_none() {
            return Err(ConfigError::UnbalancedTree { lanes: self.lanes });
        }
        Ok(())
    }
}

fn check_register_width(register: &'static str, width: u32) -> Result<(), ConfigError> {
    if (1..=REGISTER_WIDTH).contains(&width) {
        Ok(())
    } else {
        Err(ConfigError::RegisterWidth { register, width })
    }
}

/// Which arithmetic pipeline a variant uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineSpec {
    /// Q16.16 `input * weight + bias`.
    Scalar,
    Dot(DotSpec),
}

/// Complete description of one accelerator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    pub name: String,
    pub control: ControlKind,
    pub pipeline: PipelineSpec,
}

impl VariantSpec {
    /// One of the built-in variants.
    pub fn builtin(kind: VariantKind) -> Self {
        let (control, pipeline) = match kind {
            VariantKind::Linear => (ControlKind::Full, PipelineSpec::Scalar),
            VariantKind::PackedLogistic => (
                ControlKind::Minimal,
                PipelineSpec::Dot(DotSpec {
                    lanes: 16,
                    lane_width: 8,
                    bias_width: Some(8),
                    result_width: 16,
                    output_shift: 4,
                    odd_lane_policy: Some(OddLanePolicy::PassThrough),
                }),
            ),
            VariantKind::WideDot => (
                ControlKind::Combinational,
                PipelineSpec::Dot(DotSpec {
                    lanes: 8,
                    lane_width: 32,
                    bias_width: None,
                    result_width: 32,
                    output_shift: 0,
                    odd_lane_policy: Some(OddLanePolicy::PassThrough),
                }),
            ),
            VariantKind::Logistic64 => (
                ControlKind::Minimal,
                PipelineSpec::Dot(DotSpec {
                    lanes: 64,
                    lane_width: 32,
                    bias_width: Some(32),
                    result_width: 32,
                    output_shift: 0,
                    odd_lane_policy: Some(OddLanePolicy::PassThrough),
                }),
            ),
        };

        Self { name: kind.name().to_string(), control, pipeline }
    }

    /// A custom dot-product variant, validated.
    pub fn custom(
        name: impl Into<String>,
        control: ControlKind,
        dot: DotSpec,
    ) -> Result<Self, ConfigError> {
        let spec = Self { name: name.into(), control, pipeline: PipelineSpec::Dot(dot) };
        spec.validate()?;
        Ok(spec)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.pipeline {
            PipelineSpec::Scalar => Ok(()),
            PipelineSpec::Dot(dot) => dot.validate(),
        }
    }

    /// Operand values per vector.
    pub fn lanes(&self) -> usize {
        match &self.pipeline {
            PipelineSpec::Scalar => 1,
            PipelineSpec::Dot(dot) => dot.lanes,
        }
    }

    pub fn lane_width(&self) -> u32 {
        match &self.pipeline {
            PipelineSpec::Scalar => REGISTER_WIDTH,
            PipelineSpec::Dot(dot) => dot.lane_width,
        }
    }

    pub fn register_layout(&self) -> RegisterLayout {
        let (bias_width, result_width) = match &self.pipeline {
            PipelineSpec::Scalar => (Some(REGISTER_WIDTH), REGISTER_WIDTH),
            PipelineSpec::Dot(dot) => (dot.bias_width, dot.result_width),
        };
        RegisterLayout {
            operand_registers: registers_for(self.lanes(), self.lane_width()),
            bias_width,
            result_width,
            status_reset: self.control.idle_status(),
        }
    }
}

impl fmt::Display for VariantSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pipeline {
            PipelineSpec::Scalar => {
                write!(f, "{} (Q16.16 scalar, {:?} control)", self.name, self.control)
            }
            PipelineSpec::Dot(dot) => write!(
                f,
                "{} ({}x{}-bit dot product, {:?} control)",
                self.name, dot.lanes, dot.lane_width, self.control
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(lanes: usize, lane_width: u32) -> DotSpec {
        DotSpec {
            lanes,
            lane_width,
            bias_width: Some(8),
            result_width: 16,
            output_shift: 0,
            odd_lane_policy: None,
        }
    }

    #[test]
    fn test_builtins_validate() {
        for kind in VariantKind::ALL {
            let spec = VariantSpec::builtin(kind);
            assert_eq!(spec.validate(), Ok(()), "{}", kind);
            assert_eq!(spec.name, kind.name());
        }
    }

    #[test]
    fn test_packed_logistic_widths() {
        let PipelineSpec::Dot(d) = VariantSpec::builtin(VariantKind::PackedLogistic).pipeline else {
            panic!("packed-logistic is a dot-product variant");
        };
        assert_eq!(d.product_width(), 16);
        assert_eq!(d.accumulator_width(), 20);
        assert_eq!(d.final_width(), 21);
    }

    #[test]
    fn test_layouts() {
        let packed = VariantSpec::builtin(VariantKind::PackedLogistic).register_layout();
        assert_eq!(packed.operand_registers, 4);
        assert_eq!(packed.bias_width, Some(8));
        assert_eq!(packed.result_width, 16);

        let wide = VariantSpec::builtin(VariantKind::WideDot).register_layout();
        assert_eq!(wide.operand_registers, 8);
        assert_eq!(wide.bias_width, None);

        let linear = VariantSpec::builtin(VariantKind::Linear).register_layout();
        assert_eq!(linear.operand_registers, 1);
        assert_eq!(linear.status_reset, status::READY);
    }

    #[test]
    fn test_rejects_bad_lane_counts() {
        assert_eq!(dot(0, 8).validate(), Err(ConfigError::LaneCount { lanes: 0, max: MAX_LANES }));
        assert!(matches!(dot(512, 8).validate(), Err(ConfigError::LaneCount { .. })));
    }

    #[test]
    fn test_rejects_bad_lane_width() {
        assert_eq!(dot(4, 12).validate(), Err(ConfigError::LaneWidth(12)));
        assert_eq!(dot(4, 1).validate(), Err(ConfigError::LaneWidth(1)));
        assert_eq!(dot(4, 64).validate(), Err(ConfigError::LaneWidth(64)));
    }

    #[test]
    fn test_odd_lanes_need_policy() {
        assert_eq!(dot(6, 8).validate(), Err(ConfigError::UnbalancedTree { lanes: 6 }));
        let mut with_policy = dot(6, 8);
        with_policy.odd_lane_policy = Some(OddLanePolicy::ZeroPad);
        assert_eq!(with_policy.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_slice_past_final_sum() {
        // 4 x 4-bit lanes: 8 + 2 + 1 = 11-bit final sum.
        let mut spec = dot(4, 4);
        spec.result_width = 8;
        spec.output_shift = 4;
        assert_eq!(
            spec.validate(),
            Err(ConfigError::ResultSlice { shift: 4, end: 12, final_width: 11 })
        );
        spec.output_shift = 3;
        assert_eq!(spec.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_overflowing_output_shift() {
        let mut spec = dot(4, 8);
        spec.output_shift = u32::MAX;
        assert_eq!(
            spec.validate(),
            Err(ConfigError::ResultSlice { shift: u32::MAX, end: u32::MAX, final_width: 19 })
        );

        spec.output_shift = u32::MAX - spec.result_width;
        assert!(matches!(spec.validate(), Err(ConfigError::ResultSlice { .. })));
    }

    #[test]
    fn test_rejects_register_widths() {
        let mut spec = dot(4, 8);
        spec.result_width = 0;
        assert_eq!(
            spec.validate(),
            Err(ConfigError::RegisterWidth { register: "RESULT", width: 0 })
        );
        let mut spec = dot(4, 8);
        spec.bias_width = Some(40);
        assert!(matches!(
            spec.validate(),
            Err(ConfigError::RegisterWidth { register: "BIAS", .. })
        ));
    }

    #[test]
    fn test_largest_tree_fits_i128() {
        let mut spec = dot(MAX_LANES, 32);
        spec.odd_lane_policy = Some(OddLanePolicy::PassThrough);
        assert_eq!(spec.validate(), Ok(()));
        assert_eq!(spec.final_width(), 64 + 8 + 1);
        assert!(spec.final_width() < i128::BITS);
    }

    #[test]
    fn test_variant_names_parse() {
        assert_eq!("packed-logistic".parse::<VariantKind>(), Ok(VariantKind::PackedLogistic));
        assert_eq!(" Linear ".parse::<VariantKind>(), Ok(VariantKind::Linear));
        assert_eq!(
            "nope".parse::<VariantKind>(),
            Err(ConfigError::UnknownVariant("nope".to_string()))
        );
    }

    #[test]
    fn test_custom_validates() {
        assert!(VariantSpec::custom("bad", ControlKind::Full, dot(3, 8)).is_err());
        let spec = VariantSpec::custom("quad", ControlKind::Full, dot(4, 8)).unwrap();
        assert_eq!(spec.lanes(), 4);
        assert_eq!(spec.register_layout().operand_registers, 1);
    }
}
