//! Arithmetic pipelines.
//!
//! Pipelines hold no state between ticks. Each one is a pure function of the
//! current register contents; the control FSM decides when its output is
//! committed to RESULT.
//!
//! - [`fixed`]: Q16.16 scalar `input * weight + bias`
//! - [`dot`]: N-lane integer dot product with bias and output slice
//! - [`tree`]: the binary adder tree used by the dot product

pub mod dot;
pub mod fixed;
pub mod tree;

use std::fmt;

pub use dot::{DotOutput, DotProductEngine};
pub use fixed::{scalar_mac, Fixed, FixedPointAlu, FRAC_BITS};
pub use tree::{OddLanePolicy, ReductionTree};

use crate::device::{ConfigError, PipelineSpec, RegisterFile};

/// A combinational pipeline evaluated from register contents.
pub trait Pipeline: fmt::Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// The value RESULT would latch if committed now.
    fn evaluate(&self, regs: &RegisterFile) -> u32;
}

/// Build the pipeline a variant describes.
pub fn build_pipeline(spec: &PipelineSpec) -> Result<Box<dyn Pipeline>, ConfigError> {
    Ok(match spec {
        PipelineSpec::Scalar => Box::new(FixedPointAlu),
        PipelineSpec::Dot(dot) => Box::new(DotProductEngine::new(*dot)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{VariantKind, VariantSpec};

    #[test]
    fn test_build_pipeline_per_variant() {
        let scalar = build_pipeline(&VariantSpec::builtin(VariantKind::Linear).pipeline).unwrap();
        assert_eq!(scalar.name(), "fixed-point ALU");

        for kind in [VariantKind::PackedLogistic, VariantKind::WideDot, VariantKind::Logistic64] {
            let p = build_pipeline(&VariantSpec::builtin(kind).pipeline).unwrap();
            assert_eq!(p.name(), "dot product");
        }
    }
}
