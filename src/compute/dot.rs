//! Vector dot-product pipeline.
//!
//! ```text
//! INPUTS[k] ──unpack──► x[0..N) ─┐
//!                                ├─► p[i] = x[i] * w[i] ──► adder tree ──► mac_sum
//! WEIGHTS[k] ─unpack──► w[0..N) ─┘                                          │
//!                                                        BIAS ──► (+) ◄─────┘
//!                                                                  │
//!                                                   final[shift .. shift + R) ──► RESULT
//! ```
//!
//! Products are exact `2W`-bit integers; there is no fixed-point
//! renormalisation in this pipeline. The only scaling is the output slice,
//! which drops the low `output_shift` bits (truncation, not rounding) and
//! keeps the next `result_width` bits.

use super::tree::ReductionTree;
use super::Pipeline;
use crate::device::lanes::{lane_mask, unpack_lanes};
use crate::device::{ConfigError, DotSpec, RegisterFile};

/// Every intermediate value of one dot-product evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DotOutput {
    /// Root of the adder tree
    pub mac_sum: i128,
    /// `mac_sum + bias`
    pub final_sum: i128,
    /// Bits committed to RESULT
    pub narrowed: u32,
}

/// N-lane multiply and reduction pipeline.
#[derive(Debug, Clone)]
pub struct DotProductEngine {
    spec: DotSpec,
    tree: ReductionTree,
}

impl DotProductEngine {
    /// Build an engine for a validated shape.
    pub fn new(spec: DotSpec) -> Result<Self, ConfigError> {
        spec.validate()?;
        Ok(Self { tree: ReductionTree::new(spec.lanes, spec.policy()), spec })
    }

    pub fn spec(&self) -> &DotSpec {
        &self.spec
    }

    pub fn tree(&self) -> &ReductionTree {
        &self.tree
    }

    pub fn lanes(&self) -> usize {
        self.spec.lanes
    }

    /// Per-lane products, `2W` bits each.
    pub fn products(&self, inputs: &[i32], weights: &[i32]) -> Vec<i128> {
        inputs
            .iter()
            .zip(weights)
            .take(self.spec.lanes)
            .map(|(&x, &w)| x as i128 * w as i128)
            .collect()
    }

    /// Take the configured bit slice of the final sum.
    pub fn narrow(&self, final_sum: i128) -> u32 {
        ((final_sum >> self.spec.output_shift) as u32) & lane_mask(self.spec.result_width)
    }

    /// Evaluate the pipeline on already-unpacked operands.
    ///
    /// Missing lanes count as zero.
    pub fn compute(&self, inputs: &[i32], weights: &[i32], bias: i32) -> DotOutput {
        let mac_sum = self.tree.reduce(&self.products(inputs, weights));
        let final_sum = mac_sum + bias as i128;
        DotOutput { mac_sum, final_sum, narrowed: self.narrow(final_sum) }
    }

    /// Unpack operands from the register file and evaluate.
    pub fn compute_from(&self, regs: &RegisterFile) -> DotOutput {
        let inputs = unpack_lanes(regs.input_words(), self.spec.lanes, self.spec.lane_width);
        let weights = unpack_lanes(regs.weight_words(), self.spec.lanes, self.spec.lane_width);
        self.compute(&inputs, &weights, regs.bias_signed())
    }
}

impl Pipeline for DotProductEngine {
    fn name(&self) -> &'static str {
        "dot product"
    }

    fn evaluate(&self, regs: &RegisterFile) -> u32 {
        let out = self.compute_from(regs);
        log::trace!(
            "dot product: mac_sum={} final={} result=0x{:X}",
            out.mac_sum,
            out.final_sum,
            out.narrowed
        );
        out.narrowed
    }
}
