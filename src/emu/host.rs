//! Host-side driver.
//!
//! Drives an [`Accelerator`] through its register interface the way
//! firmware would: write operands, pulse START, poll STATUS, read RESULT.
//! Every poll costs one tick, so a wait is bounded by a tick budget rather
//! than wall-clock time.

use thiserror::Error;

use super::engine::Accelerator;
use crate::config::Config;
use crate::device::lanes::{pack_lanes, truncated_lanes};
use crate::device::registers_spec::{
    control, input_addr, status, weight_addr, BIAS_ADDR, CONTROL_ADDR, STATUS_ADDR,
};

/// Ticks a wait may take before giving up.
pub const DEFAULT_TIMEOUT_TICKS: u64 = 1000;

/// Driver protocol errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("accelerator did not finish within {0} ticks")]
    Timeout(u64),

    #[error("accelerator is busy")]
    Busy,

    #[error("expected {expected} operands, got {actual}")]
    InvalidOperandCount { expected: usize, actual: usize },

    #[error("variant has no BIAS register")]
    NoBiasRegister,
}

/// Register-level driver for one accelerator.
#[derive(Debug)]
pub struct HostDriver {
    accel: Accelerator,
    timeout_ticks: u64,
}

impl HostDriver {
    pub fn new(accel: Accelerator) -> Self {
        Self { accel, timeout_ticks: DEFAULT_TIMEOUT_TICKS }
    }

    /// Build the configured variant with the configured tick budget.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let accel = Accelerator::new(config.variant_spec()?)?;
        Ok(Self::new(accel).with_timeout(config.timeout_ticks()))
    }

    pub fn with_timeout(mut self, ticks: u64) -> Self {
        self.timeout_ticks = ticks;
        self
    }

    pub fn timeout_ticks(&self) -> u64 {
        self.timeout_ticks
    }

    pub fn accelerator(&self) -> &Accelerator {
        &self.accel
    }

    pub fn accelerator_mut(&mut self) -> &mut Accelerator {
        &mut self.accel
    }

    pub fn into_inner(self) -> Accelerator {
        self.accel
    }

    /// Operand values per vector.
    pub fn lanes(&self) -> usize {
        self.accel.spec().lanes()
    }

    fn check_count(&self, values: &[i32]) -> Result<(), HostError> {
        let expected = self.lanes();
        if values.len() != expected {
            return Err(HostError::InvalidOperandCount { expected, actual: values.len() });
        }
        Ok(())
    }

    fn write_packed(&mut self, values: &[i32], addr: impl Fn(usize) -> u32) {
        let width = self.accel.spec().lane_width();
        let truncated = truncated_lanes(values, width);
        if truncated > 0 {
            log::trace!(
                "{}: {} of {} values truncated to {} bits",
                self.accel.spec().name,
                truncated,
                values.len(),
                width
            );
        }
        let words = pack_lanes(values, width);
        for (k, word) in words.into_iter().enumerate() {
            self.accel.write(addr(k), word);
        }
    }

    /// Load the input vector. Values are truncated to the lane width.
    pub fn set_inputs(&mut self, values: &[i32]) -> Result<(), HostError> {
        self.check_count(values)?;
        self.write_packed(values, input_addr);
        Ok(())
    }

    /// Load the weight vector. Values are truncated to the lane width.
    pub fn set_weights(&mut self, values: &[i32]) -> Result<(), HostError> {
        self.check_count(values)?;
        let n = self.accel.registers().operand_registers();
        self.write_packed(values, |k| weight_addr(n, k));
        Ok(())
    }

    pub fn set_bias(&mut self, bias: i32) -> Result<(), HostError> {
        if !self.accel.registers().has_bias() {
            return Err(HostError::NoBiasRegister);
        }
        self.accel.write(BIAS_ADDR, bias as u32);
        Ok(())
    }

    fn status(&self) -> u32 {
        self.accel.read(STATUS_ADDR)
    }

    pub fn is_ready(&self) -> bool {
        self.status() & status::READY != 0
    }

    pub fn is_done(&self) -> bool {
        self.status() & status::DONE != 0
    }

    pub fn is_busy(&self) -> bool {
        self.status() & status::BUSY != 0
    }

    /// Pulse START.
    ///
    /// Fails with [`HostError::Busy`] while a computation is in flight or a
    /// reset is settling. A finished result that has not yet retired to
    /// IDLE is retired first.
    pub fn start(&mut self) -> Result<(), HostError> {
        if self.is_busy() || !(self.is_ready() || self.is_done()) {
            return Err(HostError::Busy);
        }
        if !self.is_ready() {
            self.accel.tick();
            if !self.is_ready() {
                return Err(HostError::Busy);
            }
        }
        self.accel.write(CONTROL_ADDR, control::START);
        Ok(())
    }

    /// Tick until DONE is set and BUSY is clear.
    ///
    /// Always ticks at least once so the START pulse is observed before
    /// STATUS is trusted. Returns the number of ticks taken.
    pub fn wait_done(&mut self) -> Result<u64, HostError> {
        for n in 1..=self.timeout_ticks {
            self.accel.tick();
            if self.is_done() && !self.is_busy() {
                return Ok(n);
            }
        }
        log::debug!(
            "{}: wait_done timed out after {} ticks",
            self.accel.spec().name,
            self.timeout_ticks
        );
        Err(HostError::Timeout(self.timeout_ticks))
    }

    /// RESULT, sign-extended from its width.
    pub fn result(&self) -> i32 {
        self.accel.result_signed()
    }

    /// Pulse RESET and tick until READY.
    pub fn reset(&mut self) -> Result<(), HostError> {
        self.accel.write(CONTROL_ADDR, control::RESET);
        for _ in 0..self.timeout_ticks {
            self.accel.tick();
            if self.is_ready() {
                return Ok(());
            }
        }
        Err(HostError::Timeout(self.timeout_ticks))
    }

    /// Load operands, run one computation and return the result.
    ///
    /// A zero bias is accepted on variants without a BIAS register.
    pub fn infer(&mut self, inputs: &[i32], weights: &[i32], bias: i32) -> Result<i32, HostError> {
        self.set_inputs(inputs)?;
        self.set_weights(weights)?;
        if self.accel.registers().has_bias() {
            self.set_bias(bias)?;
        } else if bias != 0 {
            return Err(HostError::NoBiasRegister);
        }
        self.start()?;
        self.wait_done()?;
        Ok(self.result())
    }

    /// Dot product of arbitrary length, computed one lane-sized chunk at a
    /// time with zero bias and summed on the host.
    ///
    /// Each chunk result is taken after the variant's output slice, so this
    /// is exact only for variants with no output shift and chunk sums that
    /// fit RESULT.
    pub fn dot_chunked(&mut self, inputs: &[i32], weights: &[i32]) -> Result<i64, HostError> {
        if inputs.len() != weights.len() {
            return Err(HostError::InvalidOperandCount {
                expected: inputs.len(),
                actual: weights.len(),
            });
        }
        let lanes = self.lanes();
        let mut x = vec![0; lanes];
        let mut w = vec![0; lanes];
        let mut sum = 0i64;

        for (xs, ws) in inputs.chunks(lanes).zip(weights.chunks(lanes)) {
            x.fill(0);
            w.fill(0);
            x[..xs.len()].copy_from_slice(xs);
            w[..ws.len()].copy_from_slice(ws);
            sum += self.infer(&x, &w, 0)? as i64;
        }

        log::debug!(
            "{}: chunked dot over {} values = {}",
            self.accel.spec().name,
            inputs.len(),
            sum
        );
        Ok(sum)
    }
}
