//! Tick-driven accelerator engine.
//!
//! The engine couples a [`RegisterFile`], a [`ControlFsm`] and a stateless
//! [`Pipeline`]. One call to [`Accelerator::tick`] is one clock edge:
//!
//! ```text
//!   host writes ──► RegisterFile ──► pending pulses ──► ControlFsm::transition
//!                        │                                     │
//!                        └──────► Pipeline::evaluate ──► capture? ──► RESULT
//!                                                              └──► STATUS
//! ```
//!
//! All register updates produced by a tick are computed from the snapshot
//! taken at the start of the tick and applied together at its end.
//!
//! # Usage
//!
//! ```
//! use mac_accel_emu::device::registers_spec::{control, status, CONTROL_ADDR, STATUS_ADDR};
//! use mac_accel_emu::device::VariantKind;
//! use mac_accel_emu::emu::Accelerator;
//!
//! let mut accel = Accelerator::builtin(VariantKind::Linear);
//! accel.write(CONTROL_ADDR, control::START);
//! accel.tick();
//! assert_eq!(accel.read(STATUS_ADDR), status::BUSY);
//! ```

use smallvec::SmallVec;

use super::fsm::{ControlFsm, ControlState, FsmInputs, FsmOutputs};
use crate::compute::{build_pipeline, Pipeline};
use crate::device::registers_spec::control;
use crate::device::{ConfigError, ControlKind, RegisterFile, RegisterKind, VariantKind, VariantSpec};

/// Register update produced by one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterWrite {
    Status(u32),
    Result(u32),
}

/// Result of evaluating one tick without applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    pub fsm: ControlFsm,
    pub outputs: FsmOutputs,
    pub writes: SmallVec<[RegisterWrite; 2]>,
}

/// Compute the next FSM state and register writes for one tick.
///
/// Pure: reads the snapshot in `regs` (including pending pulses) and
/// changes nothing.
pub fn tick(fsm: &ControlFsm, regs: &RegisterFile, pipeline: &dyn Pipeline) -> TickOutcome {
    let pulses = regs.pending_pulses();
    let inputs = FsmInputs {
        start: pulses & control::START != 0,
        reset: pulses & control::RESET != 0,
    };
    let (next, outputs) = fsm.transition(inputs);

    let mut writes = SmallVec::new();
    if outputs.capture {
        writes.push(RegisterWrite::Result(pipeline.evaluate(regs)));
    }
    writes.push(RegisterWrite::Status(outputs.status));

    TickOutcome { fsm: next, outputs, writes }
}

/// Operation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub ticks: u64,
    pub starts_accepted: u64,
    /// START pulses seen while the engine could not take them.
    pub starts_ignored: u64,
    pub resets: u64,
    pub results_committed: u64,
}

impl EngineStats {
    fn record(&mut self, outputs: &FsmOutputs) {
        self.ticks += 1;
        self.starts_accepted += outputs.start_accepted as u64;
        self.starts_ignored += outputs.start_ignored as u64;
        self.resets += outputs.reset_taken as u64;
        self.results_committed += outputs.capture as u64;
    }
}

/// One emulated accelerator instance.
#[derive(Debug)]
pub struct Accelerator {
    spec: VariantSpec,
    regs: RegisterFile,
    fsm: ControlFsm,
    pipeline: Box<dyn Pipeline>,
    stats: EngineStats,
}

impl Accelerator {
    /// Build an accelerator for a variant, validating it first.
    pub fn new(spec: VariantSpec) -> Result<Self, ConfigError> {
        spec.validate()?;
        let pipeline = build_pipeline(&spec.pipeline)?;
        let regs = RegisterFile::new(spec.register_layout());
        let fsm = ControlFsm::new(spec.control);
        log::debug!("accelerator '{}' ready ({})", spec.name, pipeline.name());
        Ok(Self { spec, regs, fsm, pipeline, stats: EngineStats::default() })
    }

    /// Build one of the built-in variants.
    pub fn builtin(kind: VariantKind) -> Self {
        match Self::new(VariantSpec::builtin(kind)) {
            Ok(accel) => accel,
            Err(e) => unreachable!("built-in variant {} failed validation: {}", kind, e),
        }
    }

    pub fn spec(&self) -> &VariantSpec {
        &self.spec
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    /// Host bus read.
    pub fn read(&self, address: u32) -> u32 {
        self.regs.read(address)
    }

    /// Host bus write. Takes effect on the next tick.
    pub fn write(&mut self, address: u32, value: u32) {
        self.regs.write(address, value);
    }

    /// What the tick would do, without applying it.
    pub fn peek_tick(&self) -> TickOutcome {
        tick(&self.fsm, &self.regs, self.pipeline.as_ref())
    }

    /// Advance one clock edge.
    pub fn tick(&mut self) -> FsmOutputs {
        let outcome = self.peek_tick();
        let before = self.fsm.state();

        for write in &outcome.writes {
            match *write {
                RegisterWrite::Status(v) => {
                    self.regs.write_internal(RegisterKind::Status, v);
                }
                RegisterWrite::Result(v) => {
                    self.regs.write_internal(RegisterKind::Result, v);
                    if self.spec.control != ControlKind::Combinational {
                        log::debug!("{}: RESULT <= 0x{:08X}", self.spec.name, v);
                    }
                }
            }
        }
        self.regs.take_pulses();
        self.fsm = outcome.fsm;
        self.stats.record(&outcome.outputs);

        if before != self.fsm.state() {
            log::trace!(
                "{}: tick {} {} -> {} status=0x{:X}",
                self.spec.name,
                self.stats.ticks,
                before,
                self.fsm.state(),
                outcome.outputs.status
            );
        }
        if outcome.outputs.start_ignored {
            log::trace!("{}: START ignored in {}", self.spec.name, before);
        }

        outcome.outputs
    }

    /// Run `ticks` clock edges.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.tick();
        }
    }

    /// Tick until `pred` holds for STATUS, up to `max_ticks`.
    ///
    /// Returns the number of ticks taken, or `None` on timeout.
    pub fn run_until(&mut self, max_ticks: u64, pred: impl Fn(u32) -> bool) -> Option<u64> {
        for n in 0..max_ticks {
            self.tick();
            if pred(self.status()) {
                return Some(n + 1);
            }
        }
        None
    }

    pub fn state(&self) -> ControlState {
        self.fsm.state()
    }

    pub fn fsm(&self) -> &ControlFsm {
        &self.fsm
    }

    pub fn status(&self) -> u32 {
        self.regs.status()
    }

    /// Raw RESULT register.
    pub fn result(&self) -> u32 {
        self.regs.get(RegisterKind::Result)
    }

    /// RESULT sign-extended from its width.
    pub fn result_signed(&self) -> i32 {
        self.regs.result_signed()
    }

    /// Pipeline output for the current register contents.
    pub fn evaluate(&self) -> u32 {
        self.pipeline.evaluate(&self.regs)
    }

    /// Ticks since construction or the last power-on reset.
    pub fn cycle(&self) -> u64 {
        self.stats.ticks
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Return every register and the FSM to power-on values.
    pub fn power_on_reset(&mut self) {
        self.regs.reset();
        self.fsm = ControlFsm::new(self.spec.control);
        self.stats = EngineStats::default();
    }

    /// Print engine status.
    pub fn print_status(&self) {
        println!("Accelerator: {}", self.spec);
        println!("Pipeline: {}", self.pipeline.name());
        println!("State: {} (status=0x{:X})", self.fsm.state(), self.status());
        println!("Cycles: {}", self.stats.ticks);
        println!(
            "Starts: {} accepted, {} ignored",
            self.stats.starts_accepted, self.stats.starts_ignored
        );
        println!("Resets: {}", self.stats.resets);
        println!("Results committed: {}", self.stats.results_committed);
        println!();
        println!("Registers:");
        self.regs.print_summary();
    }
}
