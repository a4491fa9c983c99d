//! Clocked emulation of the accelerator blocks.
//!
//! This module provides the engine that advances an accelerator one tick at
//! a time:
//! - The control FSM as an explicit transition table
//! - The tick engine that applies FSM outputs and commits RESULT
//! - A host driver that speaks the register protocol
//!
//! # Example
//!
//! ```
//! use mac_accel_emu::device::VariantKind;
//! use mac_accel_emu::emu::{Accelerator, HostDriver};
//!
//! let mut host = HostDriver::new(Accelerator::builtin(VariantKind::PackedLogistic));
//! let inputs = [1; 16];
//! let weights = [16; 16];
//! // (16 * 16 + 0) >> 4 = 16
//! assert_eq!(host.infer(&inputs, &weights, 0).unwrap(), 16);
//! ```

pub mod engine;
pub mod fsm;
pub mod host;

pub use engine::{tick, Accelerator, EngineStats, RegisterWrite, TickOutcome};
pub use fsm::{ControlFsm, ControlState, FsmInputs, FsmOutputs};
pub use host::{HostDriver, HostError, DEFAULT_TIMEOUT_TICKS};
