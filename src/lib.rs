//! mac-accel-emu library
//!
//! Cycle-level emulation of register-mapped multiply-accumulate accelerators.

pub mod compute;
pub mod config;
pub mod device;
pub mod emu;
pub mod testing;
