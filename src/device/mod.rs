//! Register map and variant definitions for the accelerator blocks.
//!
//! This module provides:
//! - The CSR-style register map (CONTROL, STATUS, BIAS, RESULT, operands)
//! - Lane packing helpers for registers that hold several narrow values
//! - The built-in variants and validation of custom ones
//!
//! # Example
//!
//! ```
//! use mac_accel_emu::device::{RegisterFile, VariantKind, VariantSpec};
//! use mac_accel_emu::device::lanes::pack_lanes;
//!
//! let spec = VariantSpec::builtin(VariantKind::PackedLogistic);
//! let mut regs = RegisterFile::new(spec.register_layout());
//!
//! // 16 signed bytes travel in four 32-bit words.
//! let words = pack_lanes(&[1, -1, 2, -2], 8);
//! regs.write(0x10, words[0]);
//! assert_eq!(regs.input_words()[0], 0xFE02_FF01);
//! ```

pub mod lanes;
pub mod registers;
pub mod registers_spec;
pub mod variant;

pub use registers::{Access, RegisterDef, RegisterFile, RegisterKind, RegisterLayout};
pub use variant::{ConfigError, ControlKind, DotSpec, PipelineSpec, VariantKind, VariantSpec};
