//! Register map constants for the accelerator blocks.
//!
//! Every register occupies one 32-bit bus word, 4 bytes apart, in the same
//! layout for all variants:
//!
//! ```text
//! 0x00  CONTROL     [2]=MODE  [1]=RESET [0]=START
//! 0x04  STATUS      [2]=BUSY  [1]=DONE  [0]=READY
//! 0x08  BIAS        (absent on variants without a bias term)
//! 0x0C  RESULT
//! 0x10  INPUTS[0..n)
//!  ...  WEIGHTS[0..n)   directly after the last input word
//! ```
//!
//! Narrow registers (CONTROL, STATUS, an 8-bit BIAS, a 16-bit RESULT) still
//! take a full word slot; the unused upper bits read as zero.

/// Address stride between consecutive registers.
pub const REGISTER_STRIDE: u32 = 4;

/// Width of a bus word, and of every operand register.
pub const REGISTER_WIDTH: u32 = 32;

pub const CONTROL_ADDR: u32 = 0x00;
pub const STATUS_ADDR: u32 = 0x04;
pub const BIAS_ADDR: u32 = 0x08;
pub const RESULT_ADDR: u32 = 0x0C;

/// First operand word. Weight words follow the input words.
pub const OPERAND_BASE: u32 = 0x10;

pub const CONTROL_WIDTH: u32 = 8;
pub const STATUS_WIDTH: u32 = 8;

/// CONTROL register bits.
pub mod control {
    /// Start one compute operation. Write-strobed pulse.
    pub const START: u32 = 1 << 0;
    /// Return the engine to idle. Write-strobed pulse.
    pub const RESET: u32 = 1 << 1;
    /// Level bit, stored but reserved.
    pub const MODE: u32 = 1 << 2;

    /// Bits latched as one-shot pulses on write.
    pub const PULSE_MASK: u32 = START | RESET;
}

/// STATUS register bits.
pub mod status {
    pub const READY: u32 = 1 << 0;
    pub const DONE: u32 = 1 << 1;
    pub const BUSY: u32 = 1 << 2;
}

/// Address of input word `k`.
#[inline]
pub const fn input_addr(k: usize) -> u32 {
    OPERAND_BASE + (k as u32) * REGISTER_STRIDE
}

/// Address of weight word `k`, given how many input words precede it.
#[inline]
pub const fn weight_addr(input_words: usize, k: usize) -> u32 {
    input_addr(input_words + k)
}
