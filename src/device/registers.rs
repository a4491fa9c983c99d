//! Host-visible register file.
//!
//! The register file owns every register of one accelerator instance. The
//! host writes CONTROL, BIAS and the operand words; STATUS and RESULT are
//! read-only on the bus and driven only by the engine through
//! [`RegisterFile::write_internal`].
//!
//! # CONTROL pulses
//!
//! START and RESET behave like a CSR write strobe: a host write with either
//! bit set latches a pulse that stays pending until the next tick consumes
//! it, even if a later write clears the stored level before that tick. The
//! stored CONTROL value itself is last-write-wins.

use std::fmt;
use std::ops::Range;

use super::lanes::{lane_mask, sign_extend};
use super::registers_spec::{
    self as spec, control, BIAS_ADDR, CONTROL_ADDR, CONTROL_WIDTH, REGISTER_STRIDE,
    REGISTER_WIDTH, RESULT_ADDR, STATUS_ADDR, STATUS_WIDTH,
};

/// Bus access mode of a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
}

/// Which register a slot holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegisterKind {
    Control,
    Status,
    Bias,
    Result,
    /// Input word `k`.
    Input(usize),
    /// Weight word `k`.
    Weight(usize),
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterKind::Control => write!(f, "CONTROL"),
            RegisterKind::Status => write!(f, "STATUS"),
            RegisterKind::Bias => write!(f, "BIAS"),
            RegisterKind::Result => write!(f, "RESULT"),
            RegisterKind::Input(k) => write!(f, "INPUTS[{}]", k),
            RegisterKind::Weight(k) => write!(f, "WEIGHTS[{}]", k),
        }
    }
}

/// Static description of one register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDef {
    pub kind: RegisterKind,
    /// Bus address
    pub offset: u32,
    /// Significant bits; the rest of the word reads as zero
    pub width: u32,
    pub access: Access,
    pub reset: u32,
}

impl RegisterDef {
    fn new(kind: RegisterKind, offset: u32, width: u32, access: Access, reset: u32) -> Self {
        Self { kind, offset, width, access, reset }
    }

    /// Mask a value to this register's width.
    #[inline]
    pub fn mask(&self, value: u32) -> u32 {
        value & lane_mask(self.width)
    }
}

impl fmt::Display for RegisterDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let access = match self.access {
            Access::ReadWrite => "RW",
            Access::ReadOnly => "RO",
        };
        write!(f, "0x{:02X} {} ({}b {})", self.offset, self.kind, self.width, access)
    }
}

/// Shape of a variant's register map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterLayout {
    /// Words per operand vector (inputs and weights each get this many)
    pub operand_registers: usize,
    /// BIAS width, or `None` when the variant has no bias term
    pub bias_width: Option<u32>,
    pub result_width: u32,
    /// STATUS value at power-on
    pub status_reset: u32,
}

/// Register storage for one accelerator.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    /// Register descriptors, sorted by address.
    defs: Vec<RegisterDef>,
    /// Current values, parallel to `defs`.
    values: Vec<u32>,
    /// Pulse bits written to CONTROL since the last tick.
    pending_pulses: u32,
    inputs: Range<usize>,
    weights: Range<usize>,
}

impl RegisterFile {
    /// Build the register map for a layout, with every register at its reset value.
    pub fn new(layout: RegisterLayout) -> Self {
        let mut defs = vec![
            RegisterDef::new(
                RegisterKind::Control,
                CONTROL_ADDR,
                CONTROL_WIDTH,
                Access::ReadWrite,
                0,
            ),
            RegisterDef::new(
                RegisterKind::Status,
                STATUS_ADDR,
                STATUS_WIDTH,
                Access::ReadOnly,
                layout.status_reset,
            ),
        ];
        if let Some(width) = layout.bias_width {
            defs.push(RegisterDef::new(RegisterKind::Bias, BIAS_ADDR, width, Access::ReadWrite, 0));
        }
        defs.push(RegisterDef::new(
            RegisterKind::Result,
            RESULT_ADDR,
            layout.result_width,
            Access::ReadOnly,
            0,
        ));

        let n = layout.operand_registers;
        let input_start = defs.len();
        for k in 0..n {
            defs.push(RegisterDef::new(
                RegisterKind::Input(k),
                spec::input_addr(k),
                REGISTER_WIDTH,
                Access::ReadWrite,
                0,
            ));
        }
        let weight_start = defs.len();
        for k in 0..n {
            defs.push(RegisterDef::new(
                RegisterKind::Weight(k),
                spec::weight_addr(n, k),
                REGISTER_WIDTH,
                Access::ReadWrite,
                0,
            ));
        }

        let values = defs.iter().map(|d| d.reset).collect();
        Self {
            defs,
            values,
            pending_pulses: 0,
            inputs: input_start..weight_start,
            weights: weight_start..weight_start + n,
        }
    }

    /// Restore every register to its reset value and drop pending pulses.
    pub fn reset(&mut self) {
        for (value, def) in self.values.iter_mut().zip(&self.defs) {
            *value = def.reset;
        }
        self.pending_pulses = 0;
    }

    fn index_of(&self, address: u32) -> Option<usize> {
        if address % REGISTER_STRIDE != 0 {
            return None;
        }
        self.defs.binary_search_by_key(&address, |d| d.offset).ok()
    }

    fn index_of_kind(&self, kind: RegisterKind) -> Option<usize> {
        match kind {
            RegisterKind::Input(k) => self.inputs.clone().nth(k),
            RegisterKind::Weight(k) => self.weights.clone().nth(k),
            _ => self.defs.iter().position(|d| d.kind == kind),
        }
    }

    /// Descriptor of the register at `address`, if mapped.
    pub fn lookup(&self, address: u32) -> Option<&RegisterDef> {
        self.index_of(address).map(|i| &self.defs[i])
    }

    /// Address of a register, if this variant has it.
    pub fn address_of(&self, kind: RegisterKind) -> Option<u32> {
        self.index_of_kind(kind).map(|i| self.defs[i].offset)
    }

    /// Find a register by its display name (`"BIAS"`, `"INPUTS[2]"`, ...).
    pub fn find_by_name(&self, name: &str) -> Option<&RegisterDef> {
        self.defs
            .iter()
            .find(|d| d.kind.to_string().eq_ignore_ascii_case(name))
    }

    /// All register descriptors in address order.
    pub fn defs(&self) -> &[RegisterDef] {
        &self.defs
    }

    /// Bus read. Unmapped addresses read as zero.
    pub fn read(&self, address: u32) -> u32 {
        match self.index_of(address) {
            Some(i) => self.values[i],
            None => {
                log::trace!("read from unmapped address 0x{:02X}", address);
                0
            }
        }
    }

    /// Bus write from the host.
    ///
    /// Writes to read-only or unmapped addresses are dropped. Writes to
    /// CONTROL also latch any pulse bits for the next tick.
    pub fn write(&mut self, address: u32, value: u32) {
        let Some(i) = self.index_of(address) else {
            log::trace!("write to unmapped address 0x{:02X} ignored", address);
            return;
        };
        let def = self.defs[i];
        if def.access == Access::ReadOnly {
            log::trace!("write to read-only {} ignored", def.kind);
            return;
        }

        let value = def.mask(value);
        if def.kind == RegisterKind::Control {
            self.pending_pulses |= value & control::PULSE_MASK;
        }
        log::trace!("{} <= 0x{:08X}", def.kind, value);
        self.values[i] = value;
    }

    /// Engine-side write, bypassing bus access checks.
    ///
    /// Returns false if the variant has no such register.
    pub fn write_internal(&mut self, kind: RegisterKind, value: u32) -> bool {
        match self.index_of_kind(kind) {
            Some(i) => {
                self.values[i] = self.defs[i].mask(value);
                true
            }
            None => false,
        }
    }

    /// Read a register by kind. Missing registers read as zero.
    pub fn get(&self, kind: RegisterKind) -> u32 {
        self.index_of_kind(kind).map(|i| self.values[i]).unwrap_or(0)
    }

    /// Pulse bits written since the last tick, without consuming them.
    pub fn pending_pulses(&self) -> u32 {
        self.pending_pulses
    }

    /// Consume the pending pulse bits.
    pub fn take_pulses(&mut self) -> u32 {
        std::mem::take(&mut self.pending_pulses)
    }

    pub fn control(&self) -> u32 {
        self.get(RegisterKind::Control)
    }

    pub fn status(&self) -> u32 {
        self.get(RegisterKind::Status)
    }

    pub fn input_words(&self) -> &[u32] {
        &self.values[self.inputs.clone()]
    }

    pub fn weight_words(&self) -> &[u32] {
        &self.values[self.weights.clone()]
    }

    /// Number of words per operand vector.
    pub fn operand_registers(&self) -> usize {
        self.inputs.len()
    }

    pub fn has_bias(&self) -> bool {
        self.index_of_kind(RegisterKind::Bias).is_some()
    }

    /// BIAS sign-extended from its width. Zero when the variant has no bias.
    pub fn bias_signed(&self) -> i32 {
        match self.index_of_kind(RegisterKind::Bias) {
            Some(i) => sign_extend(self.values[i], self.defs[i].width),
            None => 0,
        }
    }

    /// RESULT sign-extended from its width.
    pub fn result_signed(&self) -> i32 {
        match self.index_of_kind(RegisterKind::Result) {
            Some(i) => sign_extend(self.values[i], self.defs[i].width),
            None => 0,
        }
    }

    /// Print the register map with current values.
    pub fn print_summary(&self) {
        for (def, value) in self.defs.iter().zip(&self.values) {
            println!("  {:<28} = 0x{:08X}", def.to_string(), value);
        }
    }
}
