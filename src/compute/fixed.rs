//! Q16.16 fixed-point arithmetic and the scalar multiply-add pipeline.
//!
//! # Format
//!
//! A Q16.16 value is an `i32` read as `raw / 2^16`. Multiplying two Q16.16
//! values gives a Q32.32 product in 64 bits, which is shifted right by
//! [`FRAC_BITS`] to get back to Q16.16 before the bias is added:
//!
//! ```text
//! product = input * weight            (i64, exact)
//! scaled  = product >> 16             (arithmetic, rounds toward -inf)
//! sum     = scaled + bias             (i64)
//! result  = sum[31:0]                 (truncates, wraps on overflow)
//! ```
//!
//! Results are exact only while `|input * weight| < 2^47` and the sum stays
//! inside `i32`; outside that range the low 32 bits are kept without any
//! saturation.

use std::fmt;

use super::Pipeline;
use crate::device::{RegisterFile, RegisterKind};

/// Fractional bits in Q16.16.
pub const FRAC_BITS: u32 = 16;

/// Raw value of 1.0.
pub const ONE: i32 = 1 << FRAC_BITS;

/// `truncate32(((input * weight) >> FRAC_BITS) + bias)` on raw Q16.16 words.
#[inline]
pub fn scalar_mac(input: i32, weight: i32, bias: i32) -> i32 {
    let product = input as i64 * weight as i64;
    let scaled = product >> FRAC_BITS;
    let sum = scaled + bias as i64;
    sum as i32
}

/// A Q16.16 fixed-point number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Fixed(i32);

impl Fixed {
    pub const ZERO: Fixed = Fixed(0);
    pub const ONE: Fixed = Fixed(ONE);

    #[inline]
    pub const fn from_bits(raw: i32) -> Self {
        Fixed(raw)
    }

    #[inline]
    pub const fn to_bits(self) -> i32 {
        self.0
    }

    /// Integer part only, e.g. `Fixed::from_int(3) == 3.0`.
    #[inline]
    pub const fn from_int(value: i16) -> Self {
        Fixed((value as i32) << FRAC_BITS)
    }

    /// Host-side conversion; truncates toward zero like a C cast and
    /// saturates outside the representable range.
    pub fn from_f64(value: f64) -> Self {
        Fixed((value * ONE as f64) as i32)
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / ONE as f64
    }

    /// `self * weight + bias` with the pipeline's wrap semantics.
    #[inline]
    pub fn mul_add(self, weight: Fixed, bias: Fixed) -> Fixed {
        Fixed(scalar_mac(self.0, weight.0, bias.0))
    }
}

impl fmt::Display for Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_f64())
    }
}

/// Scalar pipeline: `RESULT = INPUT * WEIGHT + BIAS` in Q16.16.
///
/// Reads word 0 of the input and weight vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedPointAlu;

impl FixedPointAlu {
    pub fn compute(&self, input: Fixed, weight: Fixed, bias: Fixed) -> Fixed {
        input.mul_add(weight, bias)
    }
}

impl Pipeline for FixedPointAlu {
    fn name(&self) -> &'static str {
        "fixed-point ALU"
    }

    fn evaluate(&self, regs: &RegisterFile) -> u32 {
        let input = Fixed::from_bits(regs.get(RegisterKind::Input(0)) as i32);
        let weight = Fixed::from_bits(regs.get(RegisterKind::Weight(0)) as i32);
        let bias = Fixed::from_bits(regs.bias_signed());
        self.compute(input, weight, bias).to_bits() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_one_times_two_plus_one() {
        let result = scalar_mac(0x0001_0000, 0x0002_0000, 0x0001_0000);
        assert_eq!(result, 0x0003_0000);
    }

    #[test]
    fn test_fractional_values() {
        let x = Fixed::from_f64(-1.5);
        let w = Fixed::from_f64(2.0);
        let b = Fixed::from_f64(0.25);
        assert_eq!(x.mul_add(w, b), Fixed::from_f64(-2.75));
        assert_eq!(x.mul_add(w, b).to_f64(), -2.75);
    }

    #[test]
    fn test_shift_rounds_toward_negative_infinity() {
        // -1 raw * 1 raw = -1, and -1 >> 16 stays -1 rather than 0.
        assert_eq!(scalar_mac(-1, 1, 0), -1);
        assert_eq!(scalar_mac(1, 1, 0), 0);
    }

    #[test]
    fn test_overflow_wraps() {
        // 32767.0 * 2.0 does not fit in Q16.16; the low 32 bits survive.
        let big = Fixed::from_int(i16::MAX);
        let two = Fixed::from_int(2);
        let wrapped = big.mul_add(two, Fixed::ZERO);
        assert_eq!(wrapped.to_bits(), ((i16::MAX as i64 * 2) << 16) as i32);
        assert!(wrapped.to_bits() < 0);
    }

    #[test]
    fn test_conversions() {
        assert_eq!(Fixed::from_f64(1.0), Fixed::ONE);
        assert_eq!(Fixed::from_int(-3).to_bits(), -3 * ONE);
        assert_eq!(Fixed::from_f64(0.5).to_bits(), 0x8000);
        // Truncation toward zero, like the firmware's cast.
        assert_eq!(Fixed::from_f64(-0.000_01).to_bits(), 0);
        assert_eq!(Fixed::from_f64(1.0e12).to_bits(), i32::MAX);
        assert_eq!(format!("{}", Fixed::from_f64(2.5)), "2.5");
    }

    proptest! {
        #[test]
        fn scalar_matches_reference(
            a in -(1i32 << 23)..(1i32 << 23),
            b in -(1i32 << 23)..(1i32 << 23),
            c in any::<i32>(),
        ) {
            let expected = (((a as i64 * b as i64) >> 16) + c as i64) as i32;
            prop_assert_eq!(scalar_mac(a, b, c), expected);
        }

        #[test]
        fn integer_inputs_are_exact(a in -150i16..150, b in -150i16..150, c in -1000i16..1000) {
            let result = Fixed::from_int(a).mul_add(Fixed::from_int(b), Fixed::from_int(c));
            prop_assert_eq!(result.to_bits(), (a as i32 * b as i32 + c as i32) << 16);
        }
    }
}
