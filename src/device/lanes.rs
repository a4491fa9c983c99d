//! Bit-slice helpers for packed operand registers.
//!
//! A packed register holds `K = 32 / lane_width` signed lanes. Lane `i` of a
//! vector lives in word `i / K`, at bits
//! `[(i % K) * lane_width, (i % K) * lane_width + lane_width)`:
//!
//! ```text
//! lane_width = 8, K = 4
//!
//!  31      24 23      16 15       8 7        0
//! +----------+----------+----------+----------+
//! |  lane 3  |  lane 2  |  lane 1  |  lane 0  |   word 0
//! +----------+----------+----------+----------+
//! |  lane 7  |  lane 6  |  lane 5  |  lane 4  |   word 1
//! +----------+----------+----------+----------+
//! ```
//!
//! Lane widths must divide 32; callers validate this when the variant is
//! configured. Out-of-range widths are clamped to `1..=32` here so the
//! helpers stay total.

use super::registers_spec::REGISTER_WIDTH;

/// Number of lanes one register holds.
#[inline]
pub fn lanes_per_register(lane_width: u32) -> usize {
    (REGISTER_WIDTH / lane_width.clamp(1, REGISTER_WIDTH)) as usize
}

/// Number of registers needed to hold `lanes` values.
#[inline]
pub fn registers_for(lanes: usize, lane_width: u32) -> usize {
    lanes.div_ceil(lanes_per_register(lane_width))
}

/// Mask covering the low `width` bits.
#[inline]
pub fn lane_mask(width: u32) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1u32 << width) - 1
    }
}

/// Sign-extend the low `width` bits of `value`.
#[inline]
pub fn sign_extend(value: u32, width: u32) -> i32 {
    if width == 0 {
        0
    } else if width >= 32 {
        value as i32
    } else {
        let shift = 32 - width;
        ((value << shift) as i32) >> shift
    }
}

/// Extract lane `lane_index` from the register that holds it.
///
/// Only the in-register position (`lane_index % K`) matters here; picking the
/// right register (`lane_index / K`) is the caller's job.
pub fn unpack_lane(register_value: u32, lane_index: usize, lane_width: u32) -> i32 {
    let offset = (lane_index % lanes_per_register(lane_width)) as u32 * lane_width;
    sign_extend((register_value >> offset) & lane_mask(lane_width), lane_width)
}

/// Pack signed values into register words, `K` per word.
///
/// Values that do not fit in `lane_width` bits keep only their low bits.
pub fn pack_lanes(values: &[i32], lane_width: u32) -> Vec<u32> {
    let per_reg = lanes_per_register(lane_width);
    let mut words = vec![0u32; registers_for(values.len(), lane_width)];

    for (i, &value) in values.iter().enumerate() {
        let offset = (i % per_reg) as u32 * lane_width;
        words[i / per_reg] |= (value as u32 & lane_mask(lane_width)) << offset;
    }

    words
}

/// Unpack `count` lanes from a run of register words.
///
/// Lanes past the end of `words` read as zero.
pub fn unpack_lanes(words: &[u32], count: usize, lane_width: u32) -> Vec<i32> {
    let per_reg = lanes_per_register(lane_width);
    (0..count)
        .map(|i| {
            let word = words.get(i / per_reg).copied().unwrap_or(0);
            unpack_lane(word, i, lane_width)
        })
        .collect()
}

/// Does `value` fit in a signed `width`-bit lane?
#[inline]
pub fn fits_signed(value: i64, width: u32) -> bool {
    match width {
        0 => false,
        64.. => true,
        _ => {
            let half = 1i64 << (width - 1);
            (-half..half).contains(&value)
        }
    }
}

/// How many of `values` lose bits when packed at `lane_width`.
pub fn truncated_lanes(values: &[i32], lane_width: u32) -> usize {
    values.iter().filter(|&&v| !fits_signed(v as i64, lane_width)).count()
}
