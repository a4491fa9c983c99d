//! Binary adder tree for the dot-product reduction.
//!
//! Level 0 holds the per-lane products. Each following level sums adjacent
//! pairs `(2i, 2i + 1)` of the level before it until one value remains:
//!
//! ```text
//! level 0:  p0   p1   p2   p3   p4   p5   p6   p7      (2W bits)
//!            \   /     \   /     \   /     \   /
//! level 1:   s0        s1        s2        s3          (2W + 1 bits)
//!              \      /            \      /
//! level 2:       s0'                 s1'               (2W + 2 bits)
//!                   \               /
//! level 3:              mac_sum                        (2W + 3 bits)
//! ```
//!
//! Each level grows one bit, so the root needs `2W + ceil(log2 N)` bits and
//! never overflows. Values are carried in `i128`, which holds any tree the
//! variant validation accepts.
//!
//! When a level has an odd count, the last element has no partner. The
//! [`OddLanePolicy`] decides the shape: carry it up unchanged, or pad level 0
//! with zero lanes to the next power of two. Both give the same sum; neither
//! ever counts an element twice.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Inline capacity covering the common 16-lane tree without allocating.
type Level = SmallVec<[i128; 16]>;

/// Handling of an unpaired element at an odd-sized level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OddLanePolicy {
    /// The unpaired element moves to the next level unchanged.
    #[default]
    PassThrough,
    /// Level 0 is padded with zero lanes up to the next power of two.
    ZeroPad,
}

/// `ceil(log2(n))`, with `ceil_log2(0) == ceil_log2(1) == 0`.
#[inline]
pub fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

/// Shape of a reduction tree over a fixed number of lanes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReductionTree {
    lanes: usize,
    policy: OddLanePolicy,
    /// Element count at each level, level 0 first, ending with 1.
    level_sizes: Vec<usize>,
}

impl ReductionTree {
    /// Build the tree shape for `lanes` inputs (at least one).
    pub fn new(lanes: usize, policy: OddLanePolicy) -> Self {
        let lanes = lanes.max(1);
        let mut size = match policy {
            OddLanePolicy::PassThrough => lanes,
            OddLanePolicy::ZeroPad => lanes.next_power_of_two(),
        };

        let mut level_sizes = vec![size];
        while size > 1 {
            size = size.div_ceil(2);
            level_sizes.push(size);
        }

        Self { lanes, policy, level_sizes }
    }

    pub fn lanes(&self) -> usize {
        self.lanes
    }

    pub fn policy(&self) -> OddLanePolicy {
        self.policy
    }

    /// Number of adder levels.
    pub fn depth(&self) -> usize {
        self.level_sizes.len() - 1
    }

    pub fn level_sizes(&self) -> &[usize] {
        &self.level_sizes
    }

    /// Bit width of an element at `level`, given the product width.
    pub fn level_width(product_width: u32, level: usize) -> u32 {
        product_width + level as u32
    }

    /// Width needed at the root.
    pub fn accumulator_width(&self, product_width: u32) -> u32 {
        product_width + ceil_log2(self.lanes)
    }

    /// Every level of the reduction, level 0 first.
    ///
    /// `products` shorter than the lane count are zero-extended; extra
    /// products are ignored.
    pub fn levels(&self, products: &[i128]) -> Vec<Level> {
        let mut level: Level = (0..self.level_sizes[0])
            .map(|i| if i < self.lanes { products.get(i).copied().unwrap_or(0) } else { 0 })
            .collect();

        let mut levels = Vec::with_capacity(self.level_sizes.len());
        while level.len() > 1 {
            let next: Level = level.chunks(2).map(|pair| pair.iter().sum::<i128>()).collect();
            levels.push(level);
            level = next;
        }
        levels.push(level);
        levels
    }

    /// Sum the products down to the root.
    pub fn reduce(&self, products: &[i128]) -> i128 {
        self.levels(products)
            .last()
            .and_then(|root| root.first().copied())
            .unwrap_or(0)
    }
}
