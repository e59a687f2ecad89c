// src/core/storage/hll.rs

//! A dense HyperLogLog estimator backing the PF* command family.

use murmur3::murmur3_x64_128;
use std::io::Cursor;

/// A HyperLogLog cardinality estimator with 2^14 registers.
/// Only the dense representation is implemented.
#[derive(Debug, Clone, PartialEq)]
pub struct HyperLogLog {
    registers: Box<[u8; Self::REGISTER_COUNT]>,
    alpha: f64,
}

impl Default for HyperLogLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperLogLog {
    pub const REGISTER_COUNT: usize = 16384; // 2^14

    pub fn new() -> Self {
        const M: f64 = 16384.0;
        Self {
            registers: Box::new([0; Self::REGISTER_COUNT]),
            alpha: 0.7213 / (1.0 + 1.079 / M), // alpha for m = 16384
        }
    }

    /// Observes an element. Returns true if any register changed, which is
    /// what `PFADD` reports.
    pub fn add(&mut self, item: &[u8]) -> bool {
        let hash = murmur3_x64_128(&mut Cursor::new(item), 0).unwrap_or_default();
        let hash_high = (hash >> 64) as u64;

        // First 14 bits select the register.
        let index = (hash_high >> 50) as usize;

        // The remaining 50 bits count leading zeros.
        let remaining = hash_high << 14;
        let rho = (remaining.leading_zeros() + 1) as u8;

        if rho > self.registers[index] {
            self.registers[index] = rho;
            true
        } else {
            false
        }
    }

    /// Folds another estimator into this one, register by register.
    pub fn merge(&mut self, other: &HyperLogLog) {
        for (mine, theirs) in self.registers.iter_mut().zip(other.registers.iter()) {
            *mine = (*mine).max(*theirs);
        }
    }

    /// The cardinality estimate with the standard small/large range corrections.
    pub fn count(&self) -> u64 {
        const M: f64 = 16384.0;
        let sum: f64 = self
            .registers
            .iter()
            .map(|&register| (2.0_f64).powi(-(register as i32)))
            .sum();

        let estimate = self.alpha * M * M / sum;

        // Small range correction.
        if estimate <= 2.5 * M {
            let zeros = self.registers.iter().filter(|&&r| r == 0).count() as f64;
            if zeros > 0.0 {
                return (M * (M / zeros).ln()) as u64;
            }
        }

        // Large range correction for 64-bit hashes.
        const TWO_POW_64: f64 = 1.844_674_407_370_955_2e19;
        if estimate > (1.0 / 30.0) * TWO_POW_64 {
            return ((-TWO_POW_64) * (1.0 - estimate / TWO_POW_64).ln()) as u64;
        }

        estimate as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_estimator_counts_zero() {
        assert_eq!(HyperLogLog::new().count(), 0);
    }

    #[test]
    fn add_reports_register_changes() {
        let mut hll = HyperLogLog::new();
        assert!(hll.add(b"element"));
        assert!(!hll.add(b"element"));
    }

    #[test]
    fn estimate_is_within_expected_error() {
        let mut hll = HyperLogLog::new();
        let n = 10_000u32;
        for i in 0..n {
            hll.add(format!("element-{i}").as_bytes());
        }
        let estimate = hll.count() as f64;
        let error = (estimate - n as f64).abs() / n as f64;
        // The standard error for m=16384 is ~0.81%; 5% is a generous bound.
        assert!(error < 0.05, "estimate {estimate} too far from {n}");
    }

    #[test]
    fn merge_is_a_union() {
        let mut left = HyperLogLog::new();
        let mut right = HyperLogLog::new();
        for i in 0..1000 {
            left.add(format!("left-{i}").as_bytes());
            right.add(format!("right-{i}").as_bytes());
        }
        let separate = left.count();
        left.merge(&right);
        assert!(left.count() > separate);
    }
}
