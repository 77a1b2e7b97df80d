//! Register bookkeeping for the code generator.
//!
//! The allocator is greedy: it always hands out the lowest free register and never evicts
//! on its own. Running low is handled by the caller spilling results to the machine stack,
//! so the file only has to answer "which registers are free" in a stable order.

/// Type for register IDs.
pub type RegId = u8;

/// Maximum number of allocatable registers.
pub const MAX_REGISTERS: usize = 64;

/// Bit set for efficiently tracking register sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegBitSet(u64);

impl RegBitSet {
    /// Create empty register set.
    pub const fn new() -> Self {
        Self(0)
    }

    /// Set holding registers `0..count`.
    pub fn first_n(count: usize) -> Self {
        if count >= MAX_REGISTERS {
            Self(u64::MAX)
        } else {
            Self((1u64 << count) - 1)
        }
    }

    pub fn contains(&self, reg: RegId) -> bool {
        (reg as usize) < MAX_REGISTERS && self.0 & (1u64 << reg) != 0
    }

    pub fn set(&mut self, reg: RegId) {
        if (reg as usize) < MAX_REGISTERS {
            self.0 |= 1u64 << reg;
        }
    }

    pub fn clear(&mut self, reg: RegId) {
        if (reg as usize) < MAX_REGISTERS {
            self.0 &= !(1u64 << reg);
        }
    }

    /// Lowest register in the set.
    pub fn find_first(&self) -> Option<RegId> {
        if self.0 == 0 {
            None
        } else {
            Some(self.0.trailing_zeros() as RegId)
        }
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Registers of the set in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RegId> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let reg = bits.trailing_zeros() as RegId;
            bits &= bits - 1;
            Some(reg)
        })
    }
}

/// Free-register set of one function.
///
/// Seeded with every allocatable register; `take` removes the lowest one, `release`
/// returns a register to the pool.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    count: usize,
    allocatable: RegBitSet,
    free: RegBitSet,
}

impl RegisterFile {
    pub fn new(count: usize) -> Self {
        let count = count.min(MAX_REGISTERS);
        let allocatable = RegBitSet::first_n(count);
        Self {
            count,
            allocatable,
            free: allocatable,
        }
    }

    /// Number of allocatable registers.
    pub fn register_count(&self) -> usize {
        self.count
    }

    /// Mark every register free again, done at the start of each function.
    pub fn reset(&mut self) {
        self.free = self.allocatable;
    }

    /// Take the lowest free register.
    pub fn take(&mut self) -> Option<RegId> {
        let reg = self.free.find_first()?;
        self.free.clear(reg);
        Some(reg)
    }

    /// Return a register to the free pool. Registers outside the file are ignored.
    pub fn release(&mut self, reg: RegId) {
        if self.allocatable.contains(reg) {
            self.free.set(reg);
        }
    }

    /// Take a specific register out of the pool.
    pub fn reserve(&mut self, reg: RegId) {
        self.free.clear(reg);
    }

    pub fn is_free(&self, reg: RegId) -> bool {
        self.free.contains(reg)
    }

    pub fn free_count(&self) -> usize {
        self.free.count() as usize
    }

    /// Registers currently holding values, ascending.
    pub fn used_regs(&self) -> Vec<RegId> {
        let mut used = self.allocatable;
        used.0 &= !self.free.0;
        used.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitset_iteration_is_ascending() {
        let mut set = RegBitSet::new();
        set.set(5);
        set.set(1);
        set.set(9);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![1, 5, 9]);
        assert_eq!(set.find_first(), Some(1));
        set.clear(1);
        assert_eq!(set.find_first(), Some(5));
        assert_eq!(set.count(), 2);
    }

    #[test]
    fn test_take_lowest_first() {
        let mut file = RegisterFile::new(4);
        assert_eq!(file.take(), Some(0));
        assert_eq!(file.take(), Some(1));
        file.release(0);
        assert_eq!(file.take(), Some(0));
        assert_eq!(file.free_count(), 2);
        assert_eq!(file.used_regs(), vec![0, 1]);
    }

    #[test]
    fn test_exhaustion_and_reset() {
        let mut file = RegisterFile::new(2);
        assert!(file.take().is_some());
        assert!(file.take().is_some());
        assert_eq!(file.take(), None);

        file.reset();
        assert_eq!(file.free_count(), 2);
        assert!(file.used_regs().is_empty());
    }

    #[test]
    fn test_release_outside_file_is_ignored() {
        let mut file = RegisterFile::new(3);
        file.release(7);
        assert_eq!(file.free_count(), 3);
        assert!(!file.is_free(7));
    }

    #[test]
    fn test_reserve_specific() {
        let mut file = RegisterFile::new(3);
        file.reserve(1);
        assert!(!file.is_free(1));
        assert_eq!(file.take(), Some(0));
        assert_eq!(file.take(), Some(2));
    }
}
