//! Arbitrary-width lexicographic keys for partition refinement.
//!
//! A `BaseValue` is a bit string built most-significant-field first; two
//! values built with the same field layout compare like big integers. The
//! word buffer lives inline for the common (<193 bit) case.

use smallvec::SmallVec;

#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct BaseValue {
    words: SmallVec<u64, 3>,
    used: u32,
}

fn mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

impl BaseValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.used = 0;
    }

    pub fn bit_len(&self) -> u32 {
        self.used
    }

    /// Append `bits` bits of `data`, most significant first.
    pub fn add(&mut self, bits: u32, data: u64) {
        debug_assert!(bits <= 64);
        debug_assert!(bits == 64 || data <= mask(bits));
        let mut bits = bits;
        let mut data = data & mask(bits);
        while bits > 0 {
            let slot = (self.used / 64) as usize;
            if slot == self.words.len() {
                self.words.push(0);
            }
            let free = 64 - self.used % 64;
            let take = bits.min(free);
            let chunk = (data >> (bits - take)) & mask(take);
            self.words[slot] |= chunk << (free - take);
            self.used += take;
            bits -= take;
            data &= mask(bits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_order_is_significance_order() {
        let mut a = BaseValue::new();
        a.add(8, 7);
        a.add(32, 0);
        let mut b = BaseValue::new();
        b.add(8, 6);
        b.add(32, u32::MAX as u64);
        assert!(a > b);
    }

    #[test]
    fn values_span_words() {
        let mut a = BaseValue::new();
        let mut b = BaseValue::new();
        for _ in 0..3 {
            a.add(60, 0x0fff_ffff_ffff_fffe);
            b.add(60, 0x0fff_ffff_ffff_fffe);
        }
        assert_eq!(a, b);
        a.add(4, 2);
        b.add(4, 3);
        assert!(a < b);
        assert_eq!(a.bit_len(), 184);
    }

    #[test]
    fn full_width_chunk() {
        let mut a = BaseValue::new();
        a.add(64, u64::MAX);
        a.add(1, 0);
        let mut b = BaseValue::new();
        b.add(64, u64::MAX);
        b.add(1, 1);
        assert!(a < b);
    }
}
