use alloc::vec;
use alloc::vec::Vec;

use super::{get_u64, put_u64};
use crate::BLOCK_BITS;

/// 单块位图，以 64 位为一组
///
/// 第 `i` 位位于第 `i / 8` 字节的第 `i % 8` 位，按小端序读成组后即为
/// 第 `i / 64` 组的第 `i % 64` 位。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    groups: Vec<u64>,
}

impl Default for Bitmap {
    fn default() -> Self {
        Self {
            groups: vec![0; BLOCK_BITS / 64],
        }
    }
}

impl Bitmap {
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            groups: (0..BLOCK_BITS / 64).map(|i| get_u64(buf, i * 8)).collect(),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        for (i, &bits) in self.groups.iter().enumerate() {
            put_u64(buf, i * 8, bits);
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.groups.len() * 64
    }

    #[inline]
    pub fn get(&self, bit: usize) -> bool {
        self.groups[bit / 64] & (1 << (bit % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, bit: usize) {
        self.groups[bit / 64] |= 1 << (bit % 64);
    }

    /// 清除一位，返回它原先是否被置位
    #[inline]
    pub fn clear(&mut self, bit: usize) -> bool {
        let was_set = self.get(bit);
        self.groups[bit / 64] &= !(1 << (bit % 64));
        was_set
    }

    /// `[from, end)` 内第一个为 0 的位
    pub fn first_clear(&self, from: usize, end: usize) -> Option<usize> {
        let end = end.min(self.capacity());
        if from >= end {
            return None;
        }

        (from / 64..end.div_ceil(64))
            .find_map(|group_index| {
                let mut bits = self.groups[group_index];
                if group_index == from / 64 {
                    // 起点之前的位视为已占用
                    bits |= (1 << (from % 64)) - 1;
                }
                (bits != u64::MAX).then(|| group_index * 64 + bits.trailing_ones() as usize)
            })
            .filter(|&bit| bit < end)
    }

    /// `[0, end)` 内被置位的数量
    pub fn count_set(&self, end: usize) -> usize {
        let end = end.min(self.capacity());
        let full = end / 64;
        let mut count: usize = self.groups[..full]
            .iter()
            .map(|bits| bits.count_ones() as usize)
            .sum();
        if end % 64 != 0 {
            count += (self.groups[full] & ((1 << (end % 64)) - 1)).count_ones() as usize;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_order_matches_disk() {
        let mut bitmap = Bitmap::default();
        bitmap.set(0);
        bitmap.set(9);
        bitmap.set(70);

        let mut buf = [0u8; crate::BLOCK_SIZE];
        bitmap.encode(&mut buf);
        assert_eq!(buf[0], 0b1);
        assert_eq!(buf[1], 0b10);
        assert_eq!(buf[8], 0b100_0000);
        assert_eq!(Bitmap::decode(&buf), bitmap);
    }

    #[test]
    fn first_clear_respects_bounds() {
        let mut bitmap = Bitmap::default();
        for bit in 0..80 {
            bitmap.set(bit);
        }
        assert_eq!(bitmap.first_clear(0, 100), Some(80));
        assert_eq!(bitmap.first_clear(3, 100), Some(80));
        assert_eq!(bitmap.first_clear(90, 100), Some(90));
        assert_eq!(bitmap.first_clear(0, 80), None);

        bitmap.set(80);
        bitmap.set(81);
        assert_eq!(bitmap.first_clear(80, 82), None);
        assert_eq!(bitmap.first_clear(80, 83), Some(82));
    }

    #[test]
    fn clear_reports_previous_state() {
        let mut bitmap = Bitmap::default();
        bitmap.set(100);
        assert_eq!(bitmap.count_set(BLOCK_BITS), 1);
        assert!(bitmap.clear(100));
        assert!(!bitmap.clear(100));
        assert_eq!(bitmap.count_set(BLOCK_BITS), 0);
    }
}
