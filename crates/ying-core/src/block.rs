//! 固定尺寸采样块.
//!
//! 宏块的亮度 (16x16) 与色度 (8x8) 平面都以 `Block<T, N>` 存储:
//! 行优先的定长数组, 通过 `(row, col)` 下标访问, 越界访问直接 panic.

use std::ops::{Index, IndexMut};

/// 8 位采样的最大值
pub const SAMPLE_MAX: i32 = 255;

/// 将任意整数值裁剪到合法的 8 位采样范围 [0, 255]
#[inline]
pub fn clip_sample(value: i32) -> u8 {
    value.clamp(0, SAMPLE_MAX) as u8
}

/// 两个 8 位采样块的差值平方和
///
/// 16x16 块的最大 SSE 约为 1.67e7, 用 u64 累加不会溢出.
pub fn sse<const N: usize>(a: &Block<u8, N>, b: &Block<u8, N>) -> u64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = i64::from(x) - i64::from(y);
            (d * d) as u64
        })
        .sum()
}

/// N x N 采样块
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Block<T, const N: usize> {
    rows: [[T; N]; N],
}

impl<T: Copy + Default, const N: usize> Default for Block<T, N> {
    fn default() -> Self {
        Self::filled(T::default())
    }
}

impl<T: Copy, const N: usize> Block<T, N> {
    /// 块的边长
    pub const SIZE: usize = N;

    /// 创建所有采样均为 `value` 的块
    pub fn filled(value: T) -> Self {
        Self {
            rows: [[value; N]; N],
        }
    }

    /// 由逐点函数 `f(row, col)` 构造块
    pub fn from_fn(mut f: impl FnMut(usize, usize) -> T) -> Self {
        Self {
            rows: std::array::from_fn(|row| std::array::from_fn(|col| f(row, col))),
        }
    }

    /// 按行借用
    pub fn rows(&self) -> &[[T; N]; N] {
        &self.rows
    }

    /// 逐点映射到新的块
    pub fn map<U: Copy>(&self, mut f: impl FnMut(T) -> U) -> Block<U, N> {
        Block::from_fn(|row, col| f(self.rows[row][col]))
    }

    /// 与另一个同尺寸块逐点组合
    pub fn zip_map<U: Copy, V: Copy>(
        &self,
        other: &Block<U, N>,
        mut f: impl FnMut(T, U) -> V,
    ) -> Block<V, N> {
        Block::from_fn(|row, col| f(self.rows[row][col], other.rows[row][col]))
    }

    /// 行优先遍历所有采样
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        self.rows.iter().flat_map(|row| row.iter().copied())
    }

    /// 取出以 `(row, col)` 为左上角的 M x M 子块
    pub fn sub_block<const M: usize>(&self, row: usize, col: usize) -> Block<T, M> {
        Block::from_fn(|r, c| self.rows[row + r][col + c])
    }

    /// 将 M x M 子块写回到以 `(row, col)` 为左上角的位置
    pub fn put_sub_block<const M: usize>(&mut self, row: usize, col: usize, sub: &Block<T, M>) {
        for r in 0..M {
            for c in 0..M {
                self.rows[row + r][col + c] = sub.rows[r][c];
            }
        }
    }
}

impl<T, const N: usize> Index<(usize, usize)> for Block<T, N> {
    type Output = T;

    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.rows[row][col]
    }
}

impl<T, const N: usize> IndexMut<(usize, usize)> for Block<T, N> {
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.rows[row][col]
    }
}
