//! 三元组的逐元素算术.
//!
//! 所有几何计算的基础. 元组按 `(x, y, z)` 顺序解释,
//! 但这里的运算本身与轴序无关.

use num::{Num, ToPrimitive};

use crate::{Idx3dF, Idx3dI};

/// 逐元素相加.
#[inline]
pub fn add_tuple<T: Num + Copy>(a: (T, T, T), b: (T, T, T)) -> (T, T, T) {
    (a.0 + b.0, a.1 + b.1, a.2 + b.2)
}

/// 逐元素相减.
#[inline]
pub fn sub_tuple<T: Num + Copy>(a: (T, T, T), b: (T, T, T)) -> (T, T, T) {
    (a.0 - b.0, a.1 - b.1, a.2 - b.2)
}

/// 逐元素相乘.
#[inline]
pub fn mul_tuple<T: Num + Copy>(a: (T, T, T), b: (T, T, T)) -> (T, T, T) {
    (a.0 * b.0, a.1 * b.1, a.2 * b.2)
}

/// 逐元素相除. 除数含零时行为由 `T` 的除法定义 (浮点为 inf, 整数 panic).
#[inline]
pub fn div_tuple<T: Num + Copy>(a: (T, T, T), b: (T, T, T)) -> (T, T, T) {
    (a.0 / b.0, a.1 / b.1, a.2 / b.2)
}

/// 每个元素除以同一个标量.
#[inline]
pub fn div_tuple_scalar<T: Num + Copy>(a: (T, T, T), s: T) -> (T, T, T) {
    (a.0 / s, a.1 / s, a.2 / s)
}

/// 逐元素向上取整.
#[inline]
pub fn ceil_tuple(a: Idx3dF) -> Idx3dF {
    (a.0.ceil(), a.1.ceil(), a.2.ceil())
}

/// 逐元素向下取整.
#[inline]
pub fn floor_tuple(a: Idx3dF) -> Idx3dF {
    (a.0.floor(), a.1.floor(), a.2.floor())
}

/// 三个元素是否全部相等.
#[inline]
pub fn all_equal<T: PartialEq + Copy>(a: (T, T, T)) -> bool {
    a.0 == a.1 && a.1 == a.2
}

/// 转换为 `f64` 三元组. 无法精确表示的大整数按 `as` 语义截断.
#[inline]
pub fn tuple_to_f64<T: ToPrimitive>(a: (T, T, T)) -> Idx3dF {
    (
        a.0.to_f64().expect("数值应可转换为 f64"),
        a.1.to_f64().expect("数值应可转换为 f64"),
        a.2.to_f64().expect("数值应可转换为 f64"),
    )
}

/// 逐元素向零截断为 `i64` 三元组.
#[inline]
pub fn trunc_tuple(a: Idx3dF) -> Idx3dI {
    (a.0.trunc() as i64, a.1.trunc() as i64, a.2.trunc() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elementwise_ops() {
        assert_eq!(add_tuple((1, 2, 3), (4, 5, 6)), (5, 7, 9));
        assert_eq!(sub_tuple((4.0, 5.0, 6.0), (1.0, 2.0, 3.0)), (3.0, 3.0, 3.0));
        assert_eq!(mul_tuple((2, 3, 4), (5, 6, 7)), (10, 18, 28));
        assert_eq!(div_tuple((10.0, 9.0, 8.0), (2.0, 3.0, 4.0)), (5.0, 3.0, 2.0));
        assert_eq!(div_tuple_scalar((9.0, 6.0, 3.0), 3.0), (3.0, 2.0, 1.0));
    }

    #[test]
    fn test_rounding() {
        assert_eq!(ceil_tuple((0.1, 1.0, -0.5)), (1.0, 1.0, 0.0));
        assert_eq!(floor_tuple((0.9, 1.0, -0.5)), (0.0, 1.0, -1.0));
        assert_eq!(trunc_tuple((1.9, -1.9, 0.2)), (1, -1, 0));
    }

    #[test]
    fn test_all_equal() {
        assert!(all_equal((1.0, 1.0, 1.0)));
        assert!(!all_equal((1.0, 1.0, 2.0)));
    }
}
