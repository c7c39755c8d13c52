//! padding 与 ROI 起点求解.
//!
//! 两类问题: 以锚点为中心 (或按比例偏移) 提取给定体素尺寸的窗口时,
//! 源体数据两侧各需要补多少 padding 才不会越界;
//! 以及窗口在补齐后的体数据中的起始索引是多少.

use crate::consts::TRUNCATION_PAD;
use crate::geom::orientation::{AxisCode, Orientation};
use crate::geom::tuple::{
    add_tuple, div_tuple_scalar, mul_tuple, sub_tuple, trunc_tuple, tuple_to_f64,
};
use crate::{Idx3d, Idx3dF, Idx3dI};

/// 提取比例相关错误.
#[derive(Debug, Clone, PartialEq)]
pub enum RatioError {
    /// 比例值不在 `[0, 1]` 区间内.
    OutOfRange(f64),

    /// 方向编码中的某个字母及其相反字母都没有给出比例.
    Unresolved(AxisCode),
}

/// 部分指定的提取比例: 方向字母到 `[0, 1]` 分数的映射.
///
/// 语义: 字母 `X` 对应分数 `r` 表示窗口沿该轴有 `r` 比例的长度
/// 位于锚点的 `X` 一侧. 未给出的字母按 `1 - 相反字母分数` 推断.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionRatio {
    entries: Vec<(AxisCode, f64)>,
}

impl ExtractionRatio {
    /// 构建提取比例. 每个分数必须在 `[0, 1]` 内.
    pub fn new(entries: &[(AxisCode, f64)]) -> Result<Self, RatioError> {
        for (_, r) in entries {
            if !(0.0..=1.0).contains(r) {
                return Err(RatioError::OutOfRange(*r));
            }
        }
        Ok(Self {
            entries: entries.to_vec(),
        })
    }

    /// 三个轴均居中 (0.5) 的提取比例.
    pub fn centered() -> Self {
        Self {
            entries: vec![
                (AxisCode::L, 0.5),
                (AxisCode::A, 0.5),
                (AxisCode::S, 0.5),
            ],
        }
    }

    /// 查找字母对应的分数.
    fn get(&self, code: AxisCode) -> Option<f64> {
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, r)| *r)
    }

    /// 按体数据的方向编码解析出逐轴比例.
    ///
    /// 编码中的每个字母使用给出的分数; 若缺失则取 `1 - 相反字母分数`;
    /// 两者都缺失时返回 [`RatioError::Unresolved`].
    ///
    /// ```
    /// use xr_berry::geom::{AxisCode, ExtractionRatio};
    ///
    /// let ratio = ExtractionRatio::new(&[
    ///     (AxisCode::L, 0.5),
    ///     (AxisCode::A, 0.33),
    ///     (AxisCode::S, 0.5),
    /// ])
    /// .unwrap();
    /// let resolved = ratio.resolve("LPS".parse().unwrap()).unwrap();
    /// assert!((resolved[1] - 0.67).abs() < 1e-9);
    /// ```
    pub fn resolve(&self, orientation: Orientation) -> Result<[f64; 3], RatioError> {
        let mut resolved = [0.0; 3];
        for (slot, code) in resolved.iter_mut().zip(orientation.codes()) {
            *slot = match self.get(code) {
                Some(r) => r,
                None => match self.get(code.opposite()) {
                    Some(r) => 1.0 - r,
                    None => return Err(RatioError::Unresolved(code)),
                },
            };
        }
        Ok(resolved)
    }
}

/// 以整数锚点为中心提取 `window` 尺寸的窗口时, 每侧所需的 padding.
///
/// 返回 `(下界 padding, 上界 padding)`, 均逐轴非负.
pub fn required_padding(volume_size: Idx3d, window: Idx3d, anchor: Idx3dI) -> (Idx3d, Idx3d) {
    let half = div_tuple_scalar(tuple_to_f64(window), 2.0);
    let ub = add_tuple(tuple_to_f64(anchor), half);
    let lb = sub_tuple(tuple_to_f64(anchor), half);
    {
        // 一致性检查: 上下界之差必须等于窗口尺寸.
        let extent = sub_tuple(ub, lb);
        let win = tuple_to_f64(window);
        debug_assert!(
            (extent.0 - win.0).abs() < 1e-9
                && (extent.1 - win.1).abs() < 1e-9
                && (extent.2 - win.2).abs() < 1e-9
        );
    }

    let size = tuple_to_f64(volume_size);
    let upper = (
        f64::max(0.0, ub.0 - size.0).trunc() as usize,
        f64::max(0.0, ub.1 - size.1).trunc() as usize,
        f64::max(0.0, ub.2 - size.2).trunc() as usize,
    );
    let lower = (
        f64::max(0.0, -lb.0).trunc() as usize,
        f64::max(0.0, -lb.1).trunc() as usize,
        f64::max(0.0, -lb.2).trunc() as usize,
    );
    (lower, upper)
}

/// 比例偏移提取所需的 padding.
///
/// `anchor` 为连续 (亚体素) 索引, `ratio` 为已按方向编码解析的逐轴比例.
/// 边界计算会把连续索引截断为整数, 因此每侧额外补偿
/// [`TRUNCATION_PAD`] 个体素的截断误差.
pub fn required_padding_ratio(
    volume_size: Idx3d,
    window: Idx3d,
    anchor: Idx3dF,
    ratio: [f64; 3],
) -> (Idx3d, Idx3d) {
    let win = tuple_to_f64(window);
    let above = (ratio[0], ratio[1], ratio[2]);
    let below = sub_tuple((1.0, 1.0, 1.0), above);

    let ub = trunc_tuple(add_tuple(anchor, mul_tuple(win, above)));
    let lb = trunc_tuple(sub_tuple(anchor, mul_tuple(win, below)));

    let size = (
        volume_size.0 as i64,
        volume_size.1 as i64,
        volume_size.2 as i64,
    );
    let upper = (
        TRUNCATION_PAD + i64::max(0, ub.0 - size.0) as usize,
        TRUNCATION_PAD + i64::max(0, ub.1 - size.1) as usize,
        TRUNCATION_PAD + i64::max(0, ub.2 - size.2) as usize,
    );
    let lower = (
        TRUNCATION_PAD + i64::max(0, -lb.0) as usize,
        TRUNCATION_PAD + i64::max(0, -lb.1) as usize,
        TRUNCATION_PAD + i64::max(0, -lb.2) as usize,
    );
    (lower, upper)
}

/// 居中窗口在 (已补齐的) 体数据中的起始索引: `anchor - window / 2`.
#[inline]
pub fn roi_origin_from_center(anchor: Idx3dI, window: Idx3d) -> Idx3dI {
    (
        anchor.0 - window.0 as i64 / 2,
        anchor.1 - window.1 as i64 / 2,
        anchor.2 - window.2 as i64 / 2,
    )
}

/// 比例偏移窗口的起始索引: `trunc(anchor - window * ratio)`.
///
/// # 注意
///
/// `ratio` 是锚点 *下方* 的长度比例. 若手里是 "字母一侧" 语义的
/// 解析结果 `r`, 调用时应传入其补数 `1 - r`.
#[inline]
pub fn roi_origin_from_ratio(anchor: Idx3dI, window: Idx3d, ratio: [f64; 3]) -> Idx3dI {
    let shift = mul_tuple(tuple_to_f64(window), (ratio[0], ratio[1], ratio[2]));
    trunc_tuple(sub_tuple(tuple_to_f64(anchor), shift))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_resolve_all_given() {
        let ratio = ExtractionRatio::new(&[
            (AxisCode::L, 0.5),
            (AxisCode::A, 0.5),
            (AxisCode::S, 0.5),
        ])
        .unwrap();
        let resolved = ratio.resolve("LAS".parse().unwrap()).unwrap();
        assert_eq!(resolved, [0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_ratio_resolve_opposite_inferred() {
        let ratio = ExtractionRatio::new(&[
            (AxisCode::L, 0.5),
            (AxisCode::A, 0.33),
            (AxisCode::S, 0.5),
        ])
        .unwrap();
        let resolved = ratio.resolve("LPS".parse().unwrap()).unwrap();
        assert_eq!(resolved[0], 0.5);
        assert!((resolved[1] - 0.67).abs() < 1e-9);
        assert_eq!(resolved[2], 0.5);
    }

    #[test]
    fn test_ratio_resolve_unresolved() {
        let ratio = ExtractionRatio::new(&[(AxisCode::L, 0.5), (AxisCode::A, 0.5)]).unwrap();
        assert_eq!(
            ratio.resolve("LPS".parse().unwrap()),
            Err(RatioError::Unresolved(AxisCode::S))
        );
    }

    #[test]
    fn test_ratio_range_check() {
        assert_eq!(
            ExtractionRatio::new(&[(AxisCode::L, 1.5)]),
            Err(RatioError::OutOfRange(1.5))
        );
    }

    #[test]
    fn test_required_padding_inside() {
        // 锚点居中且窗口完全在界内时无需 padding.
        let (lower, upper) = required_padding((200, 200, 200), (96, 96, 96), (100, 100, 100));
        assert_eq!(lower, (0, 0, 0));
        assert_eq!(upper, (0, 0, 0));
    }

    #[test]
    fn test_required_padding_both_sides() {
        let (lower, upper) = required_padding((100, 100, 100), (96, 96, 96), (10, 50, 95));
        // x 轴: 10 - 48 = -38, 需要补 38.
        assert_eq!(lower, (38, 0, 0));
        // z 轴: 95 + 48 = 143 > 100, 需要补 43.
        assert_eq!(upper, (0, 0, 43));
    }

    #[test]
    fn test_padding_then_crop_is_exact() {
        // 补齐后按居中起点裁剪, 窗口必然完整落在界内.
        let volume_size = (60, 60, 60);
        for window in [(1, 1, 1), (7, 7, 7), (64, 64, 64), (101, 101, 101)] {
            let anchor = (30i64, 0i64, 59i64);
            let (lower, upper) = required_padding(volume_size, window, anchor);
            let padded = (
                volume_size.0 + lower.0 + upper.0,
                volume_size.1 + lower.1 + upper.1,
                volume_size.2 + lower.2 + upper.2,
            );
            let shifted = (
                anchor.0 + lower.0 as i64,
                anchor.1 + lower.1 as i64,
                anchor.2 + lower.2 as i64,
            );
            let origin = roi_origin_from_center(shifted, window);
            assert!(origin.0 >= 0 && origin.1 >= 0 && origin.2 >= 0);
            let end = add_tuple(
                origin,
                (window.0 as i64, window.1 as i64, window.2 as i64),
            );
            assert!(
                end.0 <= padded.0 as i64 + 1
                    && end.1 <= padded.1 as i64 + 1
                    && end.2 <= padded.2 as i64 + 1
            );
        }
    }

    #[test]
    fn test_required_padding_ratio_truncation_margin() {
        let (lower, upper) =
            required_padding_ratio((200, 200, 200), (96, 96, 96), (100.0, 100.0, 100.0), [
                0.5, 0.7, 0.5,
            ]);
        // 界内提取也保留 1 体素的截断余量.
        assert_eq!(lower, (1, 1, 1));
        assert_eq!(upper, (1, 1, 1));
    }

    #[test]
    fn test_roi_origin_from_ratio_truncates() {
        let origin = roi_origin_from_ratio((151, 151, 151), (96, 96, 96), [0.5, 0.3, 0.5]);
        assert_eq!(origin, (103, 122, 103));
    }
}
