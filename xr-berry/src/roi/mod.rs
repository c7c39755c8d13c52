//! 解剖 ROI 提取.
//!
//! 每次提取按同一状态机执行: 定位解剖结构 (标签统计或给定标志点),
//! 锚点换算到索引空间, 补齐 padding, 裁剪, 可选的标签隔离与重定向.
//! 三个入口分别覆盖 bounding box 居中, 标志点比例偏移与
//! bounding box 顶端锚定三种策略.

use crate::consts::{SAFETY_PAD, TRUNCATION_PAD};
use crate::data::{CropError, CtImage, CtSeg, Geometry, MissingLabelError, Volume, Voxel};
use crate::geom::orientation::OrientationError;
use crate::geom::padding::{
    required_padding, required_padding_ratio, roi_origin_from_center, roi_origin_from_ratio,
    ExtractionRatio, RatioError,
};
use crate::geom::tuple::add_tuple;
use crate::{Idx3d, Idx3dF, Idx3dI};

mod heatmap;

pub use heatmap::generate_gaussian_heatmap;

/// ROI 提取错误.
#[derive(Debug, Clone, PartialEq)]
pub enum RoiError {
    /// 请求的标签不在分割中. 对该 subject 是致命错误.
    MissingLabel(MissingLabelError),

    /// 补齐后窗口仍然越界. 出现该错误说明几何不一致.
    RegionOutOfBounds(CropError),

    /// direction cosines 非正交归一. 应由上游拒绝或重新正交化.
    NonOrthonormalDirection,

    /// 提取比例无法解析到全部三个轴.
    Ratio(RatioError),

    /// 方向编码推导失败.
    Orientation(OrientationError),
}

impl From<MissingLabelError> for RoiError {
    fn from(e: MissingLabelError) -> Self {
        Self::MissingLabel(e)
    }
}

impl From<CropError> for RoiError {
    fn from(e: CropError) -> Self {
        Self::RegionOutOfBounds(e)
    }
}

impl From<RatioError> for RoiError {
    fn from(e: RatioError) -> Self {
        Self::Ratio(e)
    }
}

impl From<OrientationError> for RoiError {
    fn from(e: OrientationError) -> Self {
        Self::Orientation(e)
    }
}

#[inline]
fn ensure_orthonormal(geom: &Geometry) -> Result<(), RoiError> {
    if geom.is_orthonormal() {
        Ok(())
    } else {
        Err(RoiError::NonOrthonormalDirection)
    }
}

/// 在计算出的 padding 之外追加安全余量.
#[inline]
fn with_safety_pad(pad: Idx3d) -> Idx3d {
    add_tuple(pad, (SAFETY_PAD, SAFETY_PAD, SAFETY_PAD))
}

/// 裁剪, 越界时先记录完整诊断上下文再返回错误.
fn crop_checked<T: Voxel>(
    padded: &Volume<T>,
    start: Idx3dI,
    size: Idx3d,
) -> Result<Volume<T>, RoiError> {
    let padded_size = padded.size();
    let spill = start.0 < 0
        || start.1 < 0
        || start.2 < 0
        || start.0 + size.0 as i64 > padded_size.0 as i64
        || start.1 + size.1 as i64 > padded_size.1 as i64
        || start.2 + size.2 as i64 > padded_size.2 as i64;
    if spill {
        log::warn!(
            "请求的 ROI 超出最大可用区域: 起点 {start:?}, 提取尺寸 {size:?}, \
             补齐后体数据尺寸 {padded_size:?}"
        );
    }
    padded.region_of_interest(start, size).map_err(RoiError::from)
}

/// 以分割中标签 `label_id` 的质心为中心, 从 `img` 提取
/// `physical_size` (mm) 对应体素尺寸的 ROI.
///
/// `padding_value` 为越界区域的填充值: 强度体数据用
/// [`crate::consts::CT_PADDING`], 分割用 [`crate::consts::SEG_PADDING`].
///
/// 后置条件: 输出尺寸与请求的体素尺寸完全一致.
pub fn extract_bbox<T: Voxel>(
    img: &Volume<T>,
    seg: &CtSeg,
    label_id: u8,
    physical_size: Idx3dF,
    padding_value: T,
) -> Result<Volume<T>, RoiError> {
    ensure_orthonormal(img.geometry())?;
    let voxel_size = img.voxel_size_for(physical_size);

    let stats = seg.label_stats(label_id)?;
    let centroid_index = img.geometry().physical_to_index(stats.centroid);
    log::debug!(
        "标签 {label_id}: bounding box 起点 {:?} 尺寸 {:?}, 质心索引 {centroid_index:?}",
        stats.bbox_origin,
        stats.bbox_size
    );

    let (lower, upper) = required_padding(img.size(), voxel_size, centroid_index);
    let padded = img.constant_pad(with_safety_pad(lower), with_safety_pad(upper), padding_value);

    let padded_centroid = padded.geometry().physical_to_index(stats.centroid);
    let start = roi_origin_from_center(padded_centroid, voxel_size);

    let roi = crop_checked(&padded, start, voxel_size)?;
    debug_assert_eq!(roi.size(), voxel_size);
    Ok(roi)
}

/// 以给定的连续标志点索引为锚点, 按提取比例从 `img` 提取 ROI,
/// 并返回与之逐体素对齐的标志点 Gaussian heatmap.
///
/// 解析后的比例 `r` 表示窗口沿该轴有 `r` 比例的长度位于锚点的
/// 对应字母一侧.
///
/// 后置条件: 由于物理坐标与索引坐标往返的截断误差,
/// 输出尺寸每轴可能比请求值小 1 个体素. 调用方不应假设完全相等.
pub fn extract_around_centroid<T: Voxel>(
    img: &Volume<T>,
    physical_size: Idx3dF,
    centroid_index: Idx3dF,
    extraction_ratio: &ExtractionRatio,
    padding_value: T,
    sigma: f64,
) -> Result<(Volume<T>, CtImage), RoiError> {
    ensure_orthonormal(img.geometry())?;
    let orientation = img.orientation()?;
    let ratio = extraction_ratio.resolve(orientation)?;
    let voxel_size = img.voxel_size_for(physical_size);

    let (lower, upper) =
        required_padding_ratio(img.size(), voxel_size, centroid_index, ratio);
    let padded = img.constant_pad(with_safety_pad(lower), with_safety_pad(upper), padding_value);

    // 锚点经物理坐标换算到补齐后的索引空间.
    let centroid_physical = img.geometry().index_to_physical(centroid_index);
    let padded_centroid = padded.geometry().physical_to_index(centroid_physical);

    // 起点求解使用比例的补数, 锚点下方的长度为 `1 - r`.
    let complement = [1.0 - ratio[0], 1.0 - ratio[1], 1.0 - ratio[2]];
    let start = roi_origin_from_ratio(padded_centroid, voxel_size, complement);

    let roi = crop_checked(&padded, start, voxel_size)?;

    let roi_centroid = roi
        .geometry()
        .physical_to_continuous_index(centroid_physical);
    log::debug!("标志点在 ROI 中的连续索引: {roi_centroid:?}");

    let heatmap = generate_gaussian_heatmap(roi_centroid, &roi, sigma);
    Ok((roi, heatmap))
}

/// 从 `img` 提取 ROI, 沿 Superior-Inferior 轴锚定到标签
/// bounding box 的顶端 (Superior 一端), 其余轴以质心为中心.
///
/// 适用于只需保留细长结构 (如股骨近端) 顶端一段的场合.
/// `headroom` 为顶端之上额外保留的体素数.
/// 顶端位于哪一端由分割的方向编码决定, S 与 I 两种轴向都支持.
pub fn extract_bbox_topleft<T: Voxel>(
    img: &Volume<T>,
    seg: &CtSeg,
    label_id: u8,
    physical_size: Idx3dF,
    padding_value: T,
    headroom: usize,
) -> Result<Volume<T>, RoiError> {
    ensure_orthonormal(img.geometry())?;
    let voxel_size = seg.voxel_size_for(physical_size);
    let voxel = [voxel_size.0 as i64, voxel_size.1 as i64, voxel_size.2 as i64];

    let stats = seg.label_stats(label_id)?;
    let centroid_index = img.geometry().physical_to_index(stats.centroid);
    let centroid = [centroid_index.0, centroid_index.1, centroid_index.2];

    let bbox_origin = [
        stats.bbox_origin.0 as i64,
        stats.bbox_origin.1 as i64,
        stats.bbox_origin.2 as i64,
    ];
    let bbox_size = [
        stats.bbox_size.0 as i64,
        stats.bbox_size.1 as i64,
        stats.bbox_size.2 as i64,
    ];

    let orientation = seg.orientation()?;
    let si = orientation.superior_inferior_axis().index();

    let mut origin = bbox_origin;
    for k in 0..3 {
        if k != si {
            origin[k] = centroid[k] - voxel[k] / 2;
        }
    }

    // 沿 Superior-Inferior 轴裁剪: 结构比请求窗口长时锚定到顶端.
    if bbox_size[si] >= voxel[si] {
        if orientation.is_superior_to_inferior() {
            // 索引增长方向朝 Superior, 顶端在高位端.
            origin[si] = bbox_origin[si] + bbox_size[si] - voxel[si] + headroom as i64;
        } else {
            // 索引增长方向朝 Inferior, 顶端在低位端.
            origin[si] = bbox_origin[si] - headroom as i64;
        }
    }

    let pad = (SAFETY_PAD, SAFETY_PAD, SAFETY_PAD);
    let padded = img.constant_pad(pad, pad, padding_value);
    let origin_physical = img
        .geometry()
        .index_to_physical((origin[0] as f64, origin[1] as f64, origin[2] as f64));
    let padded_origin = padded.geometry().physical_to_index(origin_physical);
    log::debug!(
        "顶端锚定: 原始起点 {origin:?}, 补齐后起点 {padded_origin:?}, 提取尺寸 {voxel_size:?}"
    );

    crop_checked(&padded, padded_origin, voxel_size)
}

/// 比例偏移提取允许的最大尺寸偏差 (体素/轴), 与截断补偿一致.
pub const SIZE_TOLERANCE: usize = TRUNCATION_PAD;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::{CT_PADDING, HEATMAP_SIGMA};
    use crate::geom::orientation::{AxisCode, Orientation};

    /// 构建 E2E 场景: 200^3, spacing 1, RAS 方向,
    /// 标签 5 占据索引 [90, 110)^3 的立方区域.
    fn e2e_scene() -> (CtImage, CtSeg) {
        let code: Orientation = "RAS".parse().unwrap();
        let geom = Geometry::with_orientation([1.0; 3], code);
        let mut img = CtImage::filled((200, 200, 200), 0.0, geom.clone());
        let mut seg = CtSeg::filled((200, 200, 200), 0, geom);
        for x in 90..110 {
            for y in 90..110 {
                for z in 90..110 {
                    seg[(x, y, z)] = 5;
                    img[(x, y, z)] = 1000.0;
                }
            }
        }
        (img, seg)
    }

    #[test]
    fn test_extract_bbox_e2e_exact_and_centered() {
        let (img, seg) = e2e_scene();
        let roi = extract_bbox(&img, &seg, 5, (96.0, 96.0, 96.0), CT_PADDING).unwrap();
        assert_eq!(roi.size(), (96, 96, 96));

        // 标签质心 (约 (100, 100, 100)) 应落在输出中心 (48, 48, 48) 附近.
        let stats = seg.label_stats(5).unwrap();
        let in_roi = roi.geometry().physical_to_index(stats.centroid);
        for (got, want) in [in_roi.0, in_roi.1, in_roi.2].into_iter().zip([48i64; 3]) {
            assert!((got - want).abs() <= 1, "质心映射到 {in_roi:?}");
        }
        let probe = (in_roi.0 as usize, in_roi.1 as usize, in_roi.2 as usize);
        assert_eq!(roi[probe], 1000.0);
    }

    #[test]
    fn test_extract_bbox_exact_size_for_many_sizes() {
        let code: Orientation = "LPS".parse().unwrap();
        let geom = Geometry::with_orientation([1.0; 3], code);
        let mut seg = CtSeg::filled((30, 30, 30), 0, geom.clone());
        // 质心贴近角落, 强制两侧 padding.
        for x in 0..4 {
            for y in 0..4 {
                for z in 26..30 {
                    seg[(x, y, z)] = 1;
                }
            }
        }
        let img = CtImage::filled((30, 30, 30), 12.0, geom);

        for size in [1usize, 5, 29, 31, 40] {
            let physical = (size as f64, size as f64, size as f64);
            let roi = extract_bbox(&img, &seg, 1, physical, CT_PADDING).unwrap();
            assert_eq!(roi.size(), (size, size, size), "请求尺寸 {size}");
        }
    }

    #[test]
    fn test_extract_bbox_missing_label() {
        let (img, seg) = e2e_scene();
        let err = extract_bbox(&img, &seg, 9, (96.0, 96.0, 96.0), CT_PADDING).unwrap_err();
        match err {
            RoiError::MissingLabel(e) => {
                assert_eq!(e.label, 9);
                assert_eq!(e.present, vec![5]);
            }
            other => panic!("预期 MissingLabel, 得到 {other:?}"),
        }
    }

    #[test]
    fn test_extract_rejects_non_orthonormal() {
        let (mut img, seg) = e2e_scene();
        // 人为破坏 direction 的正交归一性.
        let mut geom = img.geometry().clone();
        geom.direction[0][0] = 0.9;
        img = CtImage::new(img.data().to_owned(), geom);
        let err = extract_bbox(&img, &seg, 5, (96.0, 96.0, 96.0), CT_PADDING).unwrap_err();
        assert_eq!(err, RoiError::NonOrthonormalDirection);
    }

    #[test]
    fn test_extract_around_centroid_e2e() {
        let (img, _) = e2e_scene();
        let ratio = ExtractionRatio::new(&[
            (AxisCode::L, 0.5),
            (AxisCode::A, 0.7),
            (AxisCode::S, 0.5),
        ])
        .unwrap();

        let (roi, heatmap) = extract_around_centroid(
            &img,
            (96.0, 96.0, 96.0),
            (100.0, 100.0, 100.0),
            &ratio,
            CT_PADDING,
            HEATMAP_SIGMA,
        )
        .unwrap();

        // 尺寸允许每轴 1 体素的截断偏差.
        let (sx, sy, sz) = roi.size();
        for s in [sx, sy, sz] {
            assert!(s.abs_diff(96) <= SIZE_TOLERANCE, "输出尺寸 {:?}", roi.size());
        }
        assert_eq!(heatmap.size(), roi.size());

        // 沿 'A' 轴 (几何 y 轴), 标志点距 A 侧边缘约 0.7 * 96 = 67 体素.
        let centroid_physical = img
            .geometry()
            .index_to_physical((100.0, 100.0, 100.0));
        let in_roi = roi
            .geometry()
            .physical_to_continuous_index(centroid_physical);
        let to_a_edge = sy as f64 - in_roi.1;
        assert!(
            (to_a_edge - 67.0).abs() <= 2.0,
            "标志点距 A 侧边缘 {to_a_edge} 体素"
        );
        // 其余两轴居中.
        assert!((in_roi.0 - 48.0).abs() <= 2.0);
        assert!((in_roi.2 - 48.0).abs() <= 2.0);
    }

    #[test]
    fn test_extract_around_centroid_unresolved_ratio() {
        let (img, _) = e2e_scene();
        let ratio = ExtractionRatio::new(&[(AxisCode::L, 0.5), (AxisCode::A, 0.5)]).unwrap();
        let err = extract_around_centroid(
            &img,
            (96.0, 96.0, 96.0),
            (100.0, 100.0, 100.0),
            &ratio,
            CT_PADDING,
            HEATMAP_SIGMA,
        )
        .unwrap_err();
        assert_eq!(err, RoiError::Ratio(RatioError::Unresolved(AxisCode::S)));
    }

    #[test]
    fn test_extract_bbox_topleft_superior_high_end() {
        // LPS: Superior-Inferior 轴为 z, 索引朝 Superior 增长.
        let code: Orientation = "LPS".parse().unwrap();
        let geom = Geometry::with_orientation([1.0; 3], code);
        let mut seg = CtSeg::filled((60, 60, 60), 0, geom.clone());
        let mut img = CtImage::filled((60, 60, 60), 0.0, geom);
        for x in 25..35 {
            for y in 25..35 {
                for z in 10..50 {
                    seg[(x, y, z)] = 1;
                    img[(x, y, z)] = 500.0;
                }
            }
        }

        let roi = extract_bbox_topleft(&img, &seg, 1, (20.0, 20.0, 20.0), CT_PADDING, 3).unwrap();
        assert_eq!(roi.size(), (20, 20, 20));

        // 裁剪窗口应覆盖骨骼顶端 (z = 49) 且顶端之上保留 3 体素空间.
        let top_physical = img.geometry().index_to_physical((30.0, 30.0, 49.0));
        let top_in_roi = roi.geometry().physical_to_index(top_physical);
        assert_eq!(top_in_roi.2, 20 - 1 - 3);
        let probe = (
            top_in_roi.0 as usize,
            top_in_roi.1 as usize,
            top_in_roi.2 as usize,
        );
        assert_eq!(roi[probe], 500.0);
    }

    #[test]
    fn test_extract_bbox_topleft_superior_low_end() {
        // LPI: 索引朝 Inferior 增长, 顶端在低位端.
        let code: Orientation = "LPI".parse().unwrap();
        let geom = Geometry::with_orientation([1.0; 3], code);
        let mut seg = CtSeg::filled((60, 60, 60), 0, geom.clone());
        let mut img = CtImage::filled((60, 60, 60), 0.0, geom);
        for x in 25..35 {
            for y in 25..35 {
                for z in 10..50 {
                    seg[(x, y, z)] = 1;
                    img[(x, y, z)] = 500.0;
                }
            }
        }

        let roi = extract_bbox_topleft(&img, &seg, 1, (20.0, 20.0, 20.0), CT_PADDING, 3).unwrap();
        assert_eq!(roi.size(), (20, 20, 20));

        // 顶端为 z = 10 (低位端), 窗口从 10 - 3 = 7 开始.
        let top_physical = img.geometry().index_to_physical((30.0, 30.0, 10.0));
        let top_in_roi = roi.geometry().physical_to_index(top_physical);
        assert_eq!(top_in_roi.2, 3);
    }
}
