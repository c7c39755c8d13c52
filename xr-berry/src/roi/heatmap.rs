//! 标志点 Gaussian heatmap.

use ndarray::Array3;

use crate::data::{resample_to_reference, CtImage, Geometry, Interpolator, Volume, Voxel};
use crate::Idx3dF;

/// 以标志点为峰值生成 Gaussian heatmap, 与参考体数据逐体素对齐.
///
/// 距离场在 1 mm 的各向同性网格上构建 (坐标换算到与数组排布一致的
/// 反序), 取值为 `min(iso_size) * exp(-d^2 / (2 * sigma^2))`,
/// 随后线性重采样到参考体数据的几何上. 同一输入总是产生完全相同的
/// 输出, 过程不含随机性.
///
/// 标志点的连续索引在构建距离场前会被截断为整数体素,
/// 因此峰值位置与给定标志点之间可能有 1 体素以内的偏差.
pub fn generate_gaussian_heatmap<T: Voxel>(
    centroid_index: Idx3dF,
    reference: &Volume<T>,
    sigma: f64,
) -> CtImage {
    let (sx, sy, sz) = reference.size();
    let spacing = reference.geometry().spacing;

    // 参考体数据覆盖的物理范围, 向下取整为 1 mm 网格尺寸.
    let iso = [
        ((sx as f64 * spacing[0]) as usize).max(1),
        ((sy as f64 * spacing[1]) as usize).max(1),
        ((sz as f64 * spacing[2]) as usize).max(1),
    ];
    let peak = *iso.iter().min().expect("固定长度数组非空") as f64;

    let anchor_mm = [
        centroid_index.0.trunc() * spacing[0],
        centroid_index.1.trunc() * spacing[1],
        centroid_index.2.trunc() * spacing[2],
    ];
    let denom = 2.0 * sigma * sigma;

    let data = Array3::from_shape_fn([iso[2], iso[1], iso[0]], |(z, y, x)| {
        let dx = x as f64 - anchor_mm[0];
        let dy = y as f64 - anchor_mm[1];
        let dz = z as f64 - anchor_mm[2];
        let squared = dx * dx + dy * dy + dz * dz;
        (peak * (-squared / denom).exp()) as f32
    });

    let grid = Geometry {
        spacing: [1.0; 3],
        origin: reference.geometry().origin,
        direction: reference.geometry().direction,
    };
    let field = CtImage::new(data, grid);
    resample_to_reference(
        &field,
        reference.size(),
        reference.geometry(),
        Interpolator::Linear,
        0.0,
    )
}
