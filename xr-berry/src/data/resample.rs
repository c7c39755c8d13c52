//! 体数据重采样.
//!
//! 输出网格的每个体素经由物理空间映射回源体数据的连续索引,
//! 再按所选插值器取值. 网格之外的位置取默认值.

use ndarray::Array3;

use super::{Geometry, Volume, Voxel};
use crate::geom::tuple::all_equal;
use crate::{Idx3d, Idx3dF};

/// 插值策略.
///
/// 标签类离散数据必须使用最近邻, 强度类连续数据一般使用线性.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Interpolator {
    /// 三线性插值.
    Linear,

    /// 最近邻插值.
    NearestNeighbour,
}

/// 在源体数据 `vol` 的连续索引 `c` 处采样.
fn sample<T: Voxel>(vol: &Volume<T>, c: Idx3dF, interpolator: Interpolator, default: T) -> T {
    let (sx, sy, sz) = vol.size();
    match interpolator {
        Interpolator::NearestNeighbour => {
            let (x, y, z) = (c.0.round(), c.1.round(), c.2.round());
            if x < 0.0 || y < 0.0 || z < 0.0 {
                return default;
            }
            let idx = (x as usize, y as usize, z as usize);
            vol.get(idx).unwrap_or(default)
        }
        Interpolator::Linear => {
            let inside = c.0 >= 0.0
                && c.1 >= 0.0
                && c.2 >= 0.0
                && c.0 <= (sx - 1) as f64
                && c.1 <= (sy - 1) as f64
                && c.2 <= (sz - 1) as f64;
            if !inside {
                return default;
            }
            let (x0, y0, z0) = (c.0.floor(), c.1.floor(), c.2.floor());
            let (fx, fy, fz) = (c.0 - x0, c.1 - y0, c.2 - z0);
            let (x0, y0, z0) = (x0 as usize, y0 as usize, z0 as usize);
            let x1 = (x0 + 1).min(sx - 1);
            let y1 = (y0 + 1).min(sy - 1);
            let z1 = (z0 + 1).min(sz - 1);

            let mut acc = 0.0f64;
            for (zi, wz) in [(z0, 1.0 - fz), (z1, fz)] {
                for (yi, wy) in [(y0, 1.0 - fy), (y1, fy)] {
                    for (xi, wx) in [(x0, 1.0 - fx), (x1, fx)] {
                        let w = wx * wy * wz;
                        if w != 0.0 {
                            acc += w * vol[(xi, yi, zi)].to_f64();
                        }
                    }
                }
            }
            T::from_f64(acc)
        }
    }
}

/// 将 `vol` 重采样到给定的目标网格 (`size` + `geometry`) 上.
///
/// 目标体素中心经物理空间映射回源连续索引再插值;
/// 落在源数据之外的体素取 `default`.
pub fn resample_to_reference<T: Voxel>(
    vol: &Volume<T>,
    size: Idx3d,
    geometry: &Geometry,
    interpolator: Interpolator,
    default: T,
) -> Volume<T> {
    let data = Array3::from_shape_fn([size.2, size.1, size.0], |(z, y, x)| {
        let p = geometry.index_to_physical((x as f64, y as f64, z as f64));
        let c = vol.geometry().physical_to_continuous_index(p);
        sample(vol, c, interpolator, default)
    });
    Volume::new(data, geometry.clone())
}

/// 重采样到各向同性分辨率.
///
/// `spacing` 缺省时取当前最高分辨率轴的 spacing.
/// 体数据覆盖的物理范围保持不变, 尺寸按 spacing 比例缩放
/// (四舍五入). 已经满足目标分辨率时直接返回拷贝.
pub fn make_isotropic<T: Voxel>(
    vol: &Volume<T>,
    spacing: Option<f64>,
    interpolator: Interpolator,
) -> Volume<T> {
    let old = vol.geometry().spacing;
    let target = spacing.unwrap_or_else(|| old[0].min(old[1]).min(old[2]));

    let spacing_tuple = (old[0], old[1], old[2]);
    if all_equal(spacing_tuple) && old[0] == target {
        return vol.clone();
    }

    let (sx, sy, sz) = vol.size();
    let size = (
        (sx as f64 * old[0] / target).round() as usize,
        (sy as f64 * old[1] / target).round() as usize,
        (sz as f64 * old[2] / target).round() as usize,
    );
    let geometry = Geometry {
        spacing: [target; 3],
        origin: vol.geometry().origin,
        direction: vol.geometry().direction,
    };
    resample_to_reference(vol, size, &geometry, interpolator, T::from_f64(0.0))
}
