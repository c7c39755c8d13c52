//! 体数据与投影图的分块与重组.
//!
//! 用于内存受限地处理超大体数据: 体数据被确定性地划分为
//! 固定边长, 互不重叠的立方块网格, 逆操作把块按记录的偏移贴回.
//! 2D 投影块与 3D 体数据块之间的栅格顺序保持一致,
//! AP 视角按轴交换后的顺序遍历.

use std::collections::HashSet;

use itertools::iproduct;
use ndarray::{Array2, Array3};

use crate::data::{Geometry, Volume, Voxel};
use crate::projection::{ProjectionType, Xray2d};
use crate::Idx3d;

/// 分块与重组错误.
#[derive(Debug, Clone, PartialEq)]
pub enum TileError {
    /// 数据尺寸不是块边长的整数倍. 调用方应预先补齐或缩放.
    NotMultiple {
        /// 数据尺寸.
        size: Vec<usize>,
        /// 块边长.
        patch_size: usize,
    },

    /// 同一偏移被贴回多次. 重叠粘贴不被支持.
    DuplicateOffset(Vec<usize>),

    /// 块超出重组目标的范围.
    OutOfBounds {
        /// 块偏移.
        offset: Vec<usize>,
        /// 重组目标尺寸.
        combined: Vec<usize>,
    },
}

/// 一个 3D 块及其在原体数据中的几何偏移.
#[derive(Debug, Clone)]
pub struct VolumePatch<T: Voxel> {
    /// 块数据, 携带平移后的几何元信息.
    pub volume: Volume<T>,

    /// 块在原体数据中的起始索引, 按 `(x, y, z)`.
    pub offset: Idx3d,
}

/// 将体数据划分为边长 `patch_size` 的互不重叠立方块网格.
///
/// 偏移沿每轴独立取 `0, p, 2p, ...`; 遍历顺序与数组排布一致
/// (z 最外层, x 最内层). 尺寸不是 `patch_size` 整数倍时返回错误.
pub fn tile<T: Voxel>(
    volume: &Volume<T>,
    patch_size: usize,
) -> Result<Vec<VolumePatch<T>>, TileError> {
    let (sx, sy, sz) = volume.size();
    if patch_size == 0 || sx % patch_size != 0 || sy % patch_size != 0 || sz % patch_size != 0 {
        return Err(TileError::NotMultiple {
            size: vec![sx, sy, sz],
            patch_size,
        });
    }

    let (nx, ny, nz) = (sx / patch_size, sy / patch_size, sz / patch_size);
    let mut patches = Vec::with_capacity(nx * ny * nz);
    for (bz, by, bx) in iproduct!(0..nz, 0..ny, 0..nx) {
        let offset = (bx * patch_size, by * patch_size, bz * patch_size);
        let start = (offset.0 as i64, offset.1 as i64, offset.2 as i64);
        let cube = volume
            .region_of_interest(start, (patch_size, patch_size, patch_size))
            .expect("块网格由整除关系保证在界内");
        patches.push(VolumePatch {
            volume: cube,
            offset,
        });
    }
    Ok(patches)
}

/// 把块按记录的偏移贴回 `combined_size` 尺寸的新体数据中.
///
/// 每个偏移必须恰好被访问一次; 未覆盖的体素保持零值.
/// `geometry` 为重组结果的几何元信息.
pub fn untile<T: Voxel>(
    patches: &[VolumePatch<T>],
    combined_size: Idx3d,
    geometry: Geometry,
) -> Result<Volume<T>, TileError> {
    let mut data = Array3::from_elem(
        [combined_size.2, combined_size.1, combined_size.0],
        T::from_f64(0.0),
    );
    let mut visited = HashSet::new();

    for patch in patches {
        let (ox, oy, oz) = patch.offset;
        let (px, py, pz) = patch.volume.size();
        if ox + px > combined_size.0 || oy + py > combined_size.1 || oz + pz > combined_size.2 {
            return Err(TileError::OutOfBounds {
                offset: vec![ox, oy, oz],
                combined: vec![combined_size.0, combined_size.1, combined_size.2],
            });
        }
        if !visited.insert(patch.offset) {
            return Err(TileError::DuplicateOffset(vec![ox, oy, oz]));
        }
        data.slice_mut(ndarray::s![oz..oz + pz, oy..oy + py, ox..ox + px])
            .assign(&patch.volume.data());
    }
    Ok(Volume::new(data, geometry))
}

/// 一个 2D 投影块及其在原图中的 `(行, 列)` 偏移.
#[derive(Debug, Clone, PartialEq)]
pub struct XrayPatch {
    /// 块数据, 与原图同向.
    pub data: Array2<u8>,

    /// 块在原图中的起始位置, 按 `(行, 列)`.
    pub offset: (usize, usize),
}

/// 将投影图划分为边长 `patch_size` 的方块.
///
/// LAT 视角按行优先遍历; AP 视角按轴交换后的顺序 (列最外层)
/// 遍历, 使 AP 块的栅格顺序与 3D 体数据块保持一致.
/// 块数据本身始终与原图同向.
pub fn tile_xray(
    image: &Xray2d,
    patch_size: usize,
    view: ProjectionType,
) -> Result<Vec<XrayPatch>, TileError> {
    let (rows, cols) = image.shape();
    if patch_size == 0 || rows % patch_size != 0 || cols % patch_size != 0 {
        return Err(TileError::NotMultiple {
            size: vec![rows, cols],
            patch_size,
        });
    }

    let (nr, nc) = (rows / patch_size, cols / patch_size);
    let order: Vec<(usize, usize)> = match view {
        ProjectionType::Lat => iproduct!(0..nr, 0..nc).collect(),
        ProjectionType::Ap => iproduct!(0..nc, 0..nr).map(|(c, r)| (r, c)).collect(),
    };

    let mut patches = Vec::with_capacity(nr * nc);
    for (br, bc) in order {
        let (r0, c0) = (br * patch_size, bc * patch_size);
        let block = image
            .data()
            .slice(ndarray::s![r0..r0 + patch_size, c0..c0 + patch_size])
            .to_owned();
        patches.push(XrayPatch {
            data: block,
            offset: (r0, c0),
        });
    }
    Ok(patches)
}

/// 把 2D 块按记录的偏移贴回 `combined` 尺寸的投影图中.
///
/// 每个偏移必须恰好被访问一次.
pub fn untile_xray(patches: &[XrayPatch], combined: (usize, usize)) -> Result<Xray2d, TileError> {
    let mut data = Array2::<u8>::zeros([combined.0, combined.1]);
    let mut visited = HashSet::new();

    for patch in patches {
        let (r0, c0) = patch.offset;
        let (pr, pc) = patch.data.dim();
        if r0 + pr > combined.0 || c0 + pc > combined.1 {
            return Err(TileError::OutOfBounds {
                offset: vec![r0, c0],
                combined: vec![combined.0, combined.1],
            });
        }
        if !visited.insert(patch.offset) {
            return Err(TileError::DuplicateOffset(vec![r0, c0]));
        }
        data.slice_mut(ndarray::s![r0..r0 + pr, c0..c0 + pc])
            .assign(&patch.data);
    }
    Ok(Xray2d::new(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CtSeg;

    fn sequential_seg(size: Idx3d) -> CtSeg {
        let data = Array3::from_shape_fn([size.2, size.1, size.0], |(z, y, x)| {
            ((x + size.0 * (y + size.1 * z)) % 251) as u8
        });
        CtSeg::new(data, Geometry::identity([1.0; 3]))
    }

    #[test]
    fn test_tile_untile_roundtrip() {
        let seg = sequential_seg((8, 8, 8));
        let patches = tile(&seg, 4).unwrap();
        assert_eq!(patches.len(), 8);

        let rebuilt = untile(&patches, seg.size(), seg.geometry().clone()).unwrap();
        assert_eq!(rebuilt.data(), seg.data());
        assert_eq!(rebuilt.geometry(), seg.geometry());
    }

    #[test]
    fn test_tile_offsets_and_geometry() {
        let seg = sequential_seg((4, 4, 8));
        let patches = tile(&seg, 4).unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].offset, (0, 0, 0));
        assert_eq!(patches[1].offset, (0, 0, 4));
        // 块的原点随偏移平移.
        assert_eq!(
            patches[1].volume.geometry().origin,
            seg.geometry().index_to_physical((0.0, 0.0, 4.0))
        );
    }

    #[test]
    fn test_tile_rejects_non_multiple() {
        let seg = sequential_seg((6, 6, 6));
        assert!(matches!(
            tile(&seg, 4),
            Err(TileError::NotMultiple { .. })
        ));
    }

    #[test]
    fn test_untile_rejects_duplicate_offset() {
        let seg = sequential_seg((4, 4, 4));
        let patches = tile(&seg, 4).unwrap();
        let doubled: Vec<_> = patches.iter().chain(patches.iter()).cloned().collect();
        assert!(matches!(
            untile(&doubled, seg.size(), seg.geometry().clone()),
            Err(TileError::DuplicateOffset(_))
        ));
    }

    fn sequential_xray(rows: usize, cols: usize) -> Xray2d {
        Xray2d::new(Array2::from_shape_fn([rows, cols], |(r, c)| {
            ((r * cols + c) % 251) as u8
        }))
    }

    #[test]
    fn test_xray_tile_untile_roundtrip_both_views() {
        let image = sequential_xray(8, 12);
        for view in [ProjectionType::Ap, ProjectionType::Lat] {
            let patches = tile_xray(&image, 4, view).unwrap();
            assert_eq!(patches.len(), 6);
            let rebuilt = untile_xray(&patches, image.shape()).unwrap();
            assert_eq!(rebuilt, image, "视角 {view:?}");
        }
    }

    #[test]
    fn test_xray_ap_order_is_axis_swapped() {
        let image = sequential_xray(8, 8);
        let lat = tile_xray(&image, 4, ProjectionType::Lat).unwrap();
        let ap = tile_xray(&image, 4, ProjectionType::Ap).unwrap();

        // 行优先 vs 列优先: 角块相同, 中间两块交换.
        assert_eq!(lat[0].offset, (0, 0));
        assert_eq!(lat[1].offset, (0, 4));
        assert_eq!(ap[1].offset, (4, 0));
        assert_eq!(lat[3].offset, ap[3].offset);

        // 块数据本身与原图同向.
        assert_eq!(lat[1].data, ap[2].data);
    }
}
