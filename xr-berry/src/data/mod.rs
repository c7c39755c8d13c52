use std::ops::{Index, IndexMut};

use itertools::Itertools;
use ndarray::{Array3, ArrayView, ArrayViewMut, Axis as NdAxis, Ix3};

use crate::geom::orientation::{physical_size_to_voxel_size, Orientation, OrientationError};
use crate::{Idx3d, Idx3dF, Idx3dI};

mod nii;
mod resample;

pub use resample::{make_isotropic, resample_to_reference, Interpolator};

/// 体素类型约束. 体数据的标量类型需要支持与 `f64` 的往返转换,
/// 以便重采样和投影在统一的精度下计算.
pub trait Voxel: Copy + PartialEq + PartialOrd + std::fmt::Debug + 'static {
    /// 转换为 `f64`.
    fn to_f64(self) -> f64;

    /// 从 `f64` 转换回来. 整数类型四舍五入并饱和截断.
    fn from_f64(value: f64) -> Self;
}

impl Voxel for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Voxel for u8 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value.round().clamp(0.0, u8::MAX as f64) as u8
    }
}

/// 体数据的物理元信息: 体素分辨率, 原点与 direction cosines.
///
/// direction 为行优先的 3x3 矩阵, 第 j 列是第 j 个索引轴在 LPS
/// 物理坐标系中的方向. 核心算法要求该矩阵正交归一.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    /// 体素分辨率 (mm/体素), 按 `(x, y, z)` 顺序.
    pub spacing: [f64; 3],

    /// 体素 `(0, 0, 0)` 的物理坐标.
    pub origin: [f64; 3],

    /// direction cosines, 行优先.
    pub direction: [[f64; 3]; 3],
}

impl Geometry {
    /// 以单位 direction 和零原点构建.
    pub fn identity(spacing: [f64; 3]) -> Self {
        Self {
            spacing,
            origin: [0.0; 3],
            direction: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// 以给定方向编码对应的带符号置换矩阵构建.
    pub fn with_orientation(spacing: [f64; 3], orientation: Orientation) -> Self {
        Self {
            spacing,
            origin: [0.0; 3],
            direction: orientation.to_direction(),
        }
    }

    /// 连续索引到物理坐标: `p = origin + D * (spacing .* index)`.
    pub fn index_to_physical(&self, index: Idx3dF) -> [f64; 3] {
        let v = [
            index.0 * self.spacing[0],
            index.1 * self.spacing[1],
            index.2 * self.spacing[2],
        ];
        let mut p = self.origin;
        for (r, slot) in p.iter_mut().enumerate() {
            *slot += self.direction[r][0] * v[0]
                + self.direction[r][1] * v[1]
                + self.direction[r][2] * v[2];
        }
        p
    }

    /// 物理坐标到连续索引. 利用正交归一不变量以 `Dᵀ` 代替逆矩阵.
    pub fn physical_to_continuous_index(&self, point: [f64; 3]) -> Idx3dF {
        let d = [
            point[0] - self.origin[0],
            point[1] - self.origin[1],
            point[2] - self.origin[2],
        ];
        let mut v = [0.0; 3];
        for (c, slot) in v.iter_mut().enumerate() {
            *slot = self.direction[0][c] * d[0]
                + self.direction[1][c] * d[1]
                + self.direction[2][c] * d[2];
        }
        (
            v[0] / self.spacing[0],
            v[1] / self.spacing[1],
            v[2] / self.spacing[2],
        )
    }

    /// 物理坐标到最近的整数索引 (四舍五入).
    pub fn physical_to_index(&self, point: [f64; 3]) -> Idx3dI {
        let c = self.physical_to_continuous_index(point);
        (c.0.round() as i64, c.1.round() as i64, c.2.round() as i64)
    }

    /// direction 是否正交归一 (容差 1e-3).
    pub fn is_orthonormal(&self) -> bool {
        const TOLERANCE: f64 = 1e-3;
        for a in 0..3 {
            for b in 0..3 {
                let dot = (0..3)
                    .map(|r| self.direction[r][a] * self.direction[r][b])
                    .sum::<f64>();
                let expected = if a == b { 1.0 } else { 0.0 };
                if (dot - expected).abs() > TOLERANCE {
                    return false;
                }
            }
        }
        true
    }

    /// 从 direction cosines 推导方向编码.
    #[inline]
    pub fn orientation(&self) -> Result<Orientation, OrientationError> {
        Orientation::from_direction(&self.direction)
    }
}

/// 裁剪越界错误. 携带完整诊断上下文以便定位几何不一致.
#[derive(Debug, Clone, PartialEq)]
pub struct CropError {
    /// 请求的起始索引.
    pub start: Idx3dI,

    /// 请求的窗口尺寸.
    pub size: Idx3d,

    /// 被裁剪体数据的尺寸.
    pub volume_size: Idx3d,
}

/// 请求的标签在分割中不存在.
#[derive(Debug, Clone, PartialEq)]
pub struct MissingLabelError {
    /// 请求的标签.
    pub label: u8,

    /// 分割中实际存在的标签集合 (升序).
    pub present: Vec<u8>,
}

/// 单个标签的连通区域统计: bounding box 与质心.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelStats {
    /// bounding box 起始索引, 按 `(x, y, z)`.
    pub bbox_origin: Idx3d,

    /// bounding box 尺寸, 按 `(x, y, z)`.
    pub bbox_size: Idx3d,

    /// 质心的物理坐标.
    pub centroid: [f64; 3],

    /// 该标签的体素个数.
    pub voxel_count: usize,
}

/// 携带物理元信息的 3D 体数据. 数据按 `[z, y, x]` 存储.
///
/// `T = f32` 时表示 CT 强度 (HU), `T = u8` 时表示整数标签图.
/// 两者的填充值与插值策略不同: 强度体数据用大负数填充并线性插值,
/// 标签体数据用背景 0 填充并最近邻插值.
#[derive(Debug, Clone)]
pub struct Volume<T: Voxel> {
    geom: Geometry,
    data: Array3<T>,
}

/// CT 强度体数据 (HU).
pub type CtImage = Volume<f32>;

/// 分割标签体数据.
pub type CtSeg = Volume<u8>;

impl<T: Voxel> Index<Idx3d> for Volume<T> {
    type Output = T;

    #[inline]
    fn index(&self, (x, y, z): Idx3d) -> &Self::Output {
        &self.data[[z, y, x]]
    }
}

impl<T: Voxel> IndexMut<Idx3d> for Volume<T> {
    #[inline]
    fn index_mut(&mut self, (x, y, z): Idx3d) -> &mut Self::Output {
        &mut self.data[[z, y, x]]
    }
}

impl<T: Voxel> Volume<T> {
    /// 从 `[z, y, x]` 排布的数据和元信息直接构建. 数据必须非空.
    pub fn new(data: Array3<T>, geom: Geometry) -> Self {
        assert_ne!(data.len(), 0, "体数据不能为空");
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().to_owned()
        };
        Self { geom, data }
    }

    /// 构建以 `value` 均匀填充的体数据. `size` 按 `(x, y, z)`.
    pub fn filled(size: Idx3d, value: T, geom: Geometry) -> Self {
        let data = Array3::from_elem([size.2, size.1, size.0], value);
        Self::new(data, geom)
    }

    /// 获取几何元信息.
    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    /// 获取数据尺寸, 按 `(x, y, z)`.
    #[inline]
    pub fn size(&self) -> Idx3d {
        let (z, y, x) = self.data.dim();
        (x, y, z)
    }

    /// 获取体素个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// 体数据是否为空. 构造不变量保证恒为 `false`.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, T, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, T, Ix3> {
        self.data.view_mut()
    }

    /// 检查几何索引是否合法.
    #[inline]
    pub fn check(&self, (x, y, z): &Idx3d) -> bool {
        let (sx, sy, sz) = self.size();
        *x < sx && *y < sy && *z < sz
    }

    /// 安全访问, 越界返回 `None`.
    #[inline]
    pub fn get(&self, index: Idx3d) -> Option<T> {
        self.check(&index).then(|| self[index])
    }

    /// 表示 `physical` (mm) 的物理尺寸所需的体素数.
    #[inline]
    pub fn voxel_size_for(&self, physical: Idx3dF) -> Idx3d {
        physical_size_to_voxel_size(self.geom.spacing, physical)
    }

    /// 推导当前方向编码.
    #[inline]
    pub fn orientation(&self) -> Result<Orientation, OrientationError> {
        self.geom.orientation()
    }

    /// 两侧按常量填充. `lower`/`upper` 为每轴低位/高位的 padding 体素数.
    ///
    /// 原点相应向低位移动, 使所有原有体素的物理位置保持不变.
    pub fn constant_pad(&self, lower: Idx3d, upper: Idx3d, value: T) -> Self {
        let (x, y, z) = self.size();
        let shape = [
            z + lower.2 + upper.2,
            y + lower.1 + upper.1,
            x + lower.0 + upper.0,
        ];
        let mut data = Array3::from_elem(shape, value);
        data.slice_mut(ndarray::s![
            lower.2..lower.2 + z,
            lower.1..lower.1 + y,
            lower.0..lower.0 + x
        ])
        .assign(&self.data);

        let origin = self.geom.index_to_physical((
            -(lower.0 as f64),
            -(lower.1 as f64),
            -(lower.2 as f64),
        ));
        let geom = Geometry {
            spacing: self.geom.spacing,
            origin,
            direction: self.geom.direction,
        };
        Self::new(data, geom)
    }

    /// 从 `start` 开始裁剪 `size` 尺寸的子体数据.
    ///
    /// 窗口未完整落在界内时返回 [`CropError`], 绝不静默截短.
    pub fn region_of_interest(&self, start: Idx3dI, size: Idx3d) -> Result<Self, CropError> {
        let volume_size = self.size();
        let fits = start.0 >= 0
            && start.1 >= 0
            && start.2 >= 0
            && start.0 as usize + size.0 <= volume_size.0
            && start.1 as usize + size.1 <= volume_size.1
            && start.2 as usize + size.2 <= volume_size.2
            && size.0 > 0
            && size.1 > 0
            && size.2 > 0;
        if !fits {
            return Err(CropError {
                start,
                size,
                volume_size,
            });
        }

        let (sx, sy, sz) = (start.0 as usize, start.1 as usize, start.2 as usize);
        let view = self.data.slice(ndarray::s![
            sz..sz + size.2,
            sy..sy + size.1,
            sx..sx + size.0
        ]);
        let origin = self
            .geom
            .index_to_physical((start.0 as f64, start.1 as f64, start.2 as f64));
        let geom = Geometry {
            spacing: self.geom.spacing,
            origin,
            direction: self.geom.direction,
        };
        Ok(Self::new(view.to_owned(), geom))
    }

    /// 重定向到目标方向编码.
    ///
    /// 通过轴置换与翻转实现, 不做重采样; spacing, direction 与原点
    /// 同步更新, 所有体素的物理位置保持不变.
    pub fn reorient_to(&self, target: Orientation) -> Result<Self, OrientationError> {
        let current = self.orientation()?;
        if current == target {
            return Ok(self.clone());
        }

        // 对每个目标几何轴找到来源轴与是否翻转.
        let mut perm = [0usize; 3];
        let mut flip = [false; 3];
        for (j, want) in target.codes().into_iter().enumerate() {
            let source = current
                .axis_of(want)
                .or_else(|| current.axis_of(want.opposite()))
                .expect("两个合法方向编码覆盖同一组互逆对");
            perm[j] = source.index();
            flip[j] = current.codes()[source.index()] != want;
        }

        let view = self
            .data
            .view()
            .permuted_axes([2 - perm[2], 2 - perm[1], 2 - perm[0]]);
        let mut data = view.to_owned();
        for (j, flipped) in flip.iter().enumerate() {
            if *flipped {
                data.invert_axis(NdAxis(2 - j));
            }
        }
        let data = data.as_standard_layout().to_owned();

        let old_size = self.size();
        let old_sizes = [old_size.0, old_size.1, old_size.2];
        let mut spacing = [0.0; 3];
        let mut direction = [[0.0; 3]; 3];
        let mut corner = [0.0f64; 3];
        for j in 0..3 {
            let i = perm[j];
            spacing[j] = self.geom.spacing[i];
            let sign = if flip[j] { -1.0 } else { 1.0 };
            for (r, row) in self.geom.direction.iter().enumerate() {
                direction[r][j] = sign * row[i];
            }
            if flip[j] {
                corner[i] = old_sizes[i] as f64 - 1.0;
            }
        }
        let origin = self
            .geom
            .index_to_physical((corner[0], corner[1], corner[2]));

        Ok(Self::new(
            data,
            Geometry {
                spacing,
                origin,
                direction,
            },
        ))
    }
}

impl CtSeg {
    /// 获取分割中出现的非背景标签, 升序去重.
    pub fn labels(&self) -> Vec<u8> {
        self.data
            .iter()
            .copied()
            .filter(|v| *v != 0)
            .unique()
            .sorted()
            .collect()
    }

    /// 获取分割中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 将值为 `old` 的体素全部替换为 `new`. 返回替换个数.
    pub fn replace(&mut self, old: u8, new: u8) -> usize {
        let mut count = 0usize;
        self.data
            .iter_mut()
            .filter(|p| **p == old)
            .for_each(|p| {
                count += 1;
                *p = new;
            });
        count
    }

    /// 仅保留值为 `label` 的体素, 其余全部清零.
    pub fn keep_only_label(&self, label: u8) -> Self {
        let data = self.data.mapv(|v| if v == label { v } else { 0 });
        Self::new(data, self.geom.clone())
    }

    /// 计算标签 `label` 的 bounding box 与质心 (物理坐标).
    ///
    /// 标签不存在时返回 [`MissingLabelError`], 绝不静默产生空 ROI.
    pub fn label_stats(&self, label: u8) -> Result<LabelStats, MissingLabelError> {
        let mut min = [usize::MAX; 3];
        let mut max = [0usize; 3];
        let mut sum = [0.0f64; 3];
        let mut voxel_count = 0usize;

        for ((z, y, x), value) in self.data.indexed_iter() {
            if *value != label {
                continue;
            }
            let idx = [x, y, z];
            for k in 0..3 {
                min[k] = min[k].min(idx[k]);
                max[k] = max[k].max(idx[k]);
                sum[k] += idx[k] as f64;
            }
            voxel_count += 1;
        }

        if voxel_count == 0 {
            return Err(MissingLabelError {
                label,
                present: self.labels(),
            });
        }

        let mean = (
            sum[0] / voxel_count as f64,
            sum[1] / voxel_count as f64,
            sum[2] / voxel_count as f64,
        );
        Ok(LabelStats {
            bbox_origin: (min[0], min[1], min[2]),
            bbox_size: (max[0] - min[0] + 1, max[1] - min[1] + 1, max[2] - min[2] + 1),
            centroid: self.geom.index_to_physical(mean),
            voxel_count,
        })
    }

    /// 将多个互不重叠的分割掩码融合为一个掩码, 命中处填充 `fill_label`.
    ///
    /// 所有掩码的形状必须与 `self` 一致, 否则 panic.
    pub fn combine(&self, others: &[&CtSeg], fill_label: u8) -> Self {
        let mut data = self.data.mapv(|v| if v > 0 { fill_label } else { 0 });
        for seg in others {
            assert_eq!(seg.size(), self.size(), "掩码形状不一致");
            ndarray::Zip::from(&mut data)
                .and(&seg.data)
                .for_each(|out, v| {
                    if *v > 0 {
                        *out = fill_label;
                    }
                });
        }
        Self::new(data, self.geom.clone())
    }
}

impl CtImage {
    /// 用分割掩码遮罩强度体数据: 掩码为背景处填充 `outside`.
    ///
    /// 两者形状必须一致, 否则 panic.
    pub fn mask_with(&self, seg: &CtSeg, outside: f32) -> Self {
        assert_eq!(self.size(), seg.size(), "CT 与掩码形状不一致");
        let mut data = self.data.clone();
        ndarray::Zip::from(&mut data)
            .and(&seg.data)
            .for_each(|out, v| {
                if *v == 0 {
                    *out = outside;
                }
            });
        Self::new(data, self.geom.clone())
    }
}
