//! 平行投影模拟 (合成 X 光).
//!
//! 将各向同性重采样后的体数据沿解剖学上正确的轴做均值塌缩,
//! 得到归一化的 2D 灰度图. 投影轴由体数据当前的方向编码决定,
//! 每次调用重新解析, 不与任何固定的数组轴绑定.

use std::path::Path;

use image::ImageResult;
use itertools::{Itertools, MinMaxResult};
use ndarray::{Array2, Axis as NdAxis};
use ordered_float::NotNan;

use crate::data::{make_isotropic, Interpolator, Volume, Voxel};
use crate::geom::orientation::{AxisCode, OrientationError};

/// X 光投影视角.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ProjectionType {
    /// Anterior-Posterior 正位片.
    Ap,

    /// Lateral 侧位片.
    Lat,
}

/// 8-bit 单通道 2D 投影图. 数据按 `[行, 列]` 存储.
#[derive(Debug, Clone, PartialEq)]
pub struct Xray2d {
    data: Array2<u8>,
}

impl Xray2d {
    /// 从裸数据构建.
    pub fn new(data: Array2<u8>) -> Self {
        assert_ne!(data.len(), 0, "投影图不能为空");
        Self { data }
    }

    /// 获取数据视图.
    #[inline]
    pub fn data(&self) -> &Array2<u8> {
        &self.data
    }

    /// 获取 `(行数, 列数)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// 按原样将投影图保存为 8-bit 单通道图像文件.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> ImageResult<()> {
        let (height, width) = self.shape();
        let mut buf = image::GrayImage::new(width as u32, height as u32);
        for ((h, w), &pix) in self.data.indexed_iter() {
            buf.put_pixel(w as u32, h as u32, image::Luma([pix]));
        }
        buf.save(path)
    }
}

/// 沿视角对应的解剖轴做均值投影, 生成合成 X 光.
///
/// 步骤: 1 mm 各向同性最近邻重采样; 推导方向编码;
/// AP 视角取字母 'P' 所在轴 (缺失时取 'A'), LAT 视角取 'L'
/// (缺失时取 'R'); 沿该轴求均值; 强度线性拉伸到 `[0, 255]`
/// 后转为 8-bit. 输入恒定 (退化情形) 时输出全零.
pub fn simulate_parallel_projection<T: Voxel>(
    volume: &Volume<T>,
    view: ProjectionType,
) -> Result<Xray2d, OrientationError> {
    let iso = make_isotropic(volume, Some(1.0), Interpolator::NearestNeighbour);
    let orientation = iso.orientation()?;

    let axis = match view {
        ProjectionType::Ap => orientation
            .axis_of(AxisCode::P)
            .or_else(|| orientation.axis_of(AxisCode::A)),
        ProjectionType::Lat => orientation
            .axis_of(AxisCode::L)
            .or_else(|| orientation.axis_of(AxisCode::R)),
    }
    .expect("合法方向编码必然包含互逆对中的一个字母");

    let values = iso.data().mapv(|v| v.to_f64());
    let mean = values
        .mean_axis(NdAxis(axis.array_axis()))
        .expect("体数据非空");

    let minmax = mean
        .iter()
        .map(|v| NotNan::new(*v).expect("均值投影不应出现 NaN"))
        .minmax();
    let (low, high) = match minmax {
        MinMaxResult::MinMax(a, b) => (a.into_inner(), b.into_inner()),
        MinMaxResult::OneElement(a) => (a.into_inner(), a.into_inner()),
        MinMaxResult::NoElements => unreachable!("投影结果非空"),
    };

    let data = if high > low {
        let scale = 255.0 / (high - low);
        mean.mapv(|v| ((v - low) * scale).round() as u8)
    } else {
        Array2::zeros(mean.dim())
    };
    Ok(Xray2d::new(data))
}
