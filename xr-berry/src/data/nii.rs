//! nii 格式体数据的读写.
//!
//! 读取时把 NIfTI 的 RAS 仿射 (sform) 换算为 LPS 的 [`Geometry`],
//! 写入时逆向重建 sform. 非正交的 direction 按原样读入,
//! 不做任何静默 "修复", 由核心算法入口负责拒绝.

use std::path::Path;

use ndarray::Array3;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use super::{CtImage, CtSeg, Geometry};
use crate::Idx3d;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn shape_from_header(h: &NiftiHeader) -> [usize; 3] {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    [z as usize, h as usize, w as usize]
}

/// 从 header 构建几何元信息.
fn geometry_from_header(h: &NiftiHeader) -> Geometry {
    let mut spacing = [
        h.pixdim[1].abs() as f64,
        h.pixdim[2].abs() as f64,
        h.pixdim[3].abs() as f64,
    ];
    for s in spacing.iter_mut() {
        if !s.is_finite() || *s <= 0.0 {
            *s = 1.0;
        }
    }

    if h.sform_code > 0 {
        let rows = [h.srow_x, h.srow_y, h.srow_z];
        let mut direction = [[0.0; 3]; 3];
        for j in 0..3 {
            // NIfTI 仿射在 RAS 世界系下, 前两行取反换算到 LPS.
            direction[0][j] = -(rows[0][j] as f64) / spacing[j];
            direction[1][j] = -(rows[1][j] as f64) / spacing[j];
            direction[2][j] = rows[2][j] as f64 / spacing[j];
        }
        let origin = [
            -(rows[0][3] as f64),
            -(rows[1][3] as f64),
            rows[2][3] as f64,
        ];
        Geometry {
            spacing,
            origin,
            direction,
        }
    } else {
        log::debug!("nii header 缺少 sform, 退化为单位 direction");
        Geometry::identity(spacing)
    }
}

/// 从几何元信息构建可供写入的 header.
fn header_from_geometry(geom: &Geometry, size: Idx3d) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    header.dim = [3, size.0 as u16, size.1 as u16, size.2 as u16, 1, 1, 1, 1];
    header.pixdim = [
        1.0,
        geom.spacing[0] as f32,
        geom.spacing[1] as f32,
        geom.spacing[2] as f32,
        0.0,
        0.0,
        0.0,
        0.0,
    ];
    header.sform_code = 1;
    header.qform_code = 0;
    for j in 0..3 {
        header.srow_x[j] = (-geom.direction[0][j] * geom.spacing[j]) as f32;
        header.srow_y[j] = (-geom.direction[1][j] * geom.spacing[j]) as f32;
        header.srow_z[j] = (geom.direction[2][j] * geom.spacing[j]) as f32;
    }
    header.srow_x[3] = -geom.origin[0] as f32;
    header.srow_y[3] = -geom.origin[1] as f32;
    header.srow_z[3] = geom.origin[2] as f32;
    header
}

macro_rules! impl_nii_io {
    ($volume: ty, $elem: ty) => {
        impl $volume {
            /// 打开 nii (或 nii.gz) 格式的体数据文件.
            /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
            pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
                let obj = ReaderOptions::new().read_file(path.as_ref())?;
                let header = obj.header().clone();

                // [W, H, z] -> [z, H, W].
                let data = obj
                    .into_volume()
                    .into_ndarray::<$elem>()?
                    .permuted_axes([2, 1, 0].as_slice());

                // The nature of nifti data field layout.
                debug_assert!(data.is_standard_layout());

                // 该操作不会生成 `Err`, 可直接 unwrap.
                let data = Array3::<$elem>::from_shape_vec(
                    shape_from_header(&header),
                    data.into_raw_vec(),
                )
                .unwrap();

                Ok(Self::new(data, geometry_from_header(&header)))
            }

            /// 将体数据写入 nii (或 nii.gz) 文件, 保留几何元信息.
            pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), nifti::NiftiError> {
                let header = header_from_geometry(self.geometry(), self.size());
                let view = self.data().permuted_axes([2, 1, 0]);
                nifti::writer::WriterOptions::new(path.as_ref())
                    .reference_header(&header)
                    .write_nifti(&view)
            }
        }
    };
}

impl_nii_io!(CtImage, f32);
impl_nii_io!(CtSeg, u8);
