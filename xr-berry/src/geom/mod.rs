//! 几何核心: 元组算术, 解剖方向编码, padding 与 ROI 起点求解.

pub mod orientation;
pub mod padding;
pub mod tuple;

pub use orientation::{
    physical_size_to_voxel_size, voxel_size_to_physical_size, Axis, AxisCode, Orientation,
    OrientationError,
};

pub use padding::{
    required_padding, required_padding_ratio, roi_origin_from_center, roi_origin_from_ratio,
    ExtractionRatio, RatioError,
};
