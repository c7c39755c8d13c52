//! 常用项的一站式导入.

pub use crate::annotations::{load_centroids, CentroidAnnotation};
pub use crate::consts::{CT_PADDING, HEATMAP_SIGMA, SEG_PADDING};
pub use crate::data::{
    make_isotropic, resample_to_reference, CtImage, CtSeg, Geometry, Interpolator, Volume, Voxel,
};
pub use crate::geom::orientation::{Axis, AxisCode, Orientation};
pub use crate::geom::padding::ExtractionRatio;
pub use crate::patch::{tile, tile_xray, untile, untile_xray};
pub use crate::pipeline::{
    process_subject, run_batch, BatchReport, PipelineConfig, RoiProperties, XrayMode,
};
pub use crate::projection::{simulate_parallel_projection, ProjectionType, Xray2d};
pub use crate::roi::{
    extract_around_centroid, extract_bbox, extract_bbox_topleft, generate_gaussian_heatmap,
    RoiError,
};
