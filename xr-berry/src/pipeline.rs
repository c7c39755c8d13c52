//! 每 subject 的处理流程与批处理驱动.
//!
//! 配置是一次构建的不可变值, 以引用传入每次调用, 不存在任何
//! 进程级可变全局状态. 单个 subject 的完整流程 (定位, 补齐,
//! 裁剪, 投影) 在一个 worker 内同步跑完, worker 之间不共享可变
//! 状态; 单个 subject 的失败被记录后批处理继续执行.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::annotations::{load_centroids, AnnotationError};
use crate::consts::{CT_PADDING, HEATMAP_SIGMA, SEG_PADDING};
use crate::data::{CtImage, CtSeg, Volume, Voxel};
use crate::dataset::SubjectPaths;
use crate::drr::{render_drr, DrrError, DrrSettings};
use crate::geom::orientation::{Orientation, OrientationError};
use crate::geom::padding::ExtractionRatio;
use crate::projection::{simulate_parallel_projection, ProjectionType};
use crate::roi::{extract_around_centroid, RoiError};
use crate::Idx3dF;

/// X 光生成方式.
#[derive(Debug, Clone, PartialEq)]
pub enum XrayMode {
    /// 库内的平行均值投影模拟.
    Parallel,

    /// 外部 SiddonJacobs 射线追踪渲染器.
    SiddonJacobs(DrrSettings),
}

/// ROI 提取配置.
#[derive(Debug, Clone)]
pub struct RoiProperties {
    /// ROI 的物理边长 (mm), 三个轴相同.
    pub physical_size: f64,

    /// 强度体数据的越界填充值.
    pub ct_padding: f32,

    /// 分割体数据的越界填充值.
    pub seg_padding: u8,

    /// 输出 ROI 的目标方向编码. `None` 表示保持原方向.
    pub axcode: Option<Orientation>,

    /// 提取比例.
    pub extraction_ratio: ExtractionRatio,

    /// heatmap 的 Gaussian 标准差 (mm).
    pub sigma: f64,

    /// 是否先用分割掩码遮罩 CT ROI 再生成投影.
    pub drr_from_ct_mask: bool,
}

impl Default for RoiProperties {
    fn default() -> Self {
        Self {
            physical_size: 96.0,
            ct_padding: CT_PADDING,
            seg_padding: SEG_PADDING,
            axcode: Some("PIR".parse().expect("合法方向编码")),
            extraction_ratio: ExtractionRatio::centered(),
            sigma: HEATMAP_SIGMA,
            drr_from_ct_mask: false,
        }
    }
}

/// 流水线配置.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// ROI 提取配置.
    pub roi: RoiProperties,

    /// X 光生成方式.
    pub xray: XrayMode,
}

impl Default for XrayMode {
    fn default() -> Self {
        Self::Parallel
    }
}

/// 流水线错误. 在编排层聚合各协作组件的错误类型.
#[derive(Debug)]
pub enum PipelineError {
    /// 体数据读写错误.
    Nifti(nifti::NiftiError),

    /// ROI 提取错误.
    Roi(RoiError),

    /// 重定向错误.
    Orientation(OrientationError),

    /// 标注解析错误.
    Annotation(AnnotationError),

    /// 投影图写出错误.
    Image(image::ImageError),

    /// 外部 DRR 渲染器错误.
    Drr(DrrError),

    /// 其他底层 I/O 错误.
    Io(std::io::Error),
}

impl From<nifti::NiftiError> for PipelineError {
    fn from(e: nifti::NiftiError) -> Self {
        Self::Nifti(e)
    }
}

impl From<RoiError> for PipelineError {
    fn from(e: RoiError) -> Self {
        Self::Roi(e)
    }
}

impl From<OrientationError> for PipelineError {
    fn from(e: OrientationError) -> Self {
        Self::Orientation(e)
    }
}

impl From<AnnotationError> for PipelineError {
    fn from(e: AnnotationError) -> Self {
        Self::Annotation(e)
    }
}

impl From<image::ImageError> for PipelineError {
    fn from(e: image::ImageError) -> Self {
        Self::Image(e)
    }
}

impl From<DrrError> for PipelineError {
    fn from(e: DrrError) -> Self {
        Self::Drr(e)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// 按配置提取 ROI 并重定向到目标方向编码.
fn extract_oriented<T: Voxel>(
    props: &RoiProperties,
    volume: &Volume<T>,
    centroid_index: Idx3dF,
    padding: T,
) -> Result<(Volume<T>, CtImage), PipelineError> {
    let physical = (
        props.physical_size,
        props.physical_size,
        props.physical_size,
    );
    let (mut roi, mut heatmap) = extract_around_centroid(
        volume,
        physical,
        centroid_index,
        &props.extraction_ratio,
        padding,
        props.sigma,
    )?;

    if let Some(code) = props.axcode {
        if roi.orientation()? != code {
            roi = roi.reorient_to(code)?;
            heatmap = heatmap.reorient_to(code)?;
        }
    }
    Ok((roi, heatmap))
}

/// 提取单个椎体的分割 ROI (仅保留该椎体的标签).
pub fn extract_segmentation_roi(
    props: &RoiProperties,
    seg: &CtSeg,
    vb_id: u32,
    centroid_index: Idx3dF,
) -> Result<(CtSeg, CtImage), PipelineError> {
    let label = u8::try_from(vb_id).expect("椎体标签应在 u8 范围内");
    let (roi, heatmap) = extract_oriented(props, seg, centroid_index, props.seg_padding)?;
    Ok((roi.keep_only_label(label), heatmap))
}

/// 提取单个椎体的 CT ROI 与标志点 heatmap.
pub fn extract_image_roi(
    props: &RoiProperties,
    ct: &CtImage,
    centroid_index: Idx3dF,
) -> Result<(CtImage, CtImage), PipelineError> {
    extract_oriented(props, ct, centroid_index, props.ct_padding)
}

/// 生成一张 X 光.
///
/// 模拟模式直接对 `mask` 体数据做均值投影; 外部渲染模式把
/// `rendered_input` 路径交给 DRR 渲染器.
pub fn generate_xray<T: Voxel>(
    rendered_input: &Path,
    view: ProjectionType,
    mask: &Volume<T>,
    mode: &XrayMode,
    out_path: &Path,
) -> Result<(), PipelineError> {
    match mode {
        XrayMode::Parallel => {
            let xray = simulate_parallel_projection(mask, view)?;
            xray.save(out_path)?;
            Ok(())
        }
        XrayMode::SiddonJacobs(settings) => {
            render_drr(rendered_input, out_path, view, settings)?;
            Ok(())
        }
    }
}

/// 处理一个 subject: 对标注中的每个椎体提取配对的
/// (分割 ROI, CT ROI, heatmap) 并生成 AP/LAT 投影.
pub fn process_subject(paths: &SubjectPaths, config: &PipelineConfig) -> Result<(), PipelineError> {
    let ct = CtImage::open(&paths.ct)?;
    let seg = CtSeg::open(&paths.seg)?;
    let annotation = load_centroids(&paths.centroids)?;

    log::debug!(
        "subject {}: CT 尺寸 {:?}, spacing {:?}, 标志点 {} 个",
        paths.subject_id,
        ct.size(),
        ct.geometry().spacing,
        annotation.centroids.len()
    );

    for dir in paths.output_dirs() {
        fs::create_dir_all(dir)?;
    }

    for (vb_id, centroid_index) in &annotation.centroids {
        let vb_id = *vb_id;
        log::debug!("subject {}: 处理椎体 {vb_id}", paths.subject_id);

        let (seg_roi, _) =
            extract_segmentation_roi(&config.roi, &seg, vb_id, *centroid_index)?;
        seg_roi.save(paths.seg_roi_path(vb_id))?;

        let (mut ct_roi, heatmap) = extract_image_roi(&config.roi, &ct, *centroid_index)?;
        if config.roi.drr_from_ct_mask {
            ct_roi = ct_roi.mask_with(&seg_roi, 0.0);
        }
        let ct_path = paths.ct_roi_path(vb_id);
        ct_roi.save(&ct_path)?;
        let heatmap_path = paths.heatmap_path(vb_id);
        heatmap.save(&heatmap_path)?;

        for view in [ProjectionType::Ap, ProjectionType::Lat] {
            generate_xray(
                &ct_path,
                view,
                &seg_roi,
                &config.xray,
                &paths.xray_path(vb_id, view),
            )?;
            generate_xray(
                &heatmap_path,
                view,
                &heatmap,
                &config.xray,
                &paths.heatmap_xray_path(vb_id, view),
            )?;
        }
    }
    Ok(())
}

/// 批处理结果汇总.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// 处理成功的 subject.
    pub succeeded: Vec<String>,

    /// 处理失败的 subject 及其错误描述.
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    fn from_results(results: Vec<(String, Result<(), String>)>) -> Self {
        let mut report = Self::default();
        for (id, result) in results {
            match result {
                Ok(()) => report.succeeded.push(id),
                Err(message) => {
                    log::error!("subject {id} 处理失败: {message}");
                    report.failed.push((id, message));
                }
            }
        }
        report
    }

    /// 是否全部成功.
    #[inline]
    pub fn is_all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// 运行单个 subject, 把错误与 panic 都折叠为字符串描述.
fn run_subject_guarded(paths: &SubjectPaths, config: &PipelineConfig) -> Result<(), String> {
    match catch_unwind(AssertUnwindSafe(|| process_subject(paths, config))) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:?}")),
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "未知 panic".to_owned());
            Err(format!("panic: {message}"))
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        /// 对一组 subject 做数据并行的批处理.
        ///
        /// subject 之间无顺序保证; 单个 subject 的失败 (错误或
        /// panic) 被记录到返回的汇总中, 不会中断其余 subject.
        pub fn run_batch(subjects: &[SubjectPaths], config: &PipelineConfig) -> BatchReport {
            use rayon::prelude::*;

            let results: Vec<(String, Result<(), String>)> = subjects
                .par_iter()
                .map(|s| (s.subject_id.clone(), run_subject_guarded(s, config)))
                .collect();
            BatchReport::from_results(results)
        }
    } else {
        /// 对一组 subject 做串行批处理.
        ///
        /// 单个 subject 的失败 (错误或 panic) 被记录到返回的
        /// 汇总中, 不会中断其余 subject.
        pub fn run_batch(subjects: &[SubjectPaths], config: &PipelineConfig) -> BatchReport {
            let results: Vec<(String, Result<(), String>)> = subjects
                .iter()
                .map(|s| (s.subject_id.clone(), run_subject_guarded(s, config)))
                .collect();
            BatchReport::from_results(results)
        }
    }
}
