//! 数据集操作.
//!
//! 提供迭代器风格的 subject 数据获取模式. 目录组织约定:
//! 每个 subject 占据 `{base}/{id}` 一个目录, 其中包含
//! `{id}_ct.nii.gz`, `{id}_seg-vert_msk.nii.gz` 与
//! `{id}_seg-subreg_ctd.json` 三个输入文件, 输出写入
//! `{base}/{id}/derivatives` 下的各子目录.

use std::path::{Path, PathBuf};

use crate::projection::ProjectionType;

/// 获取 `{用户主目录}/dataset` 目录.
pub fn home_dataset_dir() -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    Some(ans)
}

/// 获取 `{用户主目录}/dataset` 目录下给定后继项组成的全路径.
pub fn home_dataset_dir_with<P: AsRef<Path>, I: IntoIterator<Item = P>>(it: I) -> Option<PathBuf> {
    let mut ans = dirs::home_dir()?;
    ans.push("dataset");
    ans.extend(it);
    Some(ans)
}

/// 单个 subject 的输入与输出路径集合.
#[derive(Debug, Clone)]
pub struct SubjectPaths {
    /// subject 标识.
    pub subject_id: String,

    /// CT 扫描路径.
    pub ct: PathBuf,

    /// 分割标注路径.
    pub seg: PathBuf,

    /// 标志点标注路径.
    pub centroids: PathBuf,

    /// 输出根目录.
    pub out_dir: PathBuf,
}

impl SubjectPaths {
    /// 按目录约定构建.
    pub fn new(base: &Path, subject_id: &str) -> Self {
        let subject_dir = base.join(subject_id);
        Self {
            subject_id: subject_id.to_owned(),
            ct: subject_dir.join(format!("{subject_id}_ct.nii.gz")),
            seg: subject_dir.join(format!("{subject_id}_seg-vert_msk.nii.gz")),
            centroids: subject_dir.join(format!("{subject_id}_seg-subreg_ctd.json")),
            out_dir: subject_dir.join("derivatives"),
        }
    }

    /// 输出子目录.
    #[inline]
    pub fn output_dir(&self, sub_dir: &str) -> PathBuf {
        self.out_dir.join(sub_dir)
    }

    /// 单个椎体的分割 ROI 输出路径.
    pub fn seg_roi_path(&self, vb_id: u32) -> PathBuf {
        self.output_dir("seg_roi")
            .join(format!("{}_vert-{vb_id}_msk.nii.gz", self.subject_id))
    }

    /// 单个椎体的 CT ROI 输出路径.
    pub fn ct_roi_path(&self, vb_id: u32) -> PathBuf {
        self.output_dir("ct_roi")
            .join(format!("{}_vert-{vb_id}_ct.nii.gz", self.subject_id))
    }

    /// 单个椎体的标志点 heatmap 输出路径.
    pub fn heatmap_path(&self, vb_id: u32) -> PathBuf {
        self.output_dir("centroid")
            .join(format!("{}_vert-{vb_id}_ctd.nii.gz", self.subject_id))
    }

    /// 单个椎体的合成 X 光输出路径.
    pub fn xray_path(&self, vb_id: u32, view: ProjectionType) -> PathBuf {
        let view = match view {
            ProjectionType::Ap => "ap",
            ProjectionType::Lat => "lat",
        };
        self.output_dir("xray_from_ct")
            .join(format!("{}_vert-{vb_id}_{view}.png", self.subject_id))
    }

    /// 单个椎体标志点 heatmap 的合成 X 光输出路径.
    pub fn heatmap_xray_path(&self, vb_id: u32, view: ProjectionType) -> PathBuf {
        let view = match view {
            ProjectionType::Ap => "ap",
            ProjectionType::Lat => "lat",
        };
        self.output_dir("xray_from_ct")
            .join(format!("{}_vert-{vb_id}_ctd-{view}.png", self.subject_id))
    }

    /// 所有输出子目录.
    pub fn output_dirs(&self) -> [PathBuf; 4] {
        [
            self.output_dir("seg_roi"),
            self.output_dir("ct_roi"),
            self.output_dir("centroid"),
            self.output_dir("xray_from_ct"),
        ]
    }
}

/// 从指定索引和路径创建 subject 路径加载器.
///
/// # 注意
///
/// 1. `base` 必须是目录, 否则程序 panic.
/// 2. 路径按约定拼接, 文件是否存在推迟到实际打开时检查.
pub fn subject_loader<I, P>(ids: I, base: P) -> SubjectLoader
where
    I: IntoIterator<Item = String>,
    P: AsRef<Path>,
{
    let base = base.as_ref().to_owned();
    assert!(base.is_dir());

    let mut ids_rev: Vec<String> = ids.into_iter().collect();
    ids_rev.reverse();

    SubjectLoader { base, ids_rev }
}

/// subject 路径加载器.
#[derive(Debug)]
pub struct SubjectLoader {
    base: PathBuf,
    ids_rev: Vec<String>,
}

impl Iterator for SubjectLoader {
    type Item = SubjectPaths;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.ids_rev.pop()?;
        Some(SubjectPaths::new(&self.base, &id))
    }
}

impl ExactSizeIterator for SubjectLoader {
    #[inline]
    fn len(&self) -> usize {
        self.ids_rev.len()
    }
}
