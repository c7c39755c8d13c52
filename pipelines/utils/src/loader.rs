//! 对 `xr-berry::dataset` 的更一层封装. 提供更直接的数据集定位方式.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// 获取数据集基本路径.
///
/// 1. 若环境变量 `$XR_DATASET_DIR` 非空, 则返回其值;
/// 2. 否则, 返回 `$HOME/dataset/verse20/BIDS`.
pub fn dataset_dir_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("XR_DATASET_DIR") {
        PathBuf::from(d)
    } else {
        xr_berry::dataset::home_dataset_dir_with(["verse20", "BIDS"]).unwrap()
    }
}

/// 获取 subject 列表文件路径.
///
/// 1. 若环境变量 `$XR_SUBJECT_LIST` 非空, 则返回其值;
/// 2. 否则, 返回 `{数据集基本路径}/subjects.csv`.
pub fn subject_list_from_env_or_home() -> PathBuf {
    if let Ok(d) = env::var("XR_SUBJECT_LIST") {
        PathBuf::from(d)
    } else {
        dataset_dir_from_env_or_home().join("subjects.csv")
    }
}

/// 读取 subject 列表文件: 每行一个 subject 标识, 空行被忽略.
///
/// 文件不可读时 panic.
pub fn read_subject_list<P: AsRef<Path>>(path: P) -> Vec<String> {
    let text = fs::read_to_string(path.as_ref())
        .unwrap_or_else(|e| panic!("无法读取 subject 列表 {:?}: {e}", path.as_ref()));
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}
