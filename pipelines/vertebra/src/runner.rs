//! 程序运行函数.

use utils::loader;
use xr_berry::dataset::subject_loader;
use xr_berry::pipeline::{run_batch, BatchReport, PipelineConfig};

/// 实际运行.
pub fn run() -> BatchReport {
    let dataset_dir = loader::dataset_dir_from_env_or_home();
    assert!(dataset_dir.is_dir(), "数据集目录不存在: {dataset_dir:?}");

    let subject_ids = loader::read_subject_list(loader::subject_list_from_env_or_home());
    log::info!(
        "数据集 {dataset_dir:?}, {} 个 subject, {} 个可用核心",
        subject_ids.len(),
        utils::cpus()
    );

    let subjects: Vec<_> = subject_loader(subject_ids, &dataset_dir).collect();
    let config = PipelineConfig::default();

    println!("Running preprocessing pipeline...");
    run_batch(&subjects, &config)
}
