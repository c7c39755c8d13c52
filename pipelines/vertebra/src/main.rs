//! 每椎体 ROI 与合成 X 光的批量生成入口.

mod runner;

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
        .expect("日志初始化只应执行一次");

    let report = runner::run();

    utils::sep();
    println!(
        "成功 {} 个 subject, 失败 {} 个",
        report.succeeded.len(),
        report.failed.len()
    );
    for (id, message) in &report.failed {
        println!("  {id}: {message}");
    }
    utils::sep();

    if !report.is_all_ok() {
        std::process::exit(1);
    }
}
