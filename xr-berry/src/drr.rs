//! 外部 DRR (Digitally Reconstructed Radiograph) 渲染器接口.
//!
//! 当需要比均值投影保真度更高的射线追踪投影时,
//! 以外部进程方式调用 SiddonJacobs 渲染器. 渲染器作为显式
//! collaborator 建模: 进程的退出状态被检查并转换为 `Result`,
//! 不假设调用必然成功.

use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;

use crate::projection::ProjectionType;

/// 已知的候选渲染命令. 第一个可执行文件需要附加子命令参数.
const CANDIDATE_COMMANDS: [(&str, Option<&str>); 2] = [
    (
        "TwoProjectionRegistrationTestDriver",
        Some("GetDRRSiddonJacobsRayTracing"),
    ),
    ("DRRSiddonJacobs", None),
];

/// 单个视角的旋转位姿 (角度制).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrrPose {
    /// 绕 x 轴的旋转角.
    pub rx: f64,

    /// 绕 y 轴的旋转角.
    pub ry: f64,

    /// 绕 z 轴的旋转角.
    pub rz: f64,
}

/// 渲染器配置: 分辨率, 输出尺寸与两个视角的位姿.
#[derive(Debug, Clone, PartialEq)]
pub struct DrrSettings {
    /// 输出像素分辨率 (mm/像素), 两个方向相同.
    pub res: f64,

    /// 输出图像边长 (像素), 两个方向相同.
    pub size: u32,

    /// AP 视角位姿.
    pub ap: DrrPose,

    /// LAT 视角位姿.
    pub lat: DrrPose,
}

impl Default for DrrSettings {
    fn default() -> Self {
        Self {
            res: 1.0,
            size: 128,
            ap: DrrPose {
                rx: -90.0,
                ry: 0.0,
                rz: 0.0,
            },
            lat: DrrPose {
                rx: 0.0,
                ry: 90.0,
                rz: 0.0,
            },
        }
    }
}

/// DRR 渲染错误.
#[derive(Debug)]
pub enum DrrError {
    /// PATH 中找不到任何候选渲染命令.
    ExecutableNotFound,

    /// 进程启动失败.
    Spawn(std::io::Error),

    /// 渲染器以非零状态退出.
    Failed {
        /// 退出码. 被信号终止时为 `None`.
        code: Option<i32>,

        /// 渲染器的标准错误输出.
        stderr: String,
    },
}

/// 在 PATH 中查找可执行文件.
fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// 解析可用的渲染命令. 结果在进程生命周期内缓存.
static RESOLVED_COMMAND: Lazy<Option<(PathBuf, Option<&'static str>)>> = Lazy::new(|| {
    CANDIDATE_COMMANDS
        .iter()
        .find_map(|(name, subcommand)| find_in_path(name).map(|p| (p, *subcommand)))
});

/// 构建渲染器的参数列表 (不含可执行文件与子命令).
///
/// 参数约定: `input -o output -rx <deg> -ry <deg> -rz <deg>
/// -res <r> <r> -size <s> <s>`.
pub fn build_drr_args(
    input: &Path,
    output: &Path,
    pose: DrrPose,
    settings: &DrrSettings,
) -> Vec<String> {
    vec![
        input.display().to_string(),
        "-o".into(),
        output.display().to_string(),
        "-rx".into(),
        pose.rx.to_string(),
        "-ry".into(),
        pose.ry.to_string(),
        "-rz".into(),
        pose.rz.to_string(),
        "-res".into(),
        settings.res.to_string(),
        settings.res.to_string(),
        "-size".into(),
        settings.size.to_string(),
        settings.size.to_string(),
    ]
}

/// 调用外部渲染器, 从 `input` 体数据渲染一张 DRR 到 `output`.
pub fn render_drr(
    input: &Path,
    output: &Path,
    view: ProjectionType,
    settings: &DrrSettings,
) -> Result<(), DrrError> {
    let (executable, subcommand) = RESOLVED_COMMAND
        .as_ref()
        .ok_or(DrrError::ExecutableNotFound)?;

    let pose = match view {
        ProjectionType::Ap => settings.ap,
        ProjectionType::Lat => settings.lat,
    };

    let mut command = Command::new(executable);
    if let Some(sub) = *subcommand {
        command.arg(sub);
    }
    command.args(build_drr_args(input, output, pose, settings));

    log::debug!("调用 DRR 渲染器: {command:?}");
    let result = command.output().map_err(DrrError::Spawn)?;
    if result.status.success() {
        Ok(())
    } else {
        Err(DrrError::Failed {
            code: result.status.code(),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_drr_args_layout() {
        let settings = DrrSettings {
            res: 1.5,
            size: 256,
            ..DrrSettings::default()
        };
        let args = build_drr_args(
            Path::new("in.nii.gz"),
            Path::new("out.png"),
            DrrPose {
                rx: -90.0,
                ry: 0.0,
                rz: 15.0,
            },
            &settings,
        );
        assert_eq!(
            args,
            vec![
                "in.nii.gz", "-o", "out.png", "-rx", "-90", "-ry", "0", "-rz", "15", "-res",
                "1.5", "1.5", "-size", "256", "256",
            ]
        );
    }
}
