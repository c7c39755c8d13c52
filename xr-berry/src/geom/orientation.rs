//! 解剖方向编码 (anatomical orientation code).
//!
//! 一个体数据的方向由 3 个字母描述, 每个字母对应一个索引轴,
//! 取自三对互逆方向: Left/Right, Anterior/Posterior, Superior/Inferior.
//! 字母语义沿用 DICOM 的 "toward" 约定: 编码 `RAS` 表示
//! x 轴索引增长方向朝向 Right, y 轴朝向 Anterior, z 轴朝向 Superior.

use std::fmt::{self, Formatter};
use std::str::FromStr;

use crate::{Idx3d, Idx3dF};

/// 几何轴的类型化表示, 替代魔法整数.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Axis {
    /// 第一几何轴.
    X,
    /// 第二几何轴.
    Y,
    /// 第三几何轴.
    Z,
}

impl Axis {
    /// 几何轴序号 (x = 0, y = 1, z = 2).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// 底层 `ndarray` 数据轴序号. 数据按 `[z, y, x]` 存储, 与几何轴互为反序.
    #[inline]
    pub fn array_axis(self) -> usize {
        2 - self.index()
    }

    /// 从几何轴序号构建. `index` 必须小于 3, 否则 panic.
    #[inline]
    pub fn from_index(index: usize) -> Axis {
        match index {
            0 => Axis::X,
            1 => Axis::Y,
            2 => Axis::Z,
            _ => panic!("几何轴序号只能是 0, 1 或 2, 但得到 `{index}`"),
        }
    }
}

/// 六个合法的解剖方向字母.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum AxisCode {
    /// Left.
    L,
    /// Right.
    R,
    /// Anterior.
    A,
    /// Posterior.
    P,
    /// Superior.
    S,
    /// Inferior.
    I,
}

impl AxisCode {
    /// 获取相反方向. 该函数在六个字母上是全函数.
    #[inline]
    pub fn opposite(self) -> AxisCode {
        match self {
            AxisCode::L => AxisCode::R,
            AxisCode::R => AxisCode::L,
            AxisCode::A => AxisCode::P,
            AxisCode::P => AxisCode::A,
            AxisCode::S => AxisCode::I,
            AxisCode::I => AxisCode::S,
        }
    }

    /// 该方向所属的互逆对序号 (L/R = 0, A/P = 1, S/I = 2).
    #[inline]
    fn pair(self) -> usize {
        match self {
            AxisCode::L | AxisCode::R => 0,
            AxisCode::A | AxisCode::P => 1,
            AxisCode::S | AxisCode::I => 2,
        }
    }

    /// LPS 物理坐标系下, 该方向对应的世界轴与符号.
    #[inline]
    fn world_axis_sign(self) -> (usize, f64) {
        match self {
            AxisCode::L => (0, 1.0),
            AxisCode::R => (0, -1.0),
            AxisCode::P => (1, 1.0),
            AxisCode::A => (1, -1.0),
            AxisCode::S => (2, 1.0),
            AxisCode::I => (2, -1.0),
        }
    }

    /// 对应的大写字母.
    #[inline]
    pub fn as_char(self) -> char {
        match self {
            AxisCode::L => 'L',
            AxisCode::R => 'R',
            AxisCode::A => 'A',
            AxisCode::P => 'P',
            AxisCode::S => 'S',
            AxisCode::I => 'I',
        }
    }
}

impl TryFrom<char> for AxisCode {
    type Error = OrientationError;

    fn try_from(value: char) -> Result<Self, Self::Error> {
        match value {
            'L' => Ok(AxisCode::L),
            'R' => Ok(AxisCode::R),
            'A' => Ok(AxisCode::A),
            'P' => Ok(AxisCode::P),
            'S' => Ok(AxisCode::S),
            'I' => Ok(AxisCode::I),
            other => Err(OrientationError::InvalidLetter(other)),
        }
    }
}

/// 方向编码相关错误.
#[derive(Debug, Clone, PartialEq)]
pub enum OrientationError {
    /// 编码长度不是 3.
    InvalidLength(usize),

    /// 出现六个合法字母之外的字符.
    InvalidLetter(char),

    /// 三个字母没有覆盖三对互逆方向各一次.
    ConflictingAxes([char; 3]),

    /// direction 矩阵退化, 无法归一到唯一的方向编码.
    DegenerateDirection,
}

/// 3 字母解剖方向编码.
///
/// 不变量: 三个字母分别来自三对互逆方向, 互不重复. 构造时校验.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Orientation([AxisCode; 3]);

impl Orientation {
    /// 从三个字母构建方向编码, 校验不变量.
    pub fn new(codes: [AxisCode; 3]) -> Result<Self, OrientationError> {
        let mut seen = [false; 3];
        for c in codes {
            let pair = c.pair();
            if seen[pair] {
                return Err(OrientationError::ConflictingAxes(
                    codes.map(AxisCode::as_char),
                ));
            }
            seen[pair] = true;
        }
        Ok(Self(codes))
    }

    /// 从 direction cosines 推导最接近的正交解剖方向编码.
    ///
    /// 算法与 DICOM 方向推导同族: 取每一列绝对值最大的分量,
    /// 按其所在世界轴与符号映射到方向字母.
    pub fn from_direction(direction: &[[f64; 3]; 3]) -> Result<Self, OrientationError> {
        let mut codes = [AxisCode::L; 3];
        for (j, code) in codes.iter_mut().enumerate() {
            let column = [direction[0][j], direction[1][j], direction[2][j]];
            let mut dominant = 0;
            for (r, value) in column.iter().enumerate() {
                if value.abs() > column[dominant].abs() {
                    dominant = r;
                }
            }
            if column[dominant] == 0.0 {
                return Err(OrientationError::DegenerateDirection);
            }
            let positive = column[dominant] > 0.0;
            *code = match (dominant, positive) {
                (0, true) => AxisCode::L,
                (0, false) => AxisCode::R,
                (1, true) => AxisCode::P,
                (1, false) => AxisCode::A,
                (2, true) => AxisCode::S,
                (2, false) => AxisCode::I,
                _ => unreachable!(),
            };
        }
        Self::new(codes).map_err(|_| OrientationError::DegenerateDirection)
    }

    /// 获取三个字母.
    #[inline]
    pub fn codes(&self) -> [AxisCode; 3] {
        self.0
    }

    /// 查找字母 `code` 对应的几何轴. 字母不在编码中时返回 `None`.
    #[inline]
    pub fn axis_of(&self, code: AxisCode) -> Option<Axis> {
        self.0
            .iter()
            .position(|c| *c == code)
            .map(Axis::from_index)
    }

    /// Superior-Inferior 方向对应的几何轴.
    /// 由不变量保证该轴总是存在.
    #[inline]
    pub fn superior_inferior_axis(&self) -> Axis {
        self.axis_of(AxisCode::S)
            .or_else(|| self.axis_of(AxisCode::I))
            .expect("合法方向编码必然包含 S 或 I")
    }

    /// Superior-Inferior 轴的索引增长方向是否朝向 Superior.
    #[inline]
    pub fn is_superior_to_inferior(&self) -> bool {
        let axis = self.superior_inferior_axis();
        self.0[axis.index()] == AxisCode::S
    }

    /// 该编码对应的 (标准化) direction 矩阵: 带符号的置换矩阵.
    pub fn to_direction(&self) -> [[f64; 3]; 3] {
        let mut direction = [[0.0; 3]; 3];
        for (j, code) in self.0.iter().enumerate() {
            let (world, sign) = code.world_axis_sign();
            direction[world][j] = sign;
        }
        direction
    }
}

impl FromStr for Orientation {
    type Err = OrientationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 3 {
            return Err(OrientationError::InvalidLength(chars.len()));
        }
        let codes = [
            AxisCode::try_from(chars[0])?,
            AxisCode::try_from(chars[1])?,
            AxisCode::try_from(chars[2])?,
        ];
        Self::new(codes)
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for c in self.0 {
            write!(f, "{}", c.as_char())?;
        }
        Ok(())
    }
}

/// 给定体素分辨率, 表示 `physical` (mm) 的物理尺寸需要多少体素?
///
/// 逐元素 `physical / spacing`, 四舍五入到最近整数.
/// 全库统一采用该舍入策略.
#[inline]
pub fn physical_size_to_voxel_size(spacing: [f64; 3], physical: Idx3dF) -> Idx3d {
    (
        (physical.0 / spacing[0]).round() as usize,
        (physical.1 / spacing[1]).round() as usize,
        (physical.2 / spacing[2]).round() as usize,
    )
}

/// 给定体素分辨率, `voxel` 个体素占据多少物理空间 (mm)?
#[inline]
pub fn voxel_size_to_physical_size(spacing: [f64; 3], voxel: Idx3d) -> Idx3dF {
    (
        voxel.0 as f64 * spacing[0],
        voxel.1 as f64 * spacing[1],
        voxel.2 as f64 * spacing[2],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposite_is_involution() {
        use AxisCode::*;
        for c in [L, R, A, P, S, I] {
            assert_eq!(c.opposite().opposite(), c);
            assert_ne!(c.opposite(), c);
        }
    }

    #[test]
    fn test_parse_and_display() {
        let code: Orientation = "RAS".parse().unwrap();
        assert_eq!(code.to_string(), "RAS");
        assert_eq!(code.codes(), [AxisCode::R, AxisCode::A, AxisCode::S]);

        assert!(matches!(
            "RA".parse::<Orientation>(),
            Err(OrientationError::InvalidLength(2))
        ));
        assert!(matches!(
            "RAX".parse::<Orientation>(),
            Err(OrientationError::InvalidLetter('X'))
        ));
        // L 和 R 属于同一对方向.
        assert!(matches!(
            "LRS".parse::<Orientation>(),
            Err(OrientationError::ConflictingAxes(_))
        ));
    }

    #[test]
    fn test_axis_of() {
        let code: Orientation = "PIR".parse().unwrap();
        assert_eq!(code.axis_of(AxisCode::P), Some(Axis::X));
        assert_eq!(code.axis_of(AxisCode::I), Some(Axis::Y));
        assert_eq!(code.axis_of(AxisCode::R), Some(Axis::Z));
        assert_eq!(code.axis_of(AxisCode::A), None);
        assert_eq!(Axis::X.array_axis(), 2);
        assert_eq!(Axis::Z.array_axis(), 0);
    }

    #[test]
    fn test_superior_inferior() {
        let ras: Orientation = "RAS".parse().unwrap();
        assert_eq!(ras.superior_inferior_axis(), Axis::Z);
        assert!(ras.is_superior_to_inferior());

        let rai: Orientation = "RAI".parse().unwrap();
        assert!(!rai.is_superior_to_inferior());

        let pir: Orientation = "PIR".parse().unwrap();
        assert_eq!(pir.superior_inferior_axis(), Axis::Y);
        assert!(!pir.is_superior_to_inferior());
    }

    #[test]
    fn test_from_direction_identity_is_lps() {
        let identity = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let code = Orientation::from_direction(&identity).unwrap();
        assert_eq!(code.to_string(), "LPS");
    }

    #[test]
    fn test_direction_roundtrip() {
        for s in ["RAS", "LPS", "PIR", "LAS", "SAR"] {
            let code: Orientation = s.parse().unwrap();
            let rebuilt = Orientation::from_direction(&code.to_direction()).unwrap();
            assert_eq!(rebuilt, code, "编码 {s} 往返后不一致");
        }
    }

    #[test]
    fn test_size_conversion() {
        let spacing = [0.5, 1.0, 2.0];
        assert_eq!(
            physical_size_to_voxel_size(spacing, (96.0, 96.0, 96.0)),
            (192, 96, 48)
        );
        // 四舍五入而非截断.
        assert_eq!(
            physical_size_to_voxel_size([0.7, 0.7, 0.7], (96.0, 96.0, 96.0)),
            (137, 137, 137)
        );
        assert_eq!(
            voxel_size_to_physical_size(spacing, (192, 96, 48)),
            (96.0, 96.0, 96.0)
        );
    }
}
