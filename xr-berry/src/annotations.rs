//! 标志点标注文件的解析.
//!
//! 标注为 JSON 记录列表, 每条记录要么给出标注空间的方向编码
//! (`direction`), 要么给出一个 `(label, X, Y, Z)` 标志点坐标.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::Idx3dF;

/// 标注解析错误.
#[derive(Debug)]
pub enum AnnotationError {
    /// 底层 I/O 错误.
    Io(std::io::Error),

    /// JSON 结构不符合预期.
    Json(serde_json::Error),
}

impl From<std::io::Error> for AnnotationError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for AnnotationError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// 方向字段的两种写法: 单个字符串或逐字母数组.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDirection {
    Code(String),
    Letters(Vec<String>),
}

impl RawDirection {
    fn into_code(self) -> String {
        match self {
            RawDirection::Code(s) => s,
            RawDirection::Letters(letters) => letters.concat(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawEntry {
    Direction {
        direction: RawDirection,
    },
    Centroid {
        label: f64,
        #[serde(rename = "X")]
        x: f64,
        #[serde(rename = "Y")]
        y: f64,
        #[serde(rename = "Z")]
        z: f64,
    },
}

/// 解析后的标志点标注.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidAnnotation {
    /// 标注空间的方向编码. 文件未给出时为空字符串.
    pub direction: String,

    /// 标志点列表, 按文件内顺序: `(结构标签, 坐标)`.
    pub centroids: Vec<(u32, Idx3dF)>,
}

/// 从 JSON 文本解析标志点标注.
pub fn parse_centroids(text: &str) -> Result<CentroidAnnotation, AnnotationError> {
    let entries: Vec<RawEntry> = serde_json::from_str(text)?;

    let mut direction = String::new();
    let mut centroids = Vec::new();
    for entry in entries {
        match entry {
            RawEntry::Direction { direction: d } => direction = d.into_code(),
            RawEntry::Centroid { label, x, y, z } => {
                centroids.push((label as u32, (x, y, z)));
            }
        }
    }
    Ok(CentroidAnnotation {
        direction,
        centroids,
    })
}

/// 读取并解析标志点标注文件.
pub fn load_centroids<P: AsRef<Path>>(path: P) -> Result<CentroidAnnotation, AnnotationError> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_centroids(&text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_direction_letters() {
        let text = r#"[
            {"direction": ["P", "I", "R"]},
            {"label": 20, "X": 10.5, "Y": 20.0, "Z": 30.25},
            {"label": 21, "X": 11.0, "Y": 40.0, "Z": 31.0}
        ]"#;
        let ann = parse_centroids(text).unwrap();
        assert_eq!(ann.direction, "PIR");
        assert_eq!(ann.centroids.len(), 2);
        assert_eq!(ann.centroids[0], (20, (10.5, 20.0, 30.25)));
        assert_eq!(ann.centroids[1].0, 21);
    }

    #[test]
    fn test_parse_with_direction_string() {
        let text = r#"[{"direction": "RAS"}, {"label": 1, "X": 0.0, "Y": 1.0, "Z": 2.0}]"#;
        let ann = parse_centroids(text).unwrap();
        assert_eq!(ann.direction, "RAS");
        assert_eq!(ann.centroids, vec![(1, (0.0, 1.0, 2.0))]);
    }

    #[test]
    fn test_direction_defaults_to_empty() {
        let text = r#"[{"label": 3, "X": 5.0, "Y": 6.0, "Z": 7.0}]"#;
        let ann = parse_centroids(text).unwrap();
        assert!(ann.direction.is_empty());
        assert_eq!(ann.centroids.len(), 1);
    }

    #[test]
    fn test_malformed_record_is_error() {
        let text = r#"[{"label": 3, "X": 5.0}]"#;
        assert!(matches!(
            parse_centroids(text),
            Err(AnnotationError::Json(_))
        ));
    }
}
