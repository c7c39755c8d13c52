//! 通用常量.

/// CT 强度体数据越界区域的填充值 (HU). 约等于空气的衰减值.
pub const CT_PADDING: f32 = -1024.0;

/// 分割标注体数据越界区域的填充值 (背景标签).
pub const SEG_PADDING: u8 = 0;

/// 比例偏移提取中, 连续索引向整数截断引入的误差上限 (体素).
/// padding 求解时每侧额外补偿该值.
pub const TRUNCATION_PAD: usize = 1;

/// 物理坐标与索引坐标往返变换的浮点误差安全余量 (体素/轴).
///
/// 该值为经验值. 欠填充会在裁剪越界时直接失败,
/// 因此提取入口在计算出的 padding 之外统一追加该余量.
pub const SAFETY_PAD: usize = 50;

/// 标志点 heatmap 的默认 Gaussian 标准差 (mm).
pub const HEATMAP_SIGMA: f64 = 5.0;

/// bounding box 顶端锚定提取时, 顶端之上预留的默认空间 (体素).
pub const TOPLEFT_HEADROOM: usize = 3;
