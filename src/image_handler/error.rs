//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载转码链路中的所有错误来源，避免字符串拼接式错误处理。
//! 这些错误都发生在本地写入之前：条目直接放弃，不留下任何中间状态，也不重试。

/// 图片转码统一错误类型。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// 字节不是合法图片，或解码失败。
    #[error("解码错误：{0}")]
    Decode(String),

    /// 目标格式无法编码。
    #[error("编码错误：{0}")]
    Encode(String),

    /// 输入格式或参数不合法。
    #[error("格式错误：{0}")]
    InvalidFormat(String),

    /// 超出体积或像素上限。
    #[error("资源限制：{0}")]
    ResourceLimit(String),

    /// 阻塞线程执行失败。
    #[error("任务执行失败：{0}")]
    Task(String),
}
