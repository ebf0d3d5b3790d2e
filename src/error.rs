//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `AppError` 枚举，收拢图片转码、本地存储、远端上传、
//! 配置加载四条链路上的错误，替代分散的 `.map_err(|e| e.to_string())`。
//!
//! 工作流编排器只在“致命”阶段（校验 / 转码 / 本地保存）把错误向上传播，
//! 上传与链接替换阶段的失败会被降级为用户提示，不会冒泡到宿主。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` / `StorageError` / `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - `user_message()` 输出经过脱敏的文本，供提示与日志使用。

use crate::image_handler::ImageError;
use crate::redact::redact_secrets;
use crate::remote::StorageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 图片校验 / 解码 / 编码失败
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 远端对象存储错误（未配置、网络、超时）
    #[error("{0}")]
    Storage(#[from] StorageError),

    /// 本地存储失败（建目录、写入、命名冲突耗尽）
    #[error("本地存储失败: {0}")]
    LocalStore(String),

    /// 配置无效或无法读写
    #[error("配置错误: {0}")]
    Settings(String),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// 脱敏后的错误文本，可直接展示给用户或写入日志。
    pub fn user_message(&self) -> String {
        redact_secrets(&self.to_string())
    }
}
