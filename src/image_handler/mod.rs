//! # 图片处理模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“条目加载 → 校验 → 解码缩放 → 重新编码”按职责拆分为多个子模块，
//! 避免单文件膨胀与耦合。
//!
//! - `transcoder`：转码器本体与异步入口
//! - `loader`：Data URL / 文件加载与体积、签名校验
//! - `pipeline`：解码、像素限制、两段式缩放、编码
//! - `config/error/source`：配置、错误、中间数据模型
//!
//! ## 调用链
//!
//! ```text
//! workflow::handler（编排）
//!    ↓
//! Transcoder::validate_item（loader.rs：体积 + 签名）
//!    ↓
//! Transcoder::process_async（transcoder.rs：spawn_blocking）
//!    ↓
//! Transcoder::process（pipeline.rs：解码 → 缩放 → 编码）
//!    ↓
//! ProcessedAsset / ImageError
//! ```

mod config;
mod error;
mod loader;
mod pipeline;
mod source;
mod transcoder;

pub use config::{ImageConfig, TargetFormat, TranscodeOptions};
pub use error::ImageError;
pub use pipeline::calculate_dimensions;
pub use source::{ItemKind, ProcessedAsset, UploadItem};
pub use transcoder::Transcoder;
