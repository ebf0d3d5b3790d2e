//! # 加载与校验模块
//!
//! ## 设计思路
//!
//! 统一处理不同来源（粘贴的 Data URL / 磁盘文件）的原始字节加载，
//! 并在“尽可能早”的阶段执行输入校验：尽快失败，不产生任何本地文件。
//!
//! ## 实现思路
//!
//! - Data URL：格式解析 + 解码前体积估算 + 解码后体积限制。
//! - 文件：metadata 体积限制 + 读取 + `infer` / `mime_guess` 推断 MIME。
//! - 待转码图片额外做文件签名校验，声明为图片但字节不是图片时按解码错误处理。

use std::path::Path;

use base64::{Engine as _, engine::general_purpose};

use super::source::UploadItem;
use super::{ImageConfig, ImageError, Transcoder};

const DATA_URL_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

impl Transcoder {
    /// 校验条目体积与签名。
    pub fn validate_item(&self, item: &UploadItem) -> Result<(), ImageError> {
        Self::validate_item_with(item, &self.config)
    }

    pub(crate) fn validate_item_with(item: &UploadItem, config: &ImageConfig) -> Result<(), ImageError> {
        if item.bytes.is_empty() {
            return Err(ImageError::InvalidFormat("文件内容为空".to_string()));
        }

        if item.bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                item.bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        if item.should_transcode() {
            Self::validate_image_signature(&item.bytes)?;
        }

        Ok(())
    }

    fn validate_image_signature(bytes: &[u8]) -> Result<(), ImageError> {
        let kind = infer::get(bytes)
            .ok_or_else(|| ImageError::Decode("无法识别图片类型".to_string()))?;

        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(ImageError::Decode(format!(
                "文件签名不是图片类型：{}",
                kind.mime_type()
            )));
        }

        Ok(())
    }
}

impl UploadItem {
    /// 从 `data:<mime>;base64,<payload>` 构造条目。
    ///
    /// # 示例
    /// ```rust
    /// use paste_upload::image_handler::UploadItem;
    ///
    /// let item = UploadItem::from_data_url("data:text/plain;base64,SGVsbG8=", "", 1024)?;
    /// assert_eq!(item.bytes, b"Hello");
    /// assert_eq!(item.mime, "text/plain");
    /// # Ok::<(), paste_upload::image_handler::ImageError>(())
    /// ```
    pub fn from_data_url(data: &str, name: &str, max_file_size: u64) -> Result<Self, ImageError> {
        let normalized = data.trim();
        let rest = normalized
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| ImageError::InvalidFormat("不是 Data URL".to_string()))?;
        let marker = rest
            .find(BASE64_MARKER)
            .ok_or_else(|| ImageError::InvalidFormat("缺少 base64 标记".to_string()))?;

        let mime = rest[..marker].trim().to_string();
        let payload = &rest[marker + BASE64_MARKER.len()..];

        let estimated_len = estimate_base64_decoded_upper_bound_len(payload)?;
        if estimated_len > max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
                estimated_len as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))?;

        Ok(Self::new(bytes, name, mime))
    }

    /// 从磁盘文件构造条目，MIME 先看文件签名，再看扩展名。
    pub fn from_path(path: &Path, max_file_size: u64) -> Result<Self, ImageError> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ImageError::InvalidFormat(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(path)
            .map_err(|e| ImageError::InvalidFormat(format!("无法读取文件：{}", e)))?;

        let mime = infer::get(&bytes)
            .map(|kind| kind.mime_type().to_string())
            .unwrap_or_else(|| mime_guess::from_path(path).first_or_octet_stream().to_string());

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self::new(bytes, name, mime))
    }
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}
