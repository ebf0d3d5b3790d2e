//! # 配置模块
//!
//! ## 设计思路
//!
//! 区分两类参数：
//! - `TranscodeOptions`：每次转码的目标（格式、质量、最大宽高），来自用户设置
//! - `ImageConfig`：资源保护上限（体积、像素、内存、滤镜），保证恶意或超大输入尽早失败
//!
//! `TargetFormat` 负责格式字符串解析与反向输出，以及扩展名 / MIME 映射。

use fast_image_resize as fr;
use serde::{Deserialize, Serialize};

use super::ImageError;
use crate::settings::ImageSettings;

/// 支持的四种目标光栅格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Png,
    Jpeg,
    Webp,
    Avif,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 4] = [Self::Png, Self::Jpeg, Self::Webp, Self::Avif];

    /// 从外部字符串解析格式。
    ///
    /// # 示例
    /// ```rust
    /// use paste_upload::image_handler::TargetFormat;
    ///
    /// let f = TargetFormat::parse("JPG")?;
    /// assert_eq!(f, TargetFormat::Jpeg);
    /// # Ok::<(), paste_upload::image_handler::ImageError>(())
    /// ```
    pub fn parse(format: &str) -> Result<Self, ImageError> {
        match format.trim().to_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "avif" => Ok(Self::Avif),
            other => Err(ImageError::InvalidFormat(format!(
                "未知目标格式：{}（可选：png / jpeg / webp / avif）",
                other
            ))),
        }
    }

    /// 稳定字符串，供持久化与日志。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// 写入文件名时使用的扩展名。
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Avif => "image/avif",
        }
    }
}

/// 单次转码目标。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeOptions {
    pub format: TargetFormat,
    /// 1~100，对应 0~1 的编码质量。
    pub quality: u8,
    /// 0 表示不限制。
    pub max_width: u32,
    /// 0 表示不限制。
    pub max_height: u32,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            format: TargetFormat::Webp,
            quality: 80,
            max_width: 0,
            max_height: 0,
        }
    }
}

/// 资源保护配置。
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// 单个条目允许的最大字节数。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 缩放滤镜。
    pub resize_filter: fr::FilterType,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            resize_filter: fr::FilterType::Lanczos3,
        }
    }
}

impl ImageConfig {
    /// 由用户设置推导资源上限，内存上限按像素上限的 RGBA 体积计算。
    pub fn from_settings(settings: &ImageSettings) -> Self {
        Self {
            max_file_size: settings.max_file_size,
            max_decoded_pixels: settings.max_decoded_pixels,
            max_decoded_bytes: settings.max_decoded_pixels.saturating_mul(4),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_accepts_aliases_and_rejects_unknown() {
        assert_eq!(TargetFormat::parse(" WebP ").unwrap(), TargetFormat::Webp);
        assert_eq!(TargetFormat::parse("jpg").unwrap(), TargetFormat::Jpeg);
        assert!(matches!(
            TargetFormat::parse("tiff"),
            Err(ImageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn as_str_round_trips_through_parse() {
        for format in TargetFormat::ALL {
            assert_eq!(TargetFormat::parse(format.as_str()).unwrap(), format);
        }
    }

    #[test]
    fn serde_uses_lowercase_names() {
        let json = serde_json::to_string(&TargetFormat::Avif).unwrap();
        assert_eq!(json, "\"avif\"");
    }

    #[test]
    fn config_from_settings_derives_memory_limit() {
        let settings = ImageSettings {
            max_decoded_pixels: 1_000,
            ..ImageSettings::default()
        };
        let config = ImageConfig::from_settings(&settings);
        assert_eq!(config.max_decoded_bytes, 4_000);
        assert_eq!(config.max_file_size, settings.max_file_size);
    }
}
