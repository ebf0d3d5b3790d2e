//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入”和“流水线中间结果”解耦：
//! - `UploadItem` 表示一次粘贴 / 拖放带来的单个文件
//! - `ProcessedAsset` 表示转码输出，只存在于单次工作流内部

use crate::naming::file_extension;

use super::TargetFormat;

/// 条目分类：图片走转码链路，其余按普通文件处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Image,
    Generic,
}

/// 单个待处理条目。
#[derive(Debug, Clone)]
pub struct UploadItem {
    /// 原始字节。
    pub bytes: Vec<u8>,
    /// 原始文件名（可能为空，如截图直接粘贴）。
    pub name: String,
    /// MIME 类型。
    pub mime: String,
}

impl UploadItem {
    pub fn new(bytes: Vec<u8>, name: impl Into<String>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            name: name.into(),
            mime: mime.into(),
        }
    }

    pub fn kind(&self) -> ItemKind {
        if self.mime.trim().to_ascii_lowercase().starts_with("image/") {
            ItemKind::Image
        } else {
            ItemKind::Generic
        }
    }

    pub fn is_image(&self) -> bool {
        self.kind() == ItemKind::Image
    }

    /// 是否进入转码链路。
    ///
    /// GIF（可能是动图）与 SVG（矢量）保持原样，避免丢帧或栅格化。
    pub fn should_transcode(&self) -> bool {
        if !self.is_image() {
            return false;
        }
        let mime = self.mime.trim().to_ascii_lowercase();
        !matches!(mime.as_str(), "image/gif" | "image/svg+xml")
    }

    /// 原样保存时使用的扩展名：优先文件名，其次 MIME，最后 `bin`。
    pub fn original_extension(&self) -> String {
        if let Some(ext) = file_extension(&self.name) {
            return ext;
        }
        mime_guess::get_mime_extensions_str(&self.mime)
            .and_then(|candidates| Self::preferred_extension(&self.mime, candidates))
            .unwrap_or_else(|| "bin".to_string())
    }

    fn preferred_extension(mime: &str, candidates: &[&str]) -> Option<String> {
        let preferred = match mime {
            "image/jpeg" => Some("jpg"),
            "image/png" => Some("png"),
            "image/svg+xml" => Some("svg"),
            "text/plain" => Some("txt"),
            _ => None,
        };
        preferred
            .or_else(|| candidates.first().copied())
            .map(str::to_string)
    }
}

/// 转码输出。
#[derive(Debug, Clone)]
pub struct ProcessedAsset {
    pub bytes: Vec<u8>,
    pub format: TargetFormat,
    pub width: u32,
    pub height: u32,
    /// 编码后字节数。
    pub size: usize,
}

impl ProcessedAsset {
    /// 压缩比（输出 / 输入），输入为空时返回 1。
    pub fn compression_ratio(&self, original_size: usize) -> f64 {
        if original_size == 0 {
            return 1.0;
        }
        self.size as f64 / original_size as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_mime() {
        assert_eq!(UploadItem::new(vec![], "a.png", "image/png").kind(), ItemKind::Image);
        assert_eq!(UploadItem::new(vec![], "a.pdf", "application/pdf").kind(), ItemKind::Generic);
        assert_eq!(UploadItem::new(vec![], "a", "").kind(), ItemKind::Generic);
    }

    #[test]
    fn gif_and_svg_bypass_transcoding() {
        assert!(UploadItem::new(vec![], "a.png", "image/png").should_transcode());
        assert!(!UploadItem::new(vec![], "a.gif", "image/gif").should_transcode());
        assert!(!UploadItem::new(vec![], "a.svg", "image/svg+xml").should_transcode());
        assert!(!UploadItem::new(vec![], "a.zip", "application/zip").should_transcode());
    }

    #[test]
    fn original_extension_prefers_name_then_mime() {
        assert_eq!(UploadItem::new(vec![], "Report.PDF", "").original_extension(), "pdf");
        assert_eq!(UploadItem::new(vec![], "", "image/jpeg").original_extension(), "jpg");
        assert_eq!(UploadItem::new(vec![], "", "image/png").original_extension(), "png");
        assert_eq!(UploadItem::new(vec![], "", "").original_extension(), "bin");
    }

    #[test]
    fn compression_ratio_handles_empty_input() {
        let asset = ProcessedAsset {
            bytes: vec![0; 50],
            format: TargetFormat::Webp,
            width: 1,
            height: 1,
            size: 50,
        };
        assert_eq!(asset.compression_ratio(0), 1.0);
        assert!((asset.compression_ratio(200) - 0.25).abs() < f64::EPSILON);
    }
}
