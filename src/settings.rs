//! # 配置模块
//!
//! ## 设计思路
//!
//! 配置是一个由宿主持久化的 JSON 块，本模块把它拆成四个有类型的子视图：
//! - `StorageSettings`：端点、凭证、桶、区域、公开访问地址
//! - `UploadSettings`：上传开关、路径模板、重试与超时、上传后删除本地
//! - `ImageSettings`：转码开关、目标格式、质量、最大宽高、资源上限
//! - `LocalSettings`：附件目录、是否保留原文件名
//!
//! 每次处理批次都使用同一份快照，配置变更通过 `UploadService::on_settings_changed`
//! 显式下发，不存在全局单例。
//!
//! ## 实现思路
//!
//! - 所有字段带 serde 默认值，旧版本或残缺的 JSON 也能加载。
//! - `validate` 做区间校验，风格与图片高级配置的校验保持一致。
//! - `StorageSettings` 手写 `Debug`，密钥永远不会出现在日志里。

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::image_handler::{TargetFormat, TranscodeOptions};
use crate::retry::RetryPolicy;

/// 默认上传路径模板。
pub const DEFAULT_PATH_PATTERN: &str = "images/{year}/{month}";
/// 默认区域（Cloudflare R2 等服务使用 `auto`）。
pub const DEFAULT_REGION: &str = "auto";

/// 完整配置快照。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub upload: UploadSettings,
    pub image: ImageSettings,
    pub local: LocalSettings,
}

/// 对象存储连接配置。
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// S3 兼容端点，如 `https://<account>.r2.cloudflarestorage.com`。
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    pub region: String,
    /// 对外访问的基础 URL（CDN / 自定义域名），为空时回退到 `endpoint/bucket`。
    pub public_url: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: String::new(),
            region: DEFAULT_REGION.to_string(),
            public_url: String::new(),
        }
    }
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |value: &str| if value.is_empty() { "<empty>" } else { "<redacted>" };
        f.debug_struct("StorageSettings")
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &mask(&self.access_key_id))
            .field("secret_access_key", &mask(&self.secret_access_key))
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("public_url", &self.public_url)
            .finish()
    }
}

impl StorageSettings {
    /// 凭证、端点与桶是否齐全。
    pub fn is_configured(&self) -> bool {
        [
            &self.endpoint,
            &self.access_key_id,
            &self.secret_access_key,
            &self.bucket,
        ]
        .iter()
        .all(|value| !value.trim().is_empty())
    }

    /// 列出缺失的配置项名称，用于“未配置”提示。
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.endpoint.trim().is_empty() {
            missing.push("endpoint");
        }
        if self.access_key_id.trim().is_empty() {
            missing.push("accessKeyId");
        }
        if self.secret_access_key.trim().is_empty() {
            missing.push("secretAccessKey");
        }
        if self.bucket.trim().is_empty() {
            missing.push("bucket");
        }
        missing
    }

    /// 计算用于拼接公开链接的基础地址（不含末尾斜杠）。
    pub fn public_base_url(&self) -> String {
        let base = self.public_url.trim();
        if !base.is_empty() {
            return base.trim_end_matches('/').to_string();
        }
        format!(
            "{}/{}",
            self.endpoint.trim().trim_end_matches('/'),
            self.bucket.trim().trim_matches('/')
        )
    }
}

/// 上传策略配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadSettings {
    pub enabled: bool,
    pub delete_local_after_upload: bool,
    /// 路径模板，支持 `{year}` / `{month}` / `{day}`。
    pub path_pattern: String,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub timeout_secs: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            delete_local_after_upload: false,
            path_pattern: DEFAULT_PATH_PATTERN.to_string(),
            retry_attempts: 3,
            retry_base_delay_ms: 1_000,
            timeout_secs: 30,
        }
    }
}

impl UploadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_base_delay_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// 图片处理配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageSettings {
    /// 关闭后图片按普通文件原样保存与上传。
    pub enabled: bool,
    pub format: TargetFormat,
    /// 1~100。
    pub quality: u8,
    /// 0 表示不限制。
    pub max_width: u32,
    /// 0 表示不限制。
    pub max_height: u32,
    /// 单个条目允许的最大字节数。
    pub max_file_size: u64,
    /// 解码前按头信息拒绝的像素上限。
    pub max_decoded_pixels: u64,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format: TargetFormat::Webp,
            quality: 80,
            max_width: 0,
            max_height: 0,
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
        }
    }
}

impl ImageSettings {
    pub fn transcode_options(&self) -> TranscodeOptions {
        TranscodeOptions {
            format: self.format,
            quality: self.quality,
            max_width: self.max_width,
            max_height: self.max_height,
        }
    }
}

/// 本地保存配置。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalSettings {
    /// 附件目录：
    /// - 空字符串：与文档同目录
    /// - `./sub`：文档目录下的子目录
    /// - 其他：仓库根下的固定目录
    pub attachment_folder: String,
    pub preserve_original_name: bool,
}

impl Settings {
    /// 区间与格式校验。
    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=100).contains(&self.image.quality) {
            return Err(AppError::Settings("quality 必须在 1~100 之间".to_string()));
        }
        if !(1..=10).contains(&self.upload.retry_attempts) {
            return Err(AppError::Settings("retryAttempts 必须在 1~10 之间".to_string()));
        }
        if !(1..=600).contains(&self.upload.timeout_secs) {
            return Err(AppError::Settings("timeoutSecs 必须在 1~600 秒之间".to_string()));
        }
        if self.upload.retry_base_delay_ms > 60_000 {
            return Err(AppError::Settings("retryBaseDelayMs 不能超过 60000 毫秒".to_string()));
        }
        if self.image.max_file_size < 1024 * 1024 {
            return Err(AppError::Settings("maxFileSize 不能小于 1MB".to_string()));
        }
        Self::validate_url("endpoint", &self.storage.endpoint)?;
        Self::validate_url("publicUrl", &self.storage.public_url)?;
        Ok(())
    }

    fn validate_url(field: &str, value: &str) -> Result<(), AppError> {
        let value = value.trim();
        if value.is_empty() {
            return Ok(());
        }
        let parsed = url::Url::parse(value)
            .map_err(|e| AppError::Settings(format!("{} 不是合法 URL：{}", field, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AppError::Settings(format!(
                "{} 仅支持 http/https 协议：{}",
                field,
                parsed.scheme()
            )));
        }
        Ok(())
    }
}

/// 配置文件读写。
#[derive(Debug, Clone)]
pub struct SettingsFile {
    path: PathBuf,
}

impl SettingsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取配置；文件不存在时返回 `Ok(None)`。
    pub fn load(&self) -> Result<Option<Settings>, AppError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let parsed = serde_json::from_str::<Settings>(&content)
            .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))?;

        Ok(Some(parsed))
    }

    pub fn save(&self, settings: &Settings) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| AppError::Settings(format!("创建设置目录失败: {}", e)))?;
            }
        }

        let content = serde_json::to_string_pretty(settings)
            .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;

        fs::write(&self.path, content)?;
        Ok(())
    }
}
