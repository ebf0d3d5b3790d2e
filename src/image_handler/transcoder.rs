//! # 转码器
//!
//! `Transcoder` 只持有资源上限配置，本身无状态，可廉价克隆到阻塞线程中执行。
//! 解码 / 编码都是 CPU 密集操作，异步入口通过 `spawn_blocking` 避免阻塞运行时。
//! 转码失败不重试。

use std::time::Instant;

use super::source::ProcessedAsset;
use super::{ImageConfig, ImageError, TranscodeOptions};

/// 图片转码器。
#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    pub(super) config: ImageConfig,
}

impl Transcoder {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    /// 在阻塞线程中执行 `process`，并记录压缩比。
    pub async fn process_async(
        &self,
        bytes: Vec<u8>,
        options: TranscodeOptions,
    ) -> Result<ProcessedAsset, ImageError> {
        let transcoder = self.clone();
        let original_size = bytes.len();
        let started = Instant::now();

        let asset = tokio::task::spawn_blocking(move || transcoder.process(&bytes, &options))
            .await
            .map_err(|e| ImageError::Task(format!("转码线程执行失败：{}", e)))??;

        log::info!(
            "🗜️ 转码完成 - {} {}x{} {}KB -> {}KB（{:.1}%）耗时 {}ms",
            asset.format.as_str(),
            asset.width,
            asset.height,
            original_size / 1024,
            asset.size / 1024,
            asset.compression_ratio(original_size) * 100.0,
            started.elapsed().as_millis()
        );

        Ok(asset)
    }
}
