//! # 单条目状态机
//!
//! ```text
//! RECEIVED → VALIDATING → TRANSCODING | READING-RAW → LOCAL-SAVE → DOCUMENT-INSERT
//!   → 未启用上传：DONE（仅本地）
//!   → UPLOADING → 成功 → LINK-REWRITE → [LOCAL-DELETE] → DONE
//!               → 失败 → DONE（保留本地引用）
//! ```
//!
//! DOCUMENT-INSERT 之前的失败放弃条目，不留下任何文件或引用；
//! 之后的失败只降级为提示，本地引用始终保留。
//! 本地删除只发生在上传成功且链接已替换之后。

use std::time::Instant;

use bytes::Bytes;

use super::UploadService;
use super::state::{ItemOutcome, ItemReport, Stage, StageTimings};
use crate::error::AppError;
use crate::host::{Document, Notice};
use crate::image_handler::{Transcoder, UploadItem};
use crate::link_rewriter::{format_reference, link_target, replace_reference};
use crate::naming::{file_stem, generate_name, sanitize_file_name};
use crate::settings::Settings;

/// 一次粘贴 / 拖放批次共享的上下文。
pub(super) struct BatchContext {
    pub(super) settings: Settings,
    pub(super) transcoder: Transcoder,
}

struct ItemRun {
    name: String,
    started: Instant,
    timings: StageTimings,
    local_path: Option<String>,
    url: Option<String>,
}

impl ItemRun {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            started: Instant::now(),
            timings: StageTimings::default(),
            local_path: None,
            url: None,
        }
    }

    fn finish(self, stage: Stage, outcome: ItemOutcome) -> ItemReport {
        let elapsed = self.started.elapsed();
        log::info!(
            "⏱️ 条目处理结束 - {} [{}] {} total={}ms",
            display_name(&self.name),
            stage,
            self.timings.summary(),
            elapsed.as_millis()
        );

        ItemReport {
            name: self.name,
            stage,
            outcome,
            local_path: self.local_path,
            url: self.url,
            elapsed,
            timings: self.timings.into_entries(),
        }
    }
}

fn display_name(name: &str) -> &str {
    if name.is_empty() { "<粘贴内容>" } else { name }
}

impl UploadService {
    /// 致命阶段失败：提示用户并放弃条目。
    fn abandon(&self, run: ItemRun, stage: Stage, err: AppError) -> ItemReport {
        let message = err.user_message();
        log::error!("❌ [{}] {} 处理失败: {}", stage, display_name(&run.name), message);
        self.notifier.notify(Notice::error(format!(
            "{} 处理失败：{}",
            display_name(&run.name),
            message
        )));
        run.finish(stage, ItemOutcome::Failed(message))
    }

    /// 处理单个条目直到终态。`separate` 为真时在引用前插入换行。
    pub(super) async fn process_item(
        &self,
        ctx: &BatchContext,
        item: UploadItem,
        separate: bool,
        document: &mut dyn Document,
    ) -> ItemReport {
        let mut run = ItemRun::new(&item.name);
        log::debug!(
            "📥 [{}] {} ({}, {}KB)",
            Stage::Received,
            display_name(&item.name),
            item.mime,
            item.bytes.len() / 1024
        );

        // VALIDATING
        let stage_start = Instant::now();
        if let Err(err) = ctx.transcoder.validate_item(&item) {
            return self.abandon(run, Stage::Validating, err.into());
        }
        run.timings.record(Stage::Validating, stage_start.elapsed());

        // TRANSCODING / READING-RAW
        let is_image = item.is_image();
        let transcode = ctx.settings.image.enabled && item.should_transcode();
        let raw_extension = item.original_extension();
        let UploadItem { bytes, name, .. } = item;

        let stage = if transcode {
            Stage::Transcoding
        } else {
            Stage::ReadingRaw
        };
        let stage_start = Instant::now();
        let (payload, extension) = if transcode {
            match ctx
                .transcoder
                .process_async(bytes, ctx.settings.image.transcode_options())
                .await
            {
                Ok(asset) => (asset.bytes, asset.format.extension().to_string()),
                Err(err) => return self.abandon(run, stage, err.into()),
            }
        } else {
            (bytes, raw_extension)
        };
        run.timings.record(stage, stage_start.elapsed());

        // LOCAL-SAVE
        let file_name = generate_name(&name, &extension, ctx.settings.local.preserve_original_name);
        let folder = document.folder();
        let stage_start = Instant::now();
        let local_path = match self
            .local
            .save(&payload, &file_name, folder.as_deref(), &ctx.settings.local)
            .await
        {
            Ok(path) => path,
            Err(err) => return self.abandon(run, Stage::LocalSave, err),
        };
        run.timings.record(Stage::LocalSave, stage_start.elapsed());
        run.local_path = Some(local_path.clone());

        // DOCUMENT-INSERT
        let target = link_target(folder.as_deref(), &local_path);
        let label = sanitize_file_name(file_stem(&name));
        let reference = format_reference(is_image, &label, &target);
        let stage_start = Instant::now();
        if separate {
            document.replace_selection("\n");
        }
        document.replace_selection(&reference);
        run.timings.record(Stage::DocumentInsert, stage_start.elapsed());
        log::debug!("📝 [{}] 已插入本地引用: {}", Stage::DocumentInsert, reference);

        if !ctx.settings.upload.enabled {
            return run.finish(Stage::Done, ItemOutcome::LocalOnly);
        }

        // UPLOADING
        let stage_start = Instant::now();
        let uploaded = self
            .remote
            .upload(
                Bytes::from(payload),
                &file_name,
                &extension,
                &ctx.settings.upload,
            )
            .await;
        run.timings.record(Stage::Uploading, stage_start.elapsed());

        let object = match uploaded {
            Ok(object) => object,
            Err(err) => {
                let message = AppError::from(err).user_message();
                log::warn!("⚠️ 上传失败，保留本地文件 {}: {}", local_path, message);
                self.notifier.notify(Notice::warning(format!(
                    "上传失败，已保留本地文件 {}：{}",
                    local_path, message
                )));
                return run.finish(Stage::Uploading, ItemOutcome::UploadFailed(message));
            }
        };
        run.url = Some(object.url.clone());

        // LINK-REWRITE
        let stage_start = Instant::now();
        let rewritten = replace_reference(&document.text(), &target, &object.url);
        run.timings.record(Stage::LinkRewrite, stage_start.elapsed());

        match rewritten {
            Some(text) => document.set_text(text),
            None => {
                log::warn!("⚠️ 文档中找不到本地引用: {}", target);
                self.notifier.notify(Notice::warning(format!(
                    "已上传，但未能更新文档中的链接：{}",
                    target
                )));
                return run.finish(Stage::LinkRewrite, ItemOutcome::RewriteFailed);
            }
        }

        // LOCAL-DELETE
        let mut local_deleted = false;
        if ctx.settings.upload.delete_local_after_upload {
            let stage_start = Instant::now();
            local_deleted = self.local.delete(&local_path).await;
            run.timings.record(Stage::LocalDelete, stage_start.elapsed());
        }

        self.notifier
            .notify(Notice::info(format!("已上传 {}", display_name(&name))));
        run.finish(Stage::Done, ItemOutcome::Uploaded { local_deleted })
    }
}
