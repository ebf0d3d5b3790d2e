//! # 工作流编排（workflow）
//!
//! ## 设计思路
//!
//! `UploadService` 是面向宿主插件外壳的唯一入口：
//! - `handle`：粘贴 / 拖放事件，逐个处理条目
//! - `test_connection`：校验当前存储配置
//! - `on_settings_changed`：推送新配置
//!
//! ## 实现思路
//!
//! - 配置显式注入，不依赖全局状态；内部用 `RwLock<Settings>` 保存当前配置。
//! - 每个批次开始时取一次配置快照，批次内所有条目使用同一份参数。
//! - 条目严格按输入顺序串行处理，上一个到达终态后才开始下一个，
//!   保证对文档的修改顺序可预测。
//! - 单条目的状态机见 `handler`。

mod handler;
mod state;

pub use state::{ItemOutcome, ItemReport, Stage};

use std::sync::{Arc, RwLock};

use handler::BatchContext;

use crate::error::AppError;
use crate::host::{Document, Notice, Notifier, Vault};
use crate::image_handler::{ImageConfig, Transcoder, UploadItem};
use crate::local_store::LocalStore;
use crate::remote::RemoteStore;
use crate::settings::Settings;

/// 粘贴上传服务。
pub struct UploadService {
    settings: RwLock<Settings>,
    local: LocalStore,
    remote: RemoteStore,
    notifier: Arc<dyn Notifier>,
}

impl UploadService {
    /// 使用 S3 兼容后端创建。
    pub fn new(
        settings: Settings,
        vault: Arc<dyn Vault>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, AppError> {
        let remote = RemoteStore::from_settings(settings.storage.clone())?;
        Ok(Self::with_remote(settings, vault, remote, notifier))
    }

    /// 使用指定的远端存储创建（测试或自定义后端）。
    pub fn with_remote(
        settings: Settings,
        vault: Arc<dyn Vault>,
        remote: RemoteStore,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            settings: RwLock::new(settings),
            local: LocalStore::new(vault),
            remote,
            notifier,
        }
    }

    /// 当前配置快照。
    pub fn settings(&self) -> Result<Settings, AppError> {
        self.settings
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| AppError::Settings("配置锁已损坏".to_string()))
    }

    /// 处理一次粘贴 / 拖放，返回与输入顺序一致的报告。
    pub async fn handle(
        &self,
        items: Vec<UploadItem>,
        document: &mut dyn Document,
    ) -> Vec<ItemReport> {
        if items.is_empty() {
            return Vec::new();
        }

        let settings = match self.settings() {
            Ok(settings) => settings,
            Err(err) => {
                let message = err.user_message();
                self.notifier.notify(Notice::error(message.clone()));
                return items
                    .into_iter()
                    .map(|item| ItemReport {
                        name: item.name,
                        stage: Stage::Received,
                        outcome: ItemOutcome::Failed(message.clone()),
                        local_path: None,
                        url: None,
                        elapsed: Default::default(),
                        timings: Vec::new(),
                    })
                    .collect();
            }
        };

        let ctx = BatchContext {
            transcoder: Transcoder::new(ImageConfig::from_settings(&settings.image)),
            settings,
        };

        log::info!(
            "📋 开始处理 {} 个条目（上传: {}）",
            items.len(),
            ctx.settings.upload.enabled
        );

        let mut reports = Vec::with_capacity(items.len());
        let mut inserted = 0usize;
        for item in items {
            let report = self
                .process_item(&ctx, item, inserted > 0, document)
                .await;
            if report.outcome.is_referenced() {
                inserted += 1;
            }
            reports.push(report);
        }

        reports
    }

    /// 校验当前存储配置，并把结果通知用户。
    pub async fn test_connection(&self) -> Result<(), AppError> {
        match self.remote.test_connection().await {
            Ok(()) => {
                self.notifier.notify(Notice::info("连接成功"));
                Ok(())
            }
            Err(err) => {
                let err = AppError::from(err);
                self.notifier.notify(Notice::error(err.user_message()));
                Err(err)
            }
        }
    }

    /// 应用新配置：先校验，再重建远端客户端，最后替换快照。
    ///
    /// 已在进行中的批次继续使用旧快照。
    pub fn on_settings_changed(&self, settings: Settings) -> Result<(), AppError> {
        settings.validate()?;
        self.remote.update_settings(settings.storage.clone())?;

        let mut guard = self
            .settings
            .write()
            .map_err(|_| AppError::Settings("配置锁已损坏".to_string()))?;
        *guard = settings;

        log::info!("🔄 配置已更新");
        Ok(())
    }
}
