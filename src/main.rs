//! # 粘贴上传：命令行入口
//!
//! 把一个目录当作编辑器仓库，模拟宿主插件外壳：
//! - `paste`：把文件“粘贴”进文档，走完整的本地保存 → 上传 → 链接替换流程
//! - `check`：测试存储连接
//! - `init`：生成默认配置文件
//!
//! 业务逻辑全部在库中，详见 `lib.rs` 架构文档。

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use paste_upload::error::AppError;
use paste_upload::host::{FsVault, LogNotifier, TextDocument};
use paste_upload::image_handler::UploadItem;
use paste_upload::settings::{Settings, SettingsFile};
use paste_upload::workflow::{ItemOutcome, UploadService};

const DEFAULT_SETTINGS_FILE: &str = ".paste-upload.json";

/// 本地优先的图片 / 文件上传工具
#[derive(Debug, Parser)]
#[command(name = "paste-upload")]
#[command(version, about = "本地优先的图片 / 文件上传工具", long_about = None)]
struct Cli {
    /// 仓库根目录
    #[arg(long, global = true, default_value = ".")]
    vault: PathBuf,

    /// 配置文件路径，默认为 `<vault>/.paste-upload.json`
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// 覆盖配置中的 Access Key ID
    #[arg(long, global = true, env = "PASTE_UPLOAD_ACCESS_KEY_ID", hide_env_values = true)]
    access_key_id: Option<String>,

    /// 覆盖配置中的 Secret Access Key
    #[arg(long, global = true, env = "PASTE_UPLOAD_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// 把文件粘贴进文档
    Paste {
        /// 文档在仓库中的路径，如 `notes/today.md`
        document: String,

        /// 要粘贴的文件，按顺序处理
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// 只保存到本地，不上传
        #[arg(long)]
        local_only: bool,
    },

    /// 测试存储连接
    Check,

    /// 写入默认配置文件
    Init {
        /// 覆盖已有配置
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    fn settings_file(&self) -> SettingsFile {
        let path = self
            .settings
            .clone()
            .unwrap_or_else(|| self.vault.join(DEFAULT_SETTINGS_FILE));
        SettingsFile::new(path)
    }

    /// 读取配置并叠加环境变量 / 命令行中的凭证。
    fn load_settings(&self) -> Result<Settings, AppError> {
        let file = self.settings_file();
        let mut settings = match file.load()? {
            Some(settings) => settings,
            None => {
                log::warn!("⚠️ 配置文件不存在，使用默认配置: {}", file.path().display());
                Settings::default()
            }
        };

        if let Some(id) = &self.access_key_id {
            settings.storage.access_key_id = id.clone();
        }
        if let Some(secret) = &self.secret_access_key {
            settings.storage.secret_access_key = secret.clone();
        }

        settings.validate()?;
        Ok(settings)
    }

    fn service(&self, settings: Settings) -> Result<UploadService, AppError> {
        UploadService::new(
            settings,
            Arc::new(FsVault::new(&self.vault)),
            Arc::new(LogNotifier),
        )
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            log::error!("❌ {}", err.user_message());
            ExitCode::FAILURE
        }
    }
}

/// 返回值表示所有条目是否都成功。
async fn run(cli: &Cli) -> Result<bool, AppError> {
    match &cli.command {
        Commands::Init { force } => init(cli, *force),
        Commands::Check => {
            let service = cli.service(cli.load_settings()?)?;
            service.test_connection().await?;
            Ok(true)
        }
        Commands::Paste {
            document,
            files,
            local_only,
        } => paste(cli, document, files, *local_only).await,
    }
}

fn init(cli: &Cli, force: bool) -> Result<bool, AppError> {
    let file = cli.settings_file();
    if file.path().exists() && !force {
        return Err(AppError::Settings(format!(
            "配置文件已存在: {}（使用 --force 覆盖）",
            file.path().display()
        )));
    }

    file.save(&Settings::default())?;
    log::info!("✅ 已写入默认配置: {}", file.path().display());
    Ok(true)
}

async fn paste(
    cli: &Cli,
    document: &str,
    files: &[PathBuf],
    local_only: bool,
) -> Result<bool, AppError> {
    let mut settings = cli.load_settings()?;
    if local_only {
        settings.upload.enabled = false;
    }
    let max_file_size = settings.image.max_file_size;

    let vault = FsVault::new(&cli.vault);
    let service = cli.service(settings)?;
    let document = document.trim_start_matches("./");
    let mut doc = TextDocument::load(&vault, document).await?;

    let mut all_ok = true;
    let mut items = Vec::with_capacity(files.len());
    for path in files {
        match load_item(path, max_file_size) {
            Ok(item) => items.push(item),
            Err(err) => {
                log::error!("❌ 读取 {} 失败: {}", path.display(), err.user_message());
                all_ok = false;
            }
        }
    }

    let reports = service.handle(items, &mut doc).await;
    doc.save(&vault).await?;

    for report in &reports {
        let location = report
            .url
            .as_deref()
            .or(report.local_path.as_deref())
            .unwrap_or("-");
        println!(
            "{:<12} {:<16} {} ({}ms)",
            report.stage.as_str(),
            outcome_label(&report.outcome),
            location,
            report.elapsed.as_millis()
        );
        if !matches!(
            report.outcome,
            ItemOutcome::Uploaded { .. } | ItemOutcome::LocalOnly
        ) {
            all_ok = false;
        }
    }

    Ok(all_ok)
}

fn load_item(path: &Path, max_file_size: u64) -> Result<UploadItem, AppError> {
    Ok(UploadItem::from_path(path, max_file_size)?)
}

fn outcome_label(outcome: &ItemOutcome) -> &'static str {
    match outcome {
        ItemOutcome::Uploaded {
            local_deleted: true,
        } => "uploaded+clean",
        ItemOutcome::Uploaded { .. } => "uploaded",
        ItemOutcome::LocalOnly => "local-only",
        ItemOutcome::UploadFailed(_) => "upload-failed",
        ItemOutcome::RewriteFailed => "rewrite-failed",
        ItemOutcome::Failed(_) => "failed",
    }
}
