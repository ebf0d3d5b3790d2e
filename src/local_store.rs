//! # 本地存储
//!
//! ## 设计思路
//!
//! 条目先落到宿主仓库里，文档立即引用本地副本；上传只是在此之上的“升级”。
//! 因此本地写入绝不能静默覆盖已有文件。
//!
//! ## 实现思路
//!
//! - 目录解析：附件目录配置 + 文档所在目录，缺省时使用 `attachments`。
//! - 冲突处理：候选路径已存在时在扩展名前插入 `_1`、`_2`……直到可用，
//!   最多尝试 `MAX_COLLISION_ATTEMPTS` 次。
//! - 删除：尽力而为，先检查存在性，失败只记日志。

use std::sync::Arc;

use crate::error::AppError;
use crate::host::{Vault, join_vault_path};
use crate::settings::LocalSettings;

/// 无法确定文档目录时使用的目录。
pub const DEFAULT_ATTACHMENT_FOLDER: &str = "attachments";

const MAX_COLLISION_ATTEMPTS: u32 = 10_000;

/// 宿主仓库之上的本地存储。
#[derive(Clone)]
pub struct LocalStore {
    vault: Arc<dyn Vault>,
}

impl LocalStore {
    pub fn new(vault: Arc<dyn Vault>) -> Self {
        Self { vault }
    }

    /// 计算目标目录。
    ///
    /// - 配置为空：文档所在目录；没有文档路径时退回 `attachments`
    /// - `./sub`：文档目录下的 `sub`
    /// - 其他：仓库根下的固定目录
    pub fn resolve_folder(settings: &LocalSettings, document_folder: Option<&str>) -> String {
        let configured = settings.attachment_folder.trim();

        if configured.is_empty() {
            return match document_folder {
                Some(folder) => folder.trim_matches('/').to_string(),
                None => DEFAULT_ATTACHMENT_FOLDER.to_string(),
            };
        }

        if let Some(relative) = configured.strip_prefix("./") {
            let base = document_folder.unwrap_or("");
            return join_vault_path(base, relative.trim_matches('/'))
                .trim_matches('/')
                .to_string();
        }

        configured.trim_matches('/').to_string()
    }

    /// 写入字节，返回实际路径（已处理命名冲突）。
    pub async fn save(
        &self,
        bytes: &[u8],
        file_name: &str,
        document_folder: Option<&str>,
        settings: &LocalSettings,
    ) -> Result<String, AppError> {
        let folder = Self::resolve_folder(settings, document_folder);

        if !folder.is_empty() && !self.vault.exists(&folder).await? {
            self.vault
                .create_folder(&folder)
                .await
                .map_err(|e| AppError::LocalStore(format!("创建目录 {} 失败: {}", folder, e)))?;
            log::debug!("📁 已创建目录: {}", folder);
        }

        let path = self.available_path(&folder, file_name).await?;
        self.vault
            .write_binary(&path, bytes)
            .await
            .map_err(|e| AppError::LocalStore(format!("写入 {} 失败: {}", path, e)))?;

        log::info!("💾 已保存到本地: {} ({}KB)", path, bytes.len() / 1024);
        Ok(path)
    }

    async fn available_path(&self, folder: &str, file_name: &str) -> Result<String, AppError> {
        let candidate = join_vault_path(folder, file_name);
        if !self.vault.exists(&candidate).await? {
            return Ok(candidate);
        }

        let (stem, extension) = split_extension(file_name);
        for counter in 1..=MAX_COLLISION_ATTEMPTS {
            let name = match extension {
                Some(ext) => format!("{}_{}.{}", stem, counter, ext),
                None => format!("{}_{}", stem, counter),
            };
            let candidate = join_vault_path(folder, &name);
            if !self.vault.exists(&candidate).await? {
                log::debug!("🔀 文件名冲突，改用: {}", candidate);
                return Ok(candidate);
            }
        }

        Err(AppError::LocalStore(format!(
            "{} 次尝试后仍无可用文件名: {}",
            MAX_COLLISION_ATTEMPTS, file_name
        )))
    }

    /// 删除本地文件；返回是否真的删除了。失败不向上传播。
    pub async fn delete(&self, path: &str) -> bool {
        match self.vault.exists(path).await {
            Ok(true) => {}
            Ok(false) => {
                log::debug!("🗑️ 本地文件已不存在，跳过删除: {}", path);
                return false;
            }
            Err(e) => {
                log::warn!("⚠️ 检查本地文件失败，跳过删除 {}: {}", path, e);
                return false;
            }
        }

        match self.vault.delete(path).await {
            Ok(()) => {
                log::info!("🗑️ 已删除本地文件: {}", path);
                true
            }
            Err(e) => {
                log::warn!("⚠️ 删除本地文件失败 {}: {}", path, e);
                false
            }
        }
    }
}

fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 && idx + 1 < file_name.len() => {
            (&file_name[..idx], Some(&file_name[idx + 1..]))
        }
        _ => (file_name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::FsVault;
    use async_trait::async_trait;
    use std::io;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().expect("create temp dir failed");
        let store = LocalStore::new(Arc::new(FsVault::new(dir.path())));
        (dir, store)
    }

    #[test]
    fn resolve_folder_variants() {
        let mut settings = LocalSettings::default();
        assert_eq!(LocalStore::resolve_folder(&settings, Some("notes")), "notes");
        assert_eq!(LocalStore::resolve_folder(&settings, Some("")), "");
        assert_eq!(LocalStore::resolve_folder(&settings, None), DEFAULT_ATTACHMENT_FOLDER);

        settings.attachment_folder = "./assets".into();
        assert_eq!(LocalStore::resolve_folder(&settings, Some("notes")), "notes/assets");
        assert_eq!(LocalStore::resolve_folder(&settings, None), "assets");

        settings.attachment_folder = "/media/".into();
        assert_eq!(LocalStore::resolve_folder(&settings, Some("notes")), "media");
    }

    #[test]
    fn split_extension_handles_dotfiles() {
        assert_eq!(split_extension("a.tar.gz"), ("a.tar", Some("gz")));
        assert_eq!(split_extension(".hidden"), (".hidden", None));
        assert_eq!(split_extension("README"), ("README", None));
    }

    #[tokio::test]
    async fn save_creates_folder_and_writes() {
        let (dir, store) = store();
        let path = store
            .save(b"abc", "shot.png", Some("notes"), &LocalSettings::default())
            .await
            .expect("save");

        assert_eq!(path, "notes/shot.png");
        assert_eq!(std::fs::read(dir.path().join("notes/shot.png")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn save_skips_existing_numbered_names() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("image.png"), b"old").unwrap();
        std::fs::write(dir.path().join("image_1.png"), b"old").unwrap();

        let path = store
            .save(b"new", "image.png", Some(""), &LocalSettings::default())
            .await
            .expect("save");

        assert_eq!(path, "image_2.png");
        assert_eq!(std::fs::read(dir.path().join("image.png")).unwrap(), b"old");
        assert_eq!(std::fs::read(dir.path().join("image_2.png")).unwrap(), b"new");
    }

    /// 所有路径都“已存在”的仓库。
    #[derive(Default)]
    struct OccupiedVault {
        exists_calls: AtomicU32,
        writes: AtomicU32,
    }

    #[async_trait]
    impl Vault for OccupiedVault {
        async fn exists(&self, _path: &str) -> io::Result<bool> {
            self.exists_calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        }

        async fn create_folder(&self, _path: &str) -> io::Result<()> {
            Ok(())
        }

        async fn write_binary(&self, _path: &str, _bytes: &[u8]) -> io::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn delete(&self, _path: &str) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn collision_loop_gives_up_after_cap() {
        let vault = Arc::new(OccupiedVault::default());
        let store = LocalStore::new(vault.clone());

        let err = store
            .save(b"x", "image.png", Some("notes"), &LocalSettings::default())
            .await
            .expect_err("no free name");

        assert!(matches!(err, AppError::LocalStore(_)));
        assert_eq!(vault.writes.load(Ordering::SeqCst), 0);
        // 目录检查 + 原始名 + 每个编号各一次
        assert_eq!(
            vault.exists_calls.load(Ordering::SeqCst),
            2 + MAX_COLLISION_ATTEMPTS
        );
    }

    #[tokio::test]
    async fn delete_is_best_effort() {
        let (dir, store) = store();
        std::fs::write(dir.path().join("a.png"), b"x").unwrap();

        assert!(store.delete("a.png").await);
        assert!(!dir.path().join("a.png").exists());
        assert!(!store.delete("a.png").await);
        assert!(!store.delete("../outside.png").await);
    }
}
