//! # 宿主能力抽象
//!
//! ## 设计思路
//!
//! 编辑器宿主提供三类能力，本模块只定义接口与少量通用适配器：
//! - `Vault`：宿主管理的文件树（存在性检查、建目录、写二进制、删除）
//! - `Document`：当前文档（读全文、替换选区、整体写回、所在目录）
//! - `Notifier`：面向用户的提示
//!
//! ## 实现思路
//!
//! - 仓库路径统一使用 `/` 分隔、相对仓库根目录。
//! - `FsVault` 基于 `tokio::fs`，拒绝绝对路径与 `..`，避免写出仓库。
//! - `TextDocument` 是带光标的内存文本缓冲，命令行模式下充当文档。

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

/// 宿主管理的文件树。
#[async_trait]
pub trait Vault: Send + Sync {
    async fn exists(&self, path: &str) -> io::Result<bool>;
    async fn create_folder(&self, path: &str) -> io::Result<()>;
    async fn write_binary(&self, path: &str, bytes: &[u8]) -> io::Result<()>;
    async fn delete(&self, path: &str) -> io::Result<()>;
}

/// 正在编辑的文档。
pub trait Document: Send {
    /// 文档在仓库中的路径；未保存的新文档返回 `None`。
    fn path(&self) -> Option<String>;

    fn text(&self) -> String;

    fn set_text(&mut self, text: String);

    /// 在光标处插入（替换选区），光标移动到插入内容之后。
    fn replace_selection(&mut self, text: &str);

    /// 文档所在目录；根目录返回空字符串。
    fn folder(&self) -> Option<String> {
        self.path().map(|path| parent_folder(&path).to_string())
    }
}

/// 提示级别。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// 面向用户的提示，消息在到达这里之前已经脱敏。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// 把提示写入日志。
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Info => log::info!("🔔 {}", notice.message),
            NoticeLevel::Warning => log::warn!("🔔 {}", notice.message),
            NoticeLevel::Error => log::error!("🔔 {}", notice.message),
        }
    }
}

/// 路径的父目录（`a/b/c.md` → `a/b`，`c.md` → 空字符串）。
pub fn parent_folder(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[..idx],
        None => "",
    }
}

/// 拼接仓库路径，忽略空段并规整多余斜杠。
pub fn join_vault_path(folder: &str, name: &str) -> String {
    let folder = folder.trim_matches('/');
    let name = name.trim_start_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// 基于本地目录的仓库实现。
#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 仓库路径 → 磁盘路径，拒绝越界。
    pub fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();

        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("路径越出仓库范围: {}", path),
                    ));
                }
            }
        }

        Ok(resolved)
    }
}

#[async_trait]
impl Vault for FsVault {
    async fn exists(&self, path: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.resolve(path)?).await
    }

    async fn create_folder(&self, path: &str) -> io::Result<()> {
        tokio::fs::create_dir_all(self.resolve(path)?).await
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        tokio::fs::write(self.resolve(path)?, bytes).await
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        tokio::fs::remove_file(self.resolve(path)?).await
    }
}

/// 带光标的内存文档。
#[derive(Debug, Clone, Default)]
pub struct TextDocument {
    path: Option<String>,
    text: String,
    /// 字节偏移，始终落在字符边界上。
    cursor: usize,
}

impl TextDocument {
    /// 光标置于文末。
    pub fn new(path: Option<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.len();
        Self { path, text, cursor }
    }

    /// 从仓库读取文档；文件不存在时视为空文档。
    pub async fn load(vault: &FsVault, path: &str) -> io::Result<Self> {
        let disk_path = vault.resolve(path)?;
        let text = match tokio::fs::read_to_string(&disk_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        Ok(Self::new(Some(path.to_string()), text))
    }

    /// 写回仓库，缺失的父目录会被创建。
    pub async fn save(&self, vault: &FsVault) -> io::Result<()> {
        let path = self.path.as_deref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "文档没有路径，无法保存")
        })?;
        let parent = parent_folder(path);
        if !parent.is_empty() {
            vault.create_folder(parent).await?;
        }
        vault.write_binary(path, self.text.as_bytes()).await
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// 设置光标，越界时截到文末并回退到最近的字符边界。
    pub fn set_cursor(&mut self, offset: usize) {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        self.cursor = offset;
    }
}

impl Document for TextDocument {
    fn path(&self) -> Option<String> {
        self.path.clone()
    }

    fn text(&self) -> String {
        self.text.clone()
    }

    /// 整体替换文本。变更发生在光标之前时，光标随长度差平移。
    fn set_text(&mut self, text: String) {
        let common_prefix = self
            .text
            .bytes()
            .zip(text.bytes())
            .take_while(|(a, b)| a == b)
            .count();

        let cursor = if self.cursor > common_prefix {
            (self.cursor + text.len()).saturating_sub(self.text.len())
        } else {
            self.cursor
        };

        self.text = text;
        self.set_cursor(cursor);
    }

    fn replace_selection(&mut self, text: &str) {
        self.text.insert_str(self.cursor, text);
        self.cursor += text.len();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_and_join_handle_root() {
        assert_eq!(parent_folder("notes/daily/today.md"), "notes/daily");
        assert_eq!(parent_folder("today.md"), "");
        assert_eq!(join_vault_path("", "a.png"), "a.png");
        assert_eq!(join_vault_path("notes/", "/a.png"), "notes/a.png");
    }

    #[test]
    fn document_folder_derives_from_path() {
        let doc = TextDocument::new(Some("notes/today.md".into()), "");
        assert_eq!(doc.folder().as_deref(), Some("notes"));
        assert_eq!(TextDocument::new(None, "").folder(), None);
    }

    #[test]
    fn replace_selection_inserts_at_cursor() {
        let mut doc = TextDocument::new(None, "hello world");
        doc.set_cursor(5);
        doc.replace_selection(",");
        doc.replace_selection(" dear");
        assert_eq!(doc.text(), "hello, dear world");
    }

    #[test]
    fn set_text_shifts_cursor_after_edit() {
        let mut doc = TextDocument::new(None, "![a](a.png)\n");
        doc.set_text("![a](https://cdn/a.png)\n".into());
        assert_eq!(doc.cursor(), doc.text().len());

        doc.set_cursor(0);
        doc.set_text("x".into());
        assert_eq!(doc.cursor(), 0);
    }

    #[test]
    fn set_cursor_snaps_to_char_boundary() {
        let mut doc = TextDocument::new(None, "图片");
        doc.set_cursor(1);
        assert_eq!(doc.cursor(), 0);
        doc.set_cursor(100);
        assert_eq!(doc.cursor(), "图片".len());
    }

    #[test]
    fn fs_vault_rejects_escaping_paths() {
        let vault = FsVault::new("/tmp/vault");
        assert!(vault.resolve("../etc/passwd").is_err());
        assert_eq!(
            vault.resolve("notes/./a.png").unwrap(),
            PathBuf::from("/tmp/vault/notes/a.png")
        );
    }

    #[tokio::test]
    async fn fs_vault_round_trip() {
        let dir = tempfile::tempdir().expect("create temp dir failed");
        let vault = FsVault::new(dir.path());

        vault.create_folder("a/b").await.expect("create folder");
        vault.write_binary("a/b/c.bin", b"data").await.expect("write");
        assert!(vault.exists("a/b/c.bin").await.expect("exists"));

        vault.delete("a/b/c.bin").await.expect("delete");
        assert!(!vault.exists("a/b/c.bin").await.expect("exists"));
    }

    #[tokio::test]
    async fn text_document_load_and_save() {
        let dir = tempfile::tempdir().expect("create temp dir failed");
        let vault = FsVault::new(dir.path());

        let mut doc = TextDocument::load(&vault, "notes/new.md").await.expect("load");
        assert_eq!(doc.text(), "");
        doc.replace_selection("# Title\n");
        doc.save(&vault).await.expect("save");

        let reloaded = TextDocument::load(&vault, "notes/new.md").await.expect("reload");
        assert_eq!(reloaded.text(), "# Title\n");
        assert_eq!(reloaded.cursor(), reloaded.text().len());
    }
}
