//! # 粘贴上传：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │              宿主插件外壳（编辑器 / CLI）                 │
//! │                                                          │
//! │   粘贴·拖放事件 ── 设置面板 ── 连接测试按钮              │
//! └───────┼──────────────────────────────────────────────────┘
//!         ↕ handle / on_settings_changed / test_connection
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            核心 (Rust)                           │
//! │                                                          │
//! │  ┌─ workflow ─── UploadService（逐条目状态机）            │
//! │  │   ├─ image_handler  校验·解码·缩放·编码               │
//! │  │   ├─ local_store    本地保存·冲突命名·删除            │
//! │  │   ├─ remote         S3 兼容上传·重试·超时              │
//! │  │   └─ link_rewriter  本地引用 → 远端链接                │
//! │  │                                                       │
//! │  ├─ naming ───── 文件名 / 对象键                          │
//! │  ├─ retry ────── 指数退避                                 │
//! │  ├─ host ─────── Vault / Document / Notifier 能力接口     │
//! │  ├─ settings ─── 配置快照 + JSON 持久化                   │
//! │  ├─ redact ───── 凭证脱敏                                 │
//! │  └─ error ────── AppError（统一错误类型）                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError`，用户可见文本统一脱敏 |
//! | [`workflow`] | 粘贴 / 拖放入口，校验 → 转码 → 本地保存 → 插入 → 上传 → 替换 → 删除 |
//! | [`image_handler`] | 条目加载与校验、解码、两段式缩放、四种格式编码 |
//! | [`local_store`] | 附件目录解析、冲突时追加数字后缀、尽力删除 |
//! | [`remote`] | `StorageBackend` 能力接口与 `object_store` S3 实现 |
//! | [`link_rewriter`] | 文档 token 化与引用精确替换 |
//! | [`naming`] | 时间戳 + 随机后缀文件名、`{year}/{month}/{day}` 路径模板 |
//! | [`retry`] | 与业务无关的异步指数退避 |
//! | [`host`] | 宿主能力接口及文件系统 / 内存文档适配器 |
//! | [`settings`] | 配置类型、默认值、校验与读写 |
//! | [`redact`] | 错误与 URL 脱敏 |

pub mod error;
pub mod host;
pub mod image_handler;
pub mod link_rewriter;
pub mod local_store;
pub mod naming;
pub mod redact;
pub mod remote;
pub mod retry;
pub mod settings;
pub mod workflow;
