//! 单个条目的处理阶段与结果。

use std::fmt;
use std::time::Duration;

/// 条目处理阶段，按发生顺序排列。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Validating,
    Transcoding,
    ReadingRaw,
    LocalSave,
    DocumentInsert,
    Uploading,
    LinkRewrite,
    LocalDelete,
    Done,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::Validating => "validating",
            Stage::Transcoding => "transcoding",
            Stage::ReadingRaw => "reading-raw",
            Stage::LocalSave => "local-save",
            Stage::DocumentInsert => "document-insert",
            Stage::Uploading => "uploading",
            Stage::LinkRewrite => "link-rewrite",
            Stage::LocalDelete => "local-delete",
            Stage::Done => "done",
        }
    }

    /// 该阶段失败是否放弃整个条目（此时文档里还没有任何引用）。
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Stage::Validating | Stage::Transcoding | Stage::ReadingRaw | Stage::LocalSave
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 条目的最终结果。错误文本均已脱敏。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// 上传成功且链接已替换。
    Uploaded { local_deleted: bool },
    /// 未启用上传，只保留本地副本。
    LocalOnly,
    /// 上传失败，文档保留本地引用。
    UploadFailed(String),
    /// 上传成功，但文档中找不到本地引用。
    RewriteFailed,
    /// 在插入文档之前失败，没有留下任何状态。
    Failed(String),
}

impl ItemOutcome {
    /// 文档里最终引用的是远端链接。
    pub fn is_remote(&self) -> bool {
        matches!(self, ItemOutcome::Uploaded { .. })
    }

    /// 文档里留有该条目的引用（本地或远端）。
    pub fn is_referenced(&self) -> bool {
        !matches!(self, ItemOutcome::Failed(_))
    }
}

/// 每个输入条目对应一份报告，顺序与输入一致。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub name: String,
    /// 最后到达的阶段；失败时为出错的阶段。
    pub stage: Stage,
    pub outcome: ItemOutcome,
    pub local_path: Option<String>,
    pub url: Option<String>,
    pub elapsed: Duration,
    /// 已完成阶段的耗时，按执行顺序。
    pub timings: Vec<(Stage, Duration)>,
}

/// 各阶段耗时，条目结束时汇总成一行日志。
#[derive(Debug, Default)]
pub(super) struct StageTimings {
    entries: Vec<(Stage, Duration)>,
}

impl StageTimings {
    pub(super) fn record(&mut self, stage: Stage, elapsed: Duration) {
        self.entries.push((stage, elapsed));
    }

    pub(super) fn summary(&self) -> String {
        self.entries
            .iter()
            .map(|(stage, elapsed)| format!("{}={}ms", stage, elapsed.as_millis()))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub(super) fn into_entries(self) -> Vec<(Stage, Duration)> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_stages_precede_document_insert() {
        for stage in [
            Stage::Validating,
            Stage::Transcoding,
            Stage::ReadingRaw,
            Stage::LocalSave,
        ] {
            assert!(stage.is_fatal());
            assert!(stage < Stage::DocumentInsert);
        }
        assert!(!Stage::Uploading.is_fatal());
        assert!(!Stage::LinkRewrite.is_fatal());
    }

    #[test]
    fn timings_summary_lists_stages_in_order() {
        let mut timings = StageTimings::default();
        timings.record(Stage::Validating, Duration::from_millis(1));
        timings.record(Stage::Uploading, Duration::from_millis(250));
        assert_eq!(timings.summary(), "validating=1ms uploading=250ms");
    }
}
