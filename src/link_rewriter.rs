//! # 链接替换
//!
//! ## 设计思路
//!
//! 不在原始文本上做子串匹配，而是先把文档切成 `Text` / `Code` / `Reference` 三类 token，
//! 只在 `Reference` 上按目标路径精确比较。这样：
//! - `a.png` 不会误中 `old/a.png`
//! - 代码块与行内代码里的示例链接不会被改写
//!
//! ## 识别的引用形式
//!
//! - Markdown：`[label](target)`、`![label](target)`，目标可用 `<…>` 包裹，可带标题
//! - Wiki：`[[target]]`、`[[target|alias]]`、`![[target|alias]]`
//!
//! 比较前会去掉尖括号并做百分号解码。替换结果统一输出为 Markdown 形式。

use std::borrow::Cow;

use crate::naming::file_extension;

/// 视为图片、替换后保持嵌入的扩展名。
pub const RASTER_EXTENSIONS: [&str; 8] = ["png", "jpg", "jpeg", "gif", "webp", "avif", "bmp", "svg"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Markdown,
    Wiki,
}

/// 文档中的一个引用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference<'a> {
    /// 原始文本片段。
    pub raw: &'a str,
    pub kind: ReferenceKind,
    /// 是否带 `!` 前缀。
    pub embed: bool,
    /// Markdown 的 label 或 Wiki 的 alias（无 alias 时为空）。
    pub label: &'a str,
    /// 去掉尖括号后的目标。
    pub target: &'a str,
    /// 含引号的标题，如 `"title"`。
    pub title: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Text(&'a str),
    Code(&'a str),
    Reference(Reference<'a>),
}

impl<'a> Token<'a> {
    /// token 对应的原始文本。
    pub fn as_str(&self) -> &'a str {
        match self {
            Token::Text(s) | Token::Code(s) => s,
            Token::Reference(r) => r.raw,
        }
    }
}

/// 把文档切分为 token，所有 token 依次拼接等于原文。
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut text_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let at_line_start = i == 0 || bytes[i - 1] == b'\n';

        if at_line_start {
            if let Some(end) = fenced_block(text, i) {
                push_text(&mut tokens, text, text_start, i);
                tokens.push(Token::Code(&text[i..end]));
                i = end;
                text_start = end;
                continue;
            }
        }

        match bytes[i] {
            b'`' => match code_span(text, i) {
                Ok(end) => {
                    push_text(&mut tokens, text, text_start, i);
                    tokens.push(Token::Code(&text[i..end]));
                    i = end;
                    text_start = end;
                }
                Err(run) => i += run,
            },
            b'!' | b'[' => match parse_reference(text, i) {
                Some((reference, end)) => {
                    push_text(&mut tokens, text, text_start, i);
                    tokens.push(Token::Reference(reference));
                    i = end;
                    text_start = end;
                }
                None => i += 1,
            },
            _ => i += 1,
        }
    }

    push_text(&mut tokens, text, text_start, text.len());
    tokens
}

fn push_text<'a>(tokens: &mut Vec<Token<'a>>, text: &'a str, start: usize, end: usize) {
    if start < end {
        tokens.push(Token::Text(&text[start..end]));
    }
}

fn line_end(text: &str, start: usize) -> usize {
    text[start..]
        .find('\n')
        .map(|n| start + n + 1)
        .unwrap_or(text.len())
}

/// 行首最多三个空格后跟至少三个相同的 `` ` `` 或 `~`。
fn fence_marker(line: &str) -> Option<(u8, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let rest = line[indent..].as_bytes();
    let marker = *rest.first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let len = rest.iter().take_while(|&&b| b == marker).count();
    (len >= 3).then_some((marker, len))
}

/// 围栏代码块，未闭合时延伸到文末。
fn fenced_block(text: &str, start: usize) -> Option<usize> {
    let first_end = line_end(text, start);
    let (marker, fence_len) = fence_marker(&text[start..first_end])?;

    let mut pos = first_end;
    while pos < text.len() {
        let next = line_end(text, pos);
        let line = &text[pos..next];
        if let Some((m, len)) = fence_marker(line) {
            if m == marker && len >= fence_len && line.trim().bytes().all(|b| b == marker) {
                return Some(next);
            }
        }
        pos = next;
    }

    Some(text.len())
}

/// 行内代码；未闭合时返回反引号串长度，调用方跳过整串。
fn code_span(text: &str, start: usize) -> Result<usize, usize> {
    let bytes = text.as_bytes();
    let run = bytes[start..].iter().take_while(|&&b| b == b'`').count();
    let mut pos = start + run;

    while pos < bytes.len() {
        if bytes[pos] == b'`' {
            let close = bytes[pos..].iter().take_while(|&&b| b == b'`').count();
            if close == run {
                return Ok(pos + close);
            }
            pos += close;
        } else {
            pos += 1;
        }
    }

    Err(run)
}

fn parse_reference(text: &str, start: usize) -> Option<(Reference<'_>, usize)> {
    let bytes = text.as_bytes();
    let embed = bytes[start] == b'!';
    let open = if embed { start + 1 } else { start };

    if bytes.get(open) != Some(&b'[') {
        return None;
    }
    if bytes.get(open + 1) == Some(&b'[') {
        return parse_wiki(text, start, embed, open + 2);
    }
    parse_markdown(text, start, embed, open + 1)
}

fn parse_wiki(text: &str, start: usize, embed: bool, inner_start: usize) -> Option<(Reference<'_>, usize)> {
    let close = inner_start + text[inner_start..].find("]]")?;
    let inner = &text[inner_start..close];
    if inner.trim().is_empty() || inner.contains('\n') || inner.contains('[') {
        return None;
    }

    let (target, label) = match inner.split_once('|') {
        Some((target, alias)) => (target.trim(), alias),
        None => (inner.trim(), ""),
    };
    let end = close + 2;

    Some((
        Reference {
            raw: &text[start..end],
            kind: ReferenceKind::Wiki,
            embed,
            label,
            target,
            title: None,
        },
        end,
    ))
}

fn skip_inline_space(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
        pos += 1;
    }
    pos
}

/// 标签的闭合 `]`：嵌套方括号需配对，反斜杠转义下一个字符，不跨行。
fn label_close(bytes: &[u8], label_start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut pos = label_start;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 1,
            b'[' => depth += 1,
            b']' if depth == 0 => return Some(pos),
            b']' => depth -= 1,
            b'\n' => return None,
            _ => {}
        }
        pos += 1;
    }
    None
}

fn parse_markdown(text: &str, start: usize, embed: bool, label_start: usize) -> Option<(Reference<'_>, usize)> {
    let bytes = text.as_bytes();
    let label_end = label_close(bytes, label_start)?;
    let label = &text[label_start..label_end];

    if bytes.get(label_end + 1) != Some(&b'(') {
        return None;
    }
    let mut pos = skip_inline_space(bytes, label_end + 2);

    let target = if bytes.get(pos) == Some(&b'<') {
        let close = pos + 1 + text[pos + 1..].find('>')?;
        let target = &text[pos + 1..close];
        if target.contains('\n') {
            return None;
        }
        pos = close + 1;
        target
    } else {
        let target_start = pos;
        let mut depth = 0usize;
        while pos < bytes.len() {
            match bytes[pos] {
                b'(' => depth += 1,
                b')' if depth == 0 => break,
                b')' => depth -= 1,
                b' ' | b'\t' | b'\n' => break,
                _ => {}
            }
            pos += 1;
        }
        &text[target_start..pos]
    };

    let after_target = pos;
    pos = skip_inline_space(bytes, pos);

    let mut title = None;
    if pos > after_target {
        if let Some(&quote) = bytes.get(pos) {
            let closer = match quote {
                b'"' => Some('"'),
                b'\'' => Some('\''),
                b'(' => Some(')'),
                _ => None,
            };
            if let Some(closer) = closer {
                let close = pos + 1 + text[pos + 1..].find(closer)?;
                title = Some(&text[pos..=close]);
                pos = skip_inline_space(bytes, close + 1);
            }
        }
    }

    if bytes.get(pos) != Some(&b')') {
        return None;
    }
    let end = pos + 1;

    Some((
        Reference {
            raw: &text[start..end],
            kind: ReferenceKind::Markdown,
            embed,
            label,
            target,
            title,
        },
        end,
    ))
}

fn decode(value: &str) -> Cow<'_, str> {
    urlencoding::decode(value).unwrap_or(Cow::Borrowed(value))
}

/// 目标是否指向 `path`（忽略百分号编码差异）。
pub fn target_matches(target: &str, path: &str) -> bool {
    target == path || decode(target) == decode(path)
}

/// 路径扩展名是否属于常见图片格式。
pub fn has_raster_extension(path: &str) -> bool {
    file_extension(&decode(path))
        .map(|ext| RASTER_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// 目标含空格或括号时用 `<…>` 包裹。
pub fn format_target(target: &str) -> Cow<'_, str> {
    if target.contains([' ', '(', ')']) {
        Cow::Owned(format!("<{}>", target))
    } else {
        Cow::Borrowed(target)
    }
}

/// 生成 Markdown 引用：`![label](target)` 或 `[label](target)`。
pub fn format_reference(embed: bool, label: &str, target: &str) -> String {
    format_reference_with_title(embed, label, target, None)
}

fn format_reference_with_title(embed: bool, label: &str, target: &str, title: Option<&str>) -> String {
    let prefix = if embed { "!" } else { "" };
    match title {
        Some(title) => format!("{}[{}]({} {})", prefix, label, format_target(target), title),
        None => format!("{}[{}]({})", prefix, label, format_target(target)),
    }
}

/// 文档内使用的链接目标：文件在文档目录下时取相对路径，否则用仓库路径。
pub fn link_target(document_folder: Option<&str>, vault_path: &str) -> String {
    let folder = document_folder.unwrap_or("").trim_matches('/');
    if folder.is_empty() {
        return vault_path.to_string();
    }
    vault_path
        .strip_prefix(folder)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(vault_path)
        .to_string()
}

/// 把第一个指向 `old_path` 的引用改为指向 `new_url`。
///
/// 找不到时返回 `None`，原文不变。
///
/// # 示例
/// ```rust
/// use paste_upload::link_rewriter::replace_reference;
///
/// let text = "see ![shot](assets/shot.png)";
/// let updated = replace_reference(text, "assets/shot.png", "https://cdn/x.png").unwrap();
/// assert_eq!(updated, "see ![shot](https://cdn/x.png)");
/// assert!(replace_reference(&updated, "assets/shot.png", "https://cdn/x.png").is_none());
/// ```
pub fn replace_reference(text: &str, old_path: &str, new_url: &str) -> Option<String> {
    let mut offset = 0;

    for token in tokenize(text) {
        let raw = token.as_str();
        if let Token::Reference(reference) = &token {
            if target_matches(reference.target, old_path) {
                let embed = reference.embed || has_raster_extension(old_path);
                let replacement =
                    format_reference_with_title(embed, reference.label, new_url, reference.title);

                let mut updated = String::with_capacity(text.len() + replacement.len());
                updated.push_str(&text[..offset]);
                updated.push_str(&replacement);
                updated.push_str(&text[offset + raw.len()..]);
                return Some(updated);
            }
        }
        offset += raw.len();
    }

    None
}
