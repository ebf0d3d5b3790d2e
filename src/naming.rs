//! # 文件名与远端 Key 生成
//!
//! ## 设计思路
//!
//! 本地文件名与远端 Key 都靠“时间戳 + 随机后缀”避免冲突，
//! 不对远端做存在性检查。时钟与随机源都可注入，测试时结果可复现。
//!
//! ## 实现思路
//!
//! - `generate_name`：保留原名时先清洗再追加毫秒时间戳；否则生成 `image_<ts>_<rand6>`。
//! - `generate_key`：替换 `{year}` / `{month}` / `{day}`，规整首尾斜杠后拼接文件名。
//!   未识别的 `{token}` 原样保留。

use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;

const MAX_BASE_NAME_CHARS: usize = 100;
const RANDOM_SUFFIX_LEN: usize = 6;
const RANDOM_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static DISALLOWED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s.\-]").unwrap());
static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// 清洗文件名主体：去掉非 `\w` / 空白 / `.` / `-` 字符，空白折叠为 `_`，截断到 100 个字符。
pub fn sanitize_file_name(name: &str) -> String {
    let stripped = DISALLOWED_CHARS.replace_all(name, "");
    let collapsed = WHITESPACE_RUN.replace_all(stripped.trim(), "_");
    collapsed.chars().take(MAX_BASE_NAME_CHARS).collect()
}

/// 去掉扩展名后的文件名主体。
pub fn file_stem(name: &str) -> &str {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => base,
        Some(idx) => &base[..idx],
    }
}

/// 文件扩展名（小写，不含点）。
pub fn file_extension(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(0) | None => None,
        Some(idx) => {
            let ext = &base[idx + 1..];
            (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
        }
    }
}

/// 使用当前时间与线程随机源生成文件名。
pub fn generate_name(original_name: &str, extension: &str, preserve_original: bool) -> String {
    generate_name_with(
        original_name,
        extension,
        preserve_original,
        Local::now(),
        &mut rand::thread_rng(),
    )
}

/// 可注入时钟与随机源的文件名生成。
pub fn generate_name_with<Tz: TimeZone, R: Rng + ?Sized>(
    original_name: &str,
    extension: &str,
    preserve_original: bool,
    now: DateTime<Tz>,
    rng: &mut R,
) -> String {
    let timestamp = now.timestamp_millis();
    let extension = extension.trim_start_matches('.');

    if preserve_original && !original_name.trim().is_empty() {
        let base = sanitize_file_name(file_stem(original_name));
        if !base.is_empty() {
            return format!("{}_{}.{}", base, timestamp, extension);
        }
    }

    format!("image_{}_{}.{}", timestamp, random_suffix(rng), extension)
}

fn random_suffix<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..RANDOM_SUFFIX_LEN)
        .map(|_| RANDOM_ALPHABET[rng.gen_range(0..RANDOM_ALPHABET.len())] as char)
        .collect()
}

/// 使用今天的日期生成远端 Key。
pub fn generate_key(file_name: &str, pattern: &str) -> String {
    generate_key_at(file_name, pattern, Local::now().date_naive())
}

/// 按指定日期展开路径模板并拼接文件名。
///
/// # 示例
/// ```rust
/// use chrono::NaiveDate;
/// use paste_upload::naming::generate_key_at;
///
/// let date = NaiveDate::from_ymd_opt(2025, 12, 19).unwrap();
/// assert_eq!(
///     generate_key_at("img.png", "images/{year}/{month}", date),
///     "images/2025/12/img.png"
/// );
/// ```
pub fn generate_key_at(file_name: &str, pattern: &str, date: NaiveDate) -> String {
    let expanded = pattern
        .replace("{year}", &format!("{:04}", date.year()))
        .replace("{month}", &format!("{:02}", date.month()))
        .replace("{day}", &format!("{:02}", date.day()));
    let prefix = expanded.trim_matches('/');
    let file_name = file_name.trim_start_matches('/');

    if prefix.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{}", prefix, file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 12, 19, 8, 30, 0).unwrap()
    }

    #[test]
    fn sanitize_strips_separators_and_special_chars() {
        let cleaned = sanitize_file_name("a/b*c.txt");
        assert_eq!(cleaned, "abc.txt");
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize_file_name("  my   holiday\tphoto "), "my_holiday_photo");
    }

    #[test]
    fn sanitize_truncates_to_100_chars() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_file_name(&long).chars().count(), 100);
    }

    #[test]
    fn stem_and_extension_split_on_last_dot() {
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
        assert_eq!(file_extension("archive.tar.gz").as_deref(), Some("gz"));
        assert_eq!(file_stem(".hidden"), ".hidden");
        assert_eq!(file_extension(".hidden"), None);
        assert_eq!(file_extension("Photo.PNG").as_deref(), Some("png"));
        assert_eq!(file_stem("dir/sub/pic.jpg"), "pic");
    }

    #[test]
    fn preserved_name_gets_timestamp() {
        let mut rng = StdRng::seed_from_u64(7);
        let name = generate_name_with("My Screenshot (1).png", "webp", true, fixed_now(), &mut rng);
        assert_eq!(
            name,
            format!("My_Screenshot_1_{}.webp", fixed_now().timestamp_millis())
        );
    }

    #[test]
    fn generated_name_has_random_suffix() {
        let mut rng = StdRng::seed_from_u64(7);
        let name = generate_name_with("", "png", true, fixed_now(), &mut rng);
        let prefix = format!("image_{}_", fixed_now().timestamp_millis());

        assert!(name.starts_with(&prefix));
        assert!(name.ends_with(".png"));
        let suffix = &name[prefix.len()..name.len() - ".png".len()];
        assert_eq!(suffix.len(), 6);
        assert!(suffix.bytes().all(|b| RANDOM_ALPHABET.contains(&b)));
    }

    #[test]
    fn unusable_original_falls_back_to_generated() {
        let mut rng = StdRng::seed_from_u64(1);
        let name = generate_name_with("***.png", "png", true, fixed_now(), &mut rng);
        assert!(name.starts_with("image_"));
    }

    #[test]
    fn same_millisecond_different_seeds_differ() {
        let a = generate_name_with("", "png", false, fixed_now(), &mut StdRng::seed_from_u64(1));
        let b = generate_name_with("", "png", false, fixed_now(), &mut StdRng::seed_from_u64(2));
        assert_ne!(a, b);
    }

    #[test]
    fn key_pattern_substitutes_date_tokens() {
        let date = NaiveDate::from_ymd_opt(2025, 12, 19).unwrap();
        assert_eq!(
            generate_key_at("img.png", "images/{year}/{month}", date),
            "images/2025/12/img.png"
        );
        assert_eq!(
            generate_key_at("img.png", "/{year}-{month}-{day}/", date),
            "2025-12-19/img.png"
        );
    }

    #[test]
    fn key_pattern_pads_and_keeps_unknown_tokens() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        assert_eq!(
            generate_key_at("a.png", "{year}/{month}/{day}/{user}", date),
            "2026/03/05/{user}/a.png"
        );
    }

    #[test]
    fn empty_pattern_yields_bare_file_name() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        assert_eq!(generate_key_at("a.png", "", date), "a.png");
        assert_eq!(generate_key_at("a.png", "///", date), "a.png");
    }

    proptest! {
        #[test]
        fn sanitized_names_never_contain_separators(name in "\\PC{0,300}") {
            let cleaned = sanitize_file_name(&name);
            prop_assert!(cleaned.chars().count() <= 100);
            prop_assert!(!cleaned.contains('/'));
            prop_assert!(!cleaned.contains('\\'));
            prop_assert!(!cleaned.chars().any(|c| c.is_control()));
        }
    }
}
