//! # 指数退避重试
//!
//! 与具体业务解耦的高阶函数：给定最大尝试次数、初始延迟与倍率，
//! 包装任意异步操作。目前只用在上传边界；解码与本地磁盘操作不重试。

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

const DEFAULT_MULTIPLIER: u32 = 2;
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// 重试策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次），至少为 1。
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
    /// 单次等待上限。
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// 第 `retry` 次重试（从 1 开始）之前的等待时间。
    ///
    /// `base * multiplier^(retry-1)`，并截断到 `max_delay`。
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .saturating_mul(factor)
            .min(self.max_delay.max(self.base_delay))
    }
}

/// 以指数退避执行异步操作。
///
/// - `is_retryable` 返回 `false` 的错误立即返回，不再等待。
/// - `operation` 收到当前尝试序号（从 1 开始），便于日志。
///
/// # 示例
/// ```rust
/// use std::time::Duration;
/// use paste_upload::retry::{retry_with_backoff, RetryPolicy};
///
/// # async fn demo() -> Result<(), String> {
/// let policy = RetryPolicy::new(3, Duration::from_millis(10));
/// let value = retry_with_backoff(&policy, |_e: &String| true, |_attempt| async {
///     Ok::<_, String>(42)
/// })
/// .await?;
/// assert_eq!(value, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    is_retryable: R,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("✅ 第 {} 次尝试成功", attempt);
                }
                return Ok(value);
            }
            Err(err) => {
                let retryable = is_retryable(&err);
                log::warn!(
                    "❌ 尝试 {}/{} 失败: {}（retryable={}）",
                    attempt,
                    max_attempts,
                    err,
                    retryable
                );

                if !retryable || attempt >= max_attempts {
                    return Err(err);
                }

                let wait = policy.delay_before_retry(attempt);
                log::debug!("🔄 {}ms 后重试", wait.as_millis());
                tokio::time::sleep(wait).await;
                attempt += 1;
            }
        }
    }
}
