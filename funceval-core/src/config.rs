//! 関数評価の設定

use std::time::Duration;

/// 関数評価のデフォルトタイムアウト
pub const DEFAULT_FUNC_EVAL_TIMEOUT: Duration = Duration::from_secs(1);

/// 関数評価の設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvalConfig {
    /// リモート呼び出しの完了を待つ上限時間
    pub timeout: Duration,
    /// 呼び出し中に他のスレッドを停止させておくかどうか
    ///
    /// false にすると、呼び出し中に他のスレッドが共有状態を書き換える可能性があります。
    pub suspend_other_threads: bool,
}

impl EvalConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_suspend_other_threads(mut self, suspend: bool) -> Self {
        self.suspend_other_threads = suspend;
        self
    }
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FUNC_EVAL_TIMEOUT,
            suspend_other_threads: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EvalConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(1));
        assert!(config.suspend_other_threads);

        let config = config.with_timeout(Duration::from_millis(50));
        assert_eq!(config.timeout, Duration::from_millis(50));
    }
}
