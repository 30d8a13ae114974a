//! プロセスの停止理由

/// 停止イベントの種類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// ブレークポイントヒット
    Breakpoint,
    /// ステップ実行完了
    Step,
    /// ユーザーによる一時停止
    Break,
    /// 例外の通知で停止
    ///
    /// `unhandled` が true の場合、ランタイムは未処理例外の巻き戻し中であり、
    /// 任意のメソッド呼び出しは安全ではありません。
    Exception { type_name: String, unhandled: bool },
    /// その他の停止
    Other,
}

impl StopReason {
    /// 未処理例外による停止かどうか
    pub fn is_unhandled_exception(&self) -> bool {
        matches!(self, StopReason::Exception { unhandled: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unhandled_exception() {
        let first_chance = StopReason::Exception {
            type_name: "System.Exception".into(),
            unhandled: false,
        };
        let unhandled = StopReason::Exception {
            type_name: "System.Exception".into(),
            unhandled: true,
        };
        assert!(!first_chance.is_unhandled_exception());
        assert!(unhandled.is_unhandled_exception());
        assert!(!StopReason::Breakpoint.is_unhandled_exception());
    }
}
