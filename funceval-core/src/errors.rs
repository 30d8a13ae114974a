//! エラー型とエラーメッセージ定数

use funceval_target::TransportError;

/// 停止中でない場合のエラーメッセージ
pub const ERR_FUNC_EVAL_ONLY_WHEN_PAUSED: &str =
    "Func-eval is only possible when the process is paused";

/// 未処理例外で停止している場合のエラーメッセージ
pub const ERR_UNHANDLED_EXCEPTION: &str =
    "Can't func-eval when an unhandled exception has occurred";

/// 同じ停止サイクルで関数評価がタイムアウトした場合のエラーメッセージ
pub const ERR_TIMED_OUT_NOW_DISABLED: &str =
    "Func-eval timed out earlier; func-eval is disabled until the process continues";

/// 別の関数評価が実行中の場合のエラーメッセージ
pub const ERR_ALREADY_EVALUATING: &str = "Can't func-eval while another evaluation is in progress";

/// 関数評価がタイムアウトした場合のエラーメッセージ
pub const ERR_EVALUATION_TIMED_OUT: &str = "Func-eval timed out";

/// 再開後に値へアクセスした場合のエラーメッセージ
pub const ERR_STALE_VALUE: &str =
    "Value is no longer valid: the process has continued since it was created";

/// 関数評価を開始できない理由
///
/// 前提条件の失敗であり、呼び出し元は評価を行わないだけで回復できます。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Refusal {
    #[error("{}", ERR_FUNC_EVAL_ONLY_WHEN_PAUSED)]
    NotPaused,
    #[error("{}", ERR_UNHANDLED_EXCEPTION)]
    UnhandledExceptionActive,
    #[error("{}", ERR_TIMED_OUT_NOW_DISABLED)]
    EvaluationDisabledAfterTimeout,
    #[error("{}", ERR_ALREADY_EVALUATING)]
    EvaluationAlreadyInFlight,
}

/// 関数評価エンジンのエラー
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // --------------------------------- recoverable -----------------------------------------------
    #[error(transparent)]
    Refused(#[from] Refusal),
    #[error("{}", ERR_EVALUATION_TIMED_OUT)]
    EvaluationTimedOut,
    #[error("{}", ERR_STALE_VALUE)]
    StaleValueAccess,
    #[error("debuggee transport error: {0}")]
    Transport(#[from] TransportError),

    // --------------------------------- fatal -----------------------------------------------------
    /// 関数評価リソースを解放できなかった（デバッグ対象との同期が失われた）
    #[error("failed to release func-eval resource, debugger lost sync with debuggee: {0}")]
    ReleaseFailed(#[source] TransportError),
}

impl Error {
    /// エンジンを継続できないエラーかどうか
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ReleaseFailed(_))
    }

    /// 前提条件による拒否であればその理由を返す
    pub fn refusal(&self) -> Option<Refusal> {
        match self {
            Error::Refused(r) => Some(*r),
            _ => None,
        }
    }
}
