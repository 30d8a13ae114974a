//! デバッグプロトコルのトランスポート抽象
//!
//! ワイヤフォーマットはこのクレートの範囲外です。エンジンは
//! 「タイムアウト付きでリモート呼び出しを行う」機能と「位置から値を読み込む」機能だけに依存します。

use crate::{HandleId, Loaded, MethodId, ObjectId, RemoteHandle, RemoteValue, Result, ThreadId, ValueLocation};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::Duration;

/// トランスポートのエラー
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown thread {0}")]
    NoSuchThread(ThreadId),
    #[error("unknown object {0}")]
    NoSuchObject(ObjectId),
    #[error("method {0} not found")]
    NoSuchMethod(MethodId),
    #[error("invalid value location: {0}")]
    InvalidLocation(ValueLocation),
    #[error("unknown func-eval #{0}")]
    UnknownFuncEval(u64),
    #[error("unknown value handle #{0}")]
    UnknownHandle(u64),
    #[error("func-eval #{0} is already open on this thread")]
    FuncEvalBusy(u64),
    #[error("connection to the debuggee was lost")]
    Disconnected,
}

/// 関数評価リソースのID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncEvalId(pub u64);

/// キャンセルトークン
///
/// プロトコルにはデバッグ対象内での協調的なキャンセルが存在しないため、
/// エンジン自身がこのトークンを発火させることはありません。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Option<Arc<AtomicBool>>);

impl CancelToken {
    /// 決して発火しないトークン
    pub fn none() -> Self {
        Self(None)
    }

    /// 発火可能なトークンを作成する
    pub fn new() -> Self {
        Self(Some(Arc::new(AtomicBool::new(false))))
    }

    pub fn cancel(&self) {
        if let Some(flag) = &self.0 {
            flag.store(true, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

/// 関数評価リソースを開くときのオプション
#[derive(Debug, Clone)]
pub struct FuncEvalOptions {
    /// 呼び出し完了を待つ上限時間
    pub timeout: Duration,
    /// 呼び出し中に他のスレッドを停止させておくかどうか
    pub suspend_other_threads: bool,
    pub cancel: CancelToken,
}

/// リモート呼び出しの完了結果
#[derive(Debug, Clone, PartialEq)]
pub enum CallReturn {
    /// メソッドが値を返した（nullの場合は `Loaded::Null`）
    Returned(Loaded),
    /// メソッドが例外を送出した
    Threw(RemoteHandle),
}

/// 完了通知チャネルに流れる値
pub type CallResult = Result<CallReturn>;

/// デバッグ対象と通信するトランスポート
///
/// 値ハンドルの解放は制御スレッド以外から要求されることがあるため、
/// 実装は `Send + Sync` でなければなりません。
pub trait Transport: Send + Sync {
    /// 対象スレッドに束縛された関数評価リソースを開く
    fn open_func_eval(&self, thread: ThreadId, options: &FuncEvalOptions) -> Result<FuncEvalId>;

    /// 関数評価リソース上でメソッド呼び出しを発行する
    ///
    /// 呼び出しは非同期に進み、完了するとチャネルに結果が一度だけ送られます。
    /// 完了しないまま送信側が破棄された場合、受信側は切断を観測します。
    fn call_method(
        &self,
        eval: FuncEvalId,
        method: &MethodId,
        this: Option<ObjectId>,
        args: &[RemoteValue],
    ) -> Result<Receiver<CallResult>>;

    /// 関数評価リソースを解放する
    fn close_func_eval(&self, eval: FuncEvalId) -> Result<()>;

    /// 位置から値を読み込む
    fn load(&self, location: &ValueLocation) -> Result<Loaded>;

    /// 値ハンドルを解放する
    fn release(&self, handle: HandleId) -> Result<()>;

    /// デバッグ対象の実行を再開する
    fn resume(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token() {
        let none = CancelToken::none();
        none.cancel();
        assert!(!none.is_cancelled());

        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
