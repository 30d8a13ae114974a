//! 制御スレッドへのアクセス検証
//!
//! デバッグ対象の状態遷移（停止・再開、評価の開始・終了、値の追跡）は
//! すべて単一の制御スレッドが所有します。

use std::thread::{self, ThreadId};

/// 制御スレッド
#[derive(Debug, Clone, Copy)]
pub struct ControlThread {
    owner: ThreadId,
}

impl ControlThread {
    /// 呼び出したスレッドを制御スレッドとして登録する
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    /// 現在のスレッドが制御スレッドかどうか
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// 現在のスレッドが制御スレッドであることを検証する
    ///
    /// # Panics
    /// 制御スレッド以外から呼ばれた場合（プログラミングエラー）
    #[track_caller]
    pub fn verify_access(&self) {
        assert!(
            self.is_current(),
            "debugger state accessed from {:?}, but it is owned by control thread {:?}",
            thread::current().id(),
            self.owner
        );
    }
}
