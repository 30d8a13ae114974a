//! 停止サイクル
//!
//! 停止から次の再開までの間だけ存在する状態です。停止時に作成され、
//! 再開時に消費されます。タイムアウトマーカーを明示的に消す操作は存在しないため、
//! 同じ停止サイクル内で関数評価が再び有効になることはありません。

use funceval_target::StopReason;
use std::fmt;

/// 停止サイクルのID（エンジンごとに単調増加）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PauseCycleId(pub u64);

impl fmt::Display for PauseCycleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pause#{}", self.0)
    }
}

/// 停止サイクルの状態
#[derive(Debug)]
pub struct PauseCycle {
    id: PauseCycleId,
    stop_reason: StopReason,
    timed_out: bool,
}

impl PauseCycle {
    pub fn new(id: PauseCycleId, stop_reason: StopReason) -> Self {
        Self {
            id,
            stop_reason,
            timed_out: false,
        }
    }

    pub fn id(&self) -> PauseCycleId {
        self.id
    }

    pub fn stop_reason(&self) -> &StopReason {
        &self.stop_reason
    }

    /// 未処理例外で停止したかどうか
    pub fn is_unhandled_exception(&self) -> bool {
        self.stop_reason.is_unhandled_exception()
    }

    /// この停止サイクルで関数評価がタイムアウトしたかどうか
    pub fn has_timed_out_marker(&self) -> bool {
        self.timed_out
    }

    /// タイムアウトマーカーを設定する（冪等）
    pub fn set_timed_out_marker(&mut self) {
        self.timed_out = true;
    }
}
